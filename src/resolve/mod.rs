//! Resolution layer: macro expansion, numbering, link rewriting, footnote and
//! citation collection, and cross-reference resolution.
//!
//! The passes run strictly in [`Phase`] order over a single mutable tree.
//! Each one walks from the root in document order, so numbers, footnote
//! order and citation order all follow the source.

pub mod collect;
pub mod enumerate;
pub mod links;
pub mod macros;
pub mod references;
pub mod state;

pub use collect::{collect, CitationRegistry, FootnoteRegistry};
pub use enumerate::enumerate_targets;
pub use links::{
    DoiLinks, IssueLinks, LinkMatch, LinkTarget, LinkTransformer, LinkTransformers,
    RegexTransformer, RridLinks, WikiLinks,
};
pub use macros::expand_math_macros;
pub use references::resolve_references;
pub use state::{anchor, ReferenceState, Target};

use crate::ast::{BibEntry, Tree};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Error, Result};
use crate::frontmatter::Frontmatter;
use serde::Serialize;
use std::collections::HashMap;

/// Pipeline phases. The tree is in a phase once the pass of that name has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Parsed,
    MacroExpanded,
    Enumerated,
    LinksTransformed,
    CollectionsBuilt,
    Resolved,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Parsed => Some(Phase::MacroExpanded),
            Phase::MacroExpanded => Some(Phase::Enumerated),
            Phase::Enumerated => Some(Phase::LinksTransformed),
            Phase::LinksTransformed => Some(Phase::CollectionsBuilt),
            Phase::CollectionsBuilt => Some(Phase::Resolved),
            Phase::Resolved => None,
        }
    }
}

/// Configuration for resolution.
#[derive(Debug)]
pub struct PipelineOptions {
    pub transformers: LinkTransformers,
    /// Bibliography data keyed by citation key. Loading it is up to the caller.
    pub bibliography: HashMap<String, BibEntry>,
    /// Let DOI links contribute citation entries.
    pub doi_citations: bool,
    /// Record the YAML snapshot of the parsed tree.
    pub snapshot: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            transformers: LinkTransformers::default(),
            bibliography: HashMap::new(),
            doi_citations: true,
            snapshot: true,
        }
    }
}

/// Everything the renderers need besides the tree.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Title, authors and numbering policy the document was resolved with.
    pub frontmatter: Frontmatter,
    pub state: ReferenceState,
    pub citations: CitationRegistry,
    pub footnotes: FootnoteRegistry,
    pub diagnostics: Diagnostics,
    /// YAML dump of the tree as parsed, with links transformed and positions stripped.
    pub snapshot: Option<String>,
}

/// Step-wise driver over the passes.
pub struct Pipeline<'a> {
    tree: &'a mut Tree,
    frontmatter: &'a Frontmatter,
    options: &'a PipelineOptions,
    phase: Phase,
    state: ReferenceState,
    citations: CitationRegistry,
    footnotes: FootnoteRegistry,
    diagnostics: Diagnostics,
    snapshot: Option<String>,
}

impl<'a> Pipeline<'a> {
    pub fn new(tree: &'a mut Tree, frontmatter: &'a Frontmatter, options: &'a PipelineOptions) -> Self {
        let snapshot = if options.snapshot {
            match snapshot(tree, &options.transformers) {
                Ok(yaml) => Some(yaml),
                Err(err) => {
                    tracing::warn!(error = %err, "could not record tree snapshot");
                    None
                }
            }
        } else {
            None
        };

        Self {
            state: ReferenceState::new(frontmatter.numbering.clone()),
            tree,
            frontmatter,
            options,
            phase: Phase::Parsed,
            citations: CitationRegistry::default(),
            footnotes: FootnoteRegistry::default(),
            diagnostics: Diagnostics::new(),
            snapshot,
        }
    }

    /// Seed the sink with diagnostics from earlier stages (parsing, front matter).
    pub fn with_diagnostics(mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn tree(&self) -> &Tree {
        self.tree
    }

    /// Run the next pass. Returns the phase reached, or `None` when resolution
    /// has already finished.
    pub fn step(&mut self) -> Option<Phase> {
        let next = self.phase.next()?;
        tracing::debug!(phase = ?next, "running pass");

        match next {
            Phase::Parsed => {}
            Phase::MacroExpanded => {
                expand_math_macros(self.tree, &self.frontmatter.math, &mut self.diagnostics);
            }
            Phase::Enumerated => {
                enumerate_targets(self.tree, &mut self.state, &mut self.diagnostics);
            }
            Phase::LinksTransformed => {
                self.options
                    .transformers
                    .apply(self.tree, &mut self.diagnostics);
            }
            Phase::CollectionsBuilt => {
                let (citations, footnotes) = collect(
                    self.tree,
                    &self.options.bibliography,
                    self.options.doi_citations,
                    &mut self.diagnostics,
                );
                self.citations = citations;
                self.footnotes = footnotes;
            }
            Phase::Resolved => {
                resolve_references(self.tree, &self.state, &mut self.diagnostics);
            }
        }

        self.phase = next;
        Some(next)
    }

    /// Run passes until `phase` is reached. Asking for a phase the pipeline
    /// has already passed is an error.
    pub fn run_until(&mut self, phase: Phase) -> Result<()> {
        if phase < self.phase {
            return Err(Error::Phase {
                requested: phase,
                current: self.phase,
            });
        }
        while self.phase < phase {
            if self.step().is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Run any remaining passes and hand over the registries.
    pub fn finish(mut self) -> PipelineResult {
        while self.step().is_some() {}

        tracing::debug!(
            labels = self.state.len(),
            citations = self.citations.len(),
            footnotes = self.footnotes.len(),
            diagnostics = self.diagnostics.len(),
            "resolution finished"
        );

        PipelineResult {
            frontmatter: self.frontmatter.clone(),
            state: self.state,
            citations: self.citations,
            footnotes: self.footnotes,
            diagnostics: self.diagnostics,
            snapshot: self.snapshot,
        }
    }
}

/// Run every pass over `tree`.
pub fn run(tree: &mut Tree, frontmatter: &Frontmatter, options: &PipelineOptions) -> PipelineResult {
    Pipeline::new(tree, frontmatter, options).finish()
}

/// YAML dump of a copy of `tree` with link transforms applied and positions
/// stripped. `tree` itself is untouched.
pub fn snapshot(tree: &Tree, transformers: &LinkTransformers) -> Result<String> {
    let mut copy = tree.clone();
    transformers.apply(&mut copy, &mut Diagnostics::new());
    Ok(copy.to_yaml()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeKind, RefStatus};
    use crate::parser::{parse, ParseOptions};
    use pretty_assertions::assert_eq;

    fn parsed(input: &str) -> Tree {
        parse(input, &ParseOptions::default()).unwrap().tree
    }

    #[test]
    fn test_resolve_simple_document() {
        let mut tree = parsed("# Introduction {#sec:intro}\n\nSome text with a reference to @sec:intro.\n");
        let result = run(&mut tree, &Frontmatter::default(), &PipelineOptions::default());

        assert!(result.state.contains("sec:intro"));
        assert!(result.diagnostics.is_empty());
        let xref = tree
            .preorder(tree.root())
            .into_iter()
            .find_map(|id| match tree.kind(id) {
                NodeKind::CrossReference { status, .. } => Some(status.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(xref.target().map(|t| t.display.as_str()), Some("Introduction"));
    }

    #[test]
    fn test_phases_advance_in_order() {
        let mut tree = parsed("Text.");
        let frontmatter = Frontmatter::default();
        let options = PipelineOptions::default();
        let mut pipeline = Pipeline::new(&mut tree, &frontmatter, &options);

        assert_eq!(pipeline.phase(), Phase::Parsed);
        assert_eq!(pipeline.step(), Some(Phase::MacroExpanded));
        pipeline.run_until(Phase::LinksTransformed).unwrap();
        assert_eq!(pipeline.phase(), Phase::LinksTransformed);

        let err = pipeline.run_until(Phase::Enumerated).unwrap_err();
        assert!(matches!(
            err,
            Error::Phase {
                requested: Phase::Enumerated,
                current: Phase::LinksTransformed
            }
        ));

        pipeline.run_until(Phase::Resolved).unwrap();
        assert_eq!(pipeline.step(), None);
    }

    #[test]
    fn test_snapshot_has_links_but_no_numbers() {
        let mut tree = parsed("$$\nx\n$$ {#eq:x}\n\nSee [[Home]].");
        let result = run(&mut tree, &Frontmatter::default(), &PipelineOptions::default());
        let yaml = result.snapshot.unwrap();

        assert!(yaml.contains("protocol: wiki"));
        assert!(!yaml.contains("numbered"));
        assert!(!yaml.contains("position"));
    }

    #[test]
    fn test_links_transformed_after_enumeration() {
        let mut tree = parsed("See @missing and [[Page]].");
        let options = PipelineOptions {
            snapshot: false,
            ..PipelineOptions::default()
        };
        let result = run(&mut tree, &Frontmatter::default(), &options);

        assert!(result.snapshot.is_none());
        assert_eq!(result.diagnostics.errors().count(), 1);
        let kinds: Vec<&'static str> = tree
            .preorder(tree.root())
            .into_iter()
            .map(|id| tree.kind(id).name())
            .collect();
        assert!(kinds.contains(&"link"));
        assert!(tree.preorder(tree.root()).into_iter().any(|id| matches!(
            tree.kind(id),
            NodeKind::CrossReference {
                status: RefStatus::Missing,
                ..
            }
        )));
    }
}
