//! Rendering layer: projects a resolved tree into HTML, LaTeX and JATS.
//!
//! Renderers only read the tree and the [`PipelineResult`]. Numbers,
//! footnote order and reference text all come from the pipeline, so the
//! three outputs agree with each other. Renderers never fail: anything a
//! format cannot express becomes a diagnostic tagged with that format.

pub mod html;
pub mod jats;
pub mod latex;
pub mod math;

pub use html::{render_html, HtmlConfig};
pub use jats::{render_jats, JatsConfig};
pub use latex::{render_latex, LatexConfig};
pub use math::{MathBackend, MathRenderer};

use crate::ast::{BibEntry, NodeId, NodeKind, Tree};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity, TargetFormat};
use crate::error::RenderError;
use crate::resolve::PipelineResult;
use std::collections::HashSet;

/// Output of one renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub format: TargetFormat,
    pub output: String,
    /// Upstream diagnostics for nodes this renderer had to degrade, plus its own.
    pub diagnostics: Vec<Diagnostic>,
}

/// A projection of the resolved tree into one output format.
pub trait Renderer: Sync {
    fn format(&self) -> TargetFormat;

    fn render(&self, tree: &Tree, result: &PipelineResult) -> Rendered;
}

/// Configuration for [`render_all`].
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub html: HtmlConfig,
    pub latex: LatexConfig,
    pub jats: JatsConfig,
}

/// All three outputs.
#[derive(Debug, Clone)]
pub struct Outputs {
    pub html: Rendered,
    pub latex: Rendered,
    pub jats: Rendered,
}

impl Outputs {
    pub fn iter(&self) -> impl Iterator<Item = &Rendered> {
        [&self.html, &self.latex, &self.jats].into_iter()
    }

    pub fn get(&self, format: TargetFormat) -> &Rendered {
        match format {
            TargetFormat::Html => &self.html,
            TargetFormat::Latex => &self.latex,
            TargetFormat::Jats => &self.jats,
        }
    }
}

/// Run the three renderers in parallel over the shared, finished tree.
pub fn render_all(tree: &Tree, result: &PipelineResult, options: &RenderOptions) -> Outputs {
    let (html, (latex, jats)) = rayon::join(
        || options.html.render(tree, result),
        || {
            rayon::join(
                || options.latex.render(tree, result),
                || options.jats.render(tree, result),
            )
        },
    );
    tracing::debug!(
        html = html.output.len(),
        latex = latex.output.len(),
        jats = jats.output.len(),
        "rendered all formats"
    );
    Outputs { html, latex, jats }
}

/// State shared by the renderers while walking the tree.
pub(crate) struct RenderContext<'a> {
    pub tree: &'a Tree,
    pub result: &'a PipelineResult,
    format: TargetFormat,
    diagnostics: Vec<Diagnostic>,
    surfaced: HashSet<NodeId>,
}

impl<'a> RenderContext<'a> {
    pub fn new(tree: &'a Tree, result: &'a PipelineResult, format: TargetFormat) -> Self {
        Self {
            tree,
            result,
            format,
            diagnostics: Vec::new(),
            surfaced: HashSet::new(),
        }
    }

    /// Re-report the pipeline's diagnostics for a node rendered as a placeholder.
    pub fn surface(&mut self, id: NodeId) {
        if !self.surfaced.insert(id) {
            return;
        }
        let format = self.format;
        self.diagnostics.extend(
            self.result
                .diagnostics
                .for_node(id)
                .map(|d| d.clone().for_format(format)),
        );
    }

    /// Record a renderer-local problem.
    pub fn report(&mut self, id: NodeId, severity: Severity, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(severity, DiagnosticKind::Render, message)
            .at(self.tree[id].position)
            .on(id)
            .for_format(self.format);
        match severity {
            Severity::Info => tracing::debug!("{}", diagnostic),
            _ => tracing::warn!("{}", diagnostic),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Report content this format cannot express.
    pub fn unsupported(&mut self, id: NodeId, what: impl Into<String>) {
        let err = RenderError::Unsupported {
            format: self.format.name(),
            what: what.into(),
        };
        self.report(id, Severity::Info, err.to_string());
    }

    /// Printed label of a numbered node, e.g. `Figure 2` or `(3)`.
    pub fn number_label(&self, id: NodeId) -> Option<String> {
        let numbered = self.tree[id].numbered.as_ref()?;
        let noun = match self.tree.kind(id) {
            NodeKind::Environment { kind } => kind.display_name(),
            _ => numbered.category.title(),
        };
        Some(
            self.result
                .state
                .format(numbered.category, noun, &numbered.enumerator),
        )
    }

    /// Anchor of a node's identifier, as issued when the label was registered.
    pub fn anchor(&self, id: NodeId) -> Option<String> {
        let label = self.tree[id].identifier.as_deref()?;
        match self.result.state.get(label) {
            Some(target) if target.node == id => Some(target.anchor.clone()),
            _ => Some(crate::resolve::anchor(label)),
        }
    }

    /// Caption child of an environment.
    pub fn caption(&self, id: NodeId) -> Option<NodeId> {
        self.tree.find_child(id, |k| matches!(k, NodeKind::Caption))
    }

    pub fn finish(self, output: String) -> Rendered {
        Rendered {
            format: self.format,
            output,
            diagnostics: self.diagnostics,
        }
    }
}

/// Escape text and attribute values; HTML shares the XML entity set here.
pub(crate) fn escape_html(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}

/// Family name of an author written as `First Last` or `Last, First`.
pub(crate) fn last_name(author: &str) -> &str {
    if let Some(comma) = author.find(',') {
        author[..comma].trim()
    } else if let Some(space) = author.trim().rfind(' ') {
        &author.trim()[space + 1..]
    } else {
        author.trim()
    }
}

/// Author part of a short citation: `Knuth`, `Aho & Lam`, `Aho et al.`
pub(crate) fn short_authors(entry: &BibEntry) -> String {
    match entry.authors.as_slice() {
        [] => entry.title.clone().unwrap_or_else(|| entry.key.clone()),
        [one] => last_name(one).to_string(),
        [first, second] => format!("{} & {}", last_name(first), last_name(second)),
        [first, ..] => format!("{} et al.", last_name(first)),
    }
}

/// `Knuth, 1984`
pub(crate) fn short_citation(entry: &BibEntry) -> String {
    format!(
        "{}, {}",
        short_authors(entry),
        entry.year.as_deref().unwrap_or("n.d.")
    )
}

/// Plain-text reference list entry, parts joined with `. `.
pub(crate) fn reference_parts(entry: &BibEntry) -> Vec<String> {
    let mut parts = Vec::new();

    if !entry.authors.is_empty() {
        parts.push(entry.authors.join(", "));
    }
    if let Some(ref year) = entry.year {
        parts.push(format!("({})", year));
    }
    if let Some(ref title) = entry.title {
        parts.push(title.clone());
    }
    if let Some(ref journal) = entry.journal {
        let mut journal_part = journal.clone();
        if let Some(ref vol) = entry.volume {
            journal_part.push_str(&format!(", {}", vol));
            if let Some(ref num) = entry.number {
                journal_part.push_str(&format!("({})", num));
            }
        }
        if let Some(ref pages) = entry.pages {
            journal_part.push_str(&format!(", {}", pages));
        }
        parts.push(journal_part);
    } else if let Some(ref booktitle) = entry.booktitle {
        parts.push(format!("In {}", booktitle));
    }
    if let Some(ref publisher) = entry.publisher {
        parts.push(publisher.clone());
    }

    parts
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_last_name() {
        assert_eq!(last_name("Donald E. Knuth"), "Knuth");
        assert_eq!(last_name("Knuth, Donald E."), "Knuth");
        assert_eq!(last_name("Plato"), "Plato");
    }

    #[test]
    fn test_short_citation() {
        let mut entry = BibEntry {
            key: "dragon".into(),
            year: Some("2006".into()),
            authors: vec!["Alfred V. Aho".into(), "Monica S. Lam".into()],
            ..BibEntry::default()
        };
        assert_eq!(short_citation(&entry), "Aho & Lam, 2006");
        entry.authors.push("Ravi Sethi".into());
        assert_eq!(short_citation(&entry), "Aho et al., 2006");
        entry.authors.clear();
        entry.year = None;
        assert_eq!(short_citation(&entry), "dragon, n.d.");
    }
}
