//! # docweave
//!
//! Reference resolution and multi-target rendering for directive-extended
//! Markdown. One source document becomes HTML, LaTeX and JATS XML whose
//! numbers, cross-references, footnotes and citations all agree.
//!
//! ## Stages
//!
//! 1. [`parse`] builds an arena [`Tree`](ast::Tree) plus raw front matter.
//! 2. [`frontmatter::validate`] turns the front matter into a numbering
//!    policy, a math macro table and bibliography paths.
//! 3. [`resolve::run`] expands math macros, numbers targets, rewrites link
//!    shorthands, collects footnotes and citations and resolves
//!    cross-references, in that order.
//! 4. [`render::render_all`] projects the finished tree into the three
//!    formats in parallel.
//!
//! Problems inside the document never abort processing. They are collected
//! as [`Diagnostic`]s and travel next to the output.
//!
//! ## Quick Start
//!
//! ```rust
//! use docweave::{process, ProcessOptions};
//!
//! let input = r#"
//! # Introduction {#sec:intro}
//!
//! $$
//! E = mc^2
//! $$ {#eq:energy}
//!
//! See @eq:energy and [[Albert Einstein]].
//! "#;
//!
//! let processed = process(input, &ProcessOptions::default()).unwrap();
//! assert!(processed.outputs.html.output.contains("(1)"));
//! assert!(processed.outputs.latex.output.contains("\\tag{1}"));
//! assert!(processed.outputs.jats.output.contains("<label>(1)</label>"));
//! ```
//!
//! ## Syntax Reference
//!
//! ### Front Matter
//!
//! ```text
//! ---
//! title: My Document
//! authors: [Jane Doe]
//! numbering:
//!   heading: true
//!   equation: { template: "Eq. (%s)" }
//! math:
//!   R: \mathbb{R}
//!   vec: \mathbf{#1}
//! bibliography: refs.bib
//! ---
//! ```
//!
//! TOML between `+++` lines is accepted too.
//!
//! ### Cross-References
//!
//! - Define: `# Section {#sec:intro}`, `$$ ... $$ {#eq:euler}`, `\label{eq:x}`
//!   inside display math, `::: theorem {#thm:main}` or a `:label:` option
//! - Reference: `@sec:intro`, `[see here](#sec:intro)`, `` {numref}`Fig. %s <fig:a>` ``
//!
//! ### Environments
//!
//! ```text
//! ::: theorem {#thm:main}
//! Statement of the theorem.
//! :::
//!
//! :::{figure} images/cat.png
//! :label: fig:cat
//! A cat on a mat.
//! :::
//!
//! :::{important}
//! Admonitions are not numbered.
//! :::
//! ```
//!
//! ### Citations, Footnotes and Links
//!
//! - `[@knuth1984; @lamport1994, p. 42]`
//! - `Some text^[inline footnote]` or `[^1]` with `[^1]: text`
//! - `[[Wiki Page]]`, `org/repo#12`, `doi:10.1000/xyz`, `RRID:AB_123`
//!
//! ## Features
//!
//! - `cli` (default): the `docweave` command line driver
//! - `mathml`: MathML output for HTML math (requires `latex2mathml`)

pub mod ast;
pub mod bibtex;
pub mod diagnostics;
pub mod error;
pub mod frontmatter;
pub mod parser;
pub mod render;
pub mod resolve;

// Convenience re-exports
pub use ast::{NodeId, NodeKind, Tree};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity, TargetFormat};
pub use error::{Error, ParseError, RenderError, Result, StructuralError};
pub use frontmatter::{validate, Frontmatter, ValidateOptions};
pub use parser::{parse, ParseOptions};
pub use render::{render_all, HtmlConfig, JatsConfig, LatexConfig, Outputs, RenderOptions, Rendered, Renderer};
pub use resolve::{run, Phase, Pipeline, PipelineOptions, PipelineResult};

/// Options for [`process`].
#[derive(Debug, Default)]
pub struct ProcessOptions {
    pub parse: ParseOptions,
    pub validate: ValidateOptions,
    pub pipeline: PipelineOptions,
    pub render: RenderOptions,
}

/// A fully processed document.
#[derive(Debug)]
pub struct Processed {
    /// The resolved tree.
    pub tree: Tree,
    pub frontmatter: Frontmatter,
    /// Registries and every diagnostic from parsing through resolution.
    pub result: PipelineResult,
    pub outputs: Outputs,
}

impl Processed {
    /// Pipeline diagnostics followed by each renderer's.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.result
            .diagnostics
            .iter()
            .chain(self.outputs.iter().flat_map(|r| r.diagnostics.iter()))
    }
}

/// Parse, validate, resolve and render a document in one step.
///
/// Fails only when the source cannot be parsed at all (for example invalid
/// front matter). Everything else ends up in the diagnostics.
///
/// # Example
///
/// ```rust
/// use docweave::{process, ProcessOptions};
///
/// let processed = process("# Hello *world*", &ProcessOptions::default()).unwrap();
/// assert!(processed.outputs.html.output.contains("<h1>"));
/// assert!(processed.outputs.latex.output.contains("\\section*{Hello \\emph{world}}"));
/// ```
pub fn process(source: &str, options: &ProcessOptions) -> Result<Processed> {
    let parsed = parse(source, &options.parse)?;
    let (frontmatter, config_diagnostics) = validate(&parsed.frontmatter, &options.validate);

    let mut tree = parsed.tree;
    let result = Pipeline::new(&mut tree, &frontmatter, &options.pipeline)
        .with_diagnostics(parsed.diagnostics.into_iter().chain(config_diagnostics))
        .finish();

    let outputs = render_all(&tree, &result, &options.render);

    Ok(Processed {
        tree,
        frontmatter,
        result,
        outputs,
    })
}
