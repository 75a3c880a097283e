//! Error types for the docweave library.
//!
//! Problems inside a document (unresolved references, duplicate labels, bad
//! macros) are reported as [`Diagnostic`](crate::diagnostics::Diagnostic)s and
//! never surface here. These types cover the cases where an operation cannot
//! produce its output at all.

use crate::resolve::Phase;
use thiserror::Error;

/// Result type alias for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Pipeline is already at {current:?}, cannot return to {requested:?}")]
    Phase { requested: Phase, current: Phase },

    #[error("Snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid front matter: {0}")]
    FrontMatter(String),

    #[error("Invalid BibTeX: {0}")]
    BibTeX(String),

    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// A node whose shape breaks the tree contract.
///
/// These should not occur for trees built by [`parse`](crate::parse); they
/// guard passes against hand-built or externally produced trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("heading depth {depth} is outside 1..=6")]
    InvalidHeadingDepth { depth: u8 },

    #[error("`{kind}` nodes cannot have children")]
    UnexpectedChildren { kind: &'static str },

    #[error("`{kind}` node is not allowed inside `{parent}`")]
    MisplacedNode {
        kind: &'static str,
        parent: &'static str,
    },

    #[error("`{kind}` node has an empty identifier")]
    EmptyIdentifier { kind: &'static str },
}

/// Errors that occur during rendering.
///
/// Renderers catch these per node and turn them into diagnostics.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Unsupported in {format}: {what}")]
    Unsupported { format: &'static str, what: String },

    #[error("Math rendering error: {0}")]
    Math(String),
}
