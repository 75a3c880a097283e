//! Structured diagnostics shared by the parser, the pipeline passes and the
//! renderers.
//!
//! Diagnostics accumulate and are never discarded. Nothing in the crate stops
//! processing because a diagnostic was recorded; the output is always produced
//! and the diagnostics travel next to it.

use crate::ast::{NodeId, Span};
use crate::error::StructuralError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Which family of problem a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Recoverable problems in the source text (unclosed fences, ...).
    Syntax,
    /// Malformed node shape; the subtree is skipped by the current pass.
    Structural,
    /// Duplicate labels, unresolved cross-references, footnotes, citations.
    Reference,
    /// Unknown numbering categories, malformed macros.
    Configuration,
    /// Content a renderer could not express in its format.
    Render,
}

/// Output format a renderer diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Html,
    Latex,
    Jats,
}

impl TargetFormat {
    pub fn name(&self) -> &'static str {
        match self {
            TargetFormat::Html => "html",
            TargetFormat::Latex => "tex",
            TargetFormat::Jats => "jats",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single message about the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Set for diagnostics produced (or re-surfaced) by a renderer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<TargetFormat>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            position: None,
            node: None,
            format: None,
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, message)
    }

    /// Attach a source position.
    pub fn at(mut self, position: Option<Span>) -> Self {
        self.position = position;
        self
    }

    /// Attach the node the message is about.
    pub fn on(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Tag the diagnostic with a renderer format.
    pub fn for_format(mut self, format: TargetFormat) -> Self {
        self.format = Some(format);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(format) = self.format {
            write!(f, "[{}] ", format)?;
        }
        write!(f, "{}", self.severity)?;
        if let Some(position) = &self.position {
            write!(f, " at {}", position)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// The diagnostics sink.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
    structural: HashSet<NodeId>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and mirror it to the log.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error | Severity::Warning => tracing::warn!(
                kind = ?diagnostic.kind,
                node = ?diagnostic.node,
                "{}",
                diagnostic
            ),
            Severity::Info => tracing::debug!(kind = ?diagnostic.kind, "{}", diagnostic),
        }
        self.messages.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    /// Record a structural problem. Every pass re-validates the tree, so the
    /// same node is reported only once per sink.
    pub fn structural(&mut self, node: NodeId, position: Option<Span>, error: &StructuralError) {
        if self.structural.insert(node) {
            self.push(
                Diagnostic::error(DiagnosticKind::Structural, error.to_string())
                    .at(position)
                    .on(node),
            );
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Diagnostics attached to a node, in the order they were recorded.
    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(move |d| d.node == Some(node))
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|d| d.severity == severity).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.messages
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(messages: Vec<Diagnostic>) -> Self {
        Self {
            messages,
            structural: HashSet::new(),
        }
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
