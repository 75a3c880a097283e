//! Parser for directive-extended Markdown.
//!
//! Produces an arena [`Tree`] plus the raw front matter. Recoverable syntax
//! problems (unclosed fences, environments, math) become warning diagnostics;
//! only unreadable front matter is an error.

mod block;
mod inline;
mod lexer;

use crate::ast::{NodeId, Point, Span, Tree};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{ParseError, Result};
use crate::frontmatter::RawFrontmatter;

/// Options for [`parse`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Turn bare `http(s)://` URLs in text into links.
    pub linkify: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { linkify: true }
    }
}

/// Output of [`parse`].
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub tree: Tree,
    pub frontmatter: RawFrontmatter,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a complete document from source text.
pub fn parse(input: &str, options: &ParseOptions) -> Result<ParsedDocument> {
    let (frontmatter, body, first_line) = parse_front_matter(input)?;

    let mut parser = Parser::new(options);
    let root = parser.tree.root();
    parser.parse_blocks(root, body, first_line)?;
    parser.finish();

    tracing::debug!(
        nodes = parser.tree.len(),
        diagnostics = parser.diagnostics.len(),
        "parsed document"
    );

    Ok(ParsedDocument {
        tree: parser.tree,
        frontmatter,
        diagnostics: parser.diagnostics,
    })
}

/// Shared state threaded through the block and inline parsers.
pub(crate) struct Parser<'o> {
    pub(crate) tree: Tree,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) options: &'o ParseOptions,
    inline_footnotes: usize,
    /// Definitions generated for `^[...]` footnotes, appended to the root.
    generated: Vec<NodeId>,
}

impl<'o> Parser<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            tree: Tree::new(),
            diagnostics: Vec::new(),
            options,
            inline_footnotes: 0,
            generated: Vec::new(),
        }
    }

    fn next_inline_footnote(&mut self) -> String {
        self.inline_footnotes += 1;
        format!("inline-{}", self.inline_footnotes)
    }

    fn syntax_warning(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.push(
            Diagnostic::warning(DiagnosticKind::Syntax, message)
                .at(Some(Span::point(Point::new(line, 1)))),
        );
    }

    fn finish(&mut self) {
        let root = self.tree.root();
        for id in std::mem::take(&mut self.generated) {
            self.tree.append(root, id);
        }
    }
}

/// Byte offset of `inner` within `outer`. `inner` must be a subslice of `outer`.
fn offset_in(outer: &str, inner: &str) -> usize {
    (inner.as_ptr() as usize).saturating_sub(outer.as_ptr() as usize)
}

/// Split off front matter delimited by `+++` (TOML) or `---` (YAML).
/// Returns the front matter, the body and the body's first line number.
fn parse_front_matter(input: &str) -> Result<(RawFrontmatter, &str, usize)> {
    let delimiter = if input.starts_with("+++") {
        "+++"
    } else if input.starts_with("---") {
        "---"
    } else {
        return Ok((RawFrontmatter::default(), input, 1));
    };

    // The opening delimiter must be alone on its line.
    let first_break = input.find('\n').unwrap_or(input.len());
    if input[..first_break].trim_end() != delimiter {
        return Ok((RawFrontmatter::default(), input, 1));
    }

    let after_open = &input[first_break..];
    let close_pos = match after_open.find(&format!("\n{}", delimiter)) {
        Some(pos) => pos,
        // A lone `---` opening the document is a thematic break.
        None if delimiter == "---" => return Ok((RawFrontmatter::default(), input, 1)),
        None => {
            return Err(ParseError::FrontMatter(format!(
                "Unclosed front matter (missing closing {})",
                delimiter
            ))
            .into())
        }
    };

    let front_matter_str = &after_open[..close_pos];
    let after_close = &after_open[close_pos + 1 + delimiter.len()..];
    let body = after_close
        .find('\n')
        .map(|i| &after_close[i + 1..])
        .unwrap_or("");
    let first_line = input[..input.len() - body.len()].matches('\n').count() + 1;

    let raw: RawFrontmatter = if delimiter == "+++" {
        toml::from_str(front_matter_str)
            .map_err(|e| ParseError::FrontMatter(format!("Invalid TOML: {}", e)))?
    } else if front_matter_str.trim().is_empty() {
        RawFrontmatter::default()
    } else {
        serde_yaml::from_str(front_matter_str)
            .map_err(|e| ParseError::FrontMatter(format!("Invalid YAML: {}", e)))?
    };

    Ok((raw, body, first_line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::diagnostics::Severity;
    use crate::error::Error;

    #[test]
    fn test_no_front_matter() {
        let input = "# Hello\n\nSome text.";
        let (meta, content, line) = parse_front_matter(input).unwrap();
        assert_eq!(meta, RawFrontmatter::default());
        assert_eq!(content, input);
        assert_eq!(line, 1);
    }

    #[test]
    fn test_toml_front_matter() {
        let input = r#"+++
title = "My Document"
author = "Jane Doe"

[math]
R = "\\mathbb{R}"
+++

# Hello"#;

        let (meta, content, line) = parse_front_matter(input).unwrap();
        assert_eq!(meta.title.as_deref(), Some("My Document"));
        assert_eq!(meta.author.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.math.len(), 1);
        assert!(content.trim_start().starts_with("# Hello"));
        assert_eq!(line, 8);
    }

    #[test]
    fn test_yaml_front_matter() {
        let input = "---\ntitle: Paper\n---\nBody text.\n";
        let (meta, content, line) = parse_front_matter(input).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Paper"));
        assert_eq!(content, "Body text.\n");
        assert_eq!(line, 4);
    }

    #[test]
    fn test_invalid_front_matter_is_error() {
        let err = parse("+++\ntitle = \n+++\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::FrontMatter(_))));
        let err = parse("+++\ntitle = 'x'\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::FrontMatter(_))));
    }

    #[test]
    fn test_inline_footnote_definition_appended_to_root() {
        let doc = parse("Text^[A note].\n\nMore.", &ParseOptions::default()).unwrap();
        let tree = &doc.tree;
        let last = *tree.children(tree.root()).last().unwrap();
        assert_eq!(
            tree.kind(last),
            &NodeKind::FootnoteDefinition {
                identifier: "inline-1".into()
            }
        );
        assert_eq!(tree.text_content(last), "A note");
    }

    #[test]
    fn test_unclosed_fence_warns() {
        let doc = parse("```rust\nfn main() {}\n", &ParseOptions::default()).unwrap();
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].severity, Severity::Warning);
    }
}
