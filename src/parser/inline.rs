//! Inline-level parsing for Markdown.

use super::lexer::{
    citation, display_math, emphasis, footnote_inline, footnote_ref, inline_code, inline_math,
    label, reference, role, strong, Token,
};
use super::{offset_in, Parser};
use crate::ast::{NodeId, NodeKind, Point, RefStatus, Span};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>\[\]]+").expect("valid URL regex"));

/// A slice of source text and the position of its first byte.
#[derive(Clone, Copy)]
struct Source<'a> {
    text: &'a str,
    at: Point,
}

impl<'a> Source<'a> {
    fn point_at(&self, offset: usize) -> Point {
        let before = &self.text[..offset.min(self.text.len())];
        match before.rfind('\n') {
            Some(nl) => Point::new(self.at.line + before.matches('\n').count(), offset - nl),
            None => Point::new(self.at.line, self.at.column + offset),
        }
    }

    /// Position of the start of `rest`, a suffix of this source.
    fn point(&self, rest: &str) -> Point {
        self.point_at(self.text.len() - rest.len())
    }

    fn sub(&self, inner: &'a str) -> Source<'a> {
        Source {
            text: inner,
            at: self.point_at(offset_in(self.text, inner)),
        }
    }

    /// Character immediately before `rest`.
    fn prev_char(&self, rest: &str) -> Option<char> {
        self.text[..self.text.len() - rest.len()].chars().next_back()
    }
}

impl Parser<'_> {
    /// Parse inline content as children of `parent`.
    pub(crate) fn parse_inlines(&mut self, parent: NodeId, input: &str, at: Point) -> Result<()> {
        self.parse_source(parent, Source { text: input, at })?;
        self.finalize_inlines(parent);
        Ok(())
    }

    fn parse_source(&mut self, parent: NodeId, src: Source<'_>) -> Result<()> {
        let mut remaining = src.text;

        while !remaining.is_empty() {
            // Try to parse special inline elements
            if let Some(rest) = self.try_parse_inline(parent, src, remaining)? {
                remaining = rest;
                continue;
            }

            // Consume plain text until the next special character or end
            let (text, rest) = consume_text(src, remaining);
            if !text.is_empty() {
                self.push_text(parent, text, src.point(remaining));
                remaining = rest;
            } else {
                // No progress made - consume one character to avoid infinite loop
                let len = remaining.chars().next().map_or(1, char::len_utf8);
                self.push_text(parent, &remaining[..len], src.point(remaining));
                remaining = &remaining[len..];
            }
        }

        Ok(())
    }

    fn try_parse_inline<'a>(
        &mut self,
        parent: NodeId,
        src: Source<'a>,
        input: &'a str,
    ) -> Result<Option<&'a str>> {
        let at = Some(Span::point(src.point(input)));
        // Order matters - try more specific patterns first

        // Display math ($$...$$) in inline context is treated as inline math
        if input.starts_with("$$") {
            if let Ok((rest, Token::DisplayMath(content))) = display_math(input) {
                self.push_math(parent, content, at);
                return Ok(Some(rest));
            }
        }

        // Inline math ($...$)
        if input.starts_with('$') && !input.starts_with("$$") {
            if let Ok((rest, Token::InlineMath(content))) = inline_math(input) {
                self.push_math(parent, content, at);
                return Ok(Some(rest));
            }
        }

        // Strong (**...** or __...__)
        if input.starts_with("**") || input.starts_with("__") {
            if let Ok((rest, Token::Strong(content))) = strong(input) {
                let id = self.tree.push(parent, NodeKind::Strong, at);
                self.parse_source(id, src.sub(content))?;
                return Ok(Some(rest));
            }
        }

        // Emphasis (*...* or _..._)
        if (input.starts_with('*') && !input.starts_with("**"))
            || (input.starts_with('_') && !input.starts_with("__"))
        {
            if let Ok((rest, Token::Emphasis(content))) = emphasis(input) {
                if !content.is_empty() {
                    let id = self.tree.push(parent, NodeKind::Emphasis, at);
                    self.parse_source(id, src.sub(content))?;
                    return Ok(Some(rest));
                }
            }
        }

        // Strikethrough (~~...~~)
        if let Some(after) = input.strip_prefix("~~") {
            if let Some(end) = after.find("~~") {
                let id = self.tree.push(parent, NodeKind::Delete, at);
                self.parse_source(id, src.sub(&after[..end]))?;
                return Ok(Some(&after[end + 2..]));
            }
        }

        // Inline code (`...`)
        if input.starts_with('`') && !input.starts_with("```") {
            if let Ok((rest, Token::InlineCode(content))) = inline_code(input) {
                self.tree.push(
                    parent,
                    NodeKind::InlineCode {
                        value: content.to_string(),
                    },
                    at,
                );
                return Ok(Some(rest));
            }
        }

        if input.starts_with('{') {
            // Role ({name}`content`)
            if let Ok((rest, Token::Role(name, content))) = role(input) {
                self.push_role(parent, name, content, at);
                return Ok(Some(rest));
            }
            // Labels are metadata, not rendered inline - skip them
            if let Ok((rest, Token::Label(_))) = label(input) {
                return Ok(Some(rest));
            }
        }

        // Citation ([@key])
        if input.starts_with("[@") {
            if let Ok((rest, Token::Citation(cites))) = citation(input) {
                let keys: Vec<String> = cites
                    .iter()
                    .map(|c| c.key.to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                if !keys.is_empty() {
                    let locator = cites.iter().rev().find_map(|c| c.locator).map(String::from);
                    self.tree.push(
                        parent,
                        NodeKind::Citation {
                            keys,
                            locator,
                            resolved: false,
                        },
                        at,
                    );
                    return Ok(Some(rest));
                }
            }
        }

        // Footnote inline (^[...])
        if input.starts_with("^[") {
            if let Ok((rest, Token::FootnoteInline(content))) = footnote_inline(input) {
                let identifier = self.next_inline_footnote();
                self.tree.push(
                    parent,
                    NodeKind::FootnoteReference {
                        identifier: identifier.clone(),
                        resolved: false,
                    },
                    at,
                );
                let def = self
                    .tree
                    .alloc(NodeKind::FootnoteDefinition { identifier }, at);
                let para = self.tree.push(def, NodeKind::Paragraph, at);
                self.parse_source(para, src.sub(content))?;
                self.finalize_inlines(para);
                self.generated.push(def);
                return Ok(Some(rest));
            }
        }

        // Footnote reference ([^...])
        if input.starts_with("[^") {
            if let Ok((rest, Token::FootnoteRef(id))) = footnote_ref(input) {
                self.tree.push(
                    parent,
                    NodeKind::FootnoteReference {
                        identifier: id.to_string(),
                        resolved: false,
                    },
                    at,
                );
                return Ok(Some(rest));
            }
        }

        // Cross-reference (@label), not inside a word (e-mail addresses)
        if input.starts_with('@') && !src.prev_char(input).is_some_and(char::is_alphanumeric) {
            if let Ok((rest, Token::Reference(lbl))) = reference(input) {
                self.push_xref(parent, lbl, None, at);
                return Ok(Some(rest));
            }
        }

        // Image (![alt](url "title"))
        if input.starts_with("![") {
            if let Some(rest) = self.try_parse_image(parent, input, at) {
                return Ok(Some(rest));
            }
        }

        // Link ([text](url "title")); `#label` targets are cross-references
        if input.starts_with('[') && !input.starts_with("[^") && !input.starts_with("[@") {
            if let Some(rest) = self.try_parse_link(parent, src, input, at)? {
                return Ok(Some(rest));
            }
        }

        // Raw HTML (<tag>) or autolink (<https://...>)
        if input.starts_with('<') {
            if let Some(rest) = self.try_parse_angle(parent, input, at) {
                return Ok(Some(rest));
            }
        }

        Ok(None)
    }

    fn push_math(&mut self, parent: NodeId, content: &str, at: Option<Span>) {
        self.tree.push(
            parent,
            NodeKind::InlineMath {
                value: content.trim().to_string(),
                expanded: None,
            },
            at,
        );
    }

    fn push_xref(&mut self, parent: NodeId, target: &str, text: Option<&str>, at: Option<Span>) {
        let id = self.tree.push(
            parent,
            NodeKind::CrossReference {
                target: target.to_string(),
                status: RefStatus::Pending,
            },
            at,
        );
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            self.tree.push(id, NodeKind::text(text), at);
        }
    }

    fn push_role(&mut self, parent: NodeId, name: &str, content: &str, at: Option<Span>) {
        match name {
            "ref" | "numref" | "eq" => {
                // `text <label>` or `label`
                let (text, target) = match content.trim().strip_suffix('>').and_then(|c| c.rsplit_once('<')) {
                    Some((text, target)) => (Some(text.trim()), target.trim()),
                    None => (None, content.trim()),
                };
                self.push_xref(parent, target, text, at);
            }
            "cite" | "cite:p" | "cite:t" | "citep" | "citet" => {
                let keys: Vec<String> = content
                    .split([',', ';'])
                    .map(|k| k.trim().trim_start_matches('@').to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                self.tree.push(
                    parent,
                    NodeKind::Citation {
                        keys,
                        locator: None,
                        resolved: false,
                    },
                    at,
                );
            }
            "math" => self.push_math(parent, content, at),
            _ => {
                self.diagnostics.push(
                    Diagnostic::info(
                        DiagnosticKind::Syntax,
                        format!("unknown role `{}` rendered as code", name),
                    )
                    .at(at),
                );
                self.tree.push(
                    parent,
                    NodeKind::InlineCode {
                        value: content.to_string(),
                    },
                    at,
                );
            }
        }
    }

    fn try_parse_link<'a>(
        &mut self,
        parent: NodeId,
        src: Source<'a>,
        input: &'a str,
        at: Option<Span>,
    ) -> Result<Option<&'a str>> {
        let Some(text_end) = matching_close(input, '[', ']') else {
            return Ok(None);
        };
        let text = &input[1..text_end];
        let after_text = &input[text_end + 1..];

        if !after_text.starts_with('(') {
            return Ok(None);
        }
        let Some(url_end) = matching_close(after_text, '(', ')') else {
            return Ok(None);
        };

        let url_part = &after_text[1..url_end];
        let rest = &after_text[url_end + 1..];

        // Parse URL and optional title
        let (url, title) = parse_url_and_title(url_part);

        if let Some(target) = url.strip_prefix('#') {
            if !target.is_empty() {
                let id = self.tree.push(
                    parent,
                    NodeKind::CrossReference {
                        target: target.to_string(),
                        status: RefStatus::Pending,
                    },
                    at,
                );
                self.parse_source(id, src.sub(text))?;
                return Ok(Some(rest));
            }
        }

        let id = self.tree.push(
            parent,
            NodeKind::Link {
                url: url.to_string(),
                title: title.map(String::from),
                protocol: None,
                citation: None,
            },
            at,
        );
        self.parse_source(id, src.sub(text))?;
        Ok(Some(rest))
    }

    fn try_parse_image<'a>(&mut self, parent: NodeId, input: &'a str, at: Option<Span>) -> Option<&'a str> {
        // ![alt](url "title")
        let close_bracket = input[2..].find(']')? + 2;
        let alt = &input[2..close_bracket];
        let after_alt = &input[close_bracket + 1..];

        if !after_alt.starts_with('(') {
            return None;
        }
        let close_paren = after_alt.find(')')?;
        let (url, title) = parse_url_and_title(&after_alt[1..close_paren]);

        self.tree.push(
            parent,
            NodeKind::Image {
                url: url.to_string(),
                alt: alt.to_string(),
                title: title.map(String::from),
            },
            at,
        );
        Some(&after_alt[close_paren + 1..])
    }

    fn try_parse_angle<'a>(&mut self, parent: NodeId, input: &'a str, at: Option<Span>) -> Option<&'a str> {
        // Find the closing >
        let close = input.find('>')?;
        let tag_content = &input[1..close];
        let first = tag_content.chars().next()?;

        if tag_content.contains("://") && !tag_content.contains(char::is_whitespace) {
            let link = self.tree.push(
                parent,
                NodeKind::Link {
                    url: tag_content.to_string(),
                    title: None,
                    protocol: None,
                    citation: None,
                },
                at,
            );
            self.tree.push(link, NodeKind::text(tag_content), at);
            return Some(&input[close + 1..]);
        }

        // Check if it looks like a tag
        if !(first.is_alphabetic() || first == '/' || first == '!') {
            return None;
        }
        self.tree.push(
            parent,
            NodeKind::Html {
                value: input[..=close].to_string(),
            },
            at,
        );
        Some(&input[close + 1..])
    }

    /// Push plain text, turning line endings into soft breaks (kept as
    /// newlines) or hard breaks.
    fn push_text(&mut self, parent: NodeId, text: &str, at: Point) {
        let src = Source { text, at };
        let parts: Vec<&str> = text.split('\n').collect();
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            let hard = !last && (part.ends_with("  ") || part.ends_with('\\'));
            let body = if hard {
                part.trim_end_matches([' ', '\\'])
            } else {
                part
            };
            let mut value = unescape(body);
            if !last && !hard {
                value.push('\n');
            }
            let span = Some(Span::point(src.point_at(offset_in(text, part))));
            if !value.is_empty() {
                self.tree.push(parent, NodeKind::text(value), span);
            }
            if hard {
                self.tree.push(parent, NodeKind::Break, span);
            }
        }
    }

    /// Merge adjacent text nodes and linkify bare URLs, recursively.
    fn finalize_inlines(&mut self, parent: NodeId) {
        let children = self.tree.children(parent).to_vec();
        let mut merged: Vec<NodeId> = Vec::with_capacity(children.len());

        for child in children {
            let previous = merged.last().copied();
            if let (Some(prev), NodeKind::Text { value }) = (previous, self.tree.kind(child).clone()) {
                if let NodeKind::Text { value: existing } = &mut self.tree[prev].kind {
                    existing.push_str(&value);
                    self.tree[child].parent = None;
                    continue;
                }
            }
            merged.push(child);
        }
        self.tree[parent].children = merged.clone();

        for child in merged {
            match self.tree.kind(child) {
                NodeKind::Text { .. } if self.options.linkify => self.linkify(child),
                NodeKind::Link { .. } | NodeKind::Image { .. } => {}
                _ => self.finalize_inlines(child),
            }
        }
    }

    fn linkify(&mut self, text_node: NodeId) {
        let NodeKind::Text { value } = self.tree.kind(text_node).clone() else {
            return;
        };
        if !BARE_URL.is_match(&value) {
            return;
        }

        let at = self.tree[text_node].position;
        let mut pieces = Vec::new();
        let mut last = 0;
        for m in BARE_URL.find_iter(&value) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'', '"']);
            if m.start() > last {
                pieces.push(self.tree.alloc(NodeKind::text(&value[last..m.start()]), at));
            }
            let link = self.tree.alloc(
                NodeKind::Link {
                    url: url.to_string(),
                    title: None,
                    protocol: None,
                    citation: None,
                },
                at,
            );
            let label = self.tree.alloc(NodeKind::text(url), at);
            self.tree.append(link, label);
            pieces.push(link);
            last = m.start() + url.len();
        }
        if last < value.len() {
            pieces.push(self.tree.alloc(NodeKind::text(&value[last..]), at));
        }
        self.tree.replace_child(text_node, &pieces);
    }
}

/// Index of the bracket closing the one at the start of `input`.
fn matching_close(input: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in input.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn parse_url_and_title(input: &str) -> (&str, Option<&str>) {
    let input = input.trim();

    // Check for title in quotes
    for quote in ['"', '\''] {
        if let Some(quote_start) = input.find(quote) {
            if let Some(quote_end) = input[quote_start + 1..].find(quote) {
                let url = input[..quote_start].trim();
                let title = &input[quote_start + 1..quote_start + 1 + quote_end];
                return (url, Some(title));
            }
        }
    }

    (input, None)
}

/// Drop the backslash from escaped ASCII punctuation.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_punctuation() {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn consume_text<'a>(src: Source<'a>, input: &'a str) -> (&'a str, &'a str) {
    // Special characters that might start inline elements
    const SPECIAL: &[char] = &['*', '_', '`', '$', '[', '!', '@', '^', '<', '~', '{'];

    let mut chars = input.char_indices().peekable();
    let mut prev: Option<char> = src.prev_char(input);

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        let escaped = prev == Some('\\');
        prev = Some(c);

        if !SPECIAL.contains(&c) || escaped {
            continue;
        }

        let stop = match c {
            // Potential emphasis/strong; `_` inside a word is literal
            '*' => next.is_some_and(|n| !n.is_whitespace()),
            '_' => {
                next.is_some_and(|n| !n.is_whitespace())
                    && !input[..i]
                        .chars()
                        .next_back()
                        .or(src.prev_char(input))
                        .is_some_and(char::is_alphanumeric)
            }
            '~' => next == Some('~'),
            '{' => next.is_some_and(|n| n == '#' || n.is_alphanumeric()),
            '!' | '^' => next == Some('['),
            '@' => {
                next.is_some_and(|n| n == '[' || n.is_alphanumeric())
                    && !input[..i]
                        .chars()
                        .next_back()
                        .or(src.prev_char(input))
                        .is_some_and(char::is_alphanumeric)
            }
            '<' => next.is_some_and(|n| n.is_alphabetic() || n == '/' || n == '!'),
            // For remaining special chars ([, $, `), stop here
            _ => true,
        };

        if stop {
            return (&input[..i], &input[i..]);
        }
    }

    (input, "")
}
