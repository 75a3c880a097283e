//! Block-level parsing for Markdown.

use super::lexer::{
    directive_option, environment_start, extract_label, fenced_code_start, footnote_definition,
    heading, is_environment_end, list_item_marker, thematic_break, ListMarker, Token,
};
use super::{offset_in, Parser};
use crate::ast::{Alignment, EnvironmentKind, NodeId, NodeKind, Point, Span};
use crate::error::Result;

impl Parser<'_> {
    /// Parse all blocks in `input` as children of `parent`. `first_line` is
    /// the source line number of the first line of `input`.
    pub(crate) fn parse_blocks(&mut self, parent: NodeId, input: &str, first_line: usize) -> Result<()> {
        let lines: Vec<&str> = input.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let line_no = first_line + i;

            // Skip blank lines
            if line.trim().is_empty() {
                i += 1;
                continue;
            }

            let rest = &lines[i..];
            let consumed = if let Some(n) = self.try_parse_heading(parent, line, line_no)? {
                n
            } else if let Some(n) = self.try_parse_thematic_break(parent, line, line_no) {
                n
            } else if let Some(n) = self.try_parse_fenced_code(parent, rest, line_no) {
                n
            } else if let Some(n) = self.try_parse_display_math(parent, rest, line_no) {
                n
            } else if let Some(n) = self.try_parse_environment(parent, rest, line_no)? {
                n
            } else if let Some(n) = self.try_parse_footnote_definition(parent, rest, line_no)? {
                n
            } else if let Some(n) = self.try_parse_block_quote(parent, rest, line_no)? {
                n
            } else if let Some(n) = self.try_parse_list(parent, rest, line_no)? {
                n
            } else if let Some(n) = self.try_parse_table(parent, rest, line_no)? {
                n
            } else if let Some(n) = self.try_parse_html(parent, rest, line_no) {
                n
            } else {
                // Default: paragraph
                self.parse_paragraph(parent, rest, line_no)?
            };
            i += consumed.max(1);
        }

        Ok(())
    }

    fn try_parse_heading(&mut self, parent: NodeId, line: &str, line_no: usize) -> Result<Option<usize>> {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            return Ok(None);
        }
        let Ok((_, Token::Heading(depth, content))) = heading(trimmed) else {
            return Ok(None);
        };

        let (content, label) = extract_label(content);
        let id = self.tree.push(
            parent,
            NodeKind::Heading { depth },
            Some(Span::lines(line_no, line_no)),
        );
        self.tree[id].identifier = label.map(String::from);
        let column = offset_in(line, content) + 1;
        self.parse_inlines(id, content, Point::new(line_no, column))?;
        Ok(Some(1))
    }

    fn try_parse_thematic_break(&mut self, parent: NodeId, line: &str, line_no: usize) -> Option<usize> {
        thematic_break(line.trim()).ok()?;
        self.tree.push(
            parent,
            NodeKind::ThematicBreak,
            Some(Span::lines(line_no, line_no)),
        );
        Some(1)
    }

    fn try_parse_fenced_code(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Option<usize> {
        let first = lines[0].trim_start();
        let Ok((_, Token::FencedCodeStart(fence, lang))) = fenced_code_start(first) else {
            return None;
        };
        let fence_char = if fence.starts_with('`') { '`' } else { '~' };

        let mut content = Vec::new();
        let mut closed = None;
        for (i, line) in lines.iter().enumerate().skip(1) {
            let t = line.trim();
            if t.starts_with(fence) && t.chars().all(|c| c == fence_char) {
                closed = Some(i);
                break;
            }
            content.push(*line);
        }

        let consumed = match closed {
            Some(i) => i + 1,
            None => {
                self.syntax_warning(line_no, "unclosed code fence; code runs to the end of the block");
                lines.len()
            }
        };

        self.tree.push(
            parent,
            NodeKind::Code {
                lang: (!lang.is_empty()).then(|| lang.to_string()),
                value: content.join("\n"),
            },
            Some(Span::lines(line_no, line_no + consumed - 1)),
        );
        Some(consumed)
    }

    fn try_parse_display_math(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Option<usize> {
        let first = lines[0].trim();
        let after_open = first.strip_prefix("$$")?;

        let (content, label, consumed) = if let Some(end_pos) = after_open.find("$$") {
            // Single-line display math
            let rest = &after_open[end_pos + 2..];
            (after_open[..end_pos].to_string(), extract_label(rest).1, 1)
        } else {
            let mut content = String::from(after_open);
            let mut found = None;
            for (i, line) in lines.iter().enumerate().skip(1) {
                if let Some(end_pos) = line.find("$$") {
                    content.push('\n');
                    content.push_str(&line[..end_pos]);
                    found = Some((i, extract_label(&line[end_pos + 2..]).1));
                    break;
                }
                content.push('\n');
                content.push_str(line);
            }
            match found {
                Some((i, label)) => (content, label, i + 1),
                None => {
                    self.syntax_warning(line_no, "unclosed display math; missing closing $$");
                    (content, None, lines.len())
                }
            }
        };

        let id = self.tree.push(
            parent,
            NodeKind::Math {
                value: content.trim().to_string(),
                expanded: None,
            },
            Some(Span::lines(line_no, line_no + consumed - 1)),
        );
        self.tree[id].identifier = label.map(String::from);
        Some(consumed)
    }

    fn try_parse_environment(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Result<Option<usize>> {
        let first = lines[0].trim_start();
        let Ok((_, Token::EnvironmentStart { kind, label, argument })) = environment_start(first) else {
            return Ok(None);
        };
        let env_kind = EnvironmentKind::from_name(kind);

        let mut depth = 1;
        let mut end = None;
        for (i, line) in lines.iter().enumerate().skip(1) {
            if is_environment_end(line) {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            } else if environment_start(line.trim_start()).is_ok() {
                depth += 1;
            }
        }
        let (body_end, consumed) = match end {
            Some(i) => (i, i + 1),
            None => {
                self.syntax_warning(
                    line_no,
                    format!("unclosed `{}` environment; missing closing :::", kind),
                );
                (lines.len(), lines.len())
            }
        };

        let id = self.tree.push(
            parent,
            NodeKind::Environment {
                kind: env_kind.clone(),
            },
            Some(Span::lines(line_no, line_no + consumed - 1)),
        );

        // Directive options directly after the opening line
        let mut identifier = label.map(String::from);
        let mut alt = String::new();
        let mut body_start = 1;
        while body_start < body_end {
            let Ok((_, Token::DirectiveOption(name, value))) = directive_option(lines[body_start].trim()) else {
                break;
            };
            match name {
                "label" | "name" => identifier = Some(value.to_string()),
                "alt" => alt = value.to_string(),
                _ => {}
            }
            body_start += 1;
        }
        self.tree[id].identifier = identifier.filter(|l| !l.is_empty());

        if !argument.is_empty() {
            if env_kind == EnvironmentKind::Figure {
                self.tree.push(
                    id,
                    NodeKind::Image {
                        url: argument.to_string(),
                        alt,
                        title: None,
                    },
                    Some(Span::lines(line_no, line_no)),
                );
            } else {
                let caption = self
                    .tree
                    .push(id, NodeKind::Caption, Some(Span::lines(line_no, line_no)));
                let column = offset_in(lines[0], argument) + 1;
                self.parse_inlines(caption, argument, Point::new(line_no, column))?;
            }
        }

        let body = lines[body_start..body_end].join("\n");
        self.parse_blocks(id, &body, line_no + body_start)?;

        // For figures/tables the trailing paragraph is the caption
        if matches!(env_kind, EnvironmentKind::Figure | EnvironmentKind::Table) {
            let children = self.tree.children(id);
            let has_caption = self.tree.find_child(id, |k| *k == NodeKind::Caption).is_some();
            if let Some(&last) = children.last() {
                if !has_caption && children.len() > 1 && *self.tree.kind(last) == NodeKind::Paragraph {
                    self.tree[last].kind = NodeKind::Caption;
                }
            }
        }

        Ok(Some(consumed))
    }

    fn try_parse_footnote_definition(
        &mut self,
        parent: NodeId,
        lines: &[&str],
        line_no: usize,
    ) -> Result<Option<usize>> {
        let Ok((_, Token::FootnoteDefinition(identifier, first))) = footnote_definition(lines[0].trim_start()) else {
            return Ok(None);
        };

        let is_indented = |l: &str| l.starts_with("    ") || l.starts_with('\t');
        let mut content = vec![first];
        let mut i = 1;
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() {
                if lines.get(i + 1).is_some_and(|next| is_indented(next)) {
                    content.push("");
                    i += 1;
                    continue;
                }
                break;
            }
            let lazy = content.last().is_some_and(|prev| !prev.is_empty());
            if footnote_definition(line.trim_start()).is_ok() || !(lazy || is_indented(line)) {
                break;
            }
            content.push(line.trim_start());
            i += 1;
        }

        let id = self.tree.push(
            parent,
            NodeKind::FootnoteDefinition {
                identifier: identifier.to_string(),
            },
            Some(Span::lines(line_no, line_no + i - 1)),
        );
        self.parse_blocks(id, &content.join("\n"), line_no)?;
        Ok(Some(i))
    }

    fn try_parse_block_quote(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Result<Option<usize>> {
        if !lines[0].trim_start().starts_with('>') {
            return Ok(None);
        }

        let mut quote_lines = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let trimmed = lines[i].trim_start();

            if let Some(content) = trimmed.strip_prefix('>') {
                // Remove the > prefix
                quote_lines.push(content.strip_prefix(' ').unwrap_or(content));
                i += 1;
            } else if trimmed.is_empty()
                && lines.get(i + 1).is_some_and(|l| l.trim_start().starts_with('>'))
            {
                // Blank line within quote
                quote_lines.push("");
                i += 1;
            } else {
                break;
            }
        }

        let id = self.tree.push(
            parent,
            NodeKind::BlockQuote,
            Some(Span::lines(line_no, line_no + i - 1)),
        );
        self.parse_blocks(id, &quote_lines.join("\n"), line_no)?;
        Ok(Some(i))
    }

    fn try_parse_list(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Result<Option<usize>> {
        let first = lines[0];
        let trimmed = first.trim_start();
        let indent = first.len() - trimmed.len();

        let Ok((_, Token::ListItemMarker(first_marker))) = list_item_marker(trimmed) else {
            return Ok(None);
        };
        let ordered = matches!(first_marker, ListMarker::Ordered(_));
        let start = match first_marker {
            ListMarker::Ordered(n) => Some(n),
            _ => None,
        };

        let list = self.tree.push(parent, NodeKind::List { ordered, start }, None);
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim_start();
            let current_indent = line.len() - trimmed.len();

            let Ok((rest, Token::ListItemMarker(marker))) = list_item_marker(trimmed) else {
                break;
            };
            // Check if same list type
            if current_indent > indent || matches!(marker, ListMarker::Ordered(_)) != ordered {
                break;
            }

            let item_line = line_no + i;
            let mut item_lines = vec![rest];
            i += 1;

            while i < lines.len() {
                let next_line = lines[i];
                let next_trimmed = next_line.trim_start();
                let next_indent = next_line.len() - next_trimmed.len();

                // Check for new list item
                if next_indent <= indent && list_item_marker(next_trimmed).is_ok() {
                    break;
                }

                if next_trimmed.is_empty() {
                    // Check if next non-blank continues the item
                    let future = lines[i..].iter().find(|l| !l.trim().is_empty());
                    match future {
                        Some(l) if l.len() - l.trim_start().len() > indent => {}
                        _ => break,
                    }
                }

                // Content belongs to this item
                item_lines.push(next_trimmed);
                i += 1;
            }

            let checked = match marker {
                ListMarker::Checkbox(c) => Some(c),
                _ => None,
            };
            let item = self.tree.push(
                list,
                NodeKind::ListItem { checked },
                Some(Span::lines(item_line, line_no + i - 1)),
            );
            self.parse_blocks(item, &item_lines.join("\n"), item_line)?;
        }

        self.tree[list].position = Some(Span::lines(line_no, line_no + i.max(1) - 1));
        Ok(Some(i.max(1)))
    }

    fn try_parse_table(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Result<Option<usize>> {
        // Need at least header row and delimiter row
        if lines.len() < 2 || !lines[0].contains('|') || !is_table_delimiter(lines[1]) {
            return Ok(None);
        }

        let mut end = 2;
        while end < lines.len() && lines[end].contains('|') && !lines[end].trim().is_empty() {
            end += 1;
        }

        // Check for caption and label after table
        let caption = lines.get(end).and_then(|next| {
            let next = next.trim();
            next.strip_prefix("Table:")
                .or_else(|| next.strip_prefix("Caption:"))
                .map(|text| extract_label(text.trim()))
        });
        let consumed = end + usize::from(caption.is_some());
        let span = Some(Span::lines(line_no, line_no + consumed - 1));

        let container = match caption {
            Some((_, label)) => {
                let env = self.tree.push(
                    parent,
                    NodeKind::Environment {
                        kind: EnvironmentKind::Table,
                    },
                    span,
                );
                self.tree[env].identifier = label.map(String::from);
                env
            }
            None => parent,
        };

        let table = self.tree.push(
            container,
            NodeKind::Table {
                alignments: parse_alignments(lines[1]),
            },
            span,
        );
        self.parse_table_row(table, lines[0], line_no, true)?;
        for (i, line) in lines[2..end].iter().enumerate() {
            self.parse_table_row(table, line, line_no + 2 + i, false)?;
        }

        if let Some((text, _)) = caption {
            let caption_line = line_no + end;
            let id = self
                .tree
                .push(container, NodeKind::Caption, Some(Span::lines(caption_line, caption_line)));
            let column = offset_in(lines[end], text) + 1;
            self.parse_inlines(id, text, Point::new(caption_line, column))?;
        }

        Ok(Some(consumed))
    }

    fn parse_table_row(&mut self, table: NodeId, line: &str, line_no: usize, header: bool) -> Result<()> {
        let row = self.tree.push(
            table,
            NodeKind::TableRow { header },
            Some(Span::lines(line_no, line_no)),
        );
        let trimmed = line.trim();
        let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
        let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
        for cell in trimmed.split('|') {
            let cell = cell.trim();
            let id = self.tree.push(row, NodeKind::TableCell, None);
            let column = offset_in(line, cell) + 1;
            self.parse_inlines(id, cell, Point::new(line_no, column))?;
        }
        Ok(())
    }

    fn try_parse_html(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Option<usize> {
        let first = lines[0].trim_start();
        let mut chars = first.chars();
        if chars.next() != Some('<') {
            return None;
        }
        let next = chars.next()?;
        if !(next.is_ascii_alphabetic() || next == '/' || next == '!') {
            return None;
        }
        // `<https://...>` is an autolink, not a block
        let tag_end = first.find(|c: char| c == '>' || c.is_whitespace()).unwrap_or(first.len());
        if first[..tag_end].contains("://") {
            return None;
        }

        let count = lines.iter().take_while(|l| !l.trim().is_empty()).count();
        self.tree.push(
            parent,
            NodeKind::Html {
                value: lines[..count].join("\n"),
            },
            Some(Span::lines(line_no, line_no + count - 1)),
        );
        Some(count)
    }

    fn parse_paragraph(&mut self, parent: NodeId, lines: &[&str], line_no: usize) -> Result<usize> {
        let mut i = 0;

        while i < lines.len() {
            let trimmed = lines[i].trim();

            // End paragraph on blank line
            if trimmed.is_empty() {
                break;
            }

            // End paragraph on block-level element (the first line always belongs here)
            if i > 0 && starts_block(trimmed) {
                break;
            }

            i += 1;
        }
        let i = i.max(1);

        let content = lines[..i].join("\n");
        let id = self.tree.push(
            parent,
            NodeKind::Paragraph,
            Some(Span::lines(line_no, line_no + i - 1)),
        );
        let column = lines[0].len() - lines[0].trim_start().len() + 1;
        self.parse_inlines(id, content.trim_start(), Point::new(line_no, column))?;

        Ok(i)
    }
}

/// Whether a trimmed line opens a block that interrupts a paragraph.
fn starts_block(trimmed: &str) -> bool {
    trimmed.starts_with('#')
        || trimmed.starts_with("```")
        || trimmed.starts_with("~~~")
        || trimmed.starts_with(":::")
        || trimmed.starts_with("$$")
        || trimmed.starts_with('>')
        || thematic_break(trimmed).is_ok()
        || footnote_definition(trimmed).is_ok()
        || list_item_marker(trimmed).is_ok()
}

fn is_table_delimiter(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.contains('|') {
        return false;
    }

    // Remove leading/trailing pipes
    let inner = trimmed.trim_matches('|');

    // Check each cell is a valid delimiter
    inner.split('|').map(str::trim).filter(|c| !c.is_empty()).all(|cell| {
        cell.chars().all(|c| c == '-' || c == ':') && cell.contains('-')
    })
}

fn parse_alignments(line: &str) -> Vec<Alignment> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| {
            let cell = cell.trim();
            match (cell.starts_with(':'), cell.ends_with(':')) {
                (true, true) => Alignment::Center,
                (false, true) => Alignment::Right,
                _ => Alignment::Left,
            }
        })
        .collect()
}
