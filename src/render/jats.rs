//! JATS XML renderer for resolved trees.

use super::{reference_parts, short_citation, RenderContext, Rendered, Renderer};
use crate::ast::{Alignment, BibEntry, Category, EnvironmentKind, NodeId, NodeKind, RefStatus, Tree};
use crate::diagnostics::TargetFormat;
use crate::resolve::{anchor, PipelineResult};
use quick_xml::escape::escape;

/// Configuration for JATS rendering.
#[derive(Debug, Clone)]
pub struct JatsConfig {
    /// Indentation width for nested elements.
    pub spaces: usize,
}

impl Default for JatsConfig {
    fn default() -> Self {
        Self { spaces: 2 }
    }
}

impl Renderer for JatsConfig {
    fn format(&self) -> TargetFormat {
        TargetFormat::Jats
    }

    fn render(&self, tree: &Tree, result: &PipelineResult) -> Rendered {
        render_jats(tree, result, self)
    }
}

/// Render a resolved tree to a JATS `<article>`.
pub fn render_jats(tree: &Tree, result: &PipelineResult, config: &JatsConfig) -> Rendered {
    let mut renderer = JatsRenderer::new(tree, result, config);
    renderer.render_article();
    let output = std::mem::take(&mut renderer.output);
    renderer.ctx.finish(output)
}

/// `ref-type` of an `<xref>` pointing at a target of `category`.
fn ref_type(category: Category) -> &'static str {
    match category {
        Category::Section => "sec",
        Category::Figure | Category::Algorithm => "fig",
        Category::Table => "table",
        Category::Equation => "disp-formula",
        Category::Theorem | Category::Lemma | Category::Definition | Category::Example => "statement",
    }
}

struct JatsRenderer<'a> {
    ctx: RenderContext<'a>,
    spaces: usize,
    level: usize,
    output: String,
}

impl<'a> JatsRenderer<'a> {
    fn new(tree: &'a Tree, result: &'a PipelineResult, config: &JatsConfig) -> Self {
        Self {
            ctx: RenderContext::new(tree, result, TargetFormat::Jats),
            spaces: config.spaces,
            level: 0,
            output: String::new(),
        }
    }

    fn indent(&mut self) {
        self.output.push_str(&" ".repeat(self.level * self.spaces));
    }

    /// Open a block element on its own line.
    fn open(&mut self, tag: &str) {
        self.indent();
        self.output.push_str(&format!("<{}>\n", tag));
        self.level += 1;
    }

    fn close(&mut self, name: &str) {
        self.level = self.level.saturating_sub(1);
        self.indent();
        self.output.push_str(&format!("</{}>\n", name));
    }

    /// A complete element with escaped text on one line.
    fn leaf(&mut self, name: &str, text: &str) {
        self.indent();
        self.output
            .push_str(&format!("<{}>{}</{}>\n", name, escape(text), name));
    }

    /// A complete element on one line with inline children.
    fn inline_line(&mut self, open: &str, name: &str, id: NodeId) {
        self.indent();
        self.output.push_str(&format!("<{}>", open));
        self.render_inlines(id);
        self.output.push_str(&format!("</{}>\n", name));
    }

    fn id_attr(&self, id: NodeId) -> String {
        self.ctx
            .anchor(id)
            .map(|a| format!(r#" id="{}""#, a))
            .unwrap_or_default()
    }

    fn render_article(&mut self) {
        self.output
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.open(
            r#"article xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:mml="http://www.w3.org/1998/Math/MathML" article-type="research-article""#,
        );
        self.render_front();
        self.render_body();
        self.render_back();
        self.close("article");
    }

    fn render_front(&mut self) {
        let frontmatter = &self.ctx.result.frontmatter;
        let title = frontmatter.title.clone();
        let authors = frontmatter.authors.clone();
        let date = frontmatter.date.clone();

        self.open("front");
        self.open("article-meta");
        if let Some(title) = title {
            self.open("title-group");
            self.leaf("article-title", &title);
            self.close("title-group");
        }
        if !authors.is_empty() {
            self.open("contrib-group");
            for author in &authors {
                self.open(r#"contrib contrib-type="author""#);
                self.leaf("string-name", author);
                self.close("contrib");
            }
            self.close("contrib-group");
        }
        if let Some(date) = date {
            self.open(r#"pub-date date-type="pub""#);
            self.leaf("string-date", &date);
            self.close("pub-date");
        }
        self.close("article-meta");
        self.close("front");
    }

    /// Top-level blocks, with headings opening nested `<sec>` elements.
    fn render_body(&mut self) {
        let tree = self.ctx.tree;
        self.open("body");
        let mut sections: Vec<u8> = Vec::new();

        for &child in tree.children(tree.root()) {
            if let NodeKind::Heading { depth } = tree.kind(child) {
                while sections.last().is_some_and(|&open| open >= *depth) {
                    sections.pop();
                    self.close("sec");
                }
                self.open(&format!("sec{}", self.id_attr(child)));
                if let Some(ref numbered) = tree[child].numbered {
                    self.leaf("label", &numbered.enumerator);
                }
                self.inline_line("title", "title", child);
                sections.push(*depth);
            } else {
                self.render_block(child);
            }
        }

        for _ in sections {
            self.close("sec");
        }
        self.close("body");
    }

    fn render_children(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        for &child in tree.children(id) {
            self.render_block(child);
        }
    }

    fn render_block(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        match tree.kind(id) {
            NodeKind::Root => self.render_children(id),
            NodeKind::Paragraph => self.inline_line("p", "p", id),
            // Only top-level headings open sections
            NodeKind::Heading { .. } => self.inline_line("p", "p", id),
            NodeKind::ThematicBreak => {
                self.ctx.unsupported(id, "thematic break dropped");
            }
            NodeKind::BlockQuote => {
                self.open("disp-quote");
                self.render_children(id);
                self.close("disp-quote");
            }
            NodeKind::List { ordered, .. } => {
                let list_type = if *ordered { "order" } else { "bullet" };
                self.open(&format!(r#"list list-type="{}""#, list_type));
                self.render_children(id);
                self.close("list");
            }
            NodeKind::ListItem { .. } => {
                self.open("list-item");
                self.render_children(id);
                self.close("list-item");
            }
            NodeKind::Code { lang, value } => {
                self.indent();
                match lang {
                    Some(lang) => self
                        .output
                        .push_str(&format!(r#"<code language="{}">"#, escape(lang.as_str()))),
                    None => self.output.push_str("<code>"),
                }
                self.output.push_str(&escape(value.as_str()));
                self.output.push_str("</code>\n");
            }
            NodeKind::Math { .. } => {
                let latex = tree.kind(id).math_source().unwrap_or_default();
                self.open(&format!("disp-formula{}", self.id_attr(id)));
                if let Some(label) = self.ctx.number_label(id) {
                    self.leaf("label", &label);
                }
                self.leaf("tex-math", latex);
                self.close("disp-formula");
            }
            NodeKind::Environment { kind } => self.render_environment(id, kind),
            NodeKind::Caption => {}
            NodeKind::Table { .. } => self.render_table(id),
            NodeKind::TableRow { .. } | NodeKind::TableCell => self.render_children(id),
            // Rendered in <back>
            NodeKind::FootnoteDefinition { .. } => {}
            NodeKind::Html { .. } => {
                self.ctx.unsupported(id, "raw HTML dropped");
            }
            NodeKind::Image { url, .. } => {
                self.indent();
                self.output
                    .push_str(&format!(r#"<graphic xlink:href="{}"/>"#, escape(url.as_str())));
                self.output.push('\n');
            }
            // Stray inline content at block level
            _ => {
                self.indent();
                self.render_inline(id);
                self.output.push('\n');
            }
        }
    }

    fn render_environment(&mut self, id: NodeId, kind: &EnvironmentKind) {
        let caption = self.ctx.caption(id);
        let id_attr = self.id_attr(id);

        match kind {
            EnvironmentKind::Figure | EnvironmentKind::Table | EnvironmentKind::Algorithm => {
                let (tag, attrs) = match kind {
                    EnvironmentKind::Figure => ("fig", String::new()),
                    EnvironmentKind::Table => ("table-wrap", String::new()),
                    _ => ("fig", r#" fig-type="algorithm""#.to_string()),
                };
                self.open(&format!("{}{}{}", tag, id_attr, attrs));
                if let Some(label) = self.ctx.number_label(id) {
                    self.leaf("label", &label);
                }
                if let Some(caption) = caption {
                    self.open("caption");
                    self.inline_line("p", "p", caption);
                    self.close("caption");
                }
                self.render_children(id);
                self.close(tag);
            }
            EnvironmentKind::Admonition(name) => {
                self.open(&format!(r#"boxed-text{} content-type="{}""#, id_attr, name));
                self.open("caption");
                match caption {
                    Some(caption) => self.inline_line("title", "title", caption),
                    None => self.leaf("title", kind.display_name()),
                }
                self.close("caption");
                self.render_children(id);
                self.close("boxed-text");
            }
            k if k.is_statement() => {
                self.open(&format!(r#"statement{} content-type="{}""#, id_attr, k.name()));
                let label = self
                    .ctx
                    .number_label(id)
                    .unwrap_or_else(|| k.display_name().to_string());
                self.leaf("label", &label);
                if let Some(caption) = caption {
                    self.inline_line("title", "title", caption);
                }
                self.render_children(id);
                self.close("statement");
            }
            _ => {
                self.open(&format!(r#"boxed-text{} content-type="{}""#, id_attr, kind.name()));
                self.render_children(id);
                self.close("boxed-text");
            }
        }
    }

    fn render_table(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        let NodeKind::Table { alignments } = tree.kind(id) else {
            return;
        };

        self.open("table");
        let (head, body): (Vec<NodeId>, Vec<NodeId>) = tree
            .children(id)
            .iter()
            .partition(|&&row| matches!(tree.kind(row), NodeKind::TableRow { header: true }));
        if !head.is_empty() {
            self.open("thead");
            for row in head {
                self.render_row(row, "th", alignments);
            }
            self.close("thead");
        }
        self.open("tbody");
        for row in body {
            self.render_row(row, "td", alignments);
        }
        self.close("tbody");
        self.close("table");
    }

    fn render_row(&mut self, row: NodeId, cell: &str, alignments: &[Alignment]) {
        let tree = self.ctx.tree;
        self.open("tr");
        for (i, &c) in tree.children(row).iter().enumerate() {
            let open = match alignments.get(i).copied().unwrap_or_default() {
                Alignment::Left => cell.to_string(),
                Alignment::Center => format!(r#"{} align="center""#, cell),
                Alignment::Right => format!(r#"{} align="right""#, cell),
            };
            self.inline_line(&open, cell, c);
        }
        self.close("tr");
    }

    fn render_inlines(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        for &child in tree.children(id) {
            self.render_inline(child);
        }
    }

    fn wrap(&mut self, id: NodeId, tag: &str) {
        self.output.push_str(&format!("<{}>", tag));
        self.render_inlines(id);
        self.output.push_str(&format!("</{}>", tag));
    }

    fn render_inline(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        match tree.kind(id) {
            NodeKind::Text { value } => self.output.push_str(&escape(value.as_str())),
            NodeKind::Emphasis => self.wrap(id, "italic"),
            NodeKind::Strong => self.wrap(id, "bold"),
            NodeKind::Delete => self.wrap(id, "strike"),
            NodeKind::InlineCode { value } => {
                self.output
                    .push_str(&format!("<monospace>{}</monospace>", escape(value.as_str())));
            }
            NodeKind::InlineMath { .. } => {
                let latex = tree.kind(id).math_source().unwrap_or_default();
                self.output.push_str(&format!(
                    "<inline-formula><tex-math>{}</tex-math></inline-formula>",
                    escape(latex)
                ));
            }
            NodeKind::Break => self.output.push_str("<break/>"),
            NodeKind::Link { url, .. } => {
                self.output.push_str(&format!(
                    r#"<ext-link ext-link-type="uri" xlink:href="{}">"#,
                    escape(url.as_str())
                ));
                self.render_inlines(id);
                self.output.push_str("</ext-link>");
            }
            NodeKind::Image { url, .. } => {
                self.output.push_str(&format!(
                    r#"<inline-graphic xlink:href="{}"/>"#,
                    escape(url.as_str())
                ));
            }
            NodeKind::CrossReference { target, status } => match status {
                RefStatus::Resolved(resolved) => {
                    self.output.push_str(&format!(
                        r#"<xref ref-type="{}" rid="{}">"#,
                        ref_type(resolved.category),
                        resolved.anchor
                    ));
                    if tree.children(id).is_empty() {
                        self.output.push_str(&escape(resolved.display.as_str()));
                    } else {
                        self.render_inlines(id);
                    }
                    self.output.push_str("</xref>");
                }
                RefStatus::Pending | RefStatus::Missing => {
                    self.output.push_str(&format!("??{}", escape(target.as_str())));
                    self.ctx.surface(id);
                }
            },
            NodeKind::FootnoteReference { identifier, .. } => {
                match self.ctx.result.footnotes.linked_number(identifier) {
                    Some(num) => self.output.push_str(&format!(
                        r#"<xref ref-type="fn" rid="fn-{}">{}</xref>"#,
                        num, num
                    )),
                    None => {
                        self.output.push_str("[?]");
                        self.ctx.surface(id);
                    }
                }
            }
            NodeKind::Citation { keys, locator, resolved } => {
                let result = self.ctx.result;
                self.output.push('[');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str("; ");
                    }
                    match result.citations.get(key) {
                        Some(entry) => self.output.push_str(&format!(
                            r#"<xref ref-type="bibr" rid="bib-{}">{}</xref>"#,
                            anchor(key),
                            escape(short_citation(entry).as_str())
                        )),
                        None => self.output.push_str(&format!("?{}", escape(key.as_str()))),
                    }
                }
                if let Some(locator) = locator {
                    self.output.push_str(&format!(", {}", escape(locator.as_str())));
                }
                self.output.push(']');
                if !resolved {
                    self.ctx.surface(id);
                }
            }
            NodeKind::Html { .. } => {
                self.ctx.unsupported(id, "raw HTML dropped");
            }
            // Block kinds never appear inline; render their text
            _ => self.render_inlines(id),
        }
    }

    fn render_back(&mut self) {
        let result = self.ctx.result;
        let has_footnotes = result.footnotes.has_definitions();
        let has_refs = result.citations.entries().next().is_some();
        if !has_footnotes && !has_refs {
            return;
        }

        self.open("back");
        if has_footnotes {
            self.open("fn-group");
            for (num, _, definition) in result.footnotes.numbered() {
                self.open(&format!(r#"fn id="fn-{}""#, num));
                self.leaf("label", &num.to_string());
                self.render_children(definition);
                self.close("fn");
            }
            self.close("fn-group");
        }
        if has_refs {
            self.open("ref-list");
            self.leaf("title", "References");
            for entry in result.citations.entries() {
                self.render_ref(entry);
            }
            self.close("ref-list");
        }
        self.close("back");
    }

    fn render_ref(&mut self, entry: &BibEntry) {
        let publication_type = match entry.entry_type.as_str() {
            "article" => "journal",
            "book" | "inbook" => "book",
            "inproceedings" | "conference" | "proceedings" => "confproc",
            "phdthesis" | "mastersthesis" => "thesis",
            _ => "other",
        };

        self.open(&format!(r#"ref id="bib-{}""#, anchor(&entry.key)));
        self.indent();
        self.output.push_str(&format!(
            r#"<mixed-citation publication-type="{}">"#,
            publication_type
        ));
        let parts: Vec<String> = reference_parts(entry)
            .iter()
            .map(|part| escape(part.as_str()).into_owned())
            .collect();
        if !parts.is_empty() {
            self.output.push_str(&parts.join(". "));
            self.output.push('.');
        }
        if let Some(ref doi) = entry.doi {
            if !parts.is_empty() {
                self.output.push(' ');
            }
            self.output.push_str(&format!(
                r#"<pub-id pub-id-type="doi">{}</pub-id>"#,
                escape(doi.as_str())
            ));
        }
        self.output.push_str("</mixed-citation>\n");
        self.close("ref");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::render::testing::resolved;

    fn jats(input: &str) -> Rendered {
        let (tree, result) = resolved(input);
        render_jats(&tree, &result, &JatsConfig::default())
    }

    #[test]
    fn test_nested_sections() {
        let out = jats("# Intro {#sec:intro}\n\nText.\n\n## Sub\n\nMore.\n\n# Next\n");
        assert!(out.output.contains(
            "    <sec id=\"sec-intro\">\n      <title>Intro</title>\n      <p>Text.</p>\n      <sec>\n        <title>Sub</title>\n        <p>More.</p>\n      </sec>\n    </sec>\n    <sec>\n      <title>Next</title>\n    </sec>\n  </body>\n"
        ));
        assert!(out.output.starts_with("<?xml"));
        assert!(out.output.ends_with("</article>\n"));
    }

    #[test]
    fn test_figure_and_xref() {
        let out = jats(":::{figure} cat.png\n:label: fig:cat\nA cat.\n:::\n\nSee @fig:cat.");
        assert!(out.output.contains(r#"<fig id="fig-cat">"#));
        assert!(out.output.contains("<label>Figure 1</label>"));
        assert!(out.output.contains("<p>A cat.</p>"));
        assert!(out.output.contains(r#"<graphic xlink:href="cat.png"/>"#));
        assert!(out
            .output
            .contains(r#"<xref ref-type="fig" rid="fig-cat">Figure 1</xref>"#));
    }

    #[test]
    fn test_disp_formula() {
        let out = jats("$$\nx < 1\n$$ {#eq:one}\n");
        assert!(out.output.contains(r#"<disp-formula id="eq-one">"#));
        assert!(out.output.contains("<label>(1)</label>"));
        assert!(out.output.contains("<tex-math>x &lt; 1</tex-math>"));
    }

    #[test]
    fn test_footnotes_in_back() {
        let out = jats("Text[^a].\n\n[^a]: Note & more.\n");
        assert!(out.output.contains(r#"<xref ref-type="fn" rid="fn-1">1</xref>"#));
        assert!(out.output.contains(r#"<fn id="fn-1">"#));
        assert!(out.output.contains("<p>Note &amp; more.</p>"));
    }

    #[test]
    fn test_front_matter() {
        let out = jats("---\ntitle: My Paper\nauthors:\n  - Ada Lovelace\n---\n\nBody.\n");
        assert!(out.output.contains("<article-title>My Paper</article-title>"));
        assert!(out.output.contains("<string-name>Ada Lovelace</string-name>"));
    }

    #[test]
    fn test_admonition_boxed_text() {
        let out = jats(":::{important}\nHello to the world!\n:::");
        assert!(out.output.contains(r#"<boxed-text content-type="important">"#));
        assert!(out.output.contains("<title>Important</title>"));
    }

    #[test]
    fn test_thematic_break_dropped() {
        let out = jats("A\n\n---\n\nB\n");
        assert!(!out.output.contains("<hr"));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].severity, Severity::Info);
    }

    #[test]
    fn test_indentation_width() {
        let (tree, result) = resolved("Text.");
        let out = render_jats(&tree, &result, &JatsConfig { spaces: 4 });
        assert!(out.output.contains("\n        <p>Text.</p>\n"));
    }

    #[test]
    fn test_unresolved_xref() {
        let out = jats("See @eq:none.");
        assert!(out.output.contains("??eq:none"));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].format, Some(TargetFormat::Jats));
    }
}
