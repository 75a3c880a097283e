//! HTML renderer for resolved trees.

use super::math::{create_renderer, passthrough, MathBackend, MathRenderer};
use super::{escape_html, reference_parts, short_citation, RenderContext, Rendered, Renderer};
use crate::ast::{Alignment, EnvironmentKind, NodeId, NodeKind, RefStatus, Tree};
use crate::diagnostics::{Severity, TargetFormat};
use crate::resolve::{anchor, PipelineResult};
use std::collections::HashSet;

/// Configuration for HTML rendering.
#[derive(Debug, Clone)]
pub struct HtmlConfig {
    /// Math rendering backend.
    pub math_backend: MathBackend,
    /// Whether to generate a complete HTML document or just the body content.
    pub standalone: bool,
    /// Document title (for standalone mode). Defaults to the front matter title.
    pub title: Option<String>,
    /// Additional CSS to include.
    pub custom_css: Option<String>,
    /// CSS class prefix for styling.
    pub class_prefix: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            math_backend: MathBackend::KaTeX,
            standalone: false,
            title: None,
            custom_css: None,
            class_prefix: String::new(),
        }
    }
}

impl Renderer for HtmlConfig {
    fn format(&self) -> TargetFormat {
        TargetFormat::Html
    }

    fn render(&self, tree: &Tree, result: &PipelineResult) -> Rendered {
        render_html(tree, result, self)
    }
}

/// Render a resolved tree to HTML.
pub fn render_html(tree: &Tree, result: &PipelineResult, config: &HtmlConfig) -> Rendered {
    let mut renderer = HtmlRenderer::new(tree, result, config);
    if config.standalone {
        renderer.render_standalone();
    } else {
        renderer.render_body();
    }
    let output = std::mem::take(&mut renderer.output);
    renderer.ctx.finish(output)
}

struct HtmlRenderer<'a> {
    ctx: RenderContext<'a>,
    config: &'a HtmlConfig,
    math: Box<dyn MathRenderer>,
    output: String,
    /// Footnotes whose back-reference anchor has been emitted.
    footnote_refs: HashSet<usize>,
}

impl<'a> HtmlRenderer<'a> {
    fn new(tree: &'a Tree, result: &'a PipelineResult, config: &'a HtmlConfig) -> Self {
        Self {
            ctx: RenderContext::new(tree, result, TargetFormat::Html),
            config,
            math: create_renderer(config.math_backend),
            output: String::new(),
            footnote_refs: HashSet::new(),
        }
    }

    fn class(&self, name: &str) -> String {
        format!("{}{}", self.config.class_prefix, name)
    }

    fn render_standalone(&mut self) {
        let result = self.ctx.result;
        let frontmatter = &result.frontmatter;
        let title = self
            .config
            .title
            .clone()
            .or_else(|| frontmatter.title.clone())
            .unwrap_or_else(|| "Document".to_string());

        self.output.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        self.output.push_str("<meta charset=\"UTF-8\">\n");
        self.output.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        self.output.push_str(&format!("<title>{}</title>\n", escape_html(&title)));

        if let Some(head) = self.math.head_content() {
            self.output.push_str(head);
            self.output.push('\n');
        }

        self.output.push_str(&self.default_styles());

        if let Some(ref css) = self.config.custom_css {
            self.output.push_str("<style>\n");
            self.output.push_str(css);
            self.output.push_str("\n</style>\n");
        }

        self.output.push_str("</head>\n<body>\n");
        self.output
            .push_str(&format!("<article class=\"{}\">\n", self.class("document")));

        if frontmatter.title.is_some() || !frontmatter.authors.is_empty() {
            self.output.push_str(&format!("<header class=\"{}\">\n", self.class("title-block")));
            if let Some(ref title) = frontmatter.title {
                self.output.push_str(&format!(
                    "<h1 class=\"{}\">{}</h1>\n",
                    self.class("title"),
                    escape_html(title)
                ));
            }
            if !frontmatter.authors.is_empty() {
                self.output.push_str(&format!(
                    "<p class=\"{}\">{}</p>\n",
                    self.class("authors"),
                    escape_html(&frontmatter.authors.join(", "))
                ));
            }
            self.output.push_str("</header>\n");
        }

        self.render_body();

        self.output.push_str("</article>\n");
        self.output.push_str("</body>\n</html>");
    }

    fn render_body(&mut self) {
        let tree = self.ctx.tree;
        for &child in tree.children(tree.root()) {
            self.render_node(child);
        }

        if self.ctx.result.footnotes.has_definitions() {
            self.render_footnotes_section();
        }

        if !self.ctx.result.citations.is_empty() {
            self.render_bibliography();
        }
    }

    fn render_children(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        for &child in tree.children(id) {
            self.render_node(child);
        }
    }

    /// Render children, unwrapping a lone paragraph (list items, footnotes).
    fn render_tight(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        match tree.children(id) {
            [only] if *tree.kind(*only) == NodeKind::Paragraph => self.render_children(*only),
            _ => self.render_children(id),
        }
    }

    fn id_attr(&self, id: NodeId) -> String {
        self.ctx
            .anchor(id)
            .map(|a| format!(r#" id="{}""#, a))
            .unwrap_or_default()
    }

    fn render_node(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        match tree.kind(id) {
            NodeKind::Root => self.render_children(id),
            NodeKind::Paragraph => {
                self.output.push_str("<p>");
                self.render_children(id);
                self.output.push_str("</p>\n");
            }
            NodeKind::Heading { depth } => {
                let tag = format!("h{}", depth);
                self.output.push_str(&format!("<{}{}>", tag, self.id_attr(id)));
                if let Some(ref numbered) = tree[id].numbered {
                    self.output.push_str(&format!(
                        r#"<span class="{}">{}</span> "#,
                        self.class("section-number"),
                        numbered.enumerator
                    ));
                }
                self.render_children(id);
                self.output.push_str(&format!("</{}>\n", tag));
            }
            NodeKind::ThematicBreak => self.output.push_str("<hr>\n"),
            NodeKind::BlockQuote => {
                self.output.push_str("<blockquote>\n");
                self.render_children(id);
                self.output.push_str("</blockquote>\n");
            }
            NodeKind::List { ordered, start } => {
                if *ordered {
                    self.output.push_str("<ol");
                    if let Some(start) = start.filter(|&s| s != 1) {
                        self.output.push_str(&format!(r#" start="{}""#, start));
                    }
                    self.output.push_str(">\n");
                } else {
                    self.output.push_str("<ul>\n");
                }
                self.render_children(id);
                self.output.push_str(if *ordered { "</ol>\n" } else { "</ul>\n" });
            }
            NodeKind::ListItem { checked } => {
                self.output.push_str("<li>");
                if let Some(checked) = checked {
                    self.output.push_str(if *checked {
                        r#"<input type="checkbox" checked disabled> "#
                    } else {
                        r#"<input type="checkbox" disabled> "#
                    });
                }
                self.render_tight(id);
                self.output.push_str("</li>\n");
            }
            NodeKind::Code { lang, value } => {
                self.output.push_str("<pre><code");
                if let Some(lang) = lang {
                    self.output
                        .push_str(&format!(r#" class="language-{}""#, escape_html(lang)));
                }
                self.output.push('>');
                self.output.push_str(&escape_html(value));
                self.output.push_str("</code></pre>\n");
            }
            NodeKind::Math { .. } => self.render_display_math(id),
            NodeKind::Environment { kind } => self.render_environment(id, kind),
            // Rendered by the enclosing environment
            NodeKind::Caption => {}
            NodeKind::Table { .. } => self.render_table(id),
            NodeKind::TableRow { .. } | NodeKind::TableCell => self.render_children(id),
            // Rendered in the footnotes section
            NodeKind::FootnoteDefinition { .. } => {}
            NodeKind::Html { value } => {
                self.output.push_str(value);
                self.output.push('\n');
            }
            NodeKind::Text { value } => self.output.push_str(&escape_html(value)),
            NodeKind::Emphasis => self.wrap(id, "em"),
            NodeKind::Strong => self.wrap(id, "strong"),
            NodeKind::Delete => self.wrap(id, "del"),
            NodeKind::InlineCode { value } => {
                self.output.push_str("<code>");
                self.output.push_str(&escape_html(value));
                self.output.push_str("</code>");
            }
            NodeKind::InlineMath { .. } => {
                let latex = tree.kind(id).math_source().unwrap_or_default();
                let rendered = match self.math.render_inline(latex) {
                    Ok(html) => html,
                    Err(err) => self.math_fallback(id, latex, false, &err),
                };
                self.output.push_str(&rendered);
            }
            NodeKind::Break => self.output.push_str("<br>\n"),
            NodeKind::Link {
                url,
                title,
                protocol,
                ..
            } => {
                self.output.push_str(&format!(r#"<a href="{}""#, escape_html(url)));
                if let Some(protocol) = protocol {
                    self.output
                        .push_str(&format!(r#" class="{}""#, self.class(&format!("{}-link", protocol))));
                }
                if let Some(title) = title {
                    self.output.push_str(&format!(r#" title="{}""#, escape_html(title)));
                }
                self.output.push('>');
                self.render_children(id);
                self.output.push_str("</a>");
            }
            NodeKind::Image { url, alt, title } => {
                self.output.push_str(&format!(
                    r#"<img src="{}" alt="{}""#,
                    escape_html(url),
                    escape_html(alt)
                ));
                if let Some(title) = title {
                    self.output.push_str(&format!(r#" title="{}""#, escape_html(title)));
                }
                self.output.push('>');
            }
            NodeKind::CrossReference { target, status } => self.render_xref(id, target, status),
            NodeKind::FootnoteReference { identifier, .. } => self.render_footnote_ref(id, identifier),
            NodeKind::Citation { keys, locator, resolved } => {
                self.render_citation(id, keys, locator.as_deref(), *resolved)
            }
        }
    }

    fn wrap(&mut self, id: NodeId, tag: &str) {
        self.output.push_str(&format!("<{}>", tag));
        self.render_children(id);
        self.output.push_str(&format!("</{}>", tag));
    }

    fn math_fallback(&mut self, id: NodeId, latex: &str, display: bool, err: &crate::error::RenderError) -> String {
        self.ctx
            .report(id, Severity::Warning, format!("{}; emitting LaTeX source instead", err));
        passthrough(latex, display)
    }

    fn render_display_math(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        let latex = tree.kind(id).math_source().unwrap_or_default();

        self.output.push_str(&format!(
            r#"<div class="{}"{}>"#,
            self.class("equation"),
            self.id_attr(id)
        ));
        self.output.push('\n');

        let rendered = match self.math.render_display(latex) {
            Ok(html) => html,
            Err(err) => self.math_fallback(id, latex, true, &err),
        };
        self.output.push_str(&rendered);

        if let Some(label) = self.ctx.number_label(id) {
            self.output.push_str(&format!(
                r#"<span class="{}">{}</span>"#,
                self.class("equation-number"),
                escape_html(&label)
            ));
        }

        self.output.push_str("\n</div>\n");
    }

    fn render_environment(&mut self, id: NodeId, kind: &EnvironmentKind) {
        let caption = self.ctx.caption(id);

        if kind.is_admonition() {
            self.output.push_str(&format!(
                r#"<aside class="{} {}"{}>"#,
                self.class("admonition"),
                kind.name(),
                self.id_attr(id)
            ));
            self.output
                .push_str(&format!(r#"<p class="{}">"#, self.class("admonition-title")));
            match caption {
                Some(caption) => self.render_children(caption),
                None => self.output.push_str(&escape_html(kind.display_name())),
            }
            self.output.push_str("</p>");
            self.render_children(id);
            self.output.push_str("</aside>\n");
            return;
        }

        let is_figure = matches!(kind, EnvironmentKind::Figure | EnvironmentKind::Table);
        let tag = if is_figure { "figure" } else { "div" };
        let class = match kind {
            EnvironmentKind::Proof => "proof",
            EnvironmentKind::Figure => "figure",
            EnvironmentKind::Table => "table-wrap",
            k if k.is_statement() => "theorem-like",
            _ => "environment",
        };

        let mut classes = self.class(class);
        if class != kind.name() {
            classes.push(' ');
            classes.push_str(&self.class(kind.name()));
        }
        self.output.push_str(&format!(r#"<{} class="{}"{}>"#, tag, classes, self.id_attr(id)));
        self.output.push('\n');

        if is_figure {
            // Table captions go above the table, figure captions below
            let above = matches!(kind, EnvironmentKind::Table);
            if above {
                self.render_figcaption(id, caption);
            }
            self.render_children(id);
            if !above {
                self.render_figcaption(id, caption);
            }
        } else {
            self.render_env_header(id, kind, caption);
            self.output
                .push_str(&format!(r#"<div class="{}">"#, self.class("env-content")));
            self.render_children(id);
            self.output.push_str("</div>\n");
            if matches!(kind, EnvironmentKind::Proof) {
                self.output
                    .push_str(&format!(r#"<span class="{}">∎</span>"#, self.class("qed")));
                self.output.push('\n');
            }
        }

        self.output.push_str(&format!("</{}>\n", tag));
    }

    fn render_figcaption(&mut self, id: NodeId, caption: Option<NodeId>) {
        let label = self.ctx.number_label(id);
        if caption.is_none() && label.is_none() {
            return;
        }
        self.output.push_str("<figcaption>");
        if let Some(label) = label {
            self.output
                .push_str(&format!("<strong>{}:</strong> ", escape_html(&label)));
        }
        if let Some(caption) = caption {
            self.render_children(caption);
        }
        self.output.push_str("</figcaption>\n");
    }

    fn render_env_header(&mut self, id: NodeId, kind: &EnvironmentKind, caption: Option<NodeId>) {
        self.output
            .push_str(&format!(r#"<span class="{}">"#, self.class("env-header")));
        if matches!(kind, EnvironmentKind::Proof) {
            self.output.push_str("<em>Proof.</em>");
        } else {
            let label = self
                .ctx
                .number_label(id)
                .unwrap_or_else(|| kind.display_name().to_string());
            self.output
                .push_str(&format!("<strong>{}</strong>", escape_html(&label)));
            if let Some(caption) = caption {
                self.output.push_str(" (");
                self.render_children(caption);
                self.output.push(')');
            }
            self.output.push('.');
        }
        self.output.push_str("</span>\n");
    }

    fn render_table(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        let NodeKind::Table { alignments } = tree.kind(id) else {
            return;
        };

        self.output.push_str(&format!(r#"<table class="{}""#, self.class("table")));
        // A wrapped table carries its anchor on the environment
        if !matches!(
            tree.parent(id).map(|p| tree.kind(p)),
            Some(NodeKind::Environment { .. })
        ) {
            self.output.push_str(&self.id_attr(id));
        }
        self.output.push_str(">\n");

        let (head, body): (Vec<NodeId>, Vec<NodeId>) = tree
            .children(id)
            .iter()
            .partition(|&&row| matches!(tree.kind(row), NodeKind::TableRow { header: true }));

        if !head.is_empty() {
            self.output.push_str("<thead>\n");
            for row in head {
                self.render_row(row, "th", alignments);
            }
            self.output.push_str("</thead>\n");
        }

        self.output.push_str("<tbody>\n");
        for row in body {
            self.render_row(row, "td", alignments);
        }
        self.output.push_str("</tbody>\n");

        self.output.push_str("</table>\n");
    }

    fn render_row(&mut self, row: NodeId, cell_tag: &str, alignments: &[Alignment]) {
        let tree = self.ctx.tree;
        self.output.push_str("<tr>\n");
        for (i, &cell) in tree.children(row).iter().enumerate() {
            let align = alignments.get(i).copied().unwrap_or_default();
            self.output
                .push_str(&format!("<{}{}>", cell_tag, alignment_style(align)));
            self.render_children(cell);
            self.output.push_str(&format!("</{}>\n", cell_tag));
        }
        self.output.push_str("</tr>\n");
    }

    fn render_xref(&mut self, id: NodeId, target: &str, status: &RefStatus) {
        match status {
            RefStatus::Resolved(resolved) => {
                self.output.push_str(&format!(
                    r##"<a class="{}" href="#{}">"##,
                    self.class("xref"),
                    resolved.anchor
                ));
                if self.ctx.tree.children(id).is_empty() {
                    self.output.push_str(&escape_html(&resolved.display));
                } else {
                    self.render_children(id);
                }
                self.output.push_str("</a>");
            }
            RefStatus::Pending | RefStatus::Missing => {
                self.output.push_str(&format!(
                    r#"<span class="{} {}">??{}</span>"#,
                    self.class("xref"),
                    self.class("unresolved"),
                    escape_html(target)
                ));
                self.ctx.surface(id);
            }
        }
    }

    fn render_footnote_ref(&mut self, id: NodeId, identifier: &str) {
        let Some(num) = self.ctx.result.footnotes.linked_number(identifier) else {
            self.output.push_str(&format!(
                r#"<sup class="{} {}">[?]</sup>"#,
                self.class("footnote-ref"),
                self.class("unresolved")
            ));
            self.ctx.surface(id);
            return;
        };

        let back_id = if self.footnote_refs.insert(num) {
            format!(r#" id="fnref-{}""#, num)
        } else {
            String::new()
        };
        self.output.push_str(&format!(
            r##"<sup class="{}"{}><a href="#fn-{}">{}</a></sup>"##,
            self.class("footnote-ref"),
            back_id,
            num,
            num
        ));
    }

    fn render_citation(&mut self, id: NodeId, keys: &[String], locator: Option<&str>, resolved: bool) {
        self.output
            .push_str(&format!(r#"<span class="{}">["#, self.class("citation")));
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                self.output.push_str("; ");
            }
            match self.ctx.result.citations.get(key) {
                Some(entry) => self.output.push_str(&format!(
                    r##"<a href="#bib-{}">{}</a>"##,
                    anchor(key),
                    escape_html(&short_citation(entry))
                )),
                None => self.output.push_str(&format!("?{}", escape_html(key))),
            }
        }
        if let Some(locator) = locator {
            self.output.push_str(&format!(", {}", escape_html(locator)));
        }
        self.output.push_str("]</span>");

        if !resolved {
            self.ctx.surface(id);
        }
    }

    fn render_footnotes_section(&mut self) {
        let result = self.ctx.result;
        self.output.push_str(&format!(
            r#"<section class="{}">"#,
            self.class("footnotes")
        ));
        self.output.push_str("<hr>\n<ol>\n");

        for (num, _, definition) in result.footnotes.numbered() {
            self.output
                .push_str(&format!(r#"<li id="fn-{}" value="{}">"#, num, num));
            self.render_tight(definition);
            self.output.push_str(&format!(
                r##" <a href="#fnref-{}" class="{}">↩</a></li>"##,
                num,
                self.class("footnote-back")
            ));
            self.output.push('\n');
        }

        self.output.push_str("</ol>\n</section>\n");
    }

    fn render_bibliography(&mut self) {
        let result = self.ctx.result;
        if result.citations.entries().next().is_none() {
            return;
        }

        self.output.push_str(&format!(
            r#"<section class="{}">"#,
            self.class("bibliography")
        ));
        self.output.push_str("<h2>References</h2>\n<ol>\n");

        for entry in result.citations.entries() {
            self.output
                .push_str(&format!(r#"<li id="bib-{}">"#, anchor(&entry.key)));
            self.output.push_str(&format_bibliography_entry(entry));
            self.output.push_str("</li>\n");
        }

        self.output.push_str("</ol>\n</section>\n");
    }

    fn default_styles(&self) -> String {
        format!(
            r#"<style>
.{p}document {{ max-width: 800px; margin: 0 auto; padding: 2em; font-family: Georgia, serif; line-height: 1.6; }}
.{p}section-number {{ color: #666; margin-right: 0.5em; }}
.{p}equation {{ display: flex; align-items: center; justify-content: space-between; margin: 1em 0; }}
.{p}equation-number {{ color: #666; }}
.{p}theorem-like {{ margin: 1.5em 0; padding: 1em; background: #f8f8f8; border-left: 3px solid #333; }}
.{p}proof {{ margin: 1em 0; padding: 1em; font-style: italic; }}
.{p}qed {{ float: right; }}
.{p}figure {{ margin: 2em 0; text-align: center; }}
.{p}figure img {{ max-width: 100%; }}
.{p}table {{ border-collapse: collapse; margin: 1em auto; }}
.{p}table th, .{p}table td {{ border: 1px solid #ddd; padding: 0.5em 1em; }}
.{p}table th {{ background: #f0f0f0; }}
.{p}admonition {{ margin: 1.5em 0; padding: 0.5em 1em; border-left: 4px solid #0066cc; background: #f3f7fb; }}
.{p}admonition-title {{ font-weight: bold; margin: 0.5em 0; }}
.{p}xref {{ color: #0066cc; text-decoration: none; }}
.{p}xref:hover {{ text-decoration: underline; }}
.{p}unresolved {{ color: #b00020; }}
.{p}footnotes {{ font-size: 0.9em; color: #666; }}
.{p}footnote-ref {{ font-size: 0.8em; }}
.{p}bibliography {{ margin-top: 3em; }}
.{p}bibliography ol {{ padding-left: 2em; }}
.{p}env-header {{ font-weight: bold; }}
.{p}env-content {{ margin-top: 0.5em; }}
</style>
"#,
            p = self.config.class_prefix
        )
    }
}

fn alignment_style(align: Alignment) -> &'static str {
    match align {
        Alignment::Left => "",
        Alignment::Center => r#" style="text-align: center""#,
        Alignment::Right => r#" style="text-align: right""#,
    }
}

fn format_bibliography_entry(entry: &crate::ast::BibEntry) -> String {
    let mut parts: Vec<String> = reference_parts(entry)
        .iter()
        .map(|part| escape_html(part))
        .collect();

    if let Some(ref doi) = entry.doi {
        parts.push(format!(
            r#"<a href="https://doi.org/{}">{}</a>"#,
            escape_html(doi),
            escape_html(doi)
        ));
    } else if let Some(ref url) = entry.url {
        parts.push(format!(r#"<a href="{}">{}</a>"#, escape_html(url), escape_html(url)));
    }

    parts.join(". ") + "."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::resolved;
    use pretty_assertions::assert_eq;

    fn html(input: &str) -> Rendered {
        let (tree, result) = resolved(input);
        render_html(&tree, &result, &HtmlConfig::default())
    }

    #[test]
    fn test_render_simple() {
        let out = html("# Hello\n\nThis is a paragraph.");
        assert_eq!(out.output, "<h1>Hello</h1>\n<p>This is a paragraph.</p>\n");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_render_math() {
        let out = html("Inline $E = mc^2$ math.");
        assert!(out.output.contains("math inline"));
    }

    #[test]
    fn test_equation_number_and_xref() {
        let out = html("$$\nx = 1\n$$ {#eq:one}\n\nBy @eq:one.");
        assert!(out.output.contains(r#"<div class="equation" id="eq-one">"#));
        assert!(out.output.contains(r#"<span class="equation-number">(1)</span>"#));
        assert!(out.output.contains(r##"<a class="xref" href="#eq-one">(1)</a>"##));
    }

    #[test]
    fn test_admonition() {
        let out = html(":::{important}\nHello to the world!\n:::");
        assert_eq!(
            out.output,
            "<aside class=\"admonition important\"><p class=\"admonition-title\">Important</p><p>Hello to the world!</p>\n</aside>\n"
        );
    }

    #[test]
    fn test_figure_caption() {
        let out = html(":::{figure} cat.png\n:label: fig:cat\nA cat.\n:::\n\nSee @fig:cat.");
        assert!(out.output.contains(r#"<figure class="figure" id="fig-cat">"#));
        assert!(out.output.contains("<figcaption><strong>Figure 1:</strong> A cat.</figcaption>"));
        assert!(out.output.contains(">Figure 1</a>"));
    }

    #[test]
    fn test_unresolved_reference_placeholder() {
        let out = html("See @fig:nowhere.");
        assert!(out.output.contains("??fig:nowhere"));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].format, Some(TargetFormat::Html));
        assert_eq!(out.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_footnotes_numbered_in_reference_order() {
        let out = html("First[^b] then[^a].\n\n[^a]: Alpha.\n[^b]: Beta.\n");
        assert!(out.output.contains(r##"<sup class="footnote-ref" id="fnref-1"><a href="#fn-1">1</a></sup>"##));
        let beta = out.output.find("<li id=\"fn-1\" value=\"1\">Beta.").unwrap();
        let alpha = out.output.find("<li id=\"fn-2\" value=\"2\">Alpha.").unwrap();
        assert!(beta < alpha);
    }

    #[test]
    fn test_missing_footnote() {
        let out = html("Text[^nope].");
        assert!(out.output.contains("[?]"));
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_render_standalone() {
        let (tree, result) = resolved("# Test");
        let config = HtmlConfig {
            standalone: true,
            title: Some("Test Doc".to_string()),
            ..Default::default()
        };
        let out = render_html(&tree, &result, &config);

        assert!(out.output.starts_with("<!DOCTYPE html>"));
        assert!(out.output.contains("<title>Test Doc</title>"));
        assert!(out.output.contains("katex"));
    }

    #[cfg(not(feature = "mathml"))]
    #[test]
    fn test_mathml_without_feature_falls_back() {
        let (tree, result) = resolved("Inline $x$.");
        let config = HtmlConfig {
            math_backend: MathBackend::MathML,
            ..Default::default()
        };
        let out = render_html(&tree, &result, &config);
        assert!(out.output.contains(r#"<span class="math inline">\(x\)</span>"#));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].severity, Severity::Warning);
    }
}
