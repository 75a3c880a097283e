//! LaTeX renderer for resolved trees.
//!
//! Numbers printed by LaTeX must match the ones the pipeline assigned.
//! Equations carry an explicit `\tag`, theorem-like environments share
//! counters the same way the enumeration pass does, and references print
//! `ResolvedTarget::display` through `\hyperref` instead of `\ref`.

use super::{reference_parts, RenderContext, Rendered, Renderer};
use crate::ast::{Alignment, Category, EnvironmentKind, NodeId, NodeKind, RefStatus, Tree};
use crate::diagnostics::TargetFormat;
use crate::resolve::PipelineResult;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Configuration for LaTeX rendering.
#[derive(Debug, Clone)]
pub struct LatexConfig {
    /// Emit `\documentclass`, the preamble and `\begin{document}`.
    pub standalone: bool,
    pub document_class: String,
}

impl Default for LatexConfig {
    fn default() -> Self {
        Self {
            standalone: false,
            document_class: "article".to_string(),
        }
    }
}

impl Renderer for LatexConfig {
    fn format(&self) -> TargetFormat {
        TargetFormat::Latex
    }

    fn render(&self, tree: &Tree, result: &PipelineResult) -> Rendered {
        render_latex(tree, result, self)
    }
}

/// Render a resolved tree to LaTeX.
pub fn render_latex(tree: &Tree, result: &PipelineResult, config: &LatexConfig) -> Rendered {
    let mut renderer = LatexRenderer::new(tree, result);
    let root = tree.root();
    renderer.render_children(root);
    renderer.render_bibliography();

    let body = std::mem::take(&mut renderer.output);
    let output = if config.standalone {
        let mut doc = renderer.preamble(config);
        doc.push_str("\\begin{document}\n");
        if result.frontmatter.title.is_some() {
            doc.push_str("\\maketitle\n");
        }
        doc.push('\n');
        doc.push_str(&body);
        doc.push_str("\\end{document}\n");
        doc
    } else {
        body
    };
    renderer.ctx.finish(output)
}

/// A `\newtheorem` declaration.
struct TheoremDecl {
    display: String,
    /// Counter shared with another environment.
    counter: Option<&'static str>,
}

struct LatexRenderer<'a> {
    ctx: RenderContext<'a>,
    output: String,
    packages: BTreeSet<&'static str>,
    theorems: BTreeMap<String, TheoremDecl>,
    /// Footnotes whose text has already been emitted.
    footnotes: HashSet<usize>,
}

impl<'a> LatexRenderer<'a> {
    fn new(tree: &'a Tree, result: &'a PipelineResult) -> Self {
        Self {
            ctx: RenderContext::new(tree, result, TargetFormat::Latex),
            output: String::new(),
            packages: BTreeSet::new(),
            theorems: BTreeMap::new(),
            footnotes: HashSet::new(),
        }
    }

    fn preamble(&self, config: &LatexConfig) -> String {
        let mut out = format!("\\documentclass{{{}}}\n", config.document_class);
        out.push_str("\\usepackage[utf8]{inputenc}\n");
        for package in self.packages.iter().filter(|&&p| p != "hyperref") {
            if *package == "ulem" {
                out.push_str("\\usepackage[normalem]{ulem}\n");
            } else {
                out.push_str(&format!("\\usepackage{{{}}}\n", package));
            }
        }
        // hyperref goes last
        out.push_str("\\usepackage{hyperref}\n");

        // Counter owners before the environments sharing them
        for (name, decl) in self.theorems.iter().filter(|(_, d)| d.counter.is_none()) {
            if let Some(unnumbered) = name.strip_suffix('*') {
                out.push_str(&format!("\\newtheorem*{{{}*}}{{{}}}\n", unnumbered, decl.display));
            } else {
                out.push_str(&format!("\\newtheorem{{{}}}{{{}}}\n", name, decl.display));
            }
        }
        for (name, decl) in &self.theorems {
            if let Some(counter) = decl.counter {
                out.push_str(&format!(
                    "\\newtheorem{{{}}}[{}]{{{}}}\n",
                    name, counter, decl.display
                ));
            }
        }

        let frontmatter = &self.ctx.result.frontmatter;
        if let Some(ref title) = frontmatter.title {
            out.push_str(&format!("\\title{{{}}}\n", escape_latex(title)));
            let authors: Vec<String> = frontmatter.authors.iter().map(|a| escape_latex(a)).collect();
            out.push_str(&format!("\\author{{{}}}\n", authors.join(" \\and ")));
            if let Some(ref date) = frontmatter.date {
                out.push_str(&format!("\\date{{{}}}\n", escape_latex(date)));
            }
        }
        out.push('\n');
        out
    }

    fn use_package(&mut self, package: &'static str) {
        self.packages.insert(package);
    }

    fn render_children(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        for &child in tree.children(id) {
            self.render_node(child);
        }
    }

    /// Render children, unwrapping a lone paragraph.
    fn render_tight(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        match tree.children(id) {
            [only] if *tree.kind(*only) == NodeKind::Paragraph => self.render_children(*only),
            _ => self.render_children(id),
        }
    }

    fn label(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        if let Some(ref label) = tree[id].identifier {
            self.use_package("hyperref");
            self.output.push_str(&format!("\\label{{{}}}", label));
        }
    }

    fn render_node(&mut self, id: NodeId) {
        let tree = self.ctx.tree;
        match tree.kind(id) {
            NodeKind::Root => self.render_children(id),
            NodeKind::Paragraph => {
                self.render_children(id);
                self.output.push_str("\n\n");
            }
            NodeKind::Heading { depth } => {
                let command = match depth {
                    1 => "section",
                    2 => "subsection",
                    3 => "subsubsection",
                    4 => "paragraph",
                    _ => "subparagraph",
                };
                let star = if tree[id].numbered.is_some() { "" } else { "*" };
                self.output.push_str(&format!("\\{}{}{{", command, star));
                self.render_children(id);
                self.output.push('}');
                self.label(id);
                self.output.push_str("\n\n");
            }
            NodeKind::ThematicBreak => {
                self.output
                    .push_str("\\par\\noindent\\rule{\\textwidth}{0.4pt}\n\n");
            }
            NodeKind::BlockQuote => {
                self.output.push_str("\\begin{quote}\n");
                self.render_children(id);
                self.output.push_str("\\end{quote}\n\n");
            }
            NodeKind::List { ordered, start } => {
                let env = if *ordered { "enumerate" } else { "itemize" };
                self.output.push_str(&format!("\\begin{{{}}}\n", env));
                if let Some(start) = start.filter(|&s| *ordered && s > 1) {
                    self.output
                        .push_str(&format!("\\setcounter{{enumi}}{{{}}}\n", start - 1));
                }
                self.render_children(id);
                self.output.push_str(&format!("\\end{{{}}}\n\n", env));
            }
            NodeKind::ListItem { checked } => {
                match checked {
                    Some(true) => {
                        self.use_package("amssymb");
                        self.output.push_str("\\item[$\\boxtimes$] ");
                    }
                    Some(false) => {
                        self.use_package("amssymb");
                        self.output.push_str("\\item[$\\square$] ");
                    }
                    None => self.output.push_str("\\item "),
                }
                self.render_tight(id);
                self.output.push('\n');
            }
            NodeKind::Code { value, .. } => {
                self.output.push_str("\\begin{verbatim}\n");
                self.output.push_str(value);
                self.output.push_str("\n\\end{verbatim}\n\n");
            }
            NodeKind::Math { .. } => self.render_display_math(id),
            NodeKind::Environment { kind } => self.render_environment(id, kind),
            NodeKind::Caption => {}
            NodeKind::Table { .. } => self.render_table(id),
            NodeKind::TableRow { .. } | NodeKind::TableCell => self.render_children(id),
            // Emitted at the first reference
            NodeKind::FootnoteDefinition { .. } => {}
            NodeKind::Html { .. } => {
                self.ctx.unsupported(id, "raw HTML dropped");
            }
            NodeKind::Text { value } => self.output.push_str(&escape_latex(value)),
            NodeKind::Emphasis => self.command(id, "emph"),
            NodeKind::Strong => self.command(id, "textbf"),
            NodeKind::Delete => {
                self.use_package("ulem");
                self.command(id, "sout");
            }
            NodeKind::InlineCode { value } => {
                self.output
                    .push_str(&format!("\\texttt{{{}}}", escape_latex(value)));
            }
            NodeKind::InlineMath { .. } => {
                let latex = tree.kind(id).math_source().unwrap_or_default();
                self.output.push_str(&format!("${}$", latex));
            }
            NodeKind::Break => self.output.push_str("\\\\\n"),
            NodeKind::Link { url, .. } => {
                self.use_package("hyperref");
                self.output.push_str(&format!("\\href{{{}}}{{", escape_url(url)));
                self.render_children(id);
                self.output.push('}');
            }
            NodeKind::Image { url, .. } => {
                self.use_package("graphicx");
                self.output.push_str(&format!(
                    "\\includegraphics[width=\\linewidth]{{{}}}\n",
                    url
                ));
            }
            NodeKind::CrossReference { target, status } => self.render_xref(id, target, status),
            NodeKind::FootnoteReference { identifier, .. } => self.render_footnote_ref(id, identifier),
            NodeKind::Citation { keys, locator, resolved } => {
                match locator {
                    Some(locator) => self.output.push_str(&format!(
                        "\\cite[{}]{{{}}}",
                        escape_latex(locator),
                        keys.join(",")
                    )),
                    None => self.output.push_str(&format!("\\cite{{{}}}", keys.join(","))),
                }
                if !resolved {
                    self.ctx.surface(id);
                }
            }
        }
    }

    fn command(&mut self, id: NodeId, name: &str) {
        self.output.push_str(&format!("\\{}{{", name));
        self.render_children(id);
        self.output.push('}');
    }

    fn render_display_math(&mut self, id: NodeId) {
        self.use_package("amsmath");
        let tree = self.ctx.tree;
        let latex = tree.kind(id).math_source().unwrap_or_default();

        match tree[id].numbered {
            Some(ref numbered) => {
                self.output.push_str("\\begin{equation}\n");
                self.output.push_str(latex);
                self.output.push_str(&format!("\n\\tag{{{}}}", numbered.enumerator));
                self.label(id);
                self.output.push_str("\n\\end{equation}\n\n");
            }
            None => {
                self.output.push_str("\\begin{equation*}\n");
                self.output.push_str(latex);
                self.output.push('\n');
                if tree[id].identifier.is_some() {
                    self.label(id);
                    self.output.push('\n');
                }
                self.output.push_str("\\end{equation*}\n\n");
            }
        }
    }

    fn render_environment(&mut self, id: NodeId, kind: &EnvironmentKind) {
        let caption = self.ctx.caption(id);
        match kind {
            EnvironmentKind::Proof => {
                self.use_package("amsthm");
                self.output.push_str("\\begin{proof}\n");
                self.render_children(id);
                self.output.push_str("\\end{proof}\n\n");
            }
            k if k.is_statement() => self.render_statement(id, k, caption),
            EnvironmentKind::Figure | EnvironmentKind::Table | EnvironmentKind::Algorithm => {
                let float = match kind {
                    EnvironmentKind::Figure => "figure",
                    EnvironmentKind::Table => "table",
                    _ => {
                        self.use_package("algorithm");
                        "algorithm"
                    }
                };
                self.output
                    .push_str(&format!("\\begin{{{}}}[htbp]\n\\centering\n", float));
                // Table captions go above the table
                let above = matches!(kind, EnvironmentKind::Table);
                if above {
                    self.render_float_caption(id, caption);
                }
                self.render_children(id);
                if !above {
                    self.render_float_caption(id, caption);
                }
                self.output.push_str(&format!("\\end{{{}}}\n\n", float));
            }
            EnvironmentKind::Admonition(_) => {
                self.output.push_str("\\begin{quote}\n\\textbf{");
                match caption {
                    Some(caption) => self.render_children(caption),
                    None => self.output.push_str(&escape_latex(kind.display_name())),
                }
                self.output.push_str("}\\par\n");
                self.render_children(id);
                self.output.push_str("\\end{quote}\n\n");
            }
            _ => {
                self.ctx
                    .unsupported(id, format!("environment `{}` rendered as plain content", kind.name()));
                self.label(id);
                self.render_children(id);
            }
        }
    }

    fn render_statement(&mut self, id: NodeId, kind: &EnvironmentKind, caption: Option<NodeId>) {
        self.use_package("amsthm");
        let numbered = self.ctx.tree[id].numbered.is_some();
        let env = if numbered {
            let counter = kind
                .category()
                .map(|c| c.name())
                .filter(|&c| c != kind.name());
            if let Some(owner) = counter.and_then(Category::from_name) {
                self.theorems
                    .entry(owner.name().to_string())
                    .or_insert_with(|| TheoremDecl {
                        display: owner.title().to_string(),
                        counter: None,
                    });
            }
            self.theorems
                .entry(kind.name().to_string())
                .or_insert_with(|| TheoremDecl {
                    display: kind.display_name().to_string(),
                    counter,
                });
            kind.name().to_string()
        } else {
            let env = format!("{}*", kind.name());
            self.theorems.entry(env.clone()).or_insert_with(|| TheoremDecl {
                display: kind.display_name().to_string(),
                counter: None,
            });
            env
        };

        self.output.push_str(&format!("\\begin{{{}}}", env));
        if let Some(caption) = caption {
            self.output.push('[');
            self.render_children(caption);
            self.output.push(']');
        }
        self.label(id);
        self.output.push('\n');
        self.render_children(id);
        self.output.push_str(&format!("\\end{{{}}}\n\n", env));
    }

    fn render_float_caption(&mut self, id: NodeId, caption: Option<NodeId>) {
        let numbered = self.ctx.tree[id].numbered.is_some();
        if caption.is_none() && !numbered {
            self.label(id);
            return;
        }
        if numbered {
            self.output.push_str("\\caption{");
        } else {
            self.use_package("caption");
            self.output.push_str("\\caption*{");
        }
        if let Some(caption) = caption {
            self.render_children(caption);
        }
        self.output.push('}');
        self.label(id);
        self.output.push('\n');
    }

    fn render_table(&mut self, id: NodeId) {
        self.use_package("booktabs");
        let tree = self.ctx.tree;
        let NodeKind::Table { alignments } = tree.kind(id) else {
            return;
        };
        let columns = tree
            .children(id)
            .iter()
            .map(|&row| tree.children(row).len())
            .max()
            .unwrap_or(0);
        let spec: String = (0..columns)
            .map(|i| match alignments.get(i).copied().unwrap_or_default() {
                Alignment::Left => 'l',
                Alignment::Center => 'c',
                Alignment::Right => 'r',
            })
            .collect();

        self.output
            .push_str(&format!("\\begin{{tabular}}{{{}}}\n\\toprule\n", spec));
        let mut in_header = true;
        for &row in tree.children(id) {
            let header = matches!(tree.kind(row), NodeKind::TableRow { header: true });
            if in_header && !header {
                self.output.push_str("\\midrule\n");
                in_header = false;
            }
            for (i, &cell) in tree.children(row).iter().enumerate() {
                if i > 0 {
                    self.output.push_str(" & ");
                }
                self.render_children(cell);
            }
            self.output.push_str(" \\\\\n");
        }
        self.output.push_str("\\bottomrule\n\\end{tabular}\n");
    }

    fn render_xref(&mut self, id: NodeId, target: &str, status: &RefStatus) {
        match status {
            RefStatus::Resolved(resolved) => {
                self.use_package("hyperref");
                self.output.push_str(&format!("\\hyperref[{}]{{", resolved.label));
                if self.ctx.tree.children(id).is_empty() {
                    self.output
                        .push_str(&escape_latex(&resolved.display).replace(' ', "~"));
                } else {
                    self.render_children(id);
                }
                self.output.push('}');
            }
            RefStatus::Pending | RefStatus::Missing => {
                self.output
                    .push_str(&format!("\\textbf{{??{}}}", escape_latex(target)));
                self.ctx.surface(id);
            }
        }
    }

    fn render_footnote_ref(&mut self, id: NodeId, identifier: &str) {
        let result = self.ctx.result;
        let footnotes = &result.footnotes;
        let (Some(num), Some(definition)) = (footnotes.number(identifier), footnotes.definition(identifier)) else {
            self.output.push_str("\\textsuperscript{[?]}");
            self.ctx.surface(id);
            return;
        };

        if self.footnotes.insert(num) {
            self.output.push_str(&format!("\\footnote[{}]{{", num));
            self.render_tight(definition);
            self.output.push('}');
        } else {
            self.output.push_str(&format!("\\footnotemark[{}]", num));
        }
    }

    fn render_bibliography(&mut self) {
        let result = self.ctx.result;
        if result.citations.entries().next().is_none() {
            return;
        }

        self.output.push_str("\\begin{thebibliography}{99}\n");
        for entry in result.citations.entries() {
            let mut parts: Vec<String> = reference_parts(entry).iter().map(|p| escape_latex(p)).collect();
            if let Some(ref doi) = entry.doi {
                self.use_package("hyperref");
                parts.push(format!(
                    "\\href{{https://doi.org/{}}}{{doi:{}}}",
                    escape_url(doi),
                    escape_latex(doi)
                ));
            } else if let Some(ref url) = entry.url {
                self.use_package("hyperref");
                parts.push(format!("\\url{{{}}}", escape_url(url)));
            }
            self.output.push_str(&format!(
                "\\bibitem{{{}}} {}.\n",
                entry.key,
                parts.join(". ")
            ));
        }
        self.output.push_str("\\end{thebibliography}\n");
    }
}

/// Escape LaTeX special characters in running text.
pub fn escape_latex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape the characters `\href` and `\url` choke on.
fn escape_url(url: &str) -> String {
    url.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('#', "\\#")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::ast::BibEntry;
    use crate::render::testing::{resolved, resolved_with};
    use crate::resolve::PipelineOptions;
    use pretty_assertions::assert_eq;

    fn latex(input: &str) -> Rendered {
        let (tree, result) = resolved(input);
        render_latex(&tree, &result, &LatexConfig::default())
    }

    #[test]
    fn test_escape_latex() {
        assert_eq!(escape_latex("50% & #1_a"), "50\\% \\& \\#1\\_a");
        assert_eq!(escape_latex("a~b^c\\"), "a\\textasciitilde{}b\\textasciicircum{}c\\textbackslash{}");
    }

    #[test]
    fn test_unnumbered_section_keeps_label() {
        let out = latex("# Intro {#sec:intro}\n\nText.");
        assert_eq!(out.output, "\\section*{Intro}\\label{sec:intro}\n\nText.\n\n");
    }

    #[test]
    fn test_equation_tag_matches_reference() {
        let out = latex("$$\nx = 1\n$$ {#eq:one}\n\nBy @eq:one.");
        assert!(out
            .output
            .contains("\\begin{equation}\nx = 1\n\\tag{1}\\label{eq:one}\n\\end{equation}"));
        assert!(out.output.contains("\\hyperref[eq:one]{(1)}"));
    }

    #[test]
    fn test_figure_reference() {
        let out = latex(":::{figure} cat.png\n:label: fig:cat\nA cat.\n:::\n\nSee @fig:cat.");
        assert!(out.output.contains("\\includegraphics[width=\\linewidth]{cat.png}"));
        assert!(out.output.contains("\\caption{A cat.}\\label{fig:cat}"));
        assert!(out.output.contains("\\hyperref[fig:cat]{Figure~1}"));
    }

    #[test]
    fn test_footnote_then_footnotemark() {
        let out = latex("A[^a] B[^a].\n\n[^a]: Note.\n");
        assert!(out.output.contains("A\\footnote[1]{Note.} B\\footnotemark[1]."));
    }

    #[test]
    fn test_citation_and_bibliography() {
        let mut options = PipelineOptions::default();
        options.bibliography.insert(
            "knuth".to_string(),
            BibEntry {
                key: "knuth".into(),
                entry_type: "book".into(),
                title: Some("The TeXbook".into()),
                authors: vec!["Donald E. Knuth".into()],
                year: Some("1984".into()),
                ..BibEntry::default()
            },
        );
        let (tree, result) = resolved_with("See [@knuth, p. 4].", &options);
        let out = render_latex(&tree, &result, &LatexConfig::default());
        assert!(out.output.contains("\\cite[p. 4]{knuth}"));
        assert!(out
            .output
            .contains("\\bibitem{knuth} Donald E. Knuth. (1984). The TeXbook."));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_raw_html_dropped_with_info() {
        let out = latex("<div>hi</div>\n");
        assert!(!out.output.contains("<div>"));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].severity, Severity::Info);
        assert_eq!(out.diagnostics[0].format, Some(TargetFormat::Latex));
    }

    #[test]
    fn test_standalone_declares_shared_counters() {
        let (tree, result) = resolved("::: theorem\nA.\n:::\n\n::: proposition\nB.\n:::\n");
        let config = LatexConfig {
            standalone: true,
            ..LatexConfig::default()
        };
        let out = render_latex(&tree, &result, &config).output;
        assert!(out.starts_with("\\documentclass{article}\n"));
        assert!(out.contains("\\usepackage{amsthm}"));
        let theorem = out.find("\\newtheorem{theorem}{Theorem}").unwrap();
        let proposition = out.find("\\newtheorem{proposition}[theorem]{Proposition}").unwrap();
        assert!(theorem < proposition);
        assert!(out.find("\\usepackage{amsthm}").unwrap() < out.find("\\usepackage{hyperref}").unwrap());
        assert!(out.ends_with("\\end{document}\n"));
    }

    #[test]
    fn test_unresolved_reference_placeholder() {
        let out = latex("See @tbl:none.");
        assert!(out.output.contains("\\textbf{??tbl:none}"));
        assert_eq!(out.diagnostics.len(), 1);
    }
}
