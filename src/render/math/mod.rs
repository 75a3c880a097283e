//! Math backends for HTML output.

mod katex;
mod mathml;

pub use self::katex::KaTeXRenderer;
pub use self::mathml::MathMLRenderer;

use crate::error::RenderError;

/// Math rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MathBackend {
    /// Raw LaTeX for KaTeX to render client-side.
    #[default]
    KaTeX,
    /// Raw LaTeX for MathJax.
    MathJax,
    /// Convert to MathML (requires the `mathml` feature).
    MathML,
}

/// Turns a LaTeX math expression into HTML.
pub trait MathRenderer: Send + Sync {
    fn render_inline(&self, latex: &str) -> Result<String, RenderError>;

    fn render_display(&self, latex: &str) -> Result<String, RenderError>;

    /// Scripts or styles for the `<head>` of a standalone document.
    fn head_content(&self) -> Option<&'static str>;
}

/// Create a math renderer for the given backend.
pub fn create_renderer(backend: MathBackend) -> Box<dyn MathRenderer> {
    match backend {
        MathBackend::KaTeX => Box::new(KaTeXRenderer::new()),
        MathBackend::MathJax => Box::new(KaTeXRenderer::new_mathjax()),
        MathBackend::MathML => Box::new(MathMLRenderer::new()),
    }
}

/// Escaped LaTeX wrapped in client-side delimiters. Also the fallback when
/// a conversion fails.
pub(crate) fn passthrough(latex: &str, display: bool) -> String {
    let escaped = super::escape_html(latex);
    if display {
        format!(r#"<div class="math display">\[{}\]</div>"#, escaped)
    } else {
        format!(r#"<span class="math inline">\({}\)</span>"#, escaped)
    }
}
