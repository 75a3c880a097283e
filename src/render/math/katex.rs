//! KaTeX/MathJax passthrough renderer.

use super::{passthrough, MathRenderer};
use crate::error::RenderError;

/// Renderer that outputs raw LaTeX for client-side rendering.
#[derive(Debug, Default)]
pub struct KaTeXRenderer {
    use_mathjax: bool,
}

impl KaTeXRenderer {
    pub fn new() -> Self {
        Self { use_mathjax: false }
    }

    /// Same markup, MathJax loader in the head.
    pub fn new_mathjax() -> Self {
        Self { use_mathjax: true }
    }
}

impl MathRenderer for KaTeXRenderer {
    fn render_inline(&self, latex: &str) -> Result<String, RenderError> {
        Ok(passthrough(latex, false))
    }

    fn render_display(&self, latex: &str) -> Result<String, RenderError> {
        Ok(passthrough(latex, true))
    }

    fn head_content(&self) -> Option<&'static str> {
        if self.use_mathjax {
            Some(MATHJAX_HEAD)
        } else {
            Some(KATEX_HEAD)
        }
    }
}

const KATEX_HEAD: &str = r#"<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css" crossorigin="anonymous">
<script defer src="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.js" crossorigin="anonymous"></script>
<script defer src="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/contrib/auto-render.min.js" crossorigin="anonymous"
    onload="renderMathInElement(document.body, {
        delimiters: [
            {left: '\\[', right: '\\]', display: true},
            {left: '\\(', right: '\\)', display: false}
        ]
    });"></script>"#;

const MATHJAX_HEAD: &str = r#"<script>
MathJax = {
    tex: {
        inlineMath: [['\\(', '\\)']],
        displayMath: [['\\[', '\\]']]
    }
};
</script>
<script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>"#;
