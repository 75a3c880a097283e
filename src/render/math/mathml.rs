//! MathML renderer.

use super::MathRenderer;
use crate::error::RenderError;

/// Renderer that converts LaTeX to MathML.
///
/// Without the `mathml` feature every conversion fails, and the HTML
/// renderer falls back to passthrough with a diagnostic.
#[derive(Debug, Default)]
pub struct MathMLRenderer;

impl MathMLRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "mathml")]
fn convert(latex: &str, display: bool) -> Result<String, RenderError> {
    let style = if display {
        latex2mathml::DisplayStyle::Block
    } else {
        latex2mathml::DisplayStyle::Inline
    };
    latex2mathml::latex_to_mathml(latex, style).map_err(|e| RenderError::Math(e.to_string()))
}

#[cfg(not(feature = "mathml"))]
fn convert(_latex: &str, _display: bool) -> Result<String, RenderError> {
    Err(RenderError::Math(
        "MathML output requires the `mathml` feature".to_string(),
    ))
}

impl MathRenderer for MathMLRenderer {
    fn render_inline(&self, latex: &str) -> Result<String, RenderError> {
        convert(latex, false)
    }

    fn render_display(&self, latex: &str) -> Result<String, RenderError> {
        convert(latex, true).map(|mathml| format!(r#"<div class="math display">{}</div>"#, mathml))
    }

    fn head_content(&self) -> Option<&'static str> {
        Some(MATHML_STYLES)
    }
}

const MATHML_STYLES: &str = r#"<style>
.math-error {
    color: red;
    font-family: monospace;
}
math {
    font-size: 1.1em;
}
</style>"#;
