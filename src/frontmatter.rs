//! Document front matter: the raw deserialized form and its validation into
//! the read-only [`Frontmatter`] the pipeline consumes.

use crate::ast::Category;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Front matter as written by the author, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawFrontmatter {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub numbering: Option<NumberingConfig>,
    pub math: BTreeMap<String, MacroConfig>,
    /// Older spelling of `math`.
    pub macros: BTreeMap<String, MacroConfig>,
    pub bibliography: Option<BibliographyConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberingConfig {
    Toggle(bool),
    Categories(BTreeMap<String, CategoryConfig>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CategoryConfig {
    Toggle(bool),
    Detailed {
        enabled: Option<bool>,
        template: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MacroConfig {
    Template(String),
    Detailed {
        #[serde(rename = "macro")]
        template: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BibliographyConfig {
    Path(String),
    Paths(Vec<String>),
    Config { path: String },
}

/// A user-defined math macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    /// Number of arguments (0 for simple substitution)
    pub arg_count: usize,
    /// Replacement template (use #1, #2, etc. for args)
    pub template: String,
}

impl Macro {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            arg_count: count_macro_args(&template),
            template,
        }
    }
}

/// Numbering settings for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNumbering {
    pub enabled: bool,
    /// Display template overriding [`Category::default_template`].
    pub template: Option<String>,
}

/// Per-category numbering policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numbering {
    categories: BTreeMap<Category, CategoryNumbering>,
}

impl Default for Numbering {
    /// Everything except sections is numbered.
    fn default() -> Self {
        let mut numbering = Self::all(true);
        numbering.set_enabled(Category::Section, false);
        numbering
    }
}

impl Numbering {
    /// Every category enabled (or disabled), default templates.
    pub fn all(enabled: bool) -> Self {
        Self {
            categories: Category::ALL
                .iter()
                .map(|&c| {
                    (
                        c,
                        CategoryNumbering {
                            enabled,
                            template: None,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.categories.get(&category).is_some_and(|c| c.enabled)
    }

    pub fn set_enabled(&mut self, category: Category, enabled: bool) {
        self.entry(category).enabled = enabled;
    }

    pub fn set_template(&mut self, category: Category, template: impl Into<String>) {
        self.entry(category).template = Some(template.into());
    }

    /// Display template for a category, custom or default.
    pub fn template(&self, category: Category) -> &str {
        self.categories
            .get(&category)
            .and_then(|c| c.template.as_deref())
            .unwrap_or_else(|| category.default_template())
    }

    fn entry(&mut self, category: Category) -> &mut CategoryNumbering {
        self.categories
            .entry(category)
            .or_insert(CategoryNumbering {
                enabled: false,
                template: None,
            })
    }
}

/// Validated, read-only document configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub date: Option<String>,
    pub numbering: Numbering,
    pub math: BTreeMap<String, Macro>,
    /// Bibliography files named by the document. Loading them is up to the caller.
    pub bibliography: Vec<String>,
}

/// Options for [`validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Policy used when the document does not specify `numbering`.
    pub default_numbering: Numbering,
}

/// Validate raw front matter. Problems are reported as configuration
/// warnings and the offending entry is ignored.
pub fn validate(raw: &RawFrontmatter, options: &ValidateOptions) -> (Frontmatter, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let mut authors = raw.authors.clone();
    if let Some(author) = &raw.author {
        if authors.is_empty() {
            authors.push(author.clone());
        }
    }

    let numbering = match &raw.numbering {
        None => options.default_numbering.clone(),
        Some(config) => validate_numbering(config, &options.default_numbering, &mut diagnostics),
    };

    let mut math = BTreeMap::new();
    for (name, config) in raw.macros.iter().chain(raw.math.iter()) {
        if let Some((name, mac)) = validate_macro(name, config, &mut diagnostics) {
            math.insert(name, mac);
        }
    }

    let bibliography = match &raw.bibliography {
        None => Vec::new(),
        Some(BibliographyConfig::Path(path)) | Some(BibliographyConfig::Config { path }) => {
            vec![path.clone()]
        }
        Some(BibliographyConfig::Paths(paths)) => paths.clone(),
    };

    tracing::debug!(
        macros = math.len(),
        bibliography = bibliography.len(),
        "validated front matter"
    );

    (
        Frontmatter {
            title: raw.title.clone(),
            authors,
            date: raw.date.clone(),
            numbering,
            math,
            bibliography,
        },
        diagnostics,
    )
}

fn validate_numbering(
    config: &NumberingConfig,
    defaults: &Numbering,
    diagnostics: &mut Vec<Diagnostic>,
) -> Numbering {
    let entries = match config {
        NumberingConfig::Toggle(enabled) => return Numbering::all(*enabled),
        NumberingConfig::Categories(entries) => entries,
    };

    let mut numbering = defaults.clone();
    for (name, entry) in entries {
        let Some(category) = Category::from_name(name) else {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::Configuration,
                format!("unknown numbering category `{}` ignored", name),
            ));
            continue;
        };
        match entry {
            CategoryConfig::Toggle(enabled) => numbering.set_enabled(category, *enabled),
            CategoryConfig::Detailed { enabled, template } => {
                numbering.set_enabled(category, enabled.unwrap_or(true));
                match template {
                    Some(t) if t.contains("%s") => numbering.set_template(category, t.clone()),
                    Some(t) => diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::Configuration,
                        format!(
                            "numbering template `{}` for `{}` has no `%s` and was ignored",
                            t, category
                        ),
                    )),
                    None => {}
                }
            }
        }
    }
    numbering
}

fn validate_macro(
    name: &str,
    config: &MacroConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<(String, Macro)> {
    let template = match config {
        MacroConfig::Template(t) | MacroConfig::Detailed { template: t } => t,
    };
    let bare = name.strip_prefix('\\').unwrap_or(name);
    if bare.is_empty() || !bare.chars().all(|c| c.is_ascii_alphabetic()) {
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::Configuration,
            format!("math macro name `{}` must be ASCII letters; skipped", name),
        ));
        return None;
    }
    if !braces_balanced(template) {
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::Configuration,
            format!("math macro `\\{}` has unbalanced braces; skipped", bare),
        ));
        return None;
    }
    Some((bare.to_string(), Macro::new(template.clone())))
}

fn braces_balanced(template: &str) -> bool {
    let mut depth: i32 = 0;
    let mut escaped = false;
    for c in template.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Count the number of macro arguments (#1, #2, etc.) in a template.
pub fn count_macro_args(template: &str) -> usize {
    let mut max_arg = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '#' {
            if let Some(&digit) = chars.peek() {
                if let Some(n) = digit.to_digit(10) {
                    max_arg = max_arg.max(n as usize);
                }
            }
        }
    }

    max_arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn from_toml(src: &str) -> RawFrontmatter {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_count_macro_args() {
        assert_eq!(count_macro_args("\\mathbb{R}"), 0);
        assert_eq!(count_macro_args("\\mathbf{#1}"), 1);
        assert_eq!(count_macro_args("\\frac{#1}{#2}"), 2);
        assert_eq!(count_macro_args("#1 + #2 + #3"), 3);
    }

    #[test]
    fn test_numbering_toggle() {
        let raw = from_toml("numbering = false");
        let (fm, diagnostics) = validate(&raw, &ValidateOptions::default());
        assert!(diagnostics.is_empty());
        assert!(Category::ALL.iter().all(|&c| !fm.numbering.is_enabled(c)));
    }

    #[test]
    fn test_numbering_table() {
        let raw = from_toml(
            r#"
[numbering]
headings = true
equation = false
figure = { template = "Fig. %s" }
widget = true
table = { template = "Tbl." }
"#,
        );
        let (fm, diagnostics) = validate(&raw, &ValidateOptions::default());
        assert!(fm.numbering.is_enabled(Category::Section));
        assert!(!fm.numbering.is_enabled(Category::Equation));
        assert!(fm.numbering.is_enabled(Category::Figure));
        assert_eq!(fm.numbering.template(Category::Figure), "Fig. %s");
        assert_eq!(fm.numbering.template(Category::Table), "Table %s");
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::Configuration));
    }

    #[test]
    fn test_default_numbering_skips_sections() {
        let (fm, _) = validate(&RawFrontmatter::default(), &ValidateOptions::default());
        assert!(!fm.numbering.is_enabled(Category::Section));
        assert!(fm.numbering.is_enabled(Category::Equation));
    }

    #[test]
    fn test_math_macros() {
        let raw = from_toml(
            r#"
[math]
"\\R" = "\\mathbb{R}"
vec = { macro = "\\mathbf{#1}" }
"bad1" = "x"
broken = "\\frac{#1"
"#,
        );
        let (fm, diagnostics) = validate(&raw, &ValidateOptions::default());
        assert_eq!(fm.math.len(), 2);
        assert_eq!(fm.math["R"].template, "\\mathbb{R}");
        assert_eq!(fm.math["vec"].arg_count, 1);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_yaml_front_matter() {
        let raw: RawFrontmatter = serde_yaml::from_str(
            "title: Paper\nauthor: Ada\nbibliography: [refs.bib, more.bib]\nnumbering: true\n",
        )
        .unwrap();
        let (fm, _) = validate(&raw, &ValidateOptions::default());
        assert_eq!(fm.title.as_deref(), Some("Paper"));
        assert_eq!(fm.authors, vec!["Ada".to_string()]);
        assert_eq!(fm.bibliography.len(), 2);
        assert!(fm.numbering.is_enabled(Category::Section));
    }
}
