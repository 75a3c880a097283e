//! Math macro expansion for user-defined LaTeX commands.

use crate::ast::{NodeKind, Tree};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::frontmatter::Macro;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Expansion stops after this many rounds.
pub const MAX_ROUNDS: usize = 10;

/// Expansion also stops once the text would grow past this many bytes.
pub const MAX_EXPANDED_LEN: usize = 64 * 1024;

static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\label\{([^{}]*)\}").expect("valid label regex"));

/// Expand macros in every math node and lift `\label{}` out of display math.
pub fn expand_math_macros(
    tree: &mut Tree,
    macros: &BTreeMap<String, Macro>,
    diagnostics: &mut Diagnostics,
) {
    let mut expanded_nodes = 0usize;
    let mut labels = 0usize;

    for id in tree.walk(diagnostics) {
        let Some(source) = tree.kind(id).math_source().map(str::to_string) else {
            continue;
        };
        let display = matches!(tree.kind(id), NodeKind::Math { .. });

        let (mut text, settled) = expand(&source, macros);
        if !settled {
            let node = &tree[id];
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::Configuration,
                    format!(
                        "math macros still expanding after {} rounds or {} bytes, recursive definition?",
                        MAX_ROUNDS, MAX_EXPANDED_LEN
                    ),
                )
                .at(node.position)
                .on(id),
            );
        }

        // Macros may introduce labels, so look after expansion
        if display {
            if let Some((stripped, label)) = take_label(&text) {
                text = stripped;
                let node = &mut tree[id];
                if node.identifier.is_none() && !label.is_empty() {
                    tracing::trace!(node = %id, %label, "label from math");
                    node.identifier = Some(label);
                    labels += 1;
                }
            }
        }

        let node = &mut tree[id];
        if let NodeKind::Math { value, expanded } | NodeKind::InlineMath { value, expanded } =
            &mut node.kind
        {
            if text != *value {
                *expanded = Some(text);
                expanded_nodes += 1;
            }
        }
    }

    tracing::debug!(nodes = expanded_nodes, labels, "expanded math macros");
}

/// Expand until nothing changes. Returns the text and whether it settled
/// within [`MAX_ROUNDS`] and [`MAX_EXPANDED_LEN`]. An unsettled result is the
/// last round that stayed under the length cap.
pub fn expand(content: &str, macros: &BTreeMap<String, Macro>) -> (String, bool) {
    let mut result = content.to_string();
    if macros.is_empty() {
        return (result, true);
    }

    for _ in 0..MAX_ROUNDS {
        let Some(next) = expand_once(&result, macros) else {
            return (result, false);
        };
        if next == result {
            return (result, true);
        }
        result = next;
    }

    let settled = expand_once(&result, macros).is_some_and(|next| next == result);
    (result, settled)
}

/// One left-to-right pass. Substituted text is not rescanned until the next
/// round. `None` once the output passes [`MAX_EXPANDED_LEN`].
fn expand_once(content: &str, macros: &BTreeMap<String, Macro>) -> Option<String> {
    let mut result = String::with_capacity(content.len());
    let mut remaining = content;

    while let Some(pos) = remaining.find('\\') {
        if result.len() > MAX_EXPANDED_LEN {
            return None;
        }
        result.push_str(&remaining[..pos]);
        let after_slash = &remaining[pos + 1..];

        let name_len = after_slash
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after_slash.len());

        if name_len == 0 {
            // Control symbol such as `\\` or `\{`
            let symbol_len = after_slash.chars().next().map_or(0, char::len_utf8);
            result.push('\\');
            result.push_str(&after_slash[..symbol_len]);
            remaining = &after_slash[symbol_len..];
            continue;
        }

        let name = &after_slash[..name_len];
        let after_name = &after_slash[name_len..];

        match macros.get(name) {
            Some(def) if def.arg_count == 0 => {
                result.push_str(&def.template);
                remaining = after_name;
            }
            Some(def) => match parse_macro_args(after_name, def.arg_count) {
                Some((args, rest)) => {
                    result.push_str(&substitute_args(&def.template, &args));
                    remaining = rest;
                }
                None => {
                    // Missing arguments, keep the invocation
                    result.push('\\');
                    result.push_str(name);
                    remaining = after_name;
                }
            },
            None => {
                result.push('\\');
                result.push_str(name);
                remaining = after_name;
            }
        }
    }

    result.push_str(remaining);
    (result.len() <= MAX_EXPANDED_LEN).then_some(result)
}

fn parse_macro_args(input: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut args = Vec::with_capacity(count);
    let mut remaining = input;

    for _ in 0..count {
        remaining = remaining.trim_start();
        if !remaining.starts_with('{') {
            return None;
        }

        let mut depth = 0;
        let mut end = None;
        for (i, c) in remaining.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = end?;
        args.push(&remaining[1..end]);
        remaining = &remaining[end + 1..];
    }

    Some((args, remaining))
}

/// Replace `#1`..`#9` in a single scan so arguments containing `#n` survive.
fn substitute_args(template: &str, args: &[&str]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '#' {
            if let Some(digit) = chars.peek().and_then(|d| d.to_digit(10)) {
                if let Some(arg) = (digit as usize).checked_sub(1).and_then(|i| args.get(i)) {
                    result.push_str(arg);
                    chars.next();
                    continue;
                }
            }
        }
        result.push(c);
    }

    result
}

/// Remove the first `\label{...}` from `text`.
fn take_label(text: &str) -> Option<(String, String)> {
    let caps = LABEL.captures(text)?;
    let whole = caps.get(0)?;
    let label = caps[1].trim().to_string();
    let stripped = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
    Some((stripped.trim().to_string(), label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Category;
    use pretty_assertions::assert_eq;

    fn macros(defs: &[(&str, &str)]) -> BTreeMap<String, Macro> {
        defs.iter()
            .map(|(name, template)| (name.to_string(), Macro::new(*template)))
            .collect()
    }

    #[test]
    fn test_expand_simple_macro() {
        let m = macros(&[("R", "\\mathbb{R}")]);
        assert_eq!(expand("x \\in \\R", &m).0, "x \\in \\mathbb{R}");
    }

    #[test]
    fn test_longer_control_words_are_not_prefix_matched() {
        let m = macros(&[("R", "\\mathbb{R}")]);
        assert_eq!(expand("a \\Rightarrow b", &m).0, "a \\Rightarrow b");
    }

    #[test]
    fn test_expand_macro_with_args() {
        let m = macros(&[("vec", "\\mathbf{#1}"), ("pair", "(#1, #2)")]);
        assert_eq!(expand("\\vec{x} + \\vec{y}", &m).0, "\\mathbf{x} + \\mathbf{y}");
        assert_eq!(expand("\\pair{a}{\\#2}", &m).0, "(a, \\#2)");
    }

    #[test]
    fn test_nested_macros() {
        let m = macros(&[("RR", "\\R^2"), ("R", "\\mathbb{R}")]);
        assert_eq!(expand("\\RR", &m), ("\\mathbb{R}^2".to_string(), true));
    }

    #[test]
    fn test_missing_arguments_left_verbatim() {
        let m = macros(&[("vec", "\\mathbf{#1}")]);
        assert_eq!(expand("\\vec x", &m).0, "\\vec x");
    }

    #[test]
    fn test_recursive_macro_hits_bound() {
        let m = macros(&[("loop", "a\\loop")]);
        let (text, settled) = expand("\\loop", &m);
        assert!(!settled);
        assert!(text.starts_with(&"a".repeat(MAX_ROUNDS)));
    }

    #[test]
    fn test_exponential_macro_stops_at_length_cap() {
        let template = "\\x".repeat(8);
        let m = macros(&[("x", template.as_str())]);
        let (text, settled) = expand("\\x", &m);
        assert!(!settled);
        assert!(text.len() <= MAX_EXPANDED_LEN);
        assert!(text.len() > 2);
    }

    #[test]
    fn test_label_introduced_by_macro() {
        let mut tree = Tree::new();
        let root = tree.root();
        let math = tree.push(
            root,
            NodeKind::Math {
                value: "E = mc^2 \\eqlabel".into(),
                expanded: None,
            },
            None,
        );
        let m = macros(&[("eqlabel", "\\label{eq:energy}")]);
        let mut diagnostics = Diagnostics::new();
        expand_math_macros(&mut tree, &m, &mut diagnostics);

        assert_eq!(tree[math].identifier.as_deref(), Some("eq:energy"));
        assert_eq!(tree.kind(math).math_source(), Some("E = mc^2"));
        assert_eq!(tree.kind(math).category(), Some(Category::Equation));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_recursion_warns_on_node() {
        let mut tree = Tree::new();
        let root = tree.root();
        let para = tree.push(root, NodeKind::Paragraph, None);
        let math = tree.push(
            para,
            NodeKind::InlineMath {
                value: "\\loop".into(),
                expanded: None,
            },
            None,
        );
        let mut diagnostics = Diagnostics::new();
        expand_math_macros(&mut tree, &macros(&[("loop", "\\loop\\loop")]), &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.as_slice()[0].node, Some(math));
        assert_eq!(diagnostics.as_slice()[0].kind, DiagnosticKind::Configuration);
    }
}
