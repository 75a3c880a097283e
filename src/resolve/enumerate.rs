//! Automatic numbering for sections, environments, equations, etc.

use super::state::{anchor, ReferenceState, Target};
use crate::ast::{NodeId, NodeKind, Numbered, Tree};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};

/// Number every enumerable node in document order and register labels.
///
/// A node is numbered when its category is enabled; it is registered when it
/// has an identifier, numbered or not. A later duplicate label loses its
/// identifier but keeps its number.
pub fn enumerate_targets(tree: &mut Tree, state: &mut ReferenceState, diagnostics: &mut Diagnostics) {
    let mut numbered = 0usize;

    for id in tree.walk(diagnostics) {
        let Some(category) = tree.kind(id).category() else {
            continue;
        };

        if state.numbering().is_enabled(category) {
            let depth = match tree.kind(id) {
                NodeKind::Heading { depth } => Some(*depth),
                _ => None,
            };
            let (number, enumerator) = state.next(category, depth);
            tree[id].numbered = Some(Numbered {
                category,
                number,
                enumerator,
            });
            numbered += 1;
        }

        let Some(label) = tree[id].identifier.clone() else {
            continue;
        };
        let numbering = tree[id].numbered.as_ref();
        let target = Target {
            anchor: anchor(&label),
            label: label.clone(),
            category,
            noun: match tree.kind(id) {
                NodeKind::Environment { kind } => kind.display_name().to_string(),
                _ => category.title().to_string(),
            },
            number: numbering.map(|n| n.number),
            enumerator: numbering.map(|n| n.enumerator.clone()),
            title: title(tree, id),
            node: id,
        };

        if let Err(existing) = state.register(target) {
            let first = tree[existing.node].position;
            let message = match first {
                Some(span) => format!("duplicate label `{}` (first defined at {})", label, span),
                None => format!("duplicate label `{}`", label),
            };
            diagnostics.push(
                Diagnostic::warning(DiagnosticKind::Reference, message)
                    .at(tree[id].position)
                    .on(id),
            );
            tree[id].identifier = None;
        }
    }

    tracing::debug!(numbered, labels = state.len(), "enumerated targets");
}

/// Text used for unnumbered targets: heading text or the caption.
fn title(tree: &Tree, id: NodeId) -> Option<String> {
    let text = match tree.kind(id) {
        NodeKind::Heading { .. } => tree.text_content(id),
        NodeKind::Environment { .. } => {
            let caption = tree.find_child(id, |k| matches!(k, NodeKind::Caption))?;
            tree.text_content(caption)
        }
        _ => return None,
    };
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Category;
    use crate::frontmatter::Numbering;
    use crate::parser::{parse, ParseOptions};
    use pretty_assertions::assert_eq;

    fn run(input: &str, numbering: Numbering) -> (Tree, ReferenceState, Diagnostics) {
        let mut tree = parse(input, &ParseOptions::default()).unwrap().tree;
        let mut state = ReferenceState::new(numbering);
        let mut diagnostics = Diagnostics::new();
        enumerate_targets(&mut tree, &mut state, &mut diagnostics);
        (tree, state, diagnostics)
    }

    fn enumerator<'a>(state: &'a ReferenceState, label: &str) -> Option<&'a str> {
        state.get(label).and_then(|t| t.enumerator.as_deref())
    }

    #[test]
    fn test_section_numbering() {
        let input = r#"
# First {#sec:first}

## Sub One {#sec:sub1}

## Sub Two {#sec:sub2}

# Second {#sec:second}
"#;

        let (_, state, _) = run(input, Numbering::all(true));

        assert_eq!(enumerator(&state, "sec:first"), Some("1"));
        assert_eq!(enumerator(&state, "sec:sub1"), Some("1.1"));
        assert_eq!(enumerator(&state, "sec:sub2"), Some("1.2"));
        assert_eq!(enumerator(&state, "sec:second"), Some("2"));
    }

    #[test]
    fn test_environment_numbering() {
        let input = r#"
::: theorem {#thm:one}
First theorem.
:::

::: proposition {#thm:two}
Shares the theorem counter.
:::

::: lemma {#lem:one}
A lemma.
:::
"#;

        let (_, state, _) = run(input, Numbering::default());

        assert_eq!(enumerator(&state, "thm:one"), Some("1"));
        assert_eq!(enumerator(&state, "thm:two"), Some("2"));
        assert_eq!(enumerator(&state, "lem:one"), Some("1"));
    }

    #[test]
    fn test_disabled_category_still_registers() {
        let (tree, state, diagnostics) = run("# Introduction {#intro}\n", Numbering::default());
        let target = state.get("intro").unwrap();
        assert_eq!(target.enumerator, None);
        assert_eq!(state.display(target), "Introduction");
        assert!(tree[target.node].numbered.is_none());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unlabeled_nodes_consume_numbers() {
        let input = "$$\na\n$$\n\n$$\nb\n$$ {#eq:b}\n";
        let (_, state, _) = run(input, Numbering::default());
        assert_eq!(enumerator(&state, "eq:b"), Some("2"));
        assert_eq!(state.get("eq:b").unwrap().category, Category::Equation);
    }

    #[test]
    fn test_duplicate_label_keeps_first() {
        let input = r#"
::: figure {#fig:x}
![a](a.png)
:::

::: figure {#fig:x}
![b](b.png)
:::
"#;
        let (tree, state, diagnostics) = run(input, Numbering::default());

        assert_eq!(enumerator(&state, "fig:x"), Some("1"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.as_slice()[0].severity, crate::diagnostics::Severity::Warning);

        let second = diagnostics.as_slice()[0].node.unwrap();
        assert_eq!(tree[second].identifier, None);
        assert_eq!(tree[second].numbered.as_ref().map(|n| n.number), Some(2));
    }
}
