//! Cross-reference resolution.

use super::state::ReferenceState;
use crate::ast::{NodeKind, RefStatus, ResolvedTarget, Tree};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};

/// Resolve every pending cross-reference against the label registry.
///
/// References that are already resolved or missing are left alone, so
/// running this twice changes nothing and reports nothing new.
pub fn resolve_references(tree: &mut Tree, state: &ReferenceState, diagnostics: &mut Diagnostics) -> usize {
    let mut resolved = 0usize;
    let mut missing = 0usize;

    for id in tree.walk(diagnostics) {
        let NodeKind::CrossReference {
            target,
            status: RefStatus::Pending,
        } = tree.kind(id)
        else {
            continue;
        };
        let label = target.clone();

        let status = match state.get(&label) {
            Some(found) => {
                let text = state.display(found);
                // Custom link text may carry the number: `Fig. %s <fig:a>`
                let fill = found.enumerator.clone().unwrap_or_else(|| text.clone());
                for child in tree.preorder(id).into_iter().skip(1) {
                    if let NodeKind::Text { value } = &mut tree[child].kind {
                        if value.contains("%s") {
                            *value = value.replace("%s", &fill);
                        }
                    }
                }
                tracing::trace!(%label, %text, "resolved reference");
                resolved += 1;
                RefStatus::Resolved(ResolvedTarget {
                    label: label.clone(),
                    category: found.category,
                    enumerator: found.enumerator.clone(),
                    display: text,
                    anchor: found.anchor.clone(),
                })
            }
            None => {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Reference,
                        format!("cross-reference target `{}` not found", label),
                    )
                    .at(tree[id].position)
                    .on(id),
                );
                missing += 1;
                RefStatus::Missing
            }
        };

        if let NodeKind::CrossReference { status: slot, .. } = &mut tree[id].kind {
            *slot = status;
        }
    }

    tracing::debug!(resolved, missing, "resolved cross-references");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::Numbering;
    use crate::parser::{parse, ParseOptions};
    use crate::resolve::enumerate::enumerate_targets;
    use pretty_assertions::assert_eq;

    fn prepare(input: &str) -> (Tree, ReferenceState) {
        let mut tree = parse(input, &ParseOptions::default()).unwrap().tree;
        let mut state = ReferenceState::new(Numbering::default());
        enumerate_targets(&mut tree, &mut state, &mut Diagnostics::new());
        (tree, state)
    }

    fn statuses(tree: &Tree) -> Vec<RefStatus> {
        tree.preorder(tree.root())
            .into_iter()
            .filter_map(|id| match tree.kind(id) {
                NodeKind::CrossReference { status, .. } => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_resolved_and_missing() {
        let (mut tree, state) = prepare("::: figure {#fig:a}\n![x](x.png)\n:::\n\nSee @fig:a and @fig:b.");
        let mut diagnostics = Diagnostics::new();
        assert_eq!(resolve_references(&mut tree, &state, &mut diagnostics), 1);

        let statuses = statuses(&tree);
        assert_eq!(statuses.len(), 2);
        let target = statuses[0].target().unwrap();
        assert_eq!(target.display, "Figure 1");
        assert_eq!(target.anchor, "fig-a");
        assert_eq!(statuses[1], RefStatus::Missing);
        assert_eq!(diagnostics.errors().count(), 1);
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let (mut tree, state) = prepare("See @nowhere.");
        let mut diagnostics = Diagnostics::new();
        resolve_references(&mut tree, &state, &mut diagnostics);
        let before = tree.clone();

        let mut again = Diagnostics::new();
        assert_eq!(resolve_references(&mut tree, &state, &mut again), 0);
        assert_eq!(tree, before);
        assert!(again.is_empty());
    }

    #[test]
    fn test_custom_text_gets_enumerator() {
        let (mut tree, state) =
            prepare("$$\nx\n$$ {#eq:x}\n\nSee {numref}`Eq. %s <eq:x>`.");
        resolve_references(&mut tree, &state, &mut Diagnostics::new());

        let xref = tree
            .preorder(tree.root())
            .into_iter()
            .find(|&id| matches!(tree.kind(id), NodeKind::CrossReference { .. }))
            .unwrap();
        assert_eq!(tree.text_content(xref), "Eq. 1");
    }
}
