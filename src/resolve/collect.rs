//! Footnote and citation collection in first-use order.

use crate::ast::{BibEntry, NodeId, NodeKind, Tree};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Citation keys in first-use order plus their bibliography data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitationRegistry {
    pub order: Vec<String>,
    pub data: HashMap<String, BibEntry>,
}

impl CitationRegistry {
    /// Record a use of `key`. Returns true the first time.
    pub fn cite(&mut self, key: &str) -> bool {
        if self.order.iter().any(|k| k == key) {
            return false;
        }
        self.order.push(key.to_string());
        true
    }

    /// 1-based position in first-use order.
    pub fn number(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|k| k == key).map(|i| i + 1)
    }

    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.data.get(key)
    }

    /// Cited keys that have bibliography data, in first-use order.
    pub fn entries(&self) -> impl Iterator<Item = &BibEntry> {
        self.order.iter().filter_map(move |k| self.data.get(k))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Footnotes in first-reference order and where they are defined.
///
/// `order` holds every referenced identifier, defined or not, so a missing
/// footnote still takes its number.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FootnoteRegistry {
    pub order: Vec<String>,
    pub definitions: HashMap<String, NodeId>,
}

impl FootnoteRegistry {
    /// Footnote number: position in first-reference order, from 1.
    pub fn number(&self, identifier: &str) -> Option<usize> {
        self.order.iter().position(|k| k == identifier).map(|i| i + 1)
    }

    pub fn definition(&self, identifier: &str) -> Option<NodeId> {
        self.definitions.get(identifier).copied()
    }

    /// Number of a footnote that has a definition to link to.
    pub fn linked_number(&self, identifier: &str) -> Option<usize> {
        self.definition(identifier)?;
        self.number(identifier)
    }

    /// Whether any referenced footnote has a definition.
    pub fn has_definitions(&self) -> bool {
        self.numbered().next().is_some()
    }

    /// Referenced definitions in footnote-number order.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &str, NodeId)> {
        self.order.iter().enumerate().filter_map(move |(i, id)| {
            self.definitions
                .get(id)
                .map(|&node| (i + 1, id.as_str(), node))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Build both registries and mark footnote references and citations as
/// resolved or not.
pub fn collect(
    tree: &mut Tree,
    bibliography: &HashMap<String, BibEntry>,
    doi_citations: bool,
    diagnostics: &mut Diagnostics,
) -> (CitationRegistry, FootnoteRegistry) {
    let mut citations = CitationRegistry::default();
    let mut footnotes = FootnoteRegistry::default();
    let order = tree.walk(diagnostics);

    // Definitions may follow their first reference
    for &id in &order {
        let NodeKind::FootnoteDefinition { identifier } = tree.kind(id) else {
            continue;
        };
        if footnotes.definitions.contains_key(identifier) {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::Reference,
                    format!("duplicate footnote definition `[^{}]`", identifier),
                )
                .at(tree[id].position)
                .on(id),
            );
            continue;
        }
        footnotes.definitions.insert(identifier.clone(), id);
    }

    let mut warned = HashSet::new();
    for id in order {
        let position = tree[id].position;
        match &mut tree[id].kind {
            NodeKind::FootnoteReference { identifier, resolved } => {
                *resolved = footnotes.definitions.contains_key(identifier.as_str());
                if !footnotes.order.contains(identifier) {
                    footnotes.order.push(identifier.clone());
                }
                if !*resolved {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::Reference,
                            format!("footnote `[^{}]` has no definition", identifier),
                        )
                        .at(position)
                        .on(id),
                    );
                }
            }
            NodeKind::Citation { keys, resolved, .. } => {
                let mut all_known = true;
                for key in keys.iter() {
                    citations.cite(key);
                    match bibliography.get(key) {
                        Some(entry) => {
                            citations.data.entry(key.clone()).or_insert_with(|| entry.clone());
                        }
                        None => {
                            all_known = false;
                            if warned.insert(key.clone()) {
                                diagnostics.push(
                                    Diagnostic::warning(
                                        DiagnosticKind::Reference,
                                        format!("unknown citation key `{}`", key),
                                    )
                                    .at(position)
                                    .on(id),
                                );
                            }
                        }
                    }
                }
                *resolved = all_known;
            }
            NodeKind::Link {
                url,
                citation: Some(key),
                ..
            } if doi_citations => {
                citations.cite(key);
                let entry = bibliography.get(key.as_str()).cloned().unwrap_or_else(|| BibEntry {
                    key: key.clone(),
                    entry_type: "misc".to_string(),
                    doi: Some(key.clone()),
                    url: Some(url.clone()),
                    ..BibEntry::default()
                });
                citations.data.entry(key.clone()).or_insert(entry);
            }
            _ => {}
        }
    }

    tracing::debug!(
        citations = citations.len(),
        footnotes = footnotes.len(),
        "collected citations and footnotes"
    );
    (citations, footnotes)
}
