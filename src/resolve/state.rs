//! Numbering counters and the label registry.

use crate::ast::{Category, NodeId};
use crate::frontmatter::Numbering;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A registered cross-reference target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub label: String,
    pub category: Category,
    /// Word used in references, e.g. `Proposition` for a target counted as a theorem.
    pub noun: String,
    /// Running ordinal, absent when numbering for the category is disabled.
    pub number: Option<u32>,
    pub enumerator: Option<String>,
    /// Heading text or caption, used when there is no number to show.
    pub title: Option<String>,
    pub node: NodeId,
    pub anchor: String,
}

/// Per-document numbering and label state.
///
/// Mutated only by the enumeration pass; read-only afterwards.
#[derive(Debug, Clone)]
pub struct ReferenceState {
    numbering: Numbering,
    counters: BTreeMap<Category, u32>,
    /// Section counters per heading depth (h1..h6).
    sections: [u32; 6],
    targets: HashMap<String, Target>,
    order: Vec<String>,
    /// Anchors handed out so far; distinct labels may sanitize alike.
    anchors: HashSet<String>,
}

impl ReferenceState {
    pub fn new(numbering: Numbering) -> Self {
        Self {
            numbering,
            counters: BTreeMap::new(),
            sections: [0; 6],
            targets: HashMap::new(),
            order: Vec::new(),
            anchors: HashSet::new(),
        }
    }

    pub fn numbering(&self) -> &Numbering {
        &self.numbering
    }

    /// Take the next number in `category`. `depth` is the heading depth
    /// for sections and drives the hierarchical enumerator.
    pub fn next(&mut self, category: Category, depth: Option<u8>) -> (u32, String) {
        let counter = self.counters.entry(category).or_insert(0);
        *counter += 1;
        let number = *counter;

        let enumerator = match (category, depth) {
            (Category::Section, Some(depth)) => self.next_section(depth),
            _ => number.to_string(),
        };
        tracing::trace!(category = %category, number, %enumerator, "assigned number");
        (number, enumerator)
    }

    fn next_section(&mut self, depth: u8) -> String {
        let idx = (depth as usize).saturating_sub(1).min(5);

        self.sections[idx] += 1;
        for counter in &mut self.sections[idx + 1..] {
            *counter = 0;
        }

        // Skip unused outer levels so a document that starts at `##` reads 1, 2, ...
        let first = self.sections[..=idx]
            .iter()
            .position(|&n| n != 0)
            .unwrap_or(idx);
        self.sections[first..=idx]
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Register a target. The first registration of a label wins; a later
    /// one is refused and the existing target returned.
    ///
    /// An anchor already issued to another label gets a numeric suffix, so
    /// `fig:a` and `fig-a` end up as `fig-a` and `fig-a-2`.
    pub fn register(&mut self, mut target: Target) -> Result<(), &Target> {
        if self.targets.contains_key(&target.label) {
            return Err(&self.targets[&target.label]);
        }
        if self.anchors.contains(&target.anchor) {
            let base = std::mem::take(&mut target.anchor);
            let mut n = 2;
            while self.anchors.contains(&format!("{}-{}", base, n)) {
                n += 1;
            }
            target.anchor = format!("{}-{}", base, n);
            tracing::trace!(label = %target.label, anchor = %target.anchor, "renamed colliding anchor");
        }
        self.anchors.insert(target.anchor.clone());
        self.order.push(target.label.clone());
        self.targets.insert(target.label.clone(), target);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Target> {
        self.targets.get(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.targets.contains_key(label)
    }

    /// Targets in registration (document) order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.order.iter().map(move |label| &self.targets[label])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Human-readable text for a target: the category template applied to
    /// the enumerator, or the title when the target is unnumbered.
    pub fn display(&self, target: &Target) -> String {
        match &target.enumerator {
            Some(enumerator) => self.format(target.category, &target.noun, enumerator),
            None => target
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| target.label.clone()),
        }
    }

    /// Apply the category template to an enumerator. Default templates name
    /// the target by `noun`, so a proposition reads `Proposition 2`.
    pub fn format(&self, category: Category, noun: &str, enumerator: &str) -> String {
        let template = self.numbering.template(category);
        let template = if template == category.default_template() {
            template.replacen(category.title(), noun, 1)
        } else {
            template.to_string()
        };
        template.replace("%s", enumerator)
    }
}

/// Convert a label to a valid HTML id / XML NCName fragment.
pub fn anchor(label: &str) -> String {
    let id: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if id.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        format!("id-{}", id)
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(label: &str, category: Category, enumerator: Option<&str>) -> Target {
        Target {
            label: label.into(),
            category,
            noun: category.title().into(),
            number: enumerator.map(|_| 1),
            enumerator: enumerator.map(String::from),
            title: Some("Introduction".into()),
            node: NodeId(1),
            anchor: anchor(label),
        }
    }

    #[test]
    fn test_colliding_anchors_are_made_unique() {
        let mut state = ReferenceState::new(Numbering::all(true));
        state.register(target("fig:a", Category::Figure, Some("1"))).unwrap();
        state.register(target("fig-a", Category::Figure, Some("2"))).unwrap();
        state.register(target("fig.a", Category::Figure, Some("3"))).unwrap();

        assert_eq!(state.get("fig:a").unwrap().anchor, "fig-a");
        assert_eq!(state.get("fig-a").unwrap().anchor, "fig-a-2");
        assert_eq!(state.get("fig.a").unwrap().anchor, "fig-a-3");
    }

    #[test]
    fn test_section_enumerators() {
        let mut state = ReferenceState::new(Numbering::all(true));
        let got: Vec<String> = [1, 2, 2, 1, 2, 3]
            .into_iter()
            .map(|d| state.next(Category::Section, Some(d)).1)
            .collect();
        assert_eq!(got, vec!["1", "1.1", "1.2", "2", "2.1", "2.1.1"]);
    }

    #[test]
    fn test_sections_starting_below_top_level() {
        let mut state = ReferenceState::new(Numbering::all(true));
        assert_eq!(state.next(Category::Section, Some(2)).1, "1");
        assert_eq!(state.next(Category::Section, Some(2)).1, "2");
        assert_eq!(state.next(Category::Section, Some(3)).1, "2.1");
    }

    #[test]
    fn test_counters_are_per_category() {
        let mut state = ReferenceState::new(Numbering::default());
        assert_eq!(state.next(Category::Figure, None), (1, "1".into()));
        assert_eq!(state.next(Category::Table, None), (1, "1".into()));
        assert_eq!(state.next(Category::Figure, None), (2, "2".into()));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut state = ReferenceState::new(Numbering::default());
        assert!(state.register(target("fig:a", Category::Figure, Some("1"))).is_ok());
        let existing = state
            .register(target("fig:a", Category::Figure, Some("2")))
            .unwrap_err();
        assert_eq!(existing.enumerator.as_deref(), Some("1"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_display() {
        let mut numbering = Numbering::default();
        numbering.set_template(Category::Figure, "Fig. %s");
        let state = ReferenceState::new(numbering);

        assert_eq!(state.display(&target("f", Category::Figure, Some("3"))), "Fig. 3");
        assert_eq!(state.display(&target("e", Category::Equation, Some("2"))), "(2)");
        assert_eq!(state.display(&target("s", Category::Section, None)), "Introduction");

        let mut prop = target("p", Category::Theorem, Some("2"));
        prop.noun = "Proposition".into();
        assert_eq!(state.display(&prop), "Proposition 2");
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("fig:results"), "fig-results");
        assert_eq!(anchor("1st"), "id-1st");
    }
}
