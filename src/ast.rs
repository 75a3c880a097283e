//! Abstract Syntax Tree definitions for directive-extended Markdown.
//!
//! The tree is an arena: nodes live in one `Vec` and refer to each other by
//! [`NodeId`]. Passes rewrite nodes in place; nodes detached by a rewrite stay
//! in the arena but are no longer reachable from the root, and every traversal
//! starts at the root.

use crate::diagnostics::Diagnostics;
use crate::error::StructuralError;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Stable index of a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A 1-based line/column position in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Point {
    pub line: usize,
    pub column: usize,
}

impl Point {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A source range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: Point,
    pub end: Point,
}

impl Span {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn point(at: Point) -> Self {
        Self { start: at, end: at }
    }

    /// Span covering whole lines `first..=last`.
    pub fn lines(first: usize, last: usize) -> Self {
        Self {
            start: Point::new(first, 1),
            end: Point::new(last, 1),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)?;
        if self.end != self.start {
            write!(f, "-{}:{}", self.end.line, self.end.column)?;
        }
        Ok(())
    }
}

/// Categories of enumerable targets. Each has its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Section,
    Figure,
    Table,
    Equation,
    Theorem,
    Lemma,
    Definition,
    Example,
    Algorithm,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Section,
        Category::Figure,
        Category::Table,
        Category::Equation,
        Category::Theorem,
        Category::Lemma,
        Category::Definition,
        Category::Example,
        Category::Algorithm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Section => "section",
            Category::Figure => "figure",
            Category::Table => "table",
            Category::Equation => "equation",
            Category::Theorem => "theorem",
            Category::Lemma => "lemma",
            Category::Definition => "definition",
            Category::Example => "example",
            Category::Algorithm => "algorithm",
        }
    }

    /// Look up a category by its configuration name. Accepts the short
    /// aliases the directive syntax accepts (`fig`, `eq`, `thm`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "section" | "sec" | "heading" | "headings" => Some(Category::Section),
            "figure" | "fig" => Some(Category::Figure),
            "table" | "tab" => Some(Category::Table),
            "equation" | "eq" | "math" => Some(Category::Equation),
            "theorem" | "thm" => Some(Category::Theorem),
            "lemma" | "lem" => Some(Category::Lemma),
            "definition" | "def" => Some(Category::Definition),
            "example" | "ex" => Some(Category::Example),
            "algorithm" | "algo" => Some(Category::Algorithm),
            _ => None,
        }
    }

    /// Word used when a target of this category is referenced.
    pub fn title(&self) -> &'static str {
        match self {
            Category::Section => "Section",
            Category::Figure => "Figure",
            Category::Table => "Table",
            Category::Equation => "Equation",
            Category::Theorem => "Theorem",
            Category::Lemma => "Lemma",
            Category::Definition => "Definition",
            Category::Example => "Example",
            Category::Algorithm => "Algorithm",
        }
    }

    /// Display template; `%s` is replaced by the enumerator.
    pub fn default_template(&self) -> &'static str {
        match self {
            Category::Section => "Section %s",
            Category::Figure => "Figure %s",
            Category::Table => "Table %s",
            Category::Equation => "(%s)",
            Category::Theorem => "Theorem %s",
            Category::Lemma => "Lemma %s",
            Category::Definition => "Definition %s",
            Category::Example => "Example %s",
            Category::Algorithm => "Algorithm %s",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Admonition names recognised by `:::{name}` directives.
pub const ADMONITIONS: [&str; 10] = [
    "note", "tip", "important", "warning", "caution", "attention", "danger", "error", "hint",
    "seealso",
];

/// Environment types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvironmentKind {
    Theorem,
    Lemma,
    Proposition,
    Corollary,
    Definition,
    Example,
    Remark,
    Proof,
    Figure,
    Table,
    Algorithm,
    /// Callout box (`note`, `warning`, ...)
    Admonition(String),
    /// Custom environment with user-defined name
    Custom(String),
}

impl EnvironmentKind {
    /// Parse an environment kind from a directive name.
    pub fn from_name(s: &str) -> Self {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "theorem" | "thm" => Self::Theorem,
            "lemma" | "lem" => Self::Lemma,
            "proposition" | "prop" => Self::Proposition,
            "corollary" | "cor" => Self::Corollary,
            "definition" | "def" => Self::Definition,
            "example" | "ex" => Self::Example,
            "remark" | "rem" => Self::Remark,
            "proof" | "pf" => Self::Proof,
            "figure" | "fig" => Self::Figure,
            "table" | "tab" => Self::Table,
            "algorithm" | "algo" => Self::Algorithm,
            name if ADMONITIONS.contains(&name) => Self::Admonition(name.to_string()),
            other => Self::Custom(other.to_string()),
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &str {
        match self {
            Self::Theorem => "theorem",
            Self::Lemma => "lemma",
            Self::Proposition => "proposition",
            Self::Corollary => "corollary",
            Self::Definition => "definition",
            Self::Example => "example",
            Self::Remark => "remark",
            Self::Proof => "proof",
            Self::Figure => "figure",
            Self::Table => "table",
            Self::Algorithm => "algorithm",
            Self::Admonition(name) | Self::Custom(name) => name,
        }
    }

    /// Get the display name for this environment.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Theorem => "Theorem",
            Self::Lemma => "Lemma",
            Self::Proposition => "Proposition",
            Self::Corollary => "Corollary",
            Self::Definition => "Definition",
            Self::Example => "Example",
            Self::Remark => "Remark",
            Self::Proof => "Proof",
            Self::Figure => "Figure",
            Self::Table => "Table",
            Self::Algorithm => "Algorithm",
            Self::Admonition(name) => match name.as_str() {
                "note" => "Note",
                "tip" => "Tip",
                "important" => "Important",
                "warning" => "Warning",
                "caution" => "Caution",
                "attention" => "Attention",
                "danger" => "Danger",
                "error" => "Error",
                "hint" => "Hint",
                "seealso" => "See Also",
                other => other,
            },
            Self::Custom(name) => name,
        }
    }

    /// Counter shared by this environment, if it is enumerable.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Theorem | Self::Proposition | Self::Corollary => Some(Category::Theorem),
            Self::Lemma => Some(Category::Lemma),
            Self::Definition => Some(Category::Definition),
            Self::Example | Self::Remark => Some(Category::Example),
            Self::Figure => Some(Category::Figure),
            Self::Table => Some(Category::Table),
            Self::Algorithm => Some(Category::Algorithm),
            Self::Proof | Self::Admonition(_) | Self::Custom(_) => None,
        }
    }

    /// Theorem-like statements (rendered with a bold heading and italic body).
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::Theorem
                | Self::Lemma
                | Self::Proposition
                | Self::Corollary
                | Self::Definition
                | Self::Example
                | Self::Remark
                | Self::Proof
        )
    }

    pub fn is_admonition(&self) -> bool {
        matches!(self, Self::Admonition(_))
    }
}

impl Serialize for EnvironmentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Table column alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Number attached to an enumerated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Numbered {
    pub category: Category,
    /// Running ordinal within the category, starting at 1.
    pub number: u32,
    /// Printed form. Equal to `number` except for sections (`2.1`).
    pub enumerator: String,
}

/// What a resolved cross-reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub label: String,
    pub category: Category,
    pub enumerator: Option<String>,
    /// Human-readable text, e.g. `Figure 3`.
    pub display: String,
    /// Fragment identifier of the target in HTML/JATS output.
    pub anchor: String,
}

/// Resolution state of a cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RefStatus {
    #[default]
    Pending,
    Resolved(ResolvedTarget),
    Missing,
}

impl RefStatus {
    pub fn target(&self) -> Option<&ResolvedTarget> {
        match self {
            RefStatus::Resolved(target) => Some(target),
            _ => None,
        }
    }
}

/// Node kinds. Kind-specific fields live in the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Root,

    // Blocks
    Paragraph,
    Heading {
        depth: u8,
    },
    ThematicBreak,
    BlockQuote,
    List {
        ordered: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        start: Option<u32>,
    },
    ListItem {
        #[serde(skip_serializing_if = "Option::is_none")]
        checked: Option<bool>,
    },
    Code {
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        value: String,
    },
    /// Display math
    Math {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expanded: Option<String>,
    },
    Environment {
        kind: EnvironmentKind,
    },
    Caption,
    Table {
        alignments: Vec<Alignment>,
    },
    TableRow {
        header: bool,
    },
    TableCell,
    FootnoteDefinition {
        identifier: String,
    },
    Html {
        value: String,
    },

    // Inlines
    Text {
        value: String,
    },
    Emphasis,
    Strong,
    Delete,
    InlineCode {
        value: String,
    },
    InlineMath {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expanded: Option<String>,
    },
    Break,
    Link {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Set by the transformer that produced the link (`wiki`, `doi`, ...).
        #[serde(skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
        /// Citation key contributed by the link, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        citation: Option<String>,
    },
    Image {
        url: String,
        alt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    CrossReference {
        target: String,
        status: RefStatus,
    },
    FootnoteReference {
        identifier: String,
        resolved: bool,
    },
    Citation {
        keys: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        locator: Option<String>,
        resolved: bool,
    },
}

impl NodeKind {
    pub fn text(value: impl Into<String>) -> Self {
        NodeKind::Text {
            value: value.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::ThematicBreak => "thematicBreak",
            NodeKind::BlockQuote => "blockquote",
            NodeKind::List { .. } => "list",
            NodeKind::ListItem { .. } => "listItem",
            NodeKind::Code { .. } => "code",
            NodeKind::Math { .. } => "math",
            NodeKind::Environment { .. } => "environment",
            NodeKind::Caption => "caption",
            NodeKind::Table { .. } => "table",
            NodeKind::TableRow { .. } => "tableRow",
            NodeKind::TableCell => "tableCell",
            NodeKind::FootnoteDefinition { .. } => "footnoteDefinition",
            NodeKind::Html { .. } => "html",
            NodeKind::Text { .. } => "text",
            NodeKind::Emphasis => "emphasis",
            NodeKind::Strong => "strong",
            NodeKind::Delete => "delete",
            NodeKind::InlineCode { .. } => "inlineCode",
            NodeKind::InlineMath { .. } => "inlineMath",
            NodeKind::Break => "break",
            NodeKind::Link { .. } => "link",
            NodeKind::Image { .. } => "image",
            NodeKind::CrossReference { .. } => "crossReference",
            NodeKind::FootnoteReference { .. } => "footnoteReference",
            NodeKind::Citation { .. } => "citation",
        }
    }

    /// Kinds that never have children.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::ThematicBreak
                | NodeKind::Code { .. }
                | NodeKind::Math { .. }
                | NodeKind::Html { .. }
                | NodeKind::Text { .. }
                | NodeKind::InlineCode { .. }
                | NodeKind::InlineMath { .. }
                | NodeKind::Break
                | NodeKind::Image { .. }
                | NodeKind::FootnoteReference { .. }
                | NodeKind::Citation { .. }
        )
    }

    /// The counter this node draws from, if it is enumerable.
    pub fn category(&self) -> Option<Category> {
        match self {
            NodeKind::Heading { .. } => Some(Category::Section),
            NodeKind::Math { .. } => Some(Category::Equation),
            NodeKind::Environment { kind } => kind.category(),
            _ => None,
        }
    }

    /// Math source after macro expansion, falling back to the raw value.
    pub fn math_source(&self) -> Option<&str> {
        match self {
            NodeKind::Math { value, expanded } | NodeKind::InlineMath { value, expanded } => {
                Some(expanded.as_deref().unwrap_or(value))
            }
            _ => None,
        }
    }
}

/// A node in the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub position: Option<Span>,
    /// Label used as a cross-reference target.
    pub identifier: Option<String>,
    /// Set by the enumeration pass.
    pub numbered: Option<Numbered>,
}

impl Node {
    fn new(kind: NodeKind, position: Option<Span>) -> Self {
        Self {
            kind,
            children: Vec::new(),
            parent: None,
            position,
            identifier: None,
            numbered: None,
        }
    }
}

/// Arena tree with a single root.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root, None)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self[id].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self[id].parent
    }

    /// Number of nodes in the arena, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Allocate a detached node.
    pub fn alloc(&mut self, kind: NodeKind, position: Option<Span>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, position));
        id
    }

    /// Attach `child` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self[child].parent = Some(parent);
        self[parent].children.push(child);
    }

    /// Allocate a node and append it to `parent`.
    pub fn push(&mut self, parent: NodeId, kind: NodeKind, position: Option<Span>) -> NodeId {
        let id = self.alloc(kind, position);
        self.append(parent, id);
        id
    }

    /// Replace `old` in its parent's child list with `replacement`.
    /// `old` is detached. Returns false if `old` has no parent.
    pub fn replace_child(&mut self, old: NodeId, replacement: &[NodeId]) -> bool {
        let Some(parent) = self[old].parent else {
            return false;
        };
        let Some(index) = self[parent].children.iter().position(|&c| c == old) else {
            return false;
        };
        for &id in replacement {
            self[id].parent = Some(parent);
        }
        self[parent]
            .children
            .splice(index..=index, replacement.iter().copied());
        self[old].parent = None;
        true
    }

    /// Detach and return the last child of `parent`.
    pub fn pop_child(&mut self, parent: NodeId) -> Option<NodeId> {
        let child = self[parent].children.pop()?;
        self[child].parent = None;
        Some(child)
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self[id].parent, move |&p| self[p].parent)
    }

    /// Pre-order (document order) traversal starting at `from`.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self[id].children.iter().rev());
        }
        out
    }

    /// Pre-order traversal from the root that validates every node. A node
    /// that breaks the tree contract is reported and its subtree skipped.
    pub fn walk(&self, diagnostics: &mut Diagnostics) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Err(err) = self.validate_node(id) {
                diagnostics.structural(id, self[id].position, &err);
                continue;
            }
            out.push(id);
            stack.extend(self[id].children.iter().rev());
        }
        out
    }

    /// Check a single node against the tree contract.
    pub fn validate_node(&self, id: NodeId) -> Result<(), StructuralError> {
        let node = &self[id];
        let kind = node.kind.name();
        if let NodeKind::Heading { depth } = node.kind {
            if !(1..=6).contains(&depth) {
                return Err(StructuralError::InvalidHeadingDepth { depth });
            }
        }
        if node.kind.is_leaf() && !node.children.is_empty() {
            return Err(StructuralError::UnexpectedChildren { kind });
        }
        let parent = node.parent.map(|p| &self[p].kind);
        let required_parent = match node.kind {
            NodeKind::TableRow { .. } => Some(matches!(parent, Some(NodeKind::Table { .. }))),
            NodeKind::TableCell => Some(matches!(parent, Some(NodeKind::TableRow { .. }))),
            NodeKind::ListItem { .. } => Some(matches!(parent, Some(NodeKind::List { .. }))),
            NodeKind::Caption => Some(matches!(parent, Some(NodeKind::Environment { .. }))),
            _ => None,
        };
        if required_parent == Some(false) {
            return Err(StructuralError::MisplacedNode {
                kind,
                parent: parent.map(NodeKind::name).unwrap_or("nothing"),
            });
        }
        let empty = match &node.kind {
            NodeKind::CrossReference { target, .. } => target.trim().is_empty(),
            NodeKind::FootnoteReference { identifier, .. }
            | NodeKind::FootnoteDefinition { identifier } => identifier.trim().is_empty(),
            NodeKind::Citation { keys, .. } => keys.is_empty() || keys.iter().any(|k| k.is_empty()),
            _ => false,
        };
        if empty || node.identifier.as_deref().is_some_and(str::is_empty) {
            return Err(StructuralError::EmptyIdentifier { kind });
        }
        Ok(())
    }

    /// Plain text of a subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.preorder(id) {
            match &self[node].kind {
                NodeKind::Text { value } | NodeKind::InlineCode { value } => out.push_str(value),
                NodeKind::InlineMath { value, .. } => out.push_str(value),
                NodeKind::Break => out.push(' '),
                _ => {}
            }
        }
        out
    }

    /// First child of the given kind.
    pub fn find_child(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self[id]
            .children
            .iter()
            .copied()
            .find(|&c| pred(&self[c].kind))
    }

    /// Serialize the reachable tree to YAML with positions stripped.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&SnapshotNode {
            tree: self,
            id: self.root,
        })
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Tree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

/// Borrowed view used to serialize a subtree without positions.
struct SnapshotNode<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl Serialize for SnapshotNode<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Flat<'a> {
            #[serde(flatten)]
            kind: &'a NodeKind,
            #[serde(skip_serializing_if = "Option::is_none")]
            identifier: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            numbered: Option<&'a Numbered>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            children: Vec<SnapshotNode<'a>>,
        }

        let node = &self.tree[self.id];
        Flat {
            kind: &node.kind,
            identifier: node.identifier.as_deref(),
            numbered: node.numbered.as_ref(),
            children: node
                .children
                .iter()
                .map(|&id| SnapshotNode {
                    tree: self.tree,
                    id,
                })
                .collect(),
        }
        .serialize(serializer)
    }
}

/// A bibliography entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BibEntry {
    pub key: String,
    pub entry_type: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<String>,
    pub journal: Option<String>,
    pub booktitle: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// All other fields
    pub extra: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.root();
        let heading = tree.push(root, NodeKind::Heading { depth: 1 }, Some(Span::lines(1, 1)));
        tree.push(heading, NodeKind::text("Intro"), None);
        let para = tree.push(root, NodeKind::Paragraph, None);
        let text = tree.push(para, NodeKind::text("see [[Home]]"), None);
        (tree, heading, text)
    }

    #[test]
    fn test_preorder_is_document_order() {
        let (tree, heading, text) = sample();
        let order = tree.preorder(tree.root());
        let h = order.iter().position(|&id| id == heading).unwrap();
        let t = order.iter().position(|&id| id == text).unwrap();
        assert!(h < t);
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn test_replace_child_detaches() {
        let (mut tree, _, text) = sample();
        let para = tree.parent(text).unwrap();
        let a = tree.alloc(NodeKind::text("see "), None);
        let b = tree.alloc(NodeKind::text("Home"), None);
        assert!(tree.replace_child(text, &[a, b]));
        assert_eq!(tree.children(para), &[a, b]);
        assert_eq!(tree.parent(text), None);
        assert_eq!(tree.parent(b), Some(para));
        assert!(!tree.preorder(tree.root()).contains(&text));
    }

    #[test]
    fn test_validate_heading_depth() {
        let mut tree = Tree::new();
        let root = tree.root();
        let bad = tree.push(root, NodeKind::Heading { depth: 7 }, None);
        assert_eq!(
            tree.validate_node(bad),
            Err(StructuralError::InvalidHeadingDepth { depth: 7 })
        );
    }

    #[test]
    fn test_validate_misplaced_and_leaf() {
        let mut tree = Tree::new();
        let root = tree.root();
        let cell = tree.push(root, NodeKind::TableCell, None);
        assert!(matches!(
            tree.validate_node(cell),
            Err(StructuralError::MisplacedNode { kind: "tableCell", parent: "root" })
        ));
        let code = tree.push(
            root,
            NodeKind::Code {
                lang: None,
                value: String::new(),
            },
            None,
        );
        tree.push(code, NodeKind::text("x"), None);
        assert_eq!(
            tree.validate_node(code),
            Err(StructuralError::UnexpectedChildren { kind: "code" })
        );
    }

    #[test]
    fn test_walk_skips_invalid_subtree() {
        let mut tree = Tree::new();
        let root = tree.root();
        let bad = tree.push(root, NodeKind::Heading { depth: 0 }, None);
        let inner = tree.push(bad, NodeKind::text("hidden"), None);
        let ok = tree.push(root, NodeKind::Paragraph, None);
        let mut diagnostics = Diagnostics::new();
        let visited = tree.walk(&mut diagnostics);
        assert!(!visited.contains(&inner));
        assert!(visited.contains(&ok));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_yaml_snapshot_strips_positions() {
        let (tree, _, _) = sample();
        let yaml = tree.to_yaml().unwrap();
        assert!(yaml.contains("type: heading"));
        assert!(yaml.contains("depth: 1"));
        assert!(yaml.contains("Home"));
        assert!(yaml.contains("type: root"));
        assert!(!yaml.contains("line"));
    }

    #[test]
    fn test_environment_categories() {
        assert_eq!(EnvironmentKind::from_name("Prop").category(), Some(Category::Theorem));
        assert_eq!(EnvironmentKind::from_name("remark").category(), Some(Category::Example));
        assert_eq!(EnvironmentKind::from_name("proof").category(), None);
        let note = EnvironmentKind::from_name("seealso");
        assert!(note.is_admonition());
        assert_eq!(note.display_name(), "See Also");
        assert_eq!(EnvironmentKind::from_name("sidebar"), EnvironmentKind::Custom("sidebar".into()));
    }
}
