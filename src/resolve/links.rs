//! Shorthand link syntax rewritten into link nodes.
//!
//! A [`LinkTransformer`] finds the first match of its syntax in a string of
//! text. [`LinkTransformers`] holds them in priority order and splices the
//! matches of all of them into the tree.

use crate::ast::{NodeId, NodeKind, Tree};
use crate::diagnostics::Diagnostics;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;
use std::ops::Range;

/// The link a match turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub url: String,
    /// Visible text of the link.
    pub text: String,
    pub title: Option<String>,
    /// Citation key the link contributes (DOIs).
    pub citation: Option<String>,
}

/// A match in a text value: byte range plus the link it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub range: Range<usize>,
    pub target: LinkTarget,
}

/// Recognizes one shorthand link syntax.
pub trait LinkTransformer: Send + Sync {
    /// Protocol recorded on the link nodes this transformer produces.
    fn protocol(&self) -> &str;

    /// First match in `text`, if any.
    fn find(&self, text: &str) -> Option<LinkMatch>;
}

type BuildFn = dyn Fn(&Captures<'_>) -> Option<LinkTarget> + Send + Sync;

/// A transformer defined by a regex and a closure over its captures.
/// Matches for which the closure returns `None` are skipped.
pub struct RegexTransformer {
    protocol: String,
    regex: Regex,
    build: Box<BuildFn>,
}

impl RegexTransformer {
    pub fn new(
        protocol: impl Into<String>,
        regex: Regex,
        build: impl Fn(&Captures<'_>) -> Option<LinkTarget> + Send + Sync + 'static,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            regex,
            build: Box::new(build),
        }
    }
}

impl LinkTransformer for RegexTransformer {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn find(&self, text: &str) -> Option<LinkMatch> {
        self.regex.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            (self.build)(&caps).map(|target| LinkMatch {
                range: whole.range(),
                target,
            })
        })
    }
}

impl fmt::Debug for RegexTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexTransformer")
            .field("protocol", &self.protocol)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

static WIKI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[([^\[\]|]+)(?:\|([^\[\]]+))?\]\]").expect("valid wiki link regex")
});

static ISSUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z0-9][A-Za-z0-9-]*)/([A-Za-z0-9_.-]+)#([0-9]+)\b")
        .expect("valid issue link regex")
});

static DOI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdoi:\s*(10\.[0-9]{4,9}/[^\s<>\[\]]+)").expect("valid DOI regex")
});

static RRID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bRRID:\s*([A-Za-z]+_[A-Za-z0-9_:-]+)").expect("valid RRID regex")
});

/// `[[Page]]` and `[[Page|text]]`.
#[derive(Debug, Clone)]
pub struct WikiLinks {
    pub base_url: String,
}

impl Default for WikiLinks {
    fn default() -> Self {
        Self {
            base_url: "https://en.wikipedia.org/wiki/".to_string(),
        }
    }
}

impl LinkTransformer for WikiLinks {
    fn protocol(&self) -> &str {
        "wiki"
    }

    fn find(&self, text: &str) -> Option<LinkMatch> {
        let caps = WIKI.captures(text)?;
        let page = caps[1].trim();
        let label = caps.get(2).map_or(page, |m| m.as_str().trim());
        Some(LinkMatch {
            range: caps.get(0)?.range(),
            target: LinkTarget {
                url: format!("{}{}", self.base_url, page.replace(' ', "_")),
                text: label.to_string(),
                title: Some(page.to_string()),
                citation: None,
            },
        })
    }
}

/// `org/repo#123` issue references.
#[derive(Debug, Clone)]
pub struct IssueLinks {
    pub host: String,
}

impl Default for IssueLinks {
    fn default() -> Self {
        Self {
            host: "https://github.com".to_string(),
        }
    }
}

impl LinkTransformer for IssueLinks {
    fn protocol(&self) -> &str {
        "github"
    }

    fn find(&self, text: &str) -> Option<LinkMatch> {
        for caps in ISSUE.captures_iter(text) {
            let whole = caps.get(0)?;
            // Part of a URL or path, not a bare reference
            if text[..whole.start()].ends_with(['/', '.', '@']) {
                continue;
            }
            return Some(LinkMatch {
                range: whole.range(),
                target: LinkTarget {
                    url: format!("{}/{}/{}/issues/{}", self.host, &caps[1], &caps[2], &caps[3]),
                    text: whole.as_str().to_string(),
                    title: None,
                    citation: None,
                },
            });
        }
        None
    }
}

/// `doi:10.xxxx/yyy`. Also contributes a citation keyed by the DOI.
#[derive(Debug, Clone, Default)]
pub struct DoiLinks;

impl LinkTransformer for DoiLinks {
    fn protocol(&self) -> &str {
        "doi"
    }

    fn find(&self, text: &str) -> Option<LinkMatch> {
        let caps = DOI.captures(text)?;
        let whole = caps.get(0)?;
        // Sentence punctuation after a DOI is not part of it
        let doi = caps[1].trim_end_matches(['.', ',', ';', ':', ')']);
        let end = caps.get(1)?.start() + doi.len();
        Some(LinkMatch {
            range: whole.start()..end,
            target: LinkTarget {
                url: format!("https://doi.org/{}", doi),
                text: doi.to_string(),
                title: None,
                citation: Some(doi.to_string()),
            },
        })
    }
}

/// `RRID:AB_123456` research resource identifiers.
#[derive(Debug, Clone, Default)]
pub struct RridLinks;

impl LinkTransformer for RridLinks {
    fn protocol(&self) -> &str {
        "rrid"
    }

    fn find(&self, text: &str) -> Option<LinkMatch> {
        let caps = RRID.captures(text)?;
        let id = &caps[1];
        Some(LinkMatch {
            range: caps.get(0)?.range(),
            target: LinkTarget {
                url: format!("https://scicrunch.org/resolver/RRID:{}", id),
                text: format!("RRID:{}", id),
                title: None,
                citation: None,
            },
        })
    }
}

/// Ordered transformer registry. Earlier registrations win ties.
pub struct LinkTransformers {
    transformers: Vec<Box<dyn LinkTransformer>>,
}

impl Default for LinkTransformers {
    /// Wiki links, issue references, DOIs and RRIDs, in that order.
    fn default() -> Self {
        Self::empty()
            .with(WikiLinks::default())
            .with(IssueLinks::default())
            .with(DoiLinks)
            .with(RridLinks)
    }
}

impl fmt::Debug for LinkTransformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.transformers.iter().map(|t| t.protocol()))
            .finish()
    }
}

impl LinkTransformers {
    pub fn empty() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    pub fn with(mut self, transformer: impl LinkTransformer + 'static) -> Self {
        self.register(transformer);
        self
    }

    pub fn register(&mut self, transformer: impl LinkTransformer + 'static) {
        self.transformers.push(Box::new(transformer));
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Split `text` into plain runs and link matches, left to right. At each
    /// position the earliest match wins; ties go to the first registered
    /// transformer. Matches never overlap.
    pub fn segments<'t>(&self, text: &'t str) -> Vec<Segment<'t>> {
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let best = self
                .transformers
                .iter()
                .filter_map(|t| {
                    t.find(rest)
                        .filter(|m| !m.range.is_empty())
                        .map(|m| (m, t.protocol()))
                })
                // min_by_key keeps the first of equal keys
                .min_by_key(|(m, _)| m.range.start);

            let Some((found, protocol)) = best else {
                break;
            };
            if found.range.start > 0 {
                segments.push(Segment::Text(&rest[..found.range.start]));
            }
            segments.push(Segment::Link {
                protocol: protocol.to_string(),
                target: found.target,
            });
            pos += found.range.end;
        }

        if pos < text.len() {
            segments.push(Segment::Text(&text[pos..]));
        }
        segments
    }

    /// Rewrite matching text nodes into link nodes. Text inside links,
    /// cross-references, images, code and math is left alone.
    pub fn apply(&self, tree: &mut Tree, diagnostics: &mut Diagnostics) -> usize {
        if self.transformers.is_empty() {
            return 0;
        }

        let candidates: Vec<NodeId> = tree
            .walk(diagnostics)
            .into_iter()
            .filter(|&id| matches!(tree.kind(id), NodeKind::Text { .. }))
            .filter(|&id| {
                !tree.ancestors(id).any(|a| {
                    matches!(
                        tree.kind(a),
                        NodeKind::Link { .. }
                            | NodeKind::CrossReference { .. }
                            | NodeKind::Image { .. }
                            | NodeKind::Code { .. }
                            | NodeKind::InlineCode { .. }
                            | NodeKind::Math { .. }
                            | NodeKind::InlineMath { .. }
                    )
                })
            })
            .collect();

        let mut links = 0;
        for id in candidates {
            let NodeKind::Text { value } = tree.kind(id) else {
                continue;
            };
            let value = value.clone();
            let segments = self.segments(&value);
            if !segments.iter().any(|s| matches!(s, Segment::Link { .. })) {
                continue;
            }

            let position = tree[id].position;
            let mut replacement = Vec::with_capacity(segments.len());
            for segment in segments {
                match segment {
                    Segment::Text(text) => {
                        replacement.push(tree.alloc(NodeKind::text(text), position));
                    }
                    Segment::Link { protocol, target } => {
                        tracing::trace!(%protocol, url = %target.url, "link transformed");
                        let link = tree.alloc(
                            NodeKind::Link {
                                url: target.url,
                                title: target.title,
                                protocol: Some(protocol),
                                citation: target.citation,
                            },
                            position,
                        );
                        tree.push(link, NodeKind::text(target.text), position);
                        replacement.push(link);
                        links += 1;
                    }
                }
            }
            tree.replace_child(id, &replacement);
        }

        tracing::debug!(links, "transformed links");
        links
    }
}

/// Piece of a text value after matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'t> {
    Text(&'t str),
    Link { protocol: String, target: LinkTarget },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn link_urls(segments: &[Segment<'_>]) -> Vec<String> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Link { target, .. } => Some(target.url.clone()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_wiki_link() {
        let m = WikiLinks::default().find("see [[Markdown|the page]] now").unwrap();
        assert_eq!(m.range, 4..25);
        assert_eq!(m.target.url, "https://en.wikipedia.org/wiki/Markdown");
        assert_eq!(m.target.text, "the page");
    }

    #[test]
    fn test_issue_link() {
        let m = IssueLinks::default().find("fixed in rust-lang/rust#123.").unwrap();
        assert_eq!(m.target.url, "https://github.com/rust-lang/rust/issues/123");
        assert_eq!(m.target.text, "rust-lang/rust#123");
    }

    #[test]
    fn test_doi_link_trims_punctuation() {
        let m = DoiLinks.find("See doi:10.1000/xyz123.").unwrap();
        assert_eq!(m.target.url, "https://doi.org/10.1000/xyz123");
        assert_eq!(m.target.citation.as_deref(), Some("10.1000/xyz123"));
        assert_eq!(m.range, 4..22);
    }

    #[test]
    fn test_rrid_link() {
        let m = RridLinks.find("antibody (RRID:AB_2298772)").unwrap();
        assert_eq!(m.target.url, "https://scicrunch.org/resolver/RRID:AB_2298772");
    }

    #[test]
    fn test_earliest_match_wins() {
        let registry = LinkTransformers::default();
        let segments = registry.segments("RRID:AB_1 then [[Page]] then doi:10.1234/abc");
        assert_eq!(
            link_urls(&segments),
            vec![
                "https://scicrunch.org/resolver/RRID:AB_1",
                "https://en.wikipedia.org/wiki/Page",
                "https://doi.org/10.1234/abc",
            ]
        );
        assert_eq!(segments[1], Segment::Text(" then "));
    }

    #[test]
    fn test_ties_go_to_first_registered() {
        let shout = RegexTransformer::new("shout", Regex::new(r"\[\[(\w+)\]\]").unwrap(), |caps| {
            Some(LinkTarget {
                url: format!("/shout/{}", &caps[1]),
                text: caps[1].to_uppercase(),
                title: None,
                citation: None,
            })
        });
        let registry = LinkTransformers::empty().with(shout).with(WikiLinks::default());
        assert_eq!(link_urls(&registry.segments("[[page]]")), vec!["/shout/page"]);

        let registry = LinkTransformers::empty()
            .with(WikiLinks::default())
            .with(RegexTransformer::new("never", Regex::new("page").unwrap(), |_| None));
        assert_eq!(
            link_urls(&registry.segments("[[page]]")),
            vec!["https://en.wikipedia.org/wiki/page"]
        );
    }

    #[test]
    fn test_apply_skips_code_and_links() {
        let mut tree = Tree::new();
        let root = tree.root();
        let para = tree.push(root, NodeKind::Paragraph, None);
        let text = tree.push(para, NodeKind::text("a [[Home]] b"), None);
        tree.push(
            para,
            NodeKind::InlineCode {
                value: "[[Code]]".into(),
            },
            None,
        );
        let link = tree.push(
            para,
            NodeKind::Link {
                url: "https://example.com".into(),
                title: None,
                protocol: None,
                citation: None,
            },
            None,
        );
        tree.push(link, NodeKind::text("[[Inside]]"), None);

        let count = LinkTransformers::default().apply(&mut tree, &mut Diagnostics::new());
        assert_eq!(count, 1);
        assert_eq!(tree.parent(text), None);

        let children = tree.children(para).to_vec();
        assert_eq!(children.len(), 5);
        assert_eq!(tree.kind(children[0]), &NodeKind::text("a "));
        assert!(matches!(
            tree.kind(children[1]),
            NodeKind::Link { protocol: Some(p), .. } if p == "wiki"
        ));
        assert_eq!(tree.text_content(children[1]), "Home");
        assert_eq!(tree.kind(children[2]), &NodeKind::text(" b"));
    }
}
