//! End-to-end tests: parse, resolve and render whole documents.

use docweave::ast::{BibEntry, Category, NodeKind, RefStatus, Tree};
use docweave::bibtex::parse_bibtex;
use docweave::resolve::resolve_references;
use docweave::{
    parse, process, render_all, validate, DiagnosticKind, Diagnostics, ParseOptions, PipelineOptions,
    ProcessOptions, Processed, RenderOptions, Renderer, Severity, ValidateOptions,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const REFS: &str = r#"
@book{knuth1984,
  author = {Donald E. Knuth},
  title = {The {\TeX}book},
  publisher = {Addison-Wesley},
  year = 1984
}

@article{lamport1994,
  author = {Leslie Lamport and Richard Palais},
  title = {LaTeX: A Document Preparation System},
  journal = {Computing},
  volume = 2,
  year = {1994}
}
"#;

fn processed(input: &str) -> Processed {
    process(input, &ProcessOptions::default()).unwrap()
}

fn with_bibliography(input: &str) -> Processed {
    let options = ProcessOptions {
        pipeline: PipelineOptions {
            bibliography: parse_bibtex(REFS).unwrap(),
            ..PipelineOptions::default()
        },
        ..ProcessOptions::default()
    };
    process(input, &options).unwrap()
}

/// `(category, number)` of every numbered node in document order.
fn numbers(tree: &Tree) -> Vec<(Category, u32)> {
    tree.preorder(tree.root())
        .into_iter()
        .filter_map(|id| tree[id].numbered.as_ref())
        .map(|n| (n.category, n.number))
        .collect()
}

#[test]
fn figure_reference_end_to_end() {
    let input = "\
:::{figure} images/cat.png
:label: fig:cat
A cat on a mat.
:::

As @fig:cat shows, cats like mats.
";
    let processed = processed(input);
    let outputs = &processed.outputs;

    assert!(outputs
        .html
        .output
        .contains(r##"<a class="xref" href="#fig-cat">Figure 1</a>"##));
    assert!(outputs.html.output.contains("<strong>Figure 1:</strong>"));
    assert!(outputs.latex.output.contains("\\hyperref[fig:cat]{Figure~1}"));
    assert!(outputs.latex.output.contains("\\label{fig:cat}"));
    assert!(outputs
        .jats
        .output
        .contains(r#"<xref ref-type="fig" rid="fig-cat">Figure 1</xref>"#));
    assert!(outputs.jats.output.contains("<label>Figure 1</label>"));
    assert_eq!(processed.diagnostics().count(), 0);
}

#[test]
fn renderers_print_the_same_numbers() {
    let input = "\
$$
a = b
$$ {#eq:first}

::: theorem {#thm:main}
Everything holds.
:::

$$
c = d
$$ {#eq:second}

By @thm:main and @eq:second.
";
    let processed = processed(input);
    let outputs = &processed.outputs;

    for label in ["Theorem 1", "(2)"] {
        assert!(outputs.html.output.contains(label), "html lacks {label}");
        assert!(outputs.jats.output.contains(label), "jats lacks {label}");
    }
    assert!(outputs.latex.output.contains("\\hyperref[thm:main]{Theorem~1}"));
    assert!(outputs.latex.output.contains("\\tag{2}\\label{eq:second}"));
}

#[test]
fn numbers_follow_document_order_per_category() {
    let input = "\
$$
x
$$ {#eq:a}

:::{figure} a.png
:label: fig:a
First.
:::

$$
y
$$ {#eq:b}

:::{figure} b.png
:label: fig:b
Second.
:::
";
    let processed = processed(input);
    assert_eq!(
        numbers(&processed.tree),
        vec![
            (Category::Equation, 1),
            (Category::Figure, 1),
            (Category::Equation, 2),
            (Category::Figure, 2),
        ]
    );
}

#[test]
fn resolving_twice_changes_nothing() {
    let mut processed = processed("# Intro {#sec:intro}\n\nSee @sec:intro and @sec:missing.\n");
    let before = processed.tree.clone();

    let mut diagnostics = Diagnostics::new();
    let resolved = resolve_references(&mut processed.tree, &processed.result.state, &mut diagnostics);

    assert_eq!(resolved, 0);
    assert!(diagnostics.is_empty());
    assert_eq!(processed.tree, before);
}

#[test]
fn duplicate_labels_keep_the_first_target() {
    let input = "\
$$
a
$$ {#eq:x}

$$
b
$$ {#eq:x}

See @eq:x.
";
    let processed = processed(input);
    let target = processed.result.state.get("eq:x").unwrap();

    assert_eq!(target.number, Some(1));
    assert_eq!(processed.result.state.len(), 1);
    assert!(processed
        .result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::Reference && d.message.contains("eq:x")));
    // The duplicate still consumes its number
    assert_eq!(
        numbers(&processed.tree),
        vec![(Category::Equation, 1), (Category::Equation, 2)]
    );
}

#[test]
fn labels_that_sanitize_alike_get_distinct_anchors() {
    let input = "\
:::{figure} a.png
:label: fig:a
First.
:::

:::{figure} b.png
:label: fig-a
Second.
:::

See @fig:a and @fig-a.
";
    let processed = processed(input);
    let html = &processed.outputs.html.output;
    let jats = &processed.outputs.jats.output;

    assert_eq!(html.matches(r#"id="fig-a""#).count(), 1);
    assert_eq!(html.matches(r#"id="fig-a-2""#).count(), 1);
    assert!(html.contains(r##"<a class="xref" href="#fig-a">Figure 1</a>"##));
    assert!(html.contains(r##"<a class="xref" href="#fig-a-2">Figure 2</a>"##));
    assert_eq!(jats.matches(r#"<fig id="fig-a">"#).count(), 1);
    assert_eq!(jats.matches(r#"<fig id="fig-a-2">"#).count(), 1);
    assert!(jats.contains(r#"<xref ref-type="fig" rid="fig-a-2">Figure 2</xref>"#));
    assert_eq!(processed.diagnostics().count(), 0);
}

#[test]
fn unresolved_references_are_not_fatal() {
    let processed = processed("See @fig:nowhere and [^ghost].\n\nStill rendered.\n");

    assert_eq!(processed.result.diagnostics.count(Severity::Error), 2);
    assert!(processed.outputs.html.output.contains("??fig:nowhere"));
    assert!(processed.outputs.latex.output.contains("\\textbf{??fig:nowhere}"));
    assert!(processed.outputs.jats.output.contains("??fig:nowhere"));
    for rendered in processed.outputs.iter() {
        assert!(rendered.output.contains("Still rendered."));
        // Each renderer re-reports what it had to replace with a placeholder
        assert!(rendered
            .diagnostics
            .iter()
            .all(|d| d.format == Some(rendered.format)));
        assert!(rendered.diagnostics.len() >= 2);
    }

    let xref = processed
        .tree
        .preorder(processed.tree.root())
        .into_iter()
        .find(|&id| matches!(processed.tree.kind(id), NodeKind::CrossReference { .. }))
        .unwrap();
    assert!(matches!(
        processed.tree.kind(xref),
        NodeKind::CrossReference {
            status: RefStatus::Missing,
            ..
        }
    ));
}

#[test]
fn single_unresolved_reference_is_one_error() {
    let processed = processed("See @fig:nowhere.\n");
    assert_eq!(processed.result.diagnostics.count(Severity::Error), 1);
    assert!(processed.outputs.html.output.contains("??fig:nowhere"));
}

#[test]
fn repeated_citations_keep_first_position() {
    let processed = processed("[@b] then [@a] then [@b] then [@c].\n");
    assert_eq!(
        processed.result.citations.order,
        vec!["b".to_string(), "a".to_string(), "c".to_string()]
    );
}

#[test]
fn citation_order_follows_first_use() {
    let processed = with_bibliography(
        "First [@lamport1994].\n\nThen [@knuth1984; @lamport1994, p. 42].\n\nAgain [@knuth1984].\n",
    );
    let citations = &processed.result.citations;

    assert_eq!(citations.order, vec!["lamport1994".to_string(), "knuth1984".to_string()]);
    assert_eq!(citations.number("knuth1984"), Some(2));
    assert_eq!(processed.diagnostics().count(), 0);

    let latex = &processed.outputs.latex.output;
    let lamport = latex.find("\\bibitem{lamport1994}").unwrap();
    let knuth = latex.find("\\bibitem{knuth1984}").unwrap();
    assert!(lamport < knuth);
    assert!(latex.contains("\\cite[p. 42]{knuth1984,lamport1994}"));

    assert!(processed.outputs.html.output.contains("Lamport &amp; Palais, 1994"));
}

#[test]
fn unknown_citation_warns_once() {
    let processed = processed("[@nobody] and [@nobody].\n");
    let warnings: Vec<_> = processed
        .result
        .diagnostics
        .warnings()
        .filter(|d| d.message.contains("nobody"))
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[test]
fn parallel_rendering_matches_sequential() {
    let input = "\
# Methods {#sec:methods}

::: lemma {#lem:one}
Small claim.[^1]
:::

| a | b |
|---|---|
| 1 | 2 |

See @lem:one.

[^1]: A footnote.
";
    let parsed = parse(input, &ParseOptions::default()).unwrap();
    let (frontmatter, _) = validate(&parsed.frontmatter, &ValidateOptions::default());
    let mut tree = parsed.tree;
    let result = docweave::run(&mut tree, &frontmatter, &PipelineOptions::default());

    let options = RenderOptions::default();
    let outputs = render_all(&tree, &result, &options);

    assert_eq!(outputs.html, options.html.render(&tree, &result));
    assert_eq!(outputs.latex, options.latex.render(&tree, &result));
    assert_eq!(outputs.jats, options.jats.render(&tree, &result));
}

#[test]
fn front_matter_bibliography_paths_are_reported() {
    let processed = processed("---\ntitle: Paper\nbibliography:\n  - refs.bib\n  - more.bib\n---\n\nBody.\n");
    assert_eq!(processed.frontmatter.bibliography, vec!["refs.bib", "more.bib"]);
    assert_eq!(processed.result.frontmatter.title.as_deref(), Some("Paper"));
}

#[test]
fn citation_data_can_come_from_caller() {
    let mut bibliography = std::collections::HashMap::new();
    bibliography.insert(
        "solo".to_string(),
        BibEntry {
            key: "solo".into(),
            entry_type: "misc".into(),
            title: Some("Notes".into()),
            authors: vec!["Plato".into()],
            year: Some("2000".into()),
            ..BibEntry::default()
        },
    );
    let options = ProcessOptions {
        pipeline: PipelineOptions {
            bibliography,
            ..PipelineOptions::default()
        },
        ..ProcessOptions::default()
    };
    let processed = process("As argued [@solo].\n", &options).unwrap();
    assert!(processed.outputs.html.output.contains("Plato, 2000"));
    assert!(processed.outputs.jats.output.contains(r#"<ref id="bib-solo">"#));
}

/// Where a generated target sits in the document.
#[derive(Debug, Clone, Copy)]
enum Wrap {
    TopLevel,
    Quote,
    Theorem,
}

fn wrap_strategy() -> impl Strategy<Value = Wrap> {
    prop_oneof![Just(Wrap::TopLevel), Just(Wrap::Quote), Just(Wrap::Theorem)]
}

/// A figure (`true`) or an equation (`false`), placed according to its wrap.
fn item_strategy() -> impl Strategy<Value = (bool, Wrap)> {
    (any::<bool>(), wrap_strategy())
}

fn label(i: usize, figure: bool) -> String {
    if figure {
        format!("fig:n{i}")
    } else {
        format!("eq:n{i}")
    }
}

fn document(items: &[(bool, Wrap)]) -> String {
    let mut doc = String::new();
    for (i, &(figure, wrap)) in items.iter().enumerate() {
        let block = if figure {
            format!(":::{{figure}} f{i}.png\n:label: fig:n{i}\nCaption {i}.\n:::")
        } else {
            format!("$$\nx_{{{i}}}\n$$ {{#eq:n{i}}}")
        };
        match wrap {
            Wrap::TopLevel => doc.push_str(&block),
            Wrap::Quote => {
                let quoted: Vec<String> = block.lines().map(|l| format!("> {l}")).collect();
                doc.push_str(&quoted.join("\n"));
            }
            Wrap::Theorem => doc.push_str(&format!("::: theorem\nClaim {i}.\n\n{block}\n:::")),
        }
        doc.push_str("\n\n");
    }
    for (i, &(figure, _)) in items.iter().enumerate() {
        doc.push_str(&format!("See @{}.\n\n", label(i, figure)));
    }
    doc
}

#[test]
fn nested_targets_number_in_reading_order() {
    let items = [
        (true, Wrap::Theorem),
        (false, Wrap::TopLevel),
        (true, Wrap::Quote),
        (false, Wrap::Theorem),
        (true, Wrap::TopLevel),
    ];
    let processed = processed(&document(&items));
    assert_eq!(
        numbers(&processed.tree),
        vec![
            (Category::Theorem, 1),
            (Category::Figure, 1),
            (Category::Equation, 1),
            (Category::Figure, 2),
            (Category::Theorem, 2),
            (Category::Equation, 2),
            (Category::Figure, 3),
        ]
    );
    assert_eq!(processed.diagnostics().count(), 0);
}

proptest! {
    #[test]
    fn numbers_increase_in_document_order(items in prop::collection::vec(item_strategy(), 1..12)) {
        let processed = processed(&document(&items));
        let found = numbers(&processed.tree);

        let mut figures = 0;
        let mut equations = 0;
        let mut theorems = 0;
        let mut expected: Vec<(Category, u32)> = Vec::new();
        for &(figure, wrap) in &items {
            if let Wrap::Theorem = wrap {
                theorems += 1;
                expected.push((Category::Theorem, theorems));
            }
            if figure {
                figures += 1;
                expected.push((Category::Figure, figures));
            } else {
                equations += 1;
                expected.push((Category::Equation, equations));
            }
        }

        prop_assert_eq!(found, expected);
        prop_assert_eq!(processed.diagnostics().count(), 0);
    }

    #[test]
    fn every_format_prints_each_reference(items in prop::collection::vec(item_strategy(), 1..8)) {
        let processed = processed(&document(&items));
        for (i, &(figure, _)) in items.iter().enumerate() {
            let target = processed.result.state.get(&label(i, figure)).unwrap();
            let display = processed.result.state.display(target);
            prop_assert!(processed.outputs.html.output.contains(&display));
            prop_assert!(processed.outputs.jats.output.contains(&display));
            let latex_display = display.replace(' ', "~");
            prop_assert!(processed.outputs.latex.output.contains(&latex_display));
        }
    }
}
