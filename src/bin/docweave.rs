//! docweave - render directive-extended Markdown to HTML, LaTeX and JATS

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use docweave::ast::BibEntry;
use docweave::bibtex::parse_bibtex;
use docweave::render::MathBackend;
use docweave::{
    parse, render_all, validate, ParseOptions, Pipeline, PipelineOptions, RenderOptions, Severity,
    TargetFormat, ValidateOptions,
};

#[derive(Parser)]
#[command(name = "docweave")]
#[command(version, about = "Render directive-extended Markdown to HTML, LaTeX and JATS", long_about = None)]
#[command(after_help = "EXAMPLES:
    docweave paper.md                     Print HTML
    docweave paper.md -f latex -s         Print a complete LaTeX document
    docweave paper.md -f all -o out/      Write paper.html, paper.tex and paper.xml
    docweave paper.md --bib refs.bib      Add a bibliography file")]
struct Cli {
    /// Input Markdown file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Output directory (prints to stdout when omitted)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Additional BibTeX files, on top of those named in the front matter
    #[arg(long = "bib", value_name = "FILE")]
    bibliography: Vec<PathBuf>,

    /// Emit complete documents instead of fragments
    #[arg(short, long)]
    standalone: bool,

    /// Do not turn bare URLs into links
    #[arg(long)]
    no_linkify: bool,

    /// Math rendering for HTML
    #[arg(long, value_enum, default_value_t = Math::Katex)]
    math: Math,

    /// Exit with failure when any error diagnostic was reported
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Html,
    Latex,
    Jats,
    /// YAML dump of the parsed tree
    Yaml,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum Math {
    Katex,
    Mathjax,
    Mathml,
}

impl From<Math> for MathBackend {
    fn from(math: Math) -> Self {
        match math {
            Math::Katex => MathBackend::KaTeX,
            Math::Mathml => MathBackend::MathML,
            Math::Mathjax => MathBackend::MathJax,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG`. Diagnostics are logged at `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

/// Returns `Ok(false)` when `--strict` is set and errors were reported.
fn run(cli: &Cli) -> docweave::Result<bool> {
    let source = fs::read_to_string(&cli.input)?;
    let parsed = parse(
        &source,
        &ParseOptions {
            linkify: !cli.no_linkify,
        },
    )?;
    let (frontmatter, config_diagnostics) = validate(&parsed.frontmatter, &ValidateOptions::default());

    let base = cli.input.parent().unwrap_or_else(|| Path::new("."));
    let mut files: Vec<PathBuf> = frontmatter.bibliography.iter().map(|p| base.join(p)).collect();
    files.extend(cli.bibliography.iter().cloned());

    let options = PipelineOptions {
        bibliography: load_bibliography(&files)?,
        snapshot: matches!(cli.format, Format::Yaml | Format::All),
        ..PipelineOptions::default()
    };

    let mut tree = parsed.tree;
    let result = Pipeline::new(&mut tree, &frontmatter, &options)
        .with_diagnostics(parsed.diagnostics.into_iter().chain(config_diagnostics))
        .finish();

    let mut render = RenderOptions::default();
    render.html.math_backend = cli.math.into();
    render.html.standalone = cli.standalone;
    render.latex.standalone = cli.standalone;
    let outputs = render_all(&tree, &result, &render);

    let stem = cli
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let snapshot = result.snapshot.as_deref().unwrap_or_default();

    match cli.format {
        Format::Html => emit(cli, stem, "html", &outputs.get(TargetFormat::Html).output)?,
        Format::Latex => emit(cli, stem, "tex", &outputs.get(TargetFormat::Latex).output)?,
        Format::Jats => emit(cli, stem, "xml", &outputs.get(TargetFormat::Jats).output)?,
        Format::Yaml => emit(cli, stem, "yaml", snapshot)?,
        Format::All => {
            emit(cli, stem, "html", &outputs.html.output)?;
            emit(cli, stem, "tex", &outputs.latex.output)?;
            emit(cli, stem, "xml", &outputs.jats.output)?;
            emit(cli, stem, "yaml", snapshot)?;
        }
    }

    let errors = result.diagnostics.count(Severity::Error);
    let warnings = result.diagnostics.count(Severity::Warning);
    if errors + warnings > 0 {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    Ok(!(cli.strict && errors > 0))
}

fn load_bibliography(files: &[PathBuf]) -> docweave::Result<HashMap<String, BibEntry>> {
    let mut entries = HashMap::new();
    for file in files {
        let text = fs::read_to_string(file)?;
        for (key, entry) in parse_bibtex(&text)? {
            entries.entry(key).or_insert(entry);
        }
        tracing::info!(file = %file.display(), total = entries.len(), "loaded bibliography");
    }
    Ok(entries)
}

fn emit(cli: &Cli, stem: &str, extension: &str, text: &str) -> docweave::Result<()> {
    match &cli.output {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!("{stem}.{extension}"));
            fs::write(&path, text)?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => {
            if cli.format == Format::All {
                println!("==> {stem}.{extension} <==");
            }
            println!("{text}");
        }
    }
    Ok(())
}
