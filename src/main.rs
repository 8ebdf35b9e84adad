//! lease-rag CLI application
//!
//! Command-line interface for the lease-rag library.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lease_rag::api::analysis::LeaseAnalyst;
use lease_rag::api::llm::OpenAiChat;
use lease_rag::text::diff::ChangeKind;
use lease_rag::utils::{get_file_extension, is_document_id, preview};
use lease_rag::{Config, IngestReport, LeaseEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lease-rag")]
#[command(about = "Lease PDF ingestion, clause segmentation and hybrid retrieval")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory holding per-document data (overrides the config)
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a lease PDF and build its index
    Ingest {
        /// PDF file(s) to ingest
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Print the cleaned text of a PDF without indexing it
    Extract {
        /// PDF file
        input: PathBuf,
    },

    /// Print the clauses detected in a PDF
    Clauses {
        /// PDF file
        input: PathBuf,
    },

    /// Hybrid search within an ingested lease
    Search {
        /// Document identity or PDF path
        document: String,

        /// Search query
        query: String,
    },

    /// Show the clauses about a topic
    Topic {
        /// Document identity or PDF path
        document: String,

        /// Topic, e.g. "security deposit"
        topic: String,
    },

    /// Ask a question about a lease
    Ask {
        /// Document identity or PDF path
        document: String,

        /// Question in plain English
        question: String,
    },

    /// Score the lease across the general risk categories
    Risks {
        /// Document identity or PDF path
        document: String,
    },

    /// List unusual or non-standard clauses
    Abnormalities {
        /// Document identity or PDF path
        document: String,
    },

    /// Compare the numbered clauses of two PDFs
    Diff {
        /// Base PDF
        base: PathBuf,

        /// PDF compared against the base
        compare: PathBuf,

        /// Print the changes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop the stored index of a document so it is rebuilt on next use
    Invalidate {
        /// Document identity
        doc_id: String,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output file
        #[arg(default_value = "lease-rag.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        Config::default()
            .save(output)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("✅ Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(work_dir) = cli.work_dir {
        config.storage.root = work_dir;
    }
    let work_dir = config.storage.root.clone();
    let engine = Arc::new(
        LeaseEngine::from_config(config)
            .with_context(|| format!("opening working directory {}", work_dir.display()))?,
    );

    match cli.command {
        Commands::Ingest { inputs } => ingest_command(&engine, inputs)?,
        Commands::Extract { input } => extract_command(&engine, &input)?,
        Commands::Clauses { input } => clauses_command(&engine, &input)?,
        Commands::Search { document, query } => search_command(&engine, &document, &query)?,
        Commands::Topic { document, topic } => topic_command(&engine, &document, &topic)?,
        Commands::Ask { document, question } => {
            let doc_id = resolve_document(&engine, &document)?;
            let analyst = analyst(&engine)?;
            println!("💬 {}", analyst.ask(&doc_id, &question)?);
        }
        Commands::Risks { document } => risks_command(&engine, &document)?,
        Commands::Abnormalities { document } => {
            let doc_id = resolve_document(&engine, &document)?;
            let analyst = analyst(&engine)?;
            println!("🔎 Abnormalities:");
            for item in analyst.detect_abnormalities(&doc_id)? {
                println!("   - {}", item);
            }
        }
        Commands::Diff {
            base,
            compare,
            json,
        } => diff_command(&engine, &base, &compare, json)?,
        Commands::Invalidate { doc_id } => {
            if engine.invalidate(&doc_id)? {
                println!("🗑️  Dropped index for {}", doc_id);
            } else {
                println!("❌ No index stored for {}", doc_id);
            }
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn ingest_file(engine: &LeaseEngine, input: &Path) -> lease_rag::Result<IngestReport> {
    let pb = spinner(format!("Indexing {}", input.display()));
    let report = engine.ingest_file(input);
    pb.finish_and_clear();
    report
}

fn analyst(engine: &Arc<LeaseEngine>) -> Result<LeaseAnalyst> {
    let chat = OpenAiChat::new(engine.config().llm.clone()).context("configuring the LLM client")?;
    Ok(LeaseAnalyst::new(Arc::clone(engine), Box::new(chat)))
}

/// Reject arguments that do not name a `.pdf` file
fn require_pdf(path: &Path) -> Result<()> {
    match get_file_extension(path).as_deref() {
        Some("pdf") => Ok(()),
        _ => bail!("{} is not a PDF file", path.display()),
    }
}

/// Accept either a document identity or a PDF path, ingesting the latter
fn resolve_document(engine: &LeaseEngine, document: &str) -> Result<String> {
    let path = Path::new(document);
    if path.is_file() {
        require_pdf(path)?;
        let report =
            ingest_file(engine, path).with_context(|| format!("ingesting {}", path.display()))?;
        return Ok(report.doc_id);
    }
    if !is_document_id(document) {
        eprintln!("⚠️  {} is neither a file nor a document identity", document);
    }
    Ok(document.to_string())
}

fn ingest_command(engine: &LeaseEngine, inputs: Vec<PathBuf>) -> Result<()> {
    println!("📚 Ingesting {} file(s)...", inputs.len());

    for input in inputs {
        println!("📄 Processing: {}", input.display());

        if !input.exists() {
            eprintln!("❌ File not found: {}", input.display());
            continue;
        }
        if let Err(e) = require_pdf(&input) {
            eprintln!("❌ {}", e);
            continue;
        }

        let start_time = std::time::Instant::now();
        let report = match ingest_file(engine, &input) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("❌ Failed to process {}: {}", input.display(), e);
                continue;
            }
        };

        let verb = if report.reused { "Reused" } else { "Built" };
        println!("   ✅ {} index in {:.2}s", verb, start_time.elapsed().as_secs_f64());
        println!("   🆔 Document: {}", report.doc_id);
        println!("   📊 Chunks: {}", report.chunk_count);
        println!("   📑 Clauses: {}", report.clause_count);
        if let Some(strategy) = &report.strategy {
            println!("   🔧 Extraction: {}", strategy);
        }
    }

    Ok(())
}

fn extract_command(engine: &LeaseEngine, input: &Path) -> Result<()> {
    require_pdf(input)?;
    let prepared = engine
        .prepare_file(input)
        .with_context(|| format!("extracting {}", input.display()))?;
    if !prepared.accepted {
        eprintln!(
            "⚠️  No strategy met its threshold; showing the longest result ({})",
            prepared.strategy
        );
    }
    println!("{}", prepared.text);
    Ok(())
}

fn clauses_command(engine: &LeaseEngine, input: &Path) -> Result<()> {
    require_pdf(input)?;
    let prepared = engine
        .prepare_file(input)
        .with_context(|| format!("segmenting {}", input.display()))?;
    let segmentation = &prepared.segmentation;
    println!(
        "📑 {} units ({:?}, {} numbered headers)",
        segmentation.units.len(),
        segmentation.mode,
        segmentation.header_count
    );
    println!();

    for unit in &segmentation.units {
        let heading = match (&unit.number, &unit.title) {
            (Some(number), Some(title)) => format!("{} {}", number, title),
            (Some(number), None) => number.clone(),
            _ => "(unnumbered)".to_string(),
        };
        println!("{} @ {}", heading, unit.offset);
        println!("   {}", preview(&unit.text, 120));
    }
    Ok(())
}

fn search_command(
    engine: &LeaseEngine,
    document: &str,
    query: &str,
) -> Result<()> {
    let doc_id = resolve_document(engine, document)?;
    println!("🔍 Searching for: \"{}\"", query);

    let results = engine.search(&doc_id, query)?;
    if results.is_empty() {
        println!("❌ No results found");
        return Ok(());
    }

    println!("📋 Found {} results:", results.len());
    println!();

    for (i, hit) in results.iter().enumerate() {
        let meta = &hit.chunk.metadata;
        println!(
            "{}. Similarity: {:.3} (page {}, clause {})",
            i + 1,
            hit.similarity,
            meta.page.map_or("?".to_string(), |p| p.to_string()),
            meta.clause.as_deref().unwrap_or("-")
        );
        println!("   {}", preview(&hit.chunk.text, 240));
        println!();
    }

    Ok(())
}

fn topic_command(
    engine: &LeaseEngine,
    document: &str,
    topic: &str,
) -> Result<()> {
    let doc_id = resolve_document(engine, document)?;
    println!("🧭 Clauses about \"{}\":", topic);
    println!();

    for clause in engine.clauses_for_topic(&doc_id, topic)? {
        println!("{}", clause);
        println!();
    }
    Ok(())
}

fn risks_command(engine: &Arc<LeaseEngine>, document: &str) -> Result<()> {
    let doc_id = resolve_document(engine, document)?;
    let analyst = analyst(engine)?;
    let report = analyst.evaluate_risks(&doc_id)?;

    println!("⚖️  Risk scores (1 = high risk, 10 = low risk):");
    for score in &report.scores {
        let value = score.score.map_or("n/a".to_string(), |s| s.to_string());
        println!("   {:<36} {:>4}  {}", score.category.key(), value, score.explanation);
    }
    Ok(())
}

fn diff_command(
    engine: &LeaseEngine,
    base: &Path,
    compare: &Path,
    json: bool,
) -> Result<()> {
    require_pdf(base)?;
    require_pdf(compare)?;
    let changes = engine.diff_documents(base, compare).with_context(|| {
        format!("comparing {} with {}", base.display(), compare.display())
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("✅ No clause changes");
        return Ok(());
    }

    for change in &changes {
        let marker = match change.kind {
            ChangeKind::Added => "➕",
            ChangeKind::Removed => "➖",
            ChangeKind::Modified => "✏️ ",
        };
        println!("{} Clause {}", marker, change.clause_no);
        if let Some(before) = &change.before {
            println!("   before: {}", preview(before, 160));
        }
        if let Some(after) = &change.after {
            println!("   after:  {}", preview(after, 160));
        }
    }
    Ok(())
}
