//! Paperchase CLI - fetch, extract and translate biomedical papers
//!
//! Usage: paperchase-cli [OPTIONS] <COMMAND>
//!
//! Progress and logs go to stderr; results go to stdout (JSON with --json).

use clap::{Parser, Subcommand};
use paperchase_lib::papers::identifiers::IdentifierResolver;
use paperchase_lib::papers::pdf_extractor::TextExtractor;
use paperchase_lib::papers::resolver::{AcquireOptions, PdfResolver, ProgressObserver};
use paperchase_lib::pipeline::{DocumentPipeline, PipelineState};
use paperchase_lib::pubmed::{PubMedClient, PubMedQuery};
use paperchase_lib::settings::{mask_key, Settings};
use paperchase_lib::translator::{TranslationMode, Translator};
use paperchase_lib::{CascadeOutcome, DocumentIdentifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "paperchase-cli")]
#[command(version, about = "Biomedical full-text acquisition CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (default: <config dir>/paperchase/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search PubMed
    Search {
        /// Free-text query terms
        query: String,

        /// Restrict to journal (repeatable or comma-separated)
        #[arg(long, value_delimiter = ',')]
        journal: Vec<String>,

        #[arg(long)]
        from_year: Option<u32>,

        #[arg(long)]
        to_year: Option<u32>,

        /// Zero-based result page
        #[arg(long, default_value = "0")]
        page: u32,

        #[arg(long, default_value = "20")]
        page_size: u32,
    },

    /// Resolve DOI and PMC accession for a PMID
    Resolve { pmid: String },

    /// Download the PDF for a PMID
    Fetch {
        pmid: String,

        /// Output file (default: <pmid>.pdf)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Also try the unrestricted mirror
        #[arg(long)]
        use_mirror: bool,
    },

    /// Extract text from a local PDF
    Extract { file: PathBuf },

    /// Translate a local text file
    Translate {
        file: PathBuf,

        /// Backend: deepl or llm
        #[arg(long, default_value = "deepl")]
        mode: TranslationMode,
    },

    /// Resolve, fetch, extract and translate one PMID
    Process {
        pmid: String,

        #[arg(long, default_value = "deepl")]
        mode: TranslationMode,

        #[arg(long)]
        use_mirror: bool,
    },

    /// Show effective settings
    Config,
}

/// Prints cascade stage labels to stderr
struct StderrProgress;

impl ProgressObserver for StderrProgress {
    fn on_progress(&self, stage: &str) {
        eprintln!("[paperchase] {}", stage);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "paperchase=debug" } else { "paperchase=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&config_path)
        .map_err(|e| e.to_string())?
        .with_env_overrides();

    match cli.command {
        Commands::Search { query, journal, from_year, to_year, page, page_size } => {
            let query = PubMedQuery { terms: query, journals: journal, from_year, to_year };
            handle_search(&settings, &query, page, page_size, cli.json).await
        }
        Commands::Resolve { pmid } => handle_resolve(&settings, &pmid, cli.json).await,
        Commands::Fetch { pmid, out, use_mirror } => {
            handle_fetch(&settings, &pmid, out, use_mirror || settings.use_mirror, cli.json).await
        }
        Commands::Extract { file } => handle_extract(&settings, &file, cli.json),
        Commands::Translate { file, mode } => handle_translate(&settings, &file, mode, cli.json).await,
        Commands::Process { pmid, mode, use_mirror } => {
            handle_process(&settings, &pmid, mode, use_mirror || settings.use_mirror, cli.json).await
        }
        Commands::Config => handle_config(&settings, &config_path, cli.json),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn identifier_json(id: &DocumentIdentifier) -> serde_json::Value {
    serde_json::json!({
        "pmid": id.primary_id(),
        "doi": id.doi(),
        "pmcid": id.pmcid(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_search(settings: &Settings, query: &PubMedQuery, page: u32, page_size: u32, json: bool) -> Result<(), String> {
    let term = query.build();
    if term.is_empty() {
        return Err("Empty query".to_string());
    }

    let client = PubMedClient::new(settings).map_err(|e| e.to_string())?;
    let results = client
        .search(&term, page.saturating_mul(page_size), page_size)
        .await
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", to_json(&results)?);
    } else {
        println!("Query: {}", term);
        for id in &results.ids {
            println!("{}", id);
        }
        println!("\n{} of {} results (offset {})", results.ids.len(), results.total, results.offset);
    }
    Ok(())
}

async fn handle_resolve(settings: &Settings, pmid: &str, json: bool) -> Result<(), String> {
    let id = paperchase_lib::resolve_identifiers(settings, pmid)
        .await
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", to_json(&identifier_json(&id))?);
    } else {
        println!("PMID:  {}", id.primary_id());
        println!("DOI:   {}", id.doi().unwrap_or("-"));
        println!("PMCID: {}", id.pmcid().unwrap_or("-"));
    }
    Ok(())
}

async fn handle_fetch(settings: &Settings, pmid: &str, out: Option<PathBuf>, use_mirror: bool, json: bool) -> Result<(), String> {
    let id = paperchase_lib::resolve_identifiers(settings, pmid)
        .await
        .map_err(|e| e.to_string())?;

    let mut resolver = PdfResolver::from_settings(settings).map_err(|e| e.to_string())?;
    if !json {
        resolver = resolver.with_observer(Arc::new(StderrProgress));
    }

    match resolver.resolve(&id, AcquireOptions { use_mirror }).await {
        CascadeOutcome::Acquired(pdf) => {
            let path = out.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", id.primary_id())));
            std::fs::write(&path, &pdf.bytes)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

            if json {
                println!(
                    "{}",
                    to_json(&serde_json::json!({
                        "identifier": identifier_json(&id),
                        "source": pdf.source,
                        "url": pdf.url,
                        "bytes": pdf.bytes.len(),
                        "path": path.display().to_string(),
                    }))?
                );
            } else {
                println!("Saved {} ({} bytes) via {}", path.display(), pdf.bytes.len(), pdf.source);
                eprint!("{}", resolver.get_stats().summary());
            }
            Ok(())
        }
        exhausted @ CascadeOutcome::Exhausted(_) => Err(exhausted.diagnostic()),
    }
}

fn handle_extract(settings: &Settings, file: &Path, json: bool) -> Result<(), String> {
    let bytes = std::fs::read(file).map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let outcome = TextExtractor::from_settings(settings).extract(&bytes);

    if json {
        println!(
            "{}",
            to_json(&serde_json::json!({
                "engine": outcome.engine,
                "sufficient": outcome.is_sufficient(),
                "chars": outcome.text.chars().count(),
                "text": outcome.text,
            }))?
        );
        return Ok(());
    }

    if !outcome.is_sufficient() {
        return Err(format!(
            "Extraction insufficient: best engine produced {} characters",
            outcome.text.chars().count()
        ));
    }
    eprintln!("[paperchase] Extracted with {}", outcome.engine);
    println!("{}", outcome.text);
    Ok(())
}

async fn handle_translate(settings: &Settings, file: &Path, mode: TranslationMode, json: bool) -> Result<(), String> {
    let text = std::fs::read_to_string(file).map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let translator = Translator::from_settings(settings, mode).map_err(|e| e.to_string())?;
    let chunks = translator.chunk_count(&text);
    let translated = translator.translate(&text).await.map_err(|e| e.to_string())?;

    if json {
        println!(
            "{}",
            to_json(&serde_json::json!({
                "mode": mode.to_string(),
                "chunks": chunks,
                "text": translated,
            }))?
        );
    } else {
        println!("{}", translated);
    }
    Ok(())
}

async fn handle_process(settings: &Settings, pmid: &str, mode: TranslationMode, use_mirror: bool, json: bool) -> Result<(), String> {
    let mut resolver = PdfResolver::from_settings(settings).map_err(|e| e.to_string())?;
    if !json {
        resolver = resolver.with_observer(Arc::new(StderrProgress));
    }

    let mut pipeline = DocumentPipeline::new(
        IdentifierResolver::new(settings).map_err(|e| e.to_string())?,
        resolver,
        TextExtractor::from_settings(settings),
        Translator::from_settings(settings, mode).map_err(|e| e.to_string())?,
    )
    .with_options(AcquireOptions { use_mirror });

    match pipeline.run(pmid).await {
        PipelineState::TranslationComplete(report) => {
            if json {
                println!("{}", to_json(&report)?);
            } else {
                eprintln!(
                    "[paperchase] {} via {} / {} ({} chunks)",
                    report.primary_id, report.source, report.engine, report.chunks
                );
                println!("{}", report.translated_text);
            }
            Ok(())
        }
        failed => {
            if json {
                println!(
                    "{}",
                    to_json(&serde_json::json!({
                        "pmid": pmid,
                        "state": failed.name(),
                        "diagnostic": failed.diagnostic(),
                    }))?
                );
            }
            Err(failed.diagnostic())
        }
    }
}

fn handle_config(settings: &Settings, path: &Path, json: bool) -> Result<(), String> {
    let masked = |key: &Option<String>| key.as_deref().map(mask_key).unwrap_or_else(|| "-".to_string());

    if json {
        let mut value = serde_json::to_value(settings).map_err(|e| e.to_string())?;
        for field in ["ncbi_api_key", "deepl_api_key", "anthropic_api_key"] {
            if let Some(v) = value.get_mut(field) {
                if let Some(key) = v.as_str() {
                    *v = serde_json::Value::String(mask_key(key));
                }
            }
        }
        println!("{}", to_json(&value)?);
        return Ok(());
    }

    println!("Settings file:  {}{}", path.display(), if path.exists() { "" } else { " (not found, using defaults)" });
    println!("Contact email:  {}", settings.contact_email.as_deref().unwrap_or("-"));
    println!("NCBI API key:   {}", masked(&settings.ncbi_api_key));
    println!("DeepL API key:  {}", masked(&settings.deepl_api_key));
    println!("Anthropic key:  {}", masked(&settings.anthropic_api_key));
    println!("Model:          {}", settings.anthropic_model);
    println!("Target lang:    {}", settings.target_lang);
    println!("Mirror:         {}", match (&settings.mirror_url, settings.use_mirror) {
        (Some(url), true) => format!("{} (enabled)", url),
        (Some(url), false) => format!("{} (disabled)", url),
        (None, _) => "not configured".to_string(),
    });
    println!("Chunk size:     {}", settings.chunk_size);
    Ok(())
}
