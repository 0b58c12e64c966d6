//! CLI binary for fundprice-ingest.
//!
//! A thin shim over the library crate that maps CLI flags onto
//! `PipelineConfig`, wires a source, a reader and a store together, and
//! prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fundprice_ingest::config::{DEFAULT_OPENAI_MODEL, DEFAULT_SUBJECT, DEFAULT_VISION_MODEL};
use fundprice_ingest::pipeline::render::bind_pdfium;
use fundprice_ingest::schedule::{parse_time_of_day, parse_timezone, DEFAULT_RUN_AT};
use fundprice_ingest::store::SetOptions;
use fundprice_ingest::{
    build_reader, connection_check, extract_document, Attachment, AttachmentSource, DirectorySource,
    DocPath, Document, DocumentStore, Environment, Extractor, FundRegistry, GmailSource,
    JsonFileStore, Pipeline, PipelineConfig, ProgressCallback, ReaderKind, RunProgressCallback,
    RunResponse, Scheduler,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per attachment and per saved record.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Daily run");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self) {
        self.bar.set_message("searching mailbox…");
    }

    fn on_messages_found(&self, count: usize) {
        self.bar
            .set_message(format!("{count} matching message(s), fetching newest…"));
    }

    fn on_attachment_start(&self, filename: &str, index: usize, total: usize) {
        self.bar
            .set_message(format!("extracting {filename} ({index}/{total})"));
    }

    fn on_attachment_complete(&self, filename: &str, status: &str, accepted: usize, rejected: usize) {
        let mark = if status == "records" || status == "empty" {
            green("✓")
        } else {
            red("✗")
        };
        self.bar.println(format!(
            "  {mark} {filename}  {}",
            dim(&format!("{status}: {accepted} accepted, {rejected} rejected"))
        ));
    }

    fn on_record_saved(&self, fund_id: &str, date: &str) {
        self.bar
            .println(format!("    {} {fund_id} {}", green("•"), dim(date)));
    }

    fn on_run_complete(&self, saved: usize, rejected: usize, errored: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} saved, {} rejected, {} errored",
            if errored == 0 { green("✔") } else { red("⚠") },
            bold(&saved.to_string()),
            rejected,
            errored
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One run against Gmail, writing to data/mpfi-qa-firestore-db.json
  fundprice run --sender reports@fiduciary.example

  # One run against PDFs in a local folder
  fundprice run --sender reports@fiduciary.example --inbox-dir ./inbox

  # HTTP trigger plus the 10:00 America/Bogota daily run
  fundprice serve --sender reports@fiduciary.example --addr 0.0.0.0:8080

  # Try extraction on a single PDF without touching storage
  fundprice extract report.pdf

  # Create fund documents for the registry
  fundprice seed-funds

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (file reader, and default vision provider)
  FUNDPRICE_SENDER        Report sender address
  FUNDPRICE_ENV           qa | production
  FUNDPRICE_DATABASE_ID   Database id (required for production)
  FUNDPRICE_DATA_DIR      Directory of the JSON database files
  EDGEQUAKE_LLM_PROVIDER  Vision reader provider override
  EDGEQUAKE_MODEL         Vision reader model override
  PDFIUM_LIB_PATH         pdfium shared library for the vision reader
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Ingest daily fund unit prices from emailed PDF reports.
#[derive(Parser, Debug)]
#[command(
    name = "fundprice",
    version,
    about = "Ingest daily fund unit prices from emailed PDF reports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FUNDPRICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FUNDPRICE_QUIET")]
    quiet: bool,

    /// Emit logs as JSON lines (for hosted deployments).
    #[arg(long, global = true, env = "FUNDPRICE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once and print the JSON response body.
    Run(RunArgs),
    /// Serve the HTTP trigger and run the pipeline daily.
    Serve(ServeArgs),
    /// Extract and validate a local PDF without writing to storage.
    Extract(ExtractArgs),
    /// Check that the configured reader accepts our credentials.
    CheckAi(ReaderArgs),
    /// Create a fund document for every registry entry that lacks one.
    SeedFunds(SeedArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Disable the progress spinner.
    #[arg(long, env = "FUNDPRICE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Listen address.
    #[arg(long, env = "FUNDPRICE_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Local time of the daily run (HH:MM).
    #[arg(long, env = "FUNDPRICE_RUN_AT", default_value = DEFAULT_RUN_AT)]
    run_at: String,

    /// IANA timezone of --run-at.
    #[arg(long, env = "FUNDPRICE_TIMEZONE", default_value = "America/Bogota")]
    timezone: String,

    /// Only serve the HTTP trigger.
    #[arg(long)]
    no_schedule: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// PDF file to read.
    file: PathBuf,

    #[command(flatten)]
    reader: ReaderArgs,
}

#[derive(Args, Debug)]
struct SeedArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// JSON file of known funds: [{"id": ..., "name": ...}].
    #[arg(long, env = "FUNDPRICE_REGISTRY")]
    registry: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Only messages from this address are processed.
    #[arg(long, env = "FUNDPRICE_SENDER")]
    sender: String,

    /// Required subject line.
    #[arg(long, env = "FUNDPRICE_SUBJECT", default_value = DEFAULT_SUBJECT)]
    subject: String,

    /// Search window in days.
    #[arg(long, env = "FUNDPRICE_WITHIN_DAYS", default_value_t = 2)]
    within_days: u32,

    /// Maximum messages requested from the mailbox.
    #[arg(long, env = "FUNDPRICE_MAX_RESULTS", default_value_t = 10)]
    max_results: u32,

    /// Pause between consecutive extraction calls (ms).
    #[arg(long, env = "FUNDPRICE_EXTRACTION_DELAY_MS", default_value_t = 1000)]
    extraction_delay_ms: u64,

    /// Retries of an extraction that failed with a service error.
    #[arg(long, env = "FUNDPRICE_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Initial retry backoff (ms), doubled per attempt.
    #[arg(long, env = "FUNDPRICE_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Execution budget of one run (seconds).
    #[arg(long, env = "FUNDPRICE_RUN_TIMEOUT", default_value_t = 540)]
    run_timeout: u64,

    /// Read PDFs from this directory instead of Gmail.
    #[arg(long, env = "FUNDPRICE_INBOX_DIR")]
    inbox_dir: Option<PathBuf>,

    /// Gmail OAuth client file.
    #[arg(long, env = "GMAIL_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Gmail OAuth token file (must contain a refresh_token).
    #[arg(long, env = "GMAIL_TOKEN", default_value = "token.json")]
    token: PathBuf,

    #[command(flatten)]
    reader: ReaderArgs,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct ReaderArgs {
    /// Document-understanding backend.
    #[arg(long, env = "FUNDPRICE_READER", value_enum, default_value = "openai-file")]
    reader: ReaderArg,

    /// OpenAI API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Model ID.
    #[arg(
        long,
        env = "FUNDPRICE_MODEL",
        long_help = "Model to use. Default: gpt-4.1 for the file reader, gpt-4.1-mini for the vision reader."
    )]
    model: Option<String>,

    /// LLM provider for the vision reader: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Per-call backend timeout (seconds).
    #[arg(long, env = "FUNDPRICE_API_TIMEOUT", default_value_t = 240)]
    api_timeout: u64,

    /// Pages rendered for the vision reader.
    #[arg(long, env = "FUNDPRICE_MAX_PAGES", default_value_t = 10)]
    max_pages: usize,

    /// Max output tokens.
    #[arg(long, env = "FUNDPRICE_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "FUNDPRICE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// JSON file of known funds: [{"id": ..., "name": ...}].
    #[arg(long, env = "FUNDPRICE_REGISTRY")]
    registry: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Deployment environment: qa or production.
    #[arg(long = "env", env = "FUNDPRICE_ENV", default_value = "qa")]
    environment: String,

    /// Database id (defaults to the qa database).
    #[arg(long, env = "FUNDPRICE_DATABASE_ID")]
    database_id: Option<String>,

    /// Directory holding `<database-id>.json`.
    #[arg(long, env = "FUNDPRICE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReaderArg {
    OpenaiFile,
    Vision,
}

impl From<ReaderArg> for ReaderKind {
    fn from(v: ReaderArg) -> Self {
        match v {
            ReaderArg::OpenaiFile => ReaderKind::OpenAiFile,
            ReaderArg::Vision => ReaderKind::Vision,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = matches!(&cli.command, Command::Run(a) if !a.no_progress)
        && !cli.quiet
        && !cli.log_json;
    init_tracing(&cli, show_progress);

    match cli.command {
        Command::Run(args) => cmd_run(args, show_progress).await,
        Command::Serve(args) => cmd_serve(args).await,
        Command::Extract(args) => cmd_extract(args).await,
        Command::CheckAi(args) => cmd_check_ai(args).await,
        Command::SeedFunds(args) => cmd_seed(args).await,
    }
}

// ── Logging setup ────────────────────────────────────────────────────────────

fn init_tracing(cli: &Cli, show_progress: bool) {
    // The spinner replaces INFO logs during an interactive run.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_run(args: RunArgs, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let pipeline = build_pipeline(&args.pipeline, progress).await?;

    let result = pipeline.run_with_timeout().await;
    let response = RunResponse::from_result(&result);
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialise response")?
    );
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(&args.pipeline, None).await?);

    if !args.no_schedule {
        let at = parse_time_of_day(&args.run_at)?;
        let tz = parse_timezone(&args.timezone)?;
        Scheduler::new(Arc::clone(&pipeline), at, tz).spawn();
    }

    fundprice_ingest::server::serve(pipeline, args.addr)
        .await
        .with_context(|| format!("HTTP server on {} failed", args.addr))
}

async fn cmd_extract(args: ExtractArgs) -> Result<()> {
    let config = reader_config(&args.reader)?;
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let extractor = Extractor::new(
        build_reader(&config),
        &config.registry,
        Duration::from_secs(config.api_timeout_secs),
    );
    let (extraction, validation) =
        extract_document(&extractor, &config.registry, &Attachment::new(filename, bytes)).await;

    let body = json!({
        "extraction": extraction,
        "records": validation.records,
        "rejects": validation.rejects,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&body).context("Failed to serialise result")?
    );
    Ok(())
}

async fn cmd_check_ai(args: ReaderArgs) -> Result<()> {
    let config = reader_config(&args)?;
    if config.reader == ReaderKind::Vision {
        tokio::task::spawn_blocking(|| bind_pdfium().map(|_| ()))
            .await
            .context("pdfium check panicked")?
            .context("Vision reader needs pdfium")?;
    }

    let Some(reader) = build_reader(&config) else {
        anyhow::bail!(
            "No document-understanding backend configured (reader: {:?}). Set OPENAI_API_KEY.",
            config.reader
        );
    };
    let model = config.model.clone().unwrap_or_else(|| match config.reader {
        ReaderKind::OpenAiFile => DEFAULT_OPENAI_MODEL.to_string(),
        ReaderKind::Vision => DEFAULT_VISION_MODEL.to_string(),
    });

    let reply = connection_check(reader.as_ref(), Duration::from_secs(config.api_timeout_secs))
        .await
        .with_context(|| format!("{} ({model}) connection check failed", reader.name()))?;
    eprintln!(
        "{} {} ({}) replied: {}",
        green("✔"),
        reader.name(),
        model,
        dim(&reply)
    );
    Ok(())
}

async fn cmd_seed(args: SeedArgs) -> Result<()> {
    let registry = load_registry(args.registry.as_deref())?;
    let store = open_store(&args.store).await?;

    let mut created = 0usize;
    for fund in registry.iter() {
        let path = DocPath::fund(&fund.id).context("Invalid fund id")?;
        if store.get(&path).await?.is_some() {
            continue;
        }
        let mut doc = Document::new();
        doc.insert("name".to_string(), Value::String(fund.name.clone()));
        store
            .set(&path, doc, SetOptions::merge())
            .await
            .with_context(|| format!("Failed to create {path}"))?;
        created += 1;
    }
    eprintln!(
        "{} {} fund document(s) created in {}",
        green("✔"),
        bold(&created.to_string()),
        store.path().display()
    );
    Ok(())
}

// ── Wiring ───────────────────────────────────────────────────────────────────

async fn build_pipeline(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<Pipeline> {
    let mut builder = apply_reader_args(PipelineConfig::builder(), &args.reader)?
        .sender(args.sender.clone())
        .subject(args.subject.clone())
        .within_days(args.within_days)
        .max_results(args.max_results)
        .extraction_delay_ms(args.extraction_delay_ms)
        .max_retries(args.max_retries)
        .retry_backoff_ms(args.retry_backoff_ms)
        .run_timeout_secs(args.run_timeout)
        .environment(parse_environment(&args.store.environment)?);
    if let Some(id) = &args.store.database_id {
        builder = builder.database_id(id.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let source: Arc<dyn AttachmentSource> = match &args.inbox_dir {
        Some(dir) => Arc::new(DirectorySource::new(dir)),
        None => Arc::new(
            GmailSource::from_files(&args.credentials, &args.token)
                .await
                .context("Gmail source unavailable")?,
        ),
    };
    let store: Arc<dyn DocumentStore> = Arc::new(open_store(&args.store).await?);

    Ok(Pipeline::new(Arc::new(config), source, store))
}

fn apply_reader_args(
    mut builder: fundprice_ingest::PipelineConfigBuilder,
    args: &ReaderArgs,
) -> Result<fundprice_ingest::PipelineConfigBuilder> {
    builder = builder
        .reader(args.reader.into())
        .registry(load_registry(args.registry.as_deref())?)
        .api_timeout_secs(args.api_timeout)
        .max_pages(args.max_pages)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature);
    if let Some(key) = &args.openai_api_key {
        builder = builder.openai_api_key(key.clone());
    }
    if let Some(model) = &args.model {
        builder = builder.model(model.clone());
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider.clone());
    }
    Ok(builder)
}

/// Config for commands that only talk to the reader.
fn reader_config(args: &ReaderArgs) -> Result<PipelineConfig> {
    apply_reader_args(PipelineConfig::builder(), args)?
        // No mailbox is searched; the builder still wants a sender.
        .sender("local@localhost")
        .build()
        .context("Invalid configuration")
}

fn load_registry(path: Option<&Path>) -> Result<FundRegistry> {
    match path {
        Some(p) => Ok(FundRegistry::from_file(p)?),
        None => Ok(FundRegistry::default()),
    }
}

fn parse_environment(s: &str) -> Result<Environment> {
    Ok(s.parse::<Environment>()?)
}

async fn open_store(args: &StoreArgs) -> Result<JsonFileStore> {
    let probe = PipelineConfig::builder()
        .sender("local@localhost")
        .environment(parse_environment(&args.environment)?);
    let probe = match &args.database_id {
        Some(id) => probe.database_id(id.clone()),
        None => probe,
    };
    let database_id = probe
        .build()
        .context("Invalid store configuration")?
        .resolved_database_id()?;
    let path = args.data_dir.join(format!("{database_id}.json"));
    JsonFileStore::open(&path)
        .await
        .with_context(|| format!("Failed to open store {}", path.display()))
}
