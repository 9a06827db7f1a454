//! HTTP daemon for cupom-fiscal.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig` and runs the server until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use cupom_fiscal::{server, ServiceConfig};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ROUTES:
  POST /api/interpretar-cupom         multipart form, file field "image"
  POST /api/interpretar-cupom-texto   JSON body {"text": "..."}
  GET  /api/status?jobId=<id>         poll a submitted job
  GET  /health                        liveness and job counts

ENVIRONMENT:
  GEMINI_API_KEY     Extractor credential (name configurable via --credential-env)
  RUST_LOG           Overrides --verbose / --quiet log filtering
  .env               Loaded from the working directory when present

EXAMPLE:
  export GEMINI_API_KEY=...
  cupomd --bind 0.0.0.0:5000 --workers 4
  curl -F image=@cupom.jpg http://localhost:5000/api/interpretar-cupom
"#;

/// Extract structured data from Brazilian fiscal receipts over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "cupomd",
    version,
    about = "Extract structured data from Brazilian fiscal receipts over HTTP",
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "CUPOM_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "CUPOM_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Vision model ID.
    #[arg(long, env = "CUPOM_MODEL", default_value = "gemini-1.5-flash")]
    model: String,

    /// Environment variable that must hold the provider credential.
    #[arg(long, env = "CUPOM_CREDENTIAL_ENV", default_value = "GEMINI_API_KEY")]
    credential_env: String,

    /// Extractions running at the same time.
    #[arg(short, long, env = "CUPOM_WORKERS", default_value_t = 8)]
    workers: usize,

    /// Submissions that may wait for a worker before new ones get 503.
    #[arg(long, env = "CUPOM_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// Per-extraction timeout in seconds (0 disables it).
    #[arg(long, env = "CUPOM_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Largest accepted request body in bytes.
    #[arg(long, env = "CUPOM_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Path to a text file replacing the built-in image prompt.
    #[arg(long, env = "CUPOM_IMAGE_PROMPT")]
    image_prompt: Option<PathBuf>,

    /// Path to a text file replacing the built-in text prompt.
    #[arg(long, env = "CUPOM_TEXT_PROMPT")]
    text_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "CUPOM_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per receipt.
    #[arg(long, env = "CUPOM_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CUPOM_VERBOSE")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, env = "CUPOM_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal in production.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info,tower_http=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    tracing::debug!(?config, "Configuration resolved");

    server::run(config).await.context("Server failed")?;
    Ok(())
}

/// Map CLI args to `ServiceConfig`.
async fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .bind_addr(cli.bind)
        .provider_name(&cli.provider)
        .model(&cli.model)
        .credential_env(&cli.credential_env)
        .workers(cli.workers)
        .queue_capacity(cli.queue_capacity)
        .extraction_timeout_secs(Some(cli.timeout))
        .max_upload_bytes(cli.max_upload_bytes)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    if let Some(path) = &cli.image_prompt {
        builder = builder.image_prompt(read_prompt(path).await?);
    }
    if let Some(path) = &cli.text_prompt {
        builder = builder.text_prompt(read_prompt(path).await?);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    let prompt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))?;
    anyhow::ensure!(!prompt.trim().is_empty(), "Prompt file {:?} is empty", path);
    Ok(prompt)
}
