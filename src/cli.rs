use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::acquisition::AnalysisRequest;
use crate::composer;
use crate::config_loader::{load_config, AnalyzerConfig, InstructionVariant};
use crate::pipeline::Analyzer;
use crate::web::build_router;

/// Top-level CLI interface
#[derive(Parser)]
#[command(
    name = "tos-trust",
    version,
    about = "Scores how trustworthy a Terms of Service document is"
)]
pub struct Cli {
    /// Config file (defaults to ./tos_trust.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API (analyze route, health checks)
    Serve {
        /// Host/IP to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },

    /// Analyze one document and print the result as JSON
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct AnalyzeSource {
    /// Terms of Service text
    #[arg(long)]
    pub text: Option<String>,
    /// URL of a Terms of Service page
    #[arg(long)]
    pub url: Option<String>,
    /// File holding Terms of Service text
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: AnalyzeSource,

    /// Instruction style sent to the model (overrides config)
    #[arg(long, value_enum)]
    pub variant: Option<InstructionVariant>,
}

impl AnalyzeSource {
    fn into_request(self) -> anyhow::Result<AnalysisRequest> {
        if let Some(path) = self.file {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(AnalysisRequest::from_text(text));
        }
        Ok(AnalysisRequest {
            source_text: self.text,
            source_url: self.url,
        })
    }
}

/// Run the parsed command, returning the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Serve { host, port } => {
            serve(config, host, port).await?;
            Ok(0)
        }
        Commands::Analyze(args) => analyze_once(config, args).await,
    }
}

async fn serve(config: AnalyzerConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.host.clone()),
        port.unwrap_or(config.port)
    );

    let analyzer = Analyzer::from_config(&config).context("Failed to build HTTP clients")?;
    if !analyzer.is_ready() {
        tracing::warn!("no model service API key configured; /api/analyze will fail until one is set");
    }
    let app = build_router(Arc::new(analyzer));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "serving tos-trust API");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;
    Ok(())
}

async fn analyze_once(config: AnalyzerConfig, args: AnalyzeArgs) -> anyhow::Result<i32> {
    let request = args.source.into_request()?;
    let mut analyzer = Analyzer::from_config(&config).context("Failed to build HTTP clients")?;
    if let Some(variant) = args.variant {
        analyzer = analyzer.with_variant(variant);
    }

    match analyzer.analyze(&request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(0)
        }
        Err(err) => {
            error!(error = %err, "analysis failed");
            let failure = composer::compose_failure(&err);
            let body = serde_json::json!({
                "score": null,
                "error": failure.to_string(),
                "detail": failure.detail(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(composer::exit_code(&err))
        }
    }
}
