//! iterview CLI
//!
//! Submits an image job and renders each iteration as its result streams in.
//!
//! ## Commands
//!
//! - `submit`: upload an image to a server and follow the streamed results
//! - `replay`: feed a captured response body through the same pipeline

mod presenter;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use iterview_core::{
    markup, ClientConfig, HttpTransport, ReplayTransport, SessionObserver, SessionOutcome,
    SessionReport, SessionSpan, StreamController, Submission, Transport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use crate::presenter::TerminalPresenter;

#[derive(Parser)]
#[command(name = "iterview")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Submit image jobs and watch iteration results stream in", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an image and render results as they arrive
    Submit {
        /// Image to upload (png, jpg or jpeg)
        image: PathBuf,

        /// Number of iterations to request
        #[arg(short = 'n', long)]
        iterations: u64,

        /// Server base URL
        #[arg(long, env = "ITERVIEW_SERVER")]
        server: Option<String>,

        /// Upload endpoint path
        #[arg(long, env = "ITERVIEW_ENDPOINT")]
        endpoint: Option<String>,

        /// Seconds to wait for the next chunk before giving up (0 disables)
        #[arg(long, env = "ITERVIEW_IDLE_TIMEOUT_SECS")]
        idle_timeout: Option<u64>,

        #[command(flatten)]
        outputs: Outputs,
    },

    /// Replay a captured response body
    Replay {
        /// File holding the raw response body
        file: PathBuf,

        /// Number of iterations the capture was requested with
        #[arg(short = 'n', long)]
        iterations: u64,

        /// Bytes per replayed chunk
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        #[command(flatten)]
        outputs: Outputs,
    },
}

/// Where to write the final session artifacts.
#[derive(Args, Debug, Default, Clone)]
struct Outputs {
    /// Write an HTML page with every slot
    #[arg(long)]
    html: Option<PathBuf>,

    /// Write the session report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    iterview_core::init_tracing(cli.json, level);

    let presenter: Arc<dyn SessionObserver> = Arc::new(TerminalPresenter::stdout());

    let report = match cli.command {
        Commands::Submit {
            image,
            iterations,
            server,
            endpoint,
            idle_timeout,
            outputs,
        } => {
            let mut config = ClientConfig::from_env();
            if let Some(server) = server {
                config.server_url = server;
            }
            if let Some(endpoint) = endpoint {
                config = config.with_endpoint(&endpoint);
            }
            if let Some(secs) = idle_timeout {
                config = config.with_idle_timeout_secs(secs);
            }
            cmd_submit(config, &image, iterations, &outputs, presenter).await?
        }
        Commands::Replay {
            file,
            iterations,
            chunk_size,
            outputs,
        } => cmd_replay(&file, iterations, chunk_size, &outputs, presenter).await?,
    };

    ensure_completed(&report)
}

async fn cmd_submit(
    config: ClientConfig,
    image: &Path,
    iterations: u64,
    outputs: &Outputs,
    observer: Arc<dyn SessionObserver>,
) -> Result<SessionReport> {
    let submission = Submission::from_path(image, iterations)
        .await
        .with_context(|| format!("Failed to prepare submission from {:?}", image))?;

    info!(server = %config.server_url, "Submitting {}", submission.file_name());
    let transport =
        HttpTransport::new(config.clone()).context("Failed to build HTTP transport")?;

    run(transport, config, &submission, outputs, observer).await
}

async fn cmd_replay(
    file: &Path,
    iterations: u64,
    chunk_size: usize,
    outputs: &Outputs,
    observer: Arc<dyn SessionObserver>,
) -> Result<SessionReport> {
    let transport = ReplayTransport::from_file(file, chunk_size)
        .await
        .with_context(|| format!("Failed to read capture {:?}", file))?;

    let submission = Submission::replay(iterations).context("Invalid iteration count")?;

    run(
        transport,
        ClientConfig::from_env(),
        &submission,
        outputs,
        observer,
    )
    .await
}

async fn run<T: Transport>(
    transport: T,
    config: ClientConfig,
    submission: &Submission,
    outputs: &Outputs,
    observer: Arc<dyn SessionObserver>,
) -> Result<SessionReport> {
    let mut controller = StreamController::new(transport, config, observer);
    let report = controller.submit(submission).await;

    let _span = SessionSpan::enter(&report.session_id.to_string());
    if let Some(session) = controller.session() {
        write_outputs(session, &report, outputs)?;
    }

    println!(
        "{} ({} of {} iterations, {} ms)",
        report.outcome.phase(),
        report.rendered,
        report.expected,
        report.duration_ms
    );
    Ok(report)
}

fn write_outputs(
    session: &iterview_core::StreamSession,
    report: &SessionReport,
    outputs: &Outputs,
) -> Result<()> {
    if let Some(path) = &outputs.html {
        std::fs::write(path, markup::render_report(session))
            .with_context(|| format!("Failed to write HTML to {:?}", path))?;
        info!("Wrote HTML results to {:?}", path);
    }
    if let Some(path) = &outputs.report {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Wrote session report to {:?}", path);
    }
    Ok(())
}

/// Only a fully completed session exits successfully.
fn ensure_completed(report: &SessionReport) -> Result<()> {
    match report.outcome {
        SessionOutcome::Completed => Ok(()),
        SessionOutcome::PartiallyCompleted { rendered, expected } => {
            bail!("Only {rendered} of {expected} iterations completed")
        }
        SessionOutcome::Failed { .. } => bail!("{}", report.status),
    }
}
