//! Bgtify CLI Tool
//!
//! Command-line front end: every input file is offered to one pipeline as a
//! single-file drop, and each result is saved as `<name>.png`.

use super::config::CliConfigBuilder;
use crate::{
    notify::{ChannelNotifier, Notification, NotificationLevel},
    pipeline::{IntakeOutcome, Pipeline, RunOutcome},
    removal::{TractRemover, TractRemoverConfig},
    state::PipelineState,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    FileIntake,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument};

/// Remove image backgrounds with an ONNX segmentation model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgtify")]
pub struct Cli {
    /// Input image files; each one is processed as its own drop
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Segmentation model (.onnx, ISNet-style 1x3xSxS input)
    #[arg(short, long, value_name = "ONNX")]
    pub model: PathBuf,

    /// Output directory [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Upper bound for both sides of transcoded images
    #[arg(long, value_name = "N")]
    pub max_dimension: Option<u32>,

    /// JPEG quality for transcoded images (1-100)
    #[arg(long, value_name = "Q")]
    pub quality: Option<u8>,

    /// Also downscale and re-encode JPEG and PNG inputs
    #[arg(long)]
    pub always_transcode: bool,

    /// Pipeline configuration file (JSON) [default: <config dir>/bgtify/config.json]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    Json,
}

impl CliLogFormat {
    fn tracing_format(self) -> Result<TracingFormat> {
        match self {
            Self::Console => Ok(TracingFormat::Console),
            Self::Compact => Ok(TracingFormat::Compact),
            #[cfg(feature = "tracing-json")]
            Self::Json => Ok(TracingFormat::Json),
            #[cfg(not(feature = "tracing-json"))]
            Self::Json => anyhow::bail!("JSON logging requires the 'tracing-json' feature"),
        }
    }
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOutcome {
    Saved { path: PathBuf, elapsed_ms: u64 },
    Skipped(String),
    Failed(String),
}

/// Counters for a whole invocation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BatchSummary {
    processed: usize,
    skipped: usize,
    failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Saved { .. } => self.processed += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn is_success(&self) -> bool {
        self.failed == 0 && self.processed > 0
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.log_format.tracing_format()?)
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let output_dir = prepare_output_dir(cli.output.as_deref())?;

    info!("Starting background removal");
    debug!(
        inputs = cli.input.len(),
        output = %output_dir.display(),
        max_width = config.normalizer.max_width,
        max_height = config.normalizer.max_height,
        quality = config.normalizer.quality,
        "Configuration resolved"
    );

    let remover = {
        let _span = spans::model_loading(&cli.model).entered();
        TractRemover::load(&TractRemoverConfig::new(&cli.model))
            .context("Failed to load segmentation model")?
    };

    let (notifier, notifications) = ChannelNotifier::new();
    let pipeline = Pipeline::new(config, Arc::new(remover), Arc::new(notifier))
        .context("Failed to assemble pipeline")?;

    let printer = tokio::spawn(print_notifications(notifications));
    let spinner = tokio::spawn(drive_spinner(pipeline.subscribe()));

    let batch_start = Instant::now();
    let summary = process_inputs(&cli.input, &pipeline, &output_dir).await;

    // Closing the pipeline ends both the notification and the state channels
    drop(pipeline);
    let _ = tokio::join!(printer, spinner);

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        elapsed_ms = batch_start.elapsed().as_millis() as u64,
        "Done"
    );

    if !summary.is_success() {
        anyhow::bail!(
            "{} processed, {} skipped, {} failed",
            summary.processed,
            summary.skipped,
            summary.failed
        );
    }

    Ok(())
}

fn prepare_output_dir(output: Option<&Path>) -> Result<PathBuf> {
    let Some(dir) = output else {
        return std::env::current_dir().context("Failed to resolve the current directory");
    };

    if dir.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            dir.display()
        );
    }
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }
    Ok(dir.to_path_buf())
}

async fn process_inputs(inputs: &[PathBuf], pipeline: &Pipeline, output_dir: &Path) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for input in inputs {
        let outcome = process_single_file(pipeline, input, output_dir)
            .instrument(spans::file_processing(input))
            .await
            .unwrap_or_else(|e| FileOutcome::Failed(format!("{e:#}")));

        match &outcome {
            FileOutcome::Saved { path, elapsed_ms } => {
                info!(input = %input.display(), output = %path.display(), elapsed_ms, "Saved");
            },
            FileOutcome::Skipped(reason) => {
                warn!(input = %input.display(), %reason, "Skipping input");
            },
            FileOutcome::Failed(message) => {
                error!(input = %input.display(), %message, "Processing failed");
            },
        }
        summary.record(&outcome);
    }

    summary
}

async fn process_single_file(
    pipeline: &Pipeline,
    input: &Path,
    output_dir: &Path,
) -> Result<FileOutcome> {
    let file = FileIntake::load(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let report = match pipeline.handle_drop(vec![file]).await {
        IntakeOutcome::Completed(report) => report,
        IntakeOutcome::Ignored(rejection) => return Ok(FileOutcome::Skipped(rejection.to_string())),
        IntakeOutcome::Busy => return Ok(FileOutcome::Skipped("pipeline is busy".to_string())),
    };

    match report.outcome {
        RunOutcome::Succeeded { .. } => {
            let download = pipeline
                .download()
                .context("Result preview is no longer available")?;
            let path = download
                .save_in(output_dir)
                .await
                .context("Failed to save result")?;
            Ok(FileOutcome::Saved {
                path,
                elapsed_ms: report.elapsed_ms,
            })
        },
        RunOutcome::Failed { message, .. } => Ok(FileOutcome::Failed(message)),
        RunOutcome::Superseded => Ok(FileOutcome::Skipped("run was abandoned".to_string())),
    }
}

fn render_notification(notification: &Notification) -> String {
    let timestamp = notification.at.format("%H:%M:%S");
    match notification.level {
        NotificationLevel::Info => format!("[{timestamp}] ℹ️  {}", notification.message),
        NotificationLevel::Success => format!("[{timestamp}] ✅ {}", notification.message),
        NotificationLevel::Error => format!("[{timestamp}] ❌ {}", notification.message),
    }
}

async fn print_notifications(mut notifications: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = notifications.recv().await {
        println!("{}", render_notification(&notification));
    }
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Removing background");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Show a spinner for as long as the pipeline state is loading
async fn drive_spinner(mut states: watch::Receiver<PipelineState>) {
    let mut spinner: Option<ProgressBar> = None;

    while states.changed().await.is_ok() {
        let loading = states.borrow_and_update().is_loading;
        match (loading, spinner.take()) {
            (true, None) => spinner = Some(new_spinner()),
            (true, Some(active)) => spinner = Some(active),
            (false, Some(active)) => active.finish_and_clear(),
            (false, None) => {},
        }
    }

    if let Some(active) = spinner {
        active.finish_and_clear();
    }
}
