use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use beat_funscript::config::AppConfig;
use beat_funscript::controller::{
    spawn_pipeline, ExecutionController, PipelineHandle, ProgressUpdate, RunOutcome,
};
use beat_funscript::error::ErrorCode;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Exit code for a run stopped with Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// How often the supervisor polls the worker for progress
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    name = "funscript_cli",
    about = "Generate a beat-synchronized funscript from an audio or video file"
)]
struct Cli {
    /// Audio or video file to analyze
    input: PathBuf,
    /// Output script path
    #[arg(long)]
    funscript: PathBuf,
    /// Use every detected onset instead of tracked beats
    #[arg(long)]
    use_onset: bool,
    /// Onset sensitivity, 0..1 (default 0.5)
    #[arg(long)]
    onset_threshold: Option<f32>,
    /// Beat trimming sensitivity, 0..1 (default 0.5)
    #[arg(long)]
    beat_threshold: Option<f32>,
    /// Also write <output stem>_analysis.json with envelope and events
    #[arg(long)]
    visualize: bool,
    /// Stroke range, 1..100 (default 100)
    #[arg(long)]
    range: Option<u8>,
    /// Mirror every position
    #[arg(long)]
    inverted: bool,
    /// Minimum spacing between actions in ms (default 50)
    #[arg(long)]
    min_interval_ms: Option<u32>,
    /// Analysis sample rate in Hz (default 22050)
    #[arg(long)]
    sample_rate: Option<u32>,
    /// JSON configuration file; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
    /// Render a progress line on stderr
    #[arg(long)]
    progress: bool,
}

/// Machine-readable line printed on success
#[derive(Serialize)]
struct RunReport {
    output: PathBuf,
    analysis: Option<PathBuf>,
    events: usize,
    actions: usize,
    duration_secs: f64,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let controller = build_controller(&cli);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("creating Tokio runtime")?;

    let handle = spawn_pipeline(controller, cli.input.clone(), cli.funscript.clone())
        .context("starting pipeline worker")?;
    let handle = runtime.block_on(supervise(handle, cli.progress));

    match handle.join() {
        Ok(RunOutcome::Done(summary)) => {
            tracing::info!("Total actions: {}", summary.action_count);
            let report = RunReport {
                output: summary.output,
                analysis: summary.analysis,
                events: summary.event_count,
                actions: summary.action_count,
                duration_secs: summary.duration_secs,
            };
            println!("{}", serde_json::to_string(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Cancelled) => {
            eprintln!("Cancelled; no script was written");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(err) => {
            eprintln!("Error [{}]: {}", err.code(), err.message());
            eprintln!("Hint: {}", err.remediation_hint());
            Ok(ExitCode::from(1))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file first, then explicit flags on top
fn build_controller(cli: &Cli) -> ExecutionController {
    let mut config = cli
        .config
        .as_ref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default()
        .pipeline;

    if let Some(value) = cli.onset_threshold {
        config.onset_threshold = value;
    }
    if let Some(value) = cli.beat_threshold {
        config.beat_threshold = value;
    }
    if let Some(value) = cli.range {
        config.range = value;
    }
    if let Some(value) = cli.min_interval_ms {
        config.min_interval_ms = value;
    }
    if let Some(value) = cli.sample_rate {
        config.sample_rate = value;
    }
    config.use_onset |= cli.use_onset;
    config.inverted |= cli.inverted;

    ExecutionController::new(config).with_visualize(cli.visualize)
}

/// Poll progress until the worker finishes; Ctrl-C requests cancellation
async fn supervise(mut handle: PipelineHandle, show_progress: bool) -> PipelineHandle {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut listening = true;

    loop {
        tokio::select! {
            signal = &mut ctrl_c, if listening => {
                listening = false;
                match signal {
                    Ok(()) => {
                        tracing::warn!("Interrupt received, cancelling at next stage boundary");
                        handle.cancel();
                    }
                    Err(err) => tracing::warn!("Failed to listen for Ctrl-C: {}", err),
                }
            }
            _ = ticker.tick() => {
                // Sample before draining so the final updates are not missed
                let finished = handle.is_finished();
                for update in handle.drain_progress() {
                    if show_progress {
                        render_progress(&update);
                    }
                }
                if finished {
                    break;
                }
            }
        }
    }

    if show_progress {
        eprintln!();
    }
    handle
}

fn render_progress(update: &ProgressUpdate) {
    let width = 30usize;
    let filled = ((update.fraction * width as f32).round() as usize).min(width);
    eprint!(
        "\r[{}{}] {:>3.0}% {:<20}",
        "#".repeat(filled),
        "-".repeat(width - filled),
        update.fraction * 100.0,
        update.state.display_name()
    );
    let _ = std::io::stderr().flush();
}
