// Execution controller - runs the pipeline stages with progress and cancellation
//
// State machine:
//   Idle -> Loading -> Extracting -> Mapping -> Sequencing -> Writing -> Done
//   any non-terminal state -> Cancelled (checked at each transition)
//   any stage error        -> Failed
//
// Each stage owns whatever temporary artifacts it creates, so nothing is left
// on disk when a run stops early. The cancel flag is never consulted once
// Writing has started: the atomic persist either lands a complete script or
// nothing.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crate::analysis::{FeatureExtractor, PulseDetector, SpectralFluxDetector, StrengthMapper};
use crate::config::PipelineConfig;
use crate::error::{log_pipeline_error, PipelineError};
use crate::media::MediaLoader;
use crate::script::writer::analysis_dump_path;
use crate::script::{AnalysisDump, Script, ScriptMetadata, ScriptWriter};
use crate::sequencer::ActionSequencer;

pub mod cancel;
pub mod progress;

pub use cancel::CancelToken;
pub use progress::{
    progress_channel, NullSink, PipelineState, ProgressSink, ProgressUpdate,
    DEFAULT_PROGRESS_CAPACITY,
};

/// What a completed run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Events found by the detector
    pub event_count: usize,
    /// Actions that survived interval filtering
    pub action_count: usize,
    pub duration_secs: f64,
    pub output: PathBuf,
    /// Analysis dump path when visualization was requested
    pub analysis: Option<PathBuf>,
}

/// Terminal result of a run that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done(RunSummary),
    Cancelled,
}

/// Reports transitions and keeps the fraction non-decreasing
struct StageTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    fraction: f32,
}

impl<'a> StageTracker<'a> {
    fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            sink,
            fraction: 0.0,
        }
    }

    fn enter(&mut self, state: PipelineState) {
        self.fraction = state.fraction().unwrap_or(self.fraction).max(self.fraction);
        tracing::info!(
            "[Pipeline] {} ({:.0}%)",
            state.display_name(),
            self.fraction * 100.0
        );
        self.sink.report(ProgressUpdate {
            state,
            fraction: self.fraction,
        });
    }

    /// Cancellation checkpoint in front of every transition
    fn advance(&mut self, state: PipelineState, cancel: &CancelToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.enter(state);
        Ok(())
    }
}

/// Runs one input through loader, extractor, mapper, sequencer and writer
pub struct ExecutionController {
    config: PipelineConfig,
    loader: MediaLoader,
    extractor: FeatureExtractor,
    visualize: bool,
}

impl ExecutionController {
    /// Controller with the bundled media loader and spectral flux detector
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            loader: MediaLoader::new(),
            extractor: FeatureExtractor::new(Box::new(SpectralFluxDetector::new())),
            visualize: false,
        }
    }

    pub fn with_loader(mut self, loader: MediaLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn PulseDetector>) -> Self {
        self.extractor = FeatureExtractor::new(detector);
        self
    }

    /// Also write `<output stem>_analysis.json` after the script
    pub fn with_visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline on the calling thread
    ///
    /// # Returns
    /// * `Ok(RunOutcome::Done)` - script written to `output`
    /// * `Ok(RunOutcome::Cancelled)` - stopped at a stage boundary, nothing written
    /// * `Err(PipelineError)` - a stage failed; `Failed` has been reported
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunOutcome, PipelineError> {
        let mut tracker = StageTracker::new(sink);
        tracker.enter(PipelineState::Idle);

        match self.run_stages(input, output, cancel, &mut tracker) {
            Ok(summary) => {
                tracker.enter(PipelineState::Done);
                tracing::info!(
                    "[Pipeline] Total actions: {} ({} events, {:.1}s) -> {:?}",
                    summary.action_count,
                    summary.event_count,
                    summary.duration_secs,
                    summary.output
                );
                Ok(RunOutcome::Done(summary))
            }
            Err(PipelineError::Cancelled) => {
                tracker.enter(PipelineState::Cancelled);
                tracing::info!("[Pipeline] Cancelled before writing {:?}", output);
                Ok(RunOutcome::Cancelled)
            }
            Err(err) => {
                log_pipeline_error(&err, "ExecutionController::run");
                tracker.enter(PipelineState::Failed);
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
        tracker: &mut StageTracker<'_>,
    ) -> Result<RunSummary, PipelineError> {
        self.config.validate()?;

        tracker.advance(PipelineState::Loading, cancel)?;
        let waveform = self.loader.load(input, self.config.sample_rate)?;

        tracker.advance(PipelineState::Extracting, cancel)?;
        let (raw_events, envelope) = self.extractor.extract(&waveform, &self.config)?;

        tracker.advance(PipelineState::Mapping, cancel)?;
        let events = StrengthMapper::map(&raw_events, &envelope);

        tracker.advance(PipelineState::Sequencing, cancel)?;
        let actions = ActionSequencer::new(&self.config).sequence(&events);

        tracker.advance(PipelineState::Writing, cancel)?;
        let duration_secs = waveform.duration_secs();
        let script = Script::new(
            actions,
            self.config.range,
            self.config.inverted,
            ScriptMetadata::for_input(input, duration_secs),
        );
        ScriptWriter::write(&script, output)?;

        let analysis = if self.visualize {
            let path = analysis_dump_path(output);
            let dump = AnalysisDump::new(&envelope, &events, waveform.sample_rate(), duration_secs);
            ScriptWriter::write_analysis(&dump, &path)?;
            Some(path)
        } else {
            None
        };

        Ok(RunSummary {
            event_count: events.len(),
            action_count: script.actions.len(),
            duration_secs,
            output: output.to_path_buf(),
            analysis,
        })
    }
}

/// Handle to a pipeline running on its own worker thread
pub struct PipelineHandle {
    cancel: CancelToken,
    progress: rtrb::Consumer<ProgressUpdate>,
    worker: JoinHandle<Result<RunOutcome, PipelineError>>,
}

impl PipelineHandle {
    /// Request cancellation at the next stage boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next pending progress update, if any
    pub fn try_progress(&mut self) -> Option<ProgressUpdate> {
        self.progress.pop().ok()
    }

    /// Every pending progress update, oldest first
    pub fn drain_progress(&mut self) -> Vec<ProgressUpdate> {
        std::iter::from_fn(|| self.progress.pop().ok()).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its terminal outcome
    pub fn join(self) -> Result<RunOutcome, PipelineError> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::io(
                "running pipeline worker",
                "worker thread panicked",
            )),
        }
    }
}

/// Start a run on a dedicated `pipeline-worker` thread
///
/// Progress goes through a bounded rtrb ring; the outcome is always
/// available from `PipelineHandle::join` even if updates were dropped.
pub fn spawn_pipeline(
    controller: ExecutionController,
    input: PathBuf,
    output: PathBuf,
) -> Result<PipelineHandle, PipelineError> {
    let cancel = CancelToken::new();
    let (mut producer, consumer) = progress_channel(DEFAULT_PROGRESS_CAPACITY);
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name("pipeline-worker".to_string())
        .spawn(move || controller.run(&input, &output, &worker_cancel, &mut producer))
        .map_err(|err| PipelineError::io("spawning pipeline worker", err))?;

    Ok(PipelineHandle {
        cancel,
        progress: consumer,
        worker,
    })
}
