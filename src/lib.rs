// Beat Funscript Core - beat/onset driven device script generation
// Media decoding, spectral flux analysis and a cancellable staged pipeline

// Module declarations
pub mod analysis;
pub mod config;
pub mod controller;
pub mod error;
pub mod media;
pub mod script;
pub mod sequencer;

// Re-exports for convenience
pub use analysis::{Event, FeatureExtractor, OnsetEnvelope, PulseDetector, StrengthMapper};
pub use config::{AppConfig, DetectorConfig, PipelineConfig};
pub use controller::{
    spawn_pipeline, CancelToken, ExecutionController, PipelineHandle, PipelineState,
    ProgressSink, ProgressUpdate, RunOutcome, RunSummary,
};
pub use error::{ErrorCode, PipelineError};
pub use media::{MediaLoader, Waveform};
pub use script::{default_output_path, Action, Script, ScriptMetadata, ScriptWriter};
pub use sequencer::ActionSequencer;
