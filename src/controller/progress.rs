// Progress reporting for pipeline runs
//
// The worker pushes one ProgressUpdate per state transition. The default
// sink is the producer half of an rtrb ring; a full ring drops the update
// instead of blocking the worker.

use rtrb::{Consumer, Producer, RingBuffer};

/// Default ring capacity; a run produces at most eight updates
pub const DEFAULT_PROGRESS_CAPACITY: usize = 16;

/// Pipeline state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PipelineState {
    Idle,
    Loading,
    Extracting,
    Mapping,
    Sequencing,
    Writing,
    Done,
    Cancelled,
    Failed,
}

impl PipelineState {
    /// Fraction reported when entering this state
    ///
    /// # Returns
    /// * `Some(fraction)` - fixed stage fraction
    /// * `None` - Cancelled/Failed, which repeat the previous fraction
    pub fn fraction(&self) -> Option<f32> {
        match self {
            PipelineState::Idle => Some(0.0),
            PipelineState::Loading => Some(0.05),
            PipelineState::Extracting => Some(0.30),
            PipelineState::Mapping => Some(0.70),
            PipelineState::Sequencing => Some(0.80),
            PipelineState::Writing => Some(0.90),
            PipelineState::Done => Some(1.0),
            PipelineState::Cancelled | PipelineState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Cancelled | PipelineState::Failed
        )
    }

    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Loading => "Loading media",
            PipelineState::Extracting => "Extracting beats",
            PipelineState::Mapping => "Mapping strengths",
            PipelineState::Sequencing => "Sequencing actions",
            PipelineState::Writing => "Writing script",
            PipelineState::Done => "Done",
            PipelineState::Cancelled => "Cancelled",
            PipelineState::Failed => "Failed",
        }
    }
}

/// One state transition
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgressUpdate {
    pub state: PipelineState,
    /// Overall completion in `[0, 1]`, never decreasing within a run
    pub fraction: f32,
}

/// Receiver of progress updates
pub trait ProgressSink: Send {
    /// Deliver one update; must not block
    fn report(&mut self, update: ProgressUpdate);
}

impl ProgressSink for Producer<ProgressUpdate> {
    fn report(&mut self, update: ProgressUpdate) {
        if self.push(update).is_err() {
            tracing::debug!(
                "[Progress] Ring full, dropped update {:?} ({:.2})",
                update.state,
                update.fraction
            );
        }
    }
}

/// Discards every update
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&mut self, _update: ProgressUpdate) {}
}

/// Collects updates in memory
impl ProgressSink for Vec<ProgressUpdate> {
    fn report(&mut self, update: ProgressUpdate) {
        self.push(update);
    }
}

/// Create a bounded SPSC progress channel
pub fn progress_channel(capacity: usize) -> (Producer<ProgressUpdate>, Consumer<ProgressUpdate>) {
    RingBuffer::new(capacity.max(1))
}
