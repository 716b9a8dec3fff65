// Error types for the beat-to-script pipeline
//
// This module defines the typed error used by every pipeline stage,
// with stable numeric codes so front ends can map failures to hints.

mod pipeline;

pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the CLI and any interactive front end.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
