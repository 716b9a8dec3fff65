// Script model - the persisted device-control document
//
// A script is the only artifact a run leaves behind (besides the optional
// analysis dump). Field order follows the JSON layout players expect.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod writer;

pub use writer::{AnalysisDump, ScriptWriter};

/// Script format version written into every document
pub const SCRIPT_VERSION: &str = "1.0";

/// Creator tag stored in the metadata block
pub const SCRIPT_CREATOR: &str = "beat_funscript";

/// File extension of generated scripts
pub const SCRIPT_EXTENSION: &str = "funscript";

/// One position command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Milliseconds from the start of the media
    pub at: u64,
    /// Position, 0..=100
    pub pos: u8,
}

/// Descriptive block carried alongside the actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub creator: String,
    pub description: String,
    /// Media duration in whole seconds
    pub duration: u64,
    pub license: String,
    pub notes: String,
    pub performers: Vec<String>,
    pub script_url: String,
    pub tags: Vec<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub video_url: String,
}

impl ScriptMetadata {
    /// Metadata for a script generated from `input`
    pub fn for_input(input: &Path, duration_secs: f64) -> Self {
        let title = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            creator: SCRIPT_CREATOR.to_string(),
            description: String::new(),
            duration: duration_secs.max(0.0) as u64,
            license: String::new(),
            notes: String::new(),
            performers: Vec::new(),
            script_url: String::new(),
            tags: Vec::new(),
            title,
            kind: "basic".to_string(),
            video_url: String::new(),
        }
    }
}

impl Default for ScriptMetadata {
    fn default() -> Self {
        Self::for_input(Path::new(""), 0.0)
    }
}

/// Complete script document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub version: String,
    pub inverted: bool,
    pub range: u8,
    pub actions: Vec<Action>,
    pub metadata: ScriptMetadata,
}

impl Script {
    pub fn new(actions: Vec<Action>, range: u8, inverted: bool, metadata: ScriptMetadata) -> Self {
        Self {
            version: SCRIPT_VERSION.to_string(),
            inverted,
            range,
            actions,
            metadata,
        }
    }

    /// Parse a script document from JSON text
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Timestamp of the last action, or 0 for an empty script
    pub fn last_action_ms(&self) -> u64 {
        self.actions.last().map(|a| a.at).unwrap_or(0)
    }
}

/// Output path a front end suggests for `input`: same directory, `<stem>.funscript`
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension(SCRIPT_EXTENSION)
}
