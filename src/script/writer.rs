// ScriptWriter - atomic JSON persistence
//
// Documents are serialized into a NamedTempFile next to the destination,
// synced, then renamed over it. A failure at any step leaves the destination
// untouched and the temp file is removed by its guard.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::analysis::{Event, OnsetEnvelope};
use crate::error::PipelineError;
use crate::script::Script;

/// Writes scripts and analysis dumps to disk
pub struct ScriptWriter;

impl ScriptWriter {
    /// Persist `script` at `path` as pretty-printed JSON
    pub fn write(script: &Script, path: &Path) -> Result<(), PipelineError> {
        write_json_atomic(script, path)?;
        log::info!(
            "[ScriptWriter] Wrote {} actions to {:?}",
            script.actions.len(),
            path
        );
        Ok(())
    }

    /// Persist the analysis dump next to the script
    pub fn write_analysis(dump: &AnalysisDump, path: &Path) -> Result<(), PipelineError> {
        write_json_atomic(dump, path)?;
        log::info!("[ScriptWriter] Wrote analysis dump to {:?}", path);
        Ok(())
    }
}

/// Serialize any value to `path` through a temp file + rename
pub fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<(), PipelineError> {
    let operation = || format!("writing {}", path.display());

    let text = serde_json::to_string_pretty(value)
        .map_err(|err| PipelineError::io(operation(), err))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".beat_funscript-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|err| PipelineError::io(operation(), err))?;

    write_synced(&mut file, text.as_bytes()).map_err(|err| PipelineError::io(operation(), err))?;

    file.persist(path)
        .map_err(|err| PipelineError::io(operation(), err.error))?;
    Ok(())
}

fn write_synced(file: &mut tempfile::NamedTempFile, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.as_file().sync_all()
}

/// Sidecar path for the analysis dump: `<output stem>_analysis.json`
pub fn analysis_dump_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    output.with_file_name(format!("{}_analysis.json", stem))
}

/// Envelope and events of one run, for external plotting
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct AnalysisDump {
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub hop_seconds: f64,
    pub envelope: Vec<f32>,
    /// Events with normalized strengths
    pub events: Vec<Event>,
}

impl AnalysisDump {
    pub fn new(envelope: &OnsetEnvelope, events: &[Event], sample_rate: u32, duration_secs: f64) -> Self {
        Self {
            sample_rate,
            duration_secs,
            hop_seconds: envelope.hop_seconds(),
            envelope: envelope.values().to_vec(),
            events: events.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Action, ScriptMetadata};

    fn sample_script() -> Script {
        Script::new(
            vec![Action { at: 0, pos: 50 }, Action { at: 500, pos: 95 }],
            100,
            false,
            ScriptMetadata::default(),
        )
    }

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map(|e| e == "tmp").unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_write_roundtrips_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.funscript");

        ScriptWriter::write(&sample_script(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(Script::from_json(&text).unwrap(), sample_script());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.funscript");
        std::fs::write(&path, "stale").unwrap();

        ScriptWriter::write(&sample_script(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"version\": \"1.0\""));
    }

    #[test]
    fn test_write_into_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.funscript");

        match ScriptWriter::write(&sample_script(), &path) {
            Err(PipelineError::Io { .. }) => {}
            other => panic!("Expected Io, got {:?}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_persist_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a rename
        let path = dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep.txt"), "x").unwrap();

        assert!(ScriptWriter::write(&sample_script(), &path).is_err());
        assert!(path.join("keep.txt").exists());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_analysis_dump_path() {
        assert_eq!(
            analysis_dump_path(Path::new("/out/song.funscript")),
            PathBuf::from("/out/song_analysis.json")
        );
    }

    #[test]
    fn test_analysis_dump_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song_analysis.json");
        let envelope = OnsetEnvelope::new(vec![0.0, 1.0, 0.5], 512, 22_050);
        let events = vec![Event::new(0.5, 1.0)];

        let dump = AnalysisDump::new(&envelope, &events, 22_050, 3.0);
        ScriptWriter::write_analysis(&dump, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sample_rate"], 22_050);
        assert_eq!(value["envelope"].as_array().unwrap().len(), 3);
        assert_eq!(value["events"][0]["timestamp"], 0.5);
    }
}
