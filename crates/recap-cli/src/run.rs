use crate::config::ConfigPaths;
use recap_core::{PlanMode, Reduction};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

const INPUT_FILE: &str = "input.txt";
const OUTPUT_FILE: &str = "output.md";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run io error: {0}")]
    Io(#[from] io::Error),
    #[error("run metadata error: {0}")]
    Metadata(#[from] toml::ser::Error),
    #[error("run time error: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    /// Finished, but at least one chunk used its fallback text.
    Degraded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub id: String,
    pub task: String,
    pub provider: String,
    pub model: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: RunStatus,
    pub mode: Option<PlanMode>,
    pub chunk_count: usize,
    pub failed_chunks: Vec<usize>,
    pub error: Option<String>,
    pub input_file: String,
    pub output_file: String,
}

impl RunMetadata {
    pub fn new(task: &str, provider: &str, model: &str) -> Result<Self, RunError> {
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            task: task.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            start_time: now_rfc3339()?,
            end_time: None,
            status: RunStatus::Running,
            mode: None,
            chunk_count: 0,
            failed_chunks: Vec::new(),
            error: None,
            input_file: INPUT_FILE.to_string(),
            output_file: OUTPUT_FILE.to_string(),
        })
    }
}

/// One recorded run under `runs/<id>/`.
#[derive(Debug)]
pub struct RunRecord {
    dir: PathBuf,
    metadata: RunMetadata,
}

impl RunRecord {
    pub fn start(
        paths: &ConfigPaths,
        metadata: RunMetadata,
        input: &str,
    ) -> Result<Self, RunError> {
        let dir = paths.runs_dir.join(&metadata.id);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(&metadata.input_file), input.as_bytes())?;
        let record = Self { dir, metadata };
        record.write_metadata()?;
        Ok(record)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn finish(mut self, reduction: Option<&Reduction>, output: &str) -> Result<(), RunError> {
        if let Some(reduction) = reduction {
            self.metadata.mode = Some(reduction.mode);
            self.metadata.chunk_count = reduction.chunk_count;
            self.metadata.failed_chunks = reduction.failed_chunks.clone();
        }
        self.metadata.status = if reduction.is_some_and(Reduction::is_degraded) {
            RunStatus::Degraded
        } else {
            RunStatus::Completed
        };
        write_atomic(&self.dir.join(&self.metadata.output_file), output.as_bytes())?;
        self.close()
    }

    pub fn fail(mut self, status: RunStatus, error: &str) -> Result<(), RunError> {
        self.metadata.status = status;
        self.metadata.error = Some(error.to_string());
        self.close()
    }

    fn close(mut self) -> Result<(), RunError> {
        self.metadata.end_time = Some(now_rfc3339()?);
        self.write_metadata()
    }

    fn write_metadata(&self) -> Result<(), RunError> {
        let contents = toml::to_string_pretty(&self.metadata)?;
        write_atomic(&self.dir.join("metadata.toml"), contents.as_bytes())
    }
}

fn now_rfc3339() -> Result<String, RunError> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), RunError> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("run path missing parent directory"))?;
    let tmp_path = parent.join(".tmp-write");
    fs::write(&tmp_path, contents)?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{RunMetadata, RunRecord, RunStatus};
    use crate::config::ConfigPaths;
    use recap_core::{PlanMode, Reduction};
    use std::fs;

    fn paths() -> (tempfile::TempDir, ConfigPaths) {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("recap"));
        (temp, paths)
    }

    fn read_metadata(dir: &std::path::Path) -> RunMetadata {
        let content = fs::read_to_string(dir.join("metadata.toml")).unwrap();
        toml::from_str(&content).unwrap()
    }

    #[test]
    fn start_writes_input_and_running_metadata() {
        let (_temp, paths) = paths();
        let metadata = RunMetadata::new("summarize", "ollama", "qwen3:30b-a3b").unwrap();
        let record = RunRecord::start(&paths, metadata, "the transcript").unwrap();

        assert!(record.dir().starts_with(&paths.runs_dir));
        assert_eq!(
            fs::read_to_string(record.dir().join("input.txt")).unwrap(),
            "the transcript"
        );
        let stored = read_metadata(record.dir());
        assert_eq!(stored.status, RunStatus::Running);
        assert_eq!(stored.id, record.metadata().id);
        assert!(stored.end_time.is_none());
    }

    #[test]
    fn finish_records_degraded_reduction() {
        let (_temp, paths) = paths();
        let metadata = RunMetadata::new("optimize", "openai", "gpt-4o-mini").unwrap();
        let record = RunRecord::start(&paths, metadata, "input").unwrap();
        let dir = record.dir().to_path_buf();
        let reduction = Reduction {
            text: "out".to_string(),
            mode: PlanMode::Chunked,
            chunk_count: 3,
            failed_chunks: vec![1],
        };
        record.finish(Some(&reduction), "out").unwrap();

        let stored = read_metadata(&dir);
        assert_eq!(stored.status, RunStatus::Degraded);
        assert_eq!(stored.mode, Some(PlanMode::Chunked));
        let raw = fs::read_to_string(dir.join("metadata.toml")).unwrap();
        assert!(raw.contains("mode = \"chunked\""));
        assert_eq!(stored.chunk_count, 3);
        assert_eq!(stored.failed_chunks, vec![1]);
        assert!(stored.end_time.is_some());
        assert_eq!(fs::read_to_string(dir.join("output.md")).unwrap(), "out");
        assert!(!dir.join(".tmp-write").exists());
    }

    #[test]
    fn fail_keeps_the_error() {
        let (_temp, paths) = paths();
        let metadata = RunMetadata::new("translate", "ollama", "m").unwrap();
        let record = RunRecord::start(&paths, metadata, "input").unwrap();
        let dir = record.dir().to_path_buf();
        record.fail(RunStatus::Cancelled, "cancelled").unwrap();

        let stored = read_metadata(&dir);
        assert_eq!(stored.status, RunStatus::Cancelled);
        assert_eq!(stored.error.as_deref(), Some("cancelled"));
        assert!(!dir.join("output.md").exists());
    }
}
