use crate::compression::{Compressor, Outcome};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_supported(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Expands folders (recursively) into the image files they contain; plain
/// files pass through untouched so unsupported ones can still be reported.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_supported(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            inputs.extend(found);
        } else {
            inputs.push(path.clone());
        }
    }

    inputs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    Duplicate,
    Unsupported,
}

/// Files waiting for the next manual run, in insertion order.
#[derive(Debug, Default, Clone)]
pub struct PendingFiles {
    paths: Vec<PathBuf>,
}

impl PendingFiles {
    pub fn add(&mut self, path: PathBuf) -> Admission {
        if self.paths.contains(&path) {
            return Admission::Duplicate;
        }
        if !is_supported(&path) {
            return Admission::Unsupported;
        }
        self.paths.push(path);
        Admission::Queued
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Drops the given paths, keeping anything queued after they were taken.
    pub fn remove_all(&mut self, done: &[PathBuf]) {
        self.paths.retain(|path| !done.contains(path));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Queued,
    Unsupported,
    Processing,
    Done,
    Skipped,
    Failed,
}

impl LogStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Queued => "[QUEUED]",
            Self::Unsupported => "[UNSUPPORTED]",
            Self::Processing => "[PROCESSING]",
            Self::Done => "[OK]",
            Self::Skipped => "[SKIP]",
            Self::Failed => "[FAIL]",
        }
    }

    pub fn for_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Compressed { .. } | Outcome::Copied { .. } => Self::Done,
            Outcome::Skipped { .. } => Self::Skipped,
            Outcome::Failed { .. } => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub status: LogStatus,
    pub name: String,
    pub detail: String,
}

impl LogLine {
    pub fn new(status: LogStatus, name: impl Into<String>) -> Self {
        Self {
            status,
            name: name.into(),
            detail: String::new(),
        }
    }

    pub fn from_outcome(name: impl Into<String>, outcome: &Outcome) -> Self {
        Self {
            status: LogStatus::for_outcome(outcome),
            name: name.into(),
            detail: outcome.to_string(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.tag(), self.name)?;
        if !self.detail.is_empty() {
            write!(f, " - {}", self.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("select or drop some image files first")]
    NoFiles,
    #[error("save folder not found: {}", .0.display())]
    MissingDestination(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub index: usize,
    pub path: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Processed {} of {} files", self.succeeded, self.total)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// A manual run over a snapshot of the pending list, processed with the
/// options in force when it started.
#[derive(Debug, Clone)]
pub struct Batch {
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    compressor: Compressor,
    next: usize,
    summary: BatchSummary,
}

impl Batch {
    /// Checks preconditions without touching the files themselves.
    pub fn prepare(
        pending: &PendingFiles,
        output_dir: &Path,
        compressor: Compressor,
    ) -> Result<Self, BatchError> {
        if pending.is_empty() {
            return Err(BatchError::NoFiles);
        }
        if !output_dir.is_dir() {
            return Err(BatchError::MissingDestination(output_dir.to_path_buf()));
        }
        Ok(Self {
            files: pending.paths().to_vec(),
            output_dir: output_dir.to_path_buf(),
            compressor,
            next: 0,
            summary: BatchSummary {
                total: pending.len(),
                ..Default::default()
            },
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn next_item(&mut self) -> Option<BatchItem> {
        let path = self.files.get(self.next)?.clone();
        let item = BatchItem {
            index: self.next,
            path,
            output_dir: self.output_dir.clone(),
        };
        self.next += 1;
        Some(item)
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match LogStatus::for_outcome(outcome) {
            LogStatus::Skipped => self.summary.skipped += 1,
            LogStatus::Failed => self.summary.failed += 1,
            _ => self.summary.succeeded += 1,
        }
    }

    pub fn summary(&self) -> BatchSummary {
        self.summary
    }
}

/// Runs the whole batch on the calling thread, reporting each outcome.
pub fn run_blocking(mut batch: Batch, mut on_item: impl FnMut(&BatchItem, &Outcome)) -> BatchSummary {
    while let Some(item) = batch.next_item() {
        let outcome = batch.compressor.process(&item.path, &item.output_dir);
        batch.record(&outcome);
        on_item(&item, &outcome);
    }
    tracing::info!(summary = %batch.summary(), "batch complete");
    batch.summary()
}
