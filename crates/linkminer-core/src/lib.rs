use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod aggregate;
pub mod annotate;
pub mod checkpoint;
pub mod config_file;
pub mod pool;
pub mod table;

// Re-export for convenience
pub use aggregate::{DEFAULT_TABLE_NAME, NAME_FIELD, aggregate_directory, normalize_name};
pub use annotate::{Enricher, annotate_document};
pub use checkpoint::{Resolution, annotated_path, discover_inputs, is_annotated, resolve};
pub use pool::run_annotations;
pub use table::RecordTable;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("enrichment failed: {0}")]
    Enrich(String),
    #[error("aggregate table error: {0}")]
    Table(String),
}

/// Outcome of processing a single input document.
///
/// Failures carry the reason but are never retried within a run; a failed
/// item leaves its output missing, so the checkpoint resolver re-queues it
/// on the next invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A new annotated document was written.
    Annotated(PathBuf),
    /// The output already existed; no enrichment call was made.
    AlreadyDone(PathBuf),
    /// Enrichment or I/O failed; no output was written.
    Failed { input: PathBuf, reason: String },
}

impl ItemOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// Summary counts for a completed annotation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub annotated: usize,
    pub already_done: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Annotated(_) => summary.annotated += 1,
                ItemOutcome::AlreadyDone(_) => summary.already_done += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.annotated + self.already_done + self.failed
    }
}

/// Progress events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Checkpoint resolution finished: `pending` inputs need work,
    /// `done` already have outputs on disk.
    Resolved { pending: usize, done: usize },
    Annotating {
        index: usize,
        total: usize,
        input: PathBuf,
    },
    Annotated {
        index: usize,
        total: usize,
        output: PathBuf,
    },
    /// The defensive in-worker re-check found the output already present.
    Skipped {
        index: usize,
        total: usize,
        output: PathBuf,
    },
    Failed {
        index: usize,
        total: usize,
        input: PathBuf,
        reason: String,
    },
    /// One annotated document scanned during aggregation.
    Aggregating { scanned: usize, total: usize },
}

/// Configuration for the annotation pipeline.
///
/// Built once at process start (flags > env > config file) and passed by
/// reference to each component; components never re-resolve settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fixed worker-pool size for annotation.
    pub num_workers: usize,
    /// File name of the persisted aggregate table, keyed by scan directory.
    pub table_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

/// Run the full pipeline over a directory of structured documents:
/// resolve the checkpoint state, annotate pending inputs across the worker
/// pool, then aggregate every annotated document into the persisted table.
///
/// The aggregate is a cache: when the table file already exists it is loaded
/// and returned without re-scanning the directory.
pub async fn run_pipeline(
    dir: &Path,
    inputs: Vec<PathBuf>,
    enricher: Arc<dyn Enricher>,
    config: &PipelineConfig,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<(RunSummary, RecordTable), CoreError> {
    let progress = Arc::new(progress);

    let resolution = resolve(inputs);
    progress(ProgressEvent::Resolved {
        pending: resolution.pending.len(),
        done: resolution.expected.len() - resolution.pending.len(),
    });

    let outcomes = run_annotations(
        resolution.pending,
        enricher,
        config.num_workers,
        progress.clone(),
        cancel,
    )
    .await;
    let summary = RunSummary::from_outcomes(&outcomes);

    let table = aggregate_directory(dir, config, progress.as_ref())?;
    Ok((summary, table))
}
