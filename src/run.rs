//! Running OCR over an entire directory tree, one batch at a time.
//!
//! A [`Run`] moves through three states:
//!
//! ```text
//! Idle -> Running -> (Stopping) -> Idle
//! ```
//!
//! Batches run strictly in order. Between batches, we check the run's
//! [`CancellationFlag`], and if it has been set we stop before starting the
//! next batch. A batch which has started always runs to completion.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use indicatif::ProgressBar;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    batch::{BatchSize, run_batch},
    discover::discover,
    error::{OcrFailure, RunError},
    mirror::{mirror_path, output_root_for},
    ocr::{Job, OcrEngine},
    prelude::*,
    worker_pool::WorkerPool,
};

/// User-supplied settings for a run, before validation.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// The folder to OCR.
    pub input_root: PathBuf,
    /// Files per batch. Must be positive.
    pub batch_size: i64,
    /// Max OCR processes at once. Must be positive.
    pub concurrency_limit: usize,
}

/// Where a run is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Not doing anything.
    Idle,
    /// Processing batches.
    Running,
    /// A stop was requested and observed; no more batches will start.
    Stopping,
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every batch ran.
    Completed,
    /// We stopped early because a stop was requested.
    Stopped,
}

/// Summary of a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// How many PDFs we found.
    pub file_count: usize,
    /// How many batches we planned.
    pub batch_count: usize,
    /// How many batches actually ran.
    pub batches_completed: usize,
    /// How many files were OCRed successfully.
    pub succeeded: usize,
    /// Every file which failed.
    pub failures: Vec<OcrFailure>,
}

impl RunReport {
    /// Fraction of attempted files which failed. Zero if nothing was
    /// attempted.
    pub fn failure_rate(&self) -> f32 {
        let attempted = self.succeeded + self.failures.len();
        if attempted == 0 {
            0.0
        } else {
            self.failures.len() as f32 / attempted as f32
        }
    }
}

/// A shared flag used to ask a run to stop after its current batch.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop. Safe to call more than once.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A validated run, ready to execute.
pub struct Run {
    input_root: PathBuf,
    batch_size: BatchSize,
    pool: WorkerPool,
    engine: Arc<dyn OcrEngine>,
    cancel: CancellationFlag,
    state: watch::Sender<RunState>,
    progress: ProgressBar,
}

impl Run {
    /// Validate `config`. This touches neither the input nor the output tree.
    pub fn new(config: &RunConfig, engine: Arc<dyn OcrEngine>) -> Result<Self, RunError> {
        let batch_size = BatchSize::new(config.batch_size)?;
        let limit = NonZeroUsize::new(config.concurrency_limit).ok_or_else(|| {
            RunError::Configuration("concurrency limit must be at least 1".to_owned())
        })?;
        let (state, _) = watch::channel(RunState::Idle);
        Ok(Self {
            input_root: config.input_root.clone(),
            batch_size,
            pool: WorkerPool::new(limit),
            engine,
            cancel: CancellationFlag::new(),
            state,
            progress: ProgressBar::hidden(),
        })
    }

    /// Use an existing cancellation flag instead of a fresh one.
    pub fn with_cancellation_flag(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report per-file progress on `progress`. Its length will be set once we
    /// know how many files there are.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Watch this run's [`RunState`].
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Spawn this run in the background.
    pub fn start(self) -> RunHandle {
        // Reset before spawning, so an immediate `request_stop` isn't lost.
        self.cancel.reset();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.execute_until_idle());
        RunHandle { cancel, task }
    }

    /// Run every batch, stopping early if our cancellation flag is set.
    pub async fn execute(self) -> Result<RunReport, RunError> {
        self.cancel.reset();
        self.execute_until_idle().await
    }

    #[instrument(level = "info", name = "run", skip_all, fields(input_root = ?self.input_root))]
    async fn execute_until_idle(self) -> Result<RunReport, RunError> {
        self.state.send_replace(RunState::Running);
        let result = self.execute_batches().await;
        self.cancel.reset();
        self.state.send_replace(RunState::Idle);
        result
    }

    async fn execute_batches(&self) -> Result<RunReport, RunError> {
        let input_root = tokio::fs::canonicalize(&self.input_root)
            .await
            .map_err(|err| RunError::filesystem(&self.input_root, err))?;
        let output_root = output_root_for(&input_root)?;
        let files = discover(&input_root).await?;
        tokio::fs::create_dir_all(&output_root)
            .await
            .map_err(|err| RunError::filesystem(&output_root, err))?;

        let batch_count = self.batch_size.batch_count(files.len());
        info!(
            files = files.len(),
            batches = batch_count,
            batch_size = self.batch_size.get(),
            jobs = self.pool.limit().get(),
            output_root = ?output_root,
            "Starting OCR run"
        );
        self.progress.set_length(files.len() as u64);

        let mut report = RunReport {
            outcome: RunOutcome::Completed,
            input_root: input_root.clone(),
            output_root: output_root.clone(),
            file_count: files.len(),
            batch_count,
            batches_completed: 0,
            succeeded: 0,
            failures: Vec::new(),
        };

        for (idx, batch) in self.batch_size.partition(&files).enumerate() {
            if idx > 0 && self.cancel.is_set() {
                self.state.send_replace(RunState::Stopping);
                info!(
                    skipped_batches = batch_count - idx,
                    "Stop requested, not starting remaining batches"
                );
                report.outcome = RunOutcome::Stopped;
                break;
            }

            info!(batch = idx + 1, of = batch_count, files = batch.len(), "Starting batch");
            let outcome = run_batch(
                &self.pool,
                &self.engine,
                &input_root,
                &output_root,
                batch,
                &self.progress,
            )
            .await?;
            info!(
                batch = idx + 1,
                of = batch_count,
                succeeded = outcome.succeeded,
                failed = outcome.failures.len(),
                "Finished batch"
            );
            report.batches_completed += 1;
            report.succeeded += outcome.succeeded;
            report.failures.extend(outcome.failures);
        }
        Ok(report)
    }
}

/// Validate `config` and start a run in the background.
pub fn start(config: &RunConfig, engine: Arc<dyn OcrEngine>) -> Result<RunHandle, RunError> {
    Ok(Run::new(config, engine)?.start())
}

/// A handle to a run executing in the background.
pub struct RunHandle {
    cancel: CancellationFlag,
    task: JoinHandle<Result<RunReport, RunError>>,
}

impl RunHandle {
    /// Ask the run to stop once its current batch finishes.
    pub fn request_stop(&self) {
        self.cancel.set();
    }

    /// A copy of the run's cancellation flag, for use by signal handlers.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Wait for the run to finish, either normally or because it was stopped.
    pub async fn wait(self) -> Result<RunReport> {
        let report = self.task.await.context("OCR run task failed")??;
        Ok(report)
    }
}

/// A run's planned batches, computed without OCRing or creating anything.
#[derive(Debug, Serialize)]
pub struct PlannedBatch {
    /// 1-based batch number.
    pub batch: usize,
    pub jobs: Vec<Job>,
}

/// Work out which files a run would process, and in which batches.
#[instrument(level = "debug")]
pub async fn plan(input_root: &Path, batch_size: i64) -> Result<Vec<PlannedBatch>, RunError> {
    let batch_size = BatchSize::new(batch_size)?;
    let input_root = tokio::fs::canonicalize(input_root)
        .await
        .map_err(|err| RunError::filesystem(input_root, err))?;
    let output_root = output_root_for(&input_root)?;
    let files = discover(&input_root).await?;
    batch_size
        .partition(&files)
        .enumerate()
        .map(|(idx, batch)| -> Result<PlannedBatch, RunError> {
            let jobs = batch
                .iter()
                .map(|input_path| {
                    Ok(Job {
                        input_path: input_path.to_owned(),
                        output_path: mirror_path(&input_root, input_path, &output_root)?,
                    })
                })
                .collect::<Result<Vec<_>, RunError>>()?;
            Ok(PlannedBatch {
                batch: idx + 1,
                jobs,
            })
        })
        .collect()
}
