//! Splitting files into batches, and running one batch at a time.

use std::{num::NonZeroUsize, sync::Arc};

use futures::future::join_all;
use indicatif::ProgressBar;

use crate::{
    error::{OcrFailure, RunError},
    mirror::mirror,
    ocr::{Job, OcrEngine},
    prelude::*,
    worker_pool::WorkerPool,
};

/// The default number of files per batch.
pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// A validated, positive batch size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSize(NonZeroUsize);

impl BatchSize {
    /// Validate a user-supplied batch size. Zero and negative sizes are
    /// rejected.
    pub fn new(raw: i64) -> Result<Self, RunError> {
        usize::try_from(raw)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(BatchSize)
            .ok_or_else(|| {
                RunError::Configuration(format!(
                    "batch size must be a positive integer, got {raw}"
                ))
            })
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    /// How many batches will `file_count` files need?
    pub fn batch_count(self, file_count: usize) -> usize {
        file_count.div_ceil(self.get())
    }

    /// Split `files` into batches. Every batch but the last is full.
    pub fn partition<T>(self, files: &[T]) -> std::slice::Chunks<'_, T> {
        files.chunks(self.get())
    }
}

/// What happened to a single batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Files which were OCRed successfully.
    pub succeeded: usize,
    /// Files which failed, in no particular order.
    pub failures: Vec<OcrFailure>,
}

/// OCR every file in `files`, running up to `pool.limit()` at once.
///
/// Returns once every file has finished, successfully or not. Failures are
/// logged and collected; only a failure to create output directories aborts
/// the batch.
#[instrument(level = "debug", skip_all, fields(files = files.len()))]
pub async fn run_batch(
    pool: &WorkerPool,
    engine: &Arc<dyn OcrEngine>,
    input_root: &Path,
    output_root: &Path,
    files: &[PathBuf],
    progress: &ProgressBar,
) -> Result<BatchOutcome, RunError> {
    // Work out all our output paths before we start anything.
    let mut jobs = Vec::with_capacity(files.len());
    for input_path in files {
        let output_path = mirror(input_root, input_path, output_root).await?;
        jobs.push(Job {
            input_path: input_path.to_owned(),
            output_path,
        });
    }

    let handles = jobs
        .into_iter()
        .map(|job| {
            let pool = pool.clone();
            let engine = engine.clone();
            let progress = progress.clone();
            let input_path = job.input_path.clone();
            let handle = tokio::spawn(async move {
                let result = pool
                    .run(|| engine.ocr_file(&job))
                    .await
                    .unwrap_or_else(|err| {
                        Err(OcrFailure::new(&job.input_path, format!("{:#}", err)))
                    });
                progress.inc(1);
                result
            });
            (input_path, handle)
        })
        .collect::<Vec<_>>();

    // Wait for everything.
    let (paths, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = join_all(handles).await;

    let mut outcome = BatchOutcome::default();
    for (path, result) in paths.into_iter().zip(results) {
        let result = result.unwrap_or_else(|join_err| {
            // The task never got to count itself.
            progress.inc(1);
            Err(OcrFailure::new(&path, format!("OCR task failed: {}", join_err)))
        });
        match result {
            Ok(()) => outcome.succeeded += 1,
            Err(failure) => {
                error!(path = ?failure.path, cause = %failure.cause, "OCR failed");
                outcome.failures.push(failure);
            }
        }
    }
    Ok(outcome)
}
