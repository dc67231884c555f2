//! A fake OCR engine for tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{error::OcrFailure, prelude::*};

use super::{Job, OcrEngine};

/// Hook run at the start of every job.
type OnStart = Box<dyn Fn(&Job) + Send + Sync>;

/// Copies input to output, unless the input's file name contains `fail`.
#[derive(Default)]
pub struct FakeEngine {
    /// Every job we were asked to run, in the order they started.
    started: Mutex<Vec<Job>>,
    /// Jobs currently running.
    running: AtomicUsize,
    /// The most jobs we ever saw running at once.
    peak: AtomicUsize,
    /// How long each job pretends to take.
    delay: Duration,
    /// Optional hook run as each job starts.
    on_start: Option<OnStart>,
}

impl FakeEngine {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn with_on_start(on_start: impl Fn(&Job) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            on_start: Some(Box::new(on_start)),
            ..Self::default()
        })
    }

    /// Input paths of every job started so far.
    pub fn started_inputs(&self) -> Vec<PathBuf> {
        self.started
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|job| job.input_path.clone())
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for FakeEngine {
    async fn ocr_file(&self, job: &Job) -> Result<(), OcrFailure> {
        self.started.lock().expect("lock poisoned").push(job.clone());
        if let Some(on_start) = &self.on_start {
            on_start(job);
        }
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let name = job
            .input_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains("fail") {
            return Err(OcrFailure::new(&job.input_path, "fake failure"));
        }
        tokio::fs::copy(&job.input_path, &job.output_path)
            .await
            .map_err(|err| OcrFailure::new(&job.input_path, err.to_string()))?;
        Ok(())
    }
}
