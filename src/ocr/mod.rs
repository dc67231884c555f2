//! OCR engine interface.
//!
//! We treat OCR as an opaque operation which turns one PDF into another, and
//! which may fail. Failures are values, not errors: an engine never stops the
//! batch it is part of.

use crate::{error::OcrFailure, prelude::*};

#[cfg(test)]
pub mod fake;
pub mod ocrmypdf;

/// One file to OCR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Job {
    /// The PDF to read. Never modified.
    pub input_path: PathBuf,
    /// Where to write the OCRed PDF. Its parent directory exists by the time
    /// an engine sees the job.
    pub output_path: PathBuf,
}

/// Interface for OCRing a single document.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// OCR `job.input_path` into `job.output_path`.
    ///
    /// On failure, `job.output_path` may or may not exist.
    async fn ocr_file(&self, job: &Job) -> Result<(), OcrFailure>;
}
