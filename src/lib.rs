//! Batch-OCR a directory tree of PDFs.
//!
//! We find every PDF under an input folder, split them into fixed-size
//! batches, and run an external OCR tool over each batch with bounded
//! concurrency. Output goes to a mirrored tree at
//! `<parent>/OCR_OUTPUT/<folder name>`.
//!
//! The main entry points are [`run::start`] (or [`run::Run`] for more
//! control), [`run::RunHandle::request_stop`] and
//! [`run::RunHandle::wait`].

pub mod async_utils;
pub mod batch;
pub mod discover;
pub mod error;
pub mod mirror;
pub mod ocr;
pub mod prelude;
pub mod run;
pub mod ui;
pub mod worker_pool;
