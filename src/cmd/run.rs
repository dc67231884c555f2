//! The `run` subcommand.

use std::{ffi::OsString, sync::Arc, time::Duration};

use anyhow::anyhow;
use clap::Args;

use ocr_batch::{
    ocr::ocrmypdf::{DEFAULT_OCR_COMMAND, OcrmypdfEngine},
    prelude::*,
    run::{CancellationFlag, Run, RunConfig, RunOutcome, RunReport, RunState},
    ui::{ProgressConfig, Ui},
    worker_pool::default_concurrency_limit,
};

use super::BatchOpts;

/// How long we wait for aborted OCR processes to be killed before exiting.
const ABORT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Options for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunOpts {
    #[clap(flatten)]
    pub batch: BatchOpts,

    /// Max number of OCR processes to run at a time. Defaults to the number
    /// of CPUs.
    #[clap(short = 'j', long = "jobs")]
    pub job_count: Option<usize>,

    /// The OCR executable. It is called as `<cmd> --force-ocr <input> <output>`.
    #[clap(long, env = "OCR_COMMAND", default_value = DEFAULT_OCR_COMMAND)]
    pub ocr_command: OsString,

    /// Write a JSON summary of the run, including every failed file, here.
    #[clap(long)]
    pub report: Option<PathBuf>,

    /// What portion of files should we allow to fail before exiting with an
    /// error? Specified as a number between 0.0 and 1.0.
    #[clap(long, default_value = "1.0")]
    pub allowed_failure_rate: f32,
}

/// The `run` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_run(ui: Ui, opts: &RunOpts) -> Result<()> {
    let config = RunConfig {
        input_root: opts.batch.input_dir.clone(),
        batch_size: opts.batch.batch_size,
        concurrency_limit: opts
            .job_count
            .unwrap_or_else(|| default_concurrency_limit().get()),
    };
    let engine = Arc::new(OcrmypdfEngine::new(&opts.ocr_command));

    // Run sets the length once it knows how many files there are.
    let pb = ui.file_progress_bar(&ProgressConfig {
        emoji: "📄",
        msg: "OCRing PDFs",
        done_msg: "OCRed PDFs",
    });

    let run = Run::new(&config, engine.clone())?.with_progress(pb.clone());
    watch_for_stopping(ui.clone(), run.subscribe());
    let handle = run.start();
    let cancel = handle.cancellation_flag();
    let wait = handle.wait();
    tokio::pin!(wait);

    let report = tokio::select! {
        report = &mut wait => report?,
        () = stop_on_ctrl_c(ui.clone(), cancel) => {
            ui.display_message("🛑", "Aborting, killing running OCR processes");
            engine.abort();
            if tokio::time::timeout(ABORT_GRACE_PERIOD, &mut wait).await.is_err() {
                warn!("OCR processes did not exit in time");
            }
            std::process::exit(130)
        }
    };
    pb.finish();

    if let Some(path) = &opts.report {
        write_report(path, &report).await?;
    }
    summarize(&ui, &report, opts.allowed_failure_rate)
}

/// Request a stop on the first Ctrl-C. Returns on the second, at which point
/// the caller should abort.
async fn stop_on_ctrl_c(ui: Ui, cancel: CancellationFlag) {
    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    cancel.set();
    ui.display_message(
        "✋",
        "OCR processing will stop after the current batch completes. Press Ctrl-C again to abort.",
    );
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending().await
    }
}

/// Tell the user when a stop request actually takes effect.
fn watch_for_stopping(ui: Ui, mut state: tokio::sync::watch::Receiver<RunState>) {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            if *state.borrow_and_update() == RunState::Stopping {
                ui.display_message("⏹️", "Current batch done, skipping the rest");
            }
        }
    });
}

/// Write `report` to `path` as pretty-printed JSON.
async fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report).context("cannot serialize run report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("cannot write run report to {:?}", path))
}

/// Tell the user how things went, and fail if too many files failed.
fn summarize(ui: &Ui, report: &RunReport, allowed_failure_rate: f32) -> Result<()> {
    match report.outcome {
        RunOutcome::Completed => ui.display_message(
            "✅",
            &format!(
                "OCR processing completed: {} of {} files in {} batches",
                report.succeeded, report.file_count, report.batch_count,
            ),
        ),
        RunOutcome::Stopped => ui.display_message(
            "⏹️",
            &format!(
                "OCR processing stopped early after {} of {} batches ({} files OCRed)",
                report.batches_completed, report.batch_count, report.succeeded,
            ),
        ),
    }
    if !report.failures.is_empty() {
        ui.display_message(
            "⚠️",
            &format!("{} files failed to OCR; see log for details", report.failures.len()),
        );
    }

    let failure_rate = report.failure_rate();
    if failure_rate > allowed_failure_rate {
        Err(anyhow!(
            "{}/{} ({:.2}%) of files failed, but only {:.2}% were allowed",
            report.failures.len(),
            report.succeeded + report.failures.len(),
            failure_rate * 100.0,
            allowed_failure_rate * 100.0
        ))
    } else {
        Ok(())
    }
}
