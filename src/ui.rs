//! Terminal UI: one progress bar counting OCRed files, plus status messages
//! and log output which don't trample on it.
//!
//! This is adapted from `substudy` by Eric Kidd, which is licensed under
//! Apache-2.0 OR MIT. Used with permission.

use std::{
    borrow::Cow,
    io::{self, Write as _},
    sync::Arc,
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle};

/// Application UI state. Cheap to clone.
#[derive(Clone)]
pub struct Ui {
    multi_progress: Arc<MultiProgress>,
}

impl Ui {
    pub fn init() -> Ui {
        Ui {
            multi_progress: Arc::new(MultiProgress::new()),
        }
    }

    /// Don't draw any progress bars. Used when `stdout` carries real output.
    pub fn hide_progress_bars(&self) {
        self.multi_progress
            .set_draw_target(ProgressDrawTarget::hidden());
    }

    /// A `tracing` writer which prints log lines above the progress bar.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter { ui: self.clone() }
    }

    /// Create the bar which counts files as they finish OCR. Its length is
    /// unknown until discovery is done, so callers set it later.
    pub fn file_progress_bar(&self, config: &ProgressConfig<'_>) -> ProgressBar {
        let pb = self
            .multi_progress
            .add(ProgressBar::new(0).with_style(file_progress_style()));
        pb.set_prefix(config.emoji.to_owned());
        pb.set_message(config.msg.to_owned());
        // OCR of one file can take minutes, so keep the clock moving.
        pb.enable_steady_tick(Duration::from_millis(500));
        pb.with_finish(ProgressFinish::WithMessage(Cow::Owned(
            config.done_msg.to_owned(),
        )))
    }

    /// Print a one-line status message above the progress bar.
    pub fn display_message(&self, emoji: &str, msg: &str) {
        let _ = self.suspend(|stderr| writeln!(stderr, "{} {}", emoji, msg));
    }

    /// Run `f` with the progress bar cleared, and redraw it afterwards.
    fn suspend<R>(&self, f: impl FnOnce(&mut io::Stderr) -> R) -> R {
        self.multi_progress.suspend(|| f(&mut io::stderr()))
    }
}

/// Labels for a progress bar.
pub struct ProgressConfig<'a> {
    pub emoji: &'a str,
    /// Shown while files are being OCRed.
    pub msg: &'a str,
    /// Shown once the run is over.
    pub done_msg: &'a str,
}

fn file_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {prefix:3}{msg:15} {pos:>5}/{len:5} files {elapsed_precise} {wide_bar:.cyan/blue} {eta_precise}")
        .expect("bad progress bar template")
}

/// Writes to `stderr` with the progress bar temporarily cleared.
#[derive(Clone)]
pub struct SafeStderrWriter {
    ui: Ui,
}

impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ui.suspend(|stderr| stderr.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ui.suspend(|stderr| stderr.flush())
    }

    // `tracing` writes each event with `write_all`; do it in one suspend so a
    // redraw can't land in the middle of a log line.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ui.suspend(|stderr| stderr.write_all(buf))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
