use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use ocr_batch::{prelude::*, ui::Ui};

mod cmd;

/// OCR every PDF in a folder, in batches.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Output is written to OCR_OUTPUT/<folder name>, next to the input folder,
with the same directory structure as the input.

Press Ctrl-C once to stop after the current batch, or twice to abort.

Environment Variables:
  - OCR_COMMAND (optional): The OCR executable to run. Defaults to `ocrmypdf`.
  - RUST_LOG (optional): Log filter. Defaults to `info`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR every PDF under a folder.
    Run(cmd::run::RunOpts),
    /// Show which batches a run would process, without OCRing anything.
    Plan(cmd::plan::PlanOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Run(_) => false,
            Cmd::Plan(_) => true,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Run(run_opts) => cmd::run::cmd_run(ui, run_opts).await?,
        Cmd::Plan(plan_opts) => cmd::plan::cmd_plan(plan_opts).await?,
    }
    Ok(())
}
