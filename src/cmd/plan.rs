//! The `plan` subcommand.

use std::io::Write as _;

use clap::Args;

use ocr_batch::{prelude::*, run::plan};

use super::BatchOpts;

/// Options for the `plan` subcommand.
#[derive(Debug, Args)]
pub struct PlanOpts {
    #[clap(flatten)]
    pub batch: BatchOpts,
}

/// Print one JSON line per planned batch.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_plan(opts: &PlanOpts) -> Result<()> {
    let batches = plan(&opts.batch.input_dir, opts.batch.batch_size).await?;
    let mut stdout = std::io::stdout().lock();
    for batch in &batches {
        let line = serde_json::to_string(batch).context("cannot serialize batch")?;
        writeln!(stdout, "{}", line).context("cannot write to stdout")?;
    }
    stdout.flush().context("cannot flush stdout")?;
    Ok(())
}
