//! Command-line entry points.

use clap::Args;

use ocr_batch::{batch::DEFAULT_BATCH_SIZE, prelude::*};

pub mod plan;
pub mod run;

/// Options shared by every subcommand which walks an input folder.
#[derive(Debug, Clone, Args)]
pub struct BatchOpts {
    /// The folder containing PDFs to OCR. Subfolders are included.
    pub input_dir: PathBuf,

    /// Number of files per batch. A stop request takes effect between
    /// batches.
    #[clap(
        short = 'b',
        long,
        default_value_t = DEFAULT_BATCH_SIZE,
        allow_negative_numbers = true
    )]
    pub batch_size: i64,
}
