//! Mapping input paths to output paths.
//!
//! Output for `/data/scans/x/y.pdf` with input root `/data/scans` goes to
//! `/data/OCR_OUTPUT/scans/x/y.pdf`.

use std::ffi::OsStr;

use crate::{error::RunError, prelude::*};

/// Name of the directory, next to the input root, which holds all output.
pub const OUTPUT_DIR_NAME: &str = "OCR_OUTPUT";

/// Compute the output root for a run: `<parent>/OCR_OUTPUT/<basename>`.
///
/// This does not touch the filesystem.
pub fn output_root_for(input_root: &Path) -> Result<PathBuf, RunError> {
    let name = input_root
        .file_name()
        .filter(|name| *name != OsStr::new(""))
        .ok_or_else(|| RunError::filesystem_msg(input_root, "input root has no name"))?;
    let parent = input_root
        .parent()
        .ok_or_else(|| RunError::filesystem_msg(input_root, "input root has no parent"))?;
    Ok(parent.join(OUTPUT_DIR_NAME).join(name))
}

/// Compute where the output for `input_path` belongs, and create its parent
/// directories.
pub async fn mirror(
    input_root: &Path,
    input_path: &Path,
    output_root: &Path,
) -> Result<PathBuf, RunError> {
    let output_path = mirror_path(input_root, input_path, output_root)?;
    if let Some(dir) = output_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| RunError::filesystem(dir, err))?;
    }
    Ok(output_path)
}

/// The pure path computation behind [`mirror`]. Creates nothing.
pub fn mirror_path(
    input_root: &Path,
    input_path: &Path,
    output_root: &Path,
) -> Result<PathBuf, RunError> {
    let relative = input_path.strip_prefix(input_root).map_err(|_| {
        RunError::filesystem_msg(
            input_path,
            format!("path is not under input root {:?}", input_root),
        )
    })?;
    if relative.as_os_str().is_empty() {
        return Err(RunError::filesystem_msg(
            input_path,
            "path is the input root itself",
        ));
    }
    Ok(output_root.join(relative))
}
