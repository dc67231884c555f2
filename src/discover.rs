//! Finding the PDFs to OCR.

use std::io;

use walkdir::WalkDir;

use crate::{async_utils::spawn_blocking_propagating_panics, error::RunError, prelude::*};

/// The suffix of the files we OCR. Compared case-insensitively.
pub const PDF_SUFFIX: &str = ".pdf";

/// Recursively find every PDF under `root`, in sorted order.
///
/// Returns an empty list if there are no PDFs. Fails if `root` is missing,
/// unreadable or not a directory. Unreadable subdirectories are logged and
/// skipped. Symlinks to files are included, but we never descend into
/// symlinked directories.
#[instrument(level = "debug")]
pub async fn discover(root: &Path) -> Result<Vec<PathBuf>, RunError> {
    let root = root.to_owned();
    spawn_blocking_propagating_panics(move || discover_blocking(&root)).await
}

/// Blocking implementation of [`discover`].
fn discover_blocking(root: &Path) -> Result<Vec<PathBuf>, RunError> {
    let metadata = std::fs::metadata(root).map_err(|err| RunError::filesystem(root, err))?;
    if !metadata.is_dir() {
        return Err(RunError::filesystem_msg(root, "input root is not a directory"));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            // Failing to read the root itself is fatal.
            Err(err) if err.depth() == 0 => {
                let path = err.path().unwrap_or(root).to_owned();
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("cannot read input root"));
                return Err(RunError::filesystem(path, source));
            }
            Err(err) => {
                warn!(path = ?err.path(), "Skipping unreadable entry: {}", err);
                continue;
            }
        };
        if is_pdf(entry.path()) && is_file_or_link_to_file(&entry) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    debug!(count = files.len(), "Discovered PDFs");
    Ok(files)
}

/// Does the name of `path` end in `.pdf`, in any case?
fn is_pdf(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .is_some_and(|name| name.ends_with(PDF_SUFFIX))
}

fn is_file_or_link_to_file(entry: &walkdir::DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}
