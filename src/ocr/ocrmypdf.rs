//! OCR engine that calls `ocrmypdf`.

use std::{
    ffi::{OsStr, OsString},
    process::Stdio,
    sync::Arc,
};

use anyhow::bail;
use tokio::{process::Command, sync::watch};

use crate::{async_utils::check_for_command_failure, error::OcrFailure, prelude::*};

use super::{Job, OcrEngine};

/// The executable we run if the user doesn't ask for another one.
pub const DEFAULT_OCR_COMMAND: &str = "ocrmypdf";

/// OCR engine wrapping the `ocrmypdf` CLI tool, or anything which accepts
/// the same `--force-ocr <input> <output>` arguments.
#[derive(Clone, Debug)]
pub struct OcrmypdfEngine {
    /// The executable to run.
    command: OsString,
    /// Set once [`OcrmypdfEngine::abort`] has been called.
    aborted: Arc<watch::Sender<bool>>,
}

impl OcrmypdfEngine {
    /// Create a new engine which runs `command`.
    pub fn new(command: impl AsRef<OsStr>) -> Self {
        let (aborted, _) = watch::channel(false);
        Self {
            command: command.as_ref().to_owned(),
            aborted: Arc::new(aborted),
        }
    }

    /// Kill every OCR process this engine is running, and fail every job
    /// which starts afterwards.
    pub fn abort(&self) {
        self.aborted.send_replace(true);
    }

    /// A short name for the command, for logs and error messages.
    fn command_name(&self) -> String {
        Path::new(&self.command)
            .file_name()
            .unwrap_or(self.command.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

impl Default for OcrmypdfEngine {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_COMMAND)
    }
}

#[async_trait]
impl OcrEngine for OcrmypdfEngine {
    #[instrument(level = "debug", skip_all, fields(path = ?job.input_path))]
    async fn ocr_file(&self, job: &Job) -> Result<(), OcrFailure> {
        let command_name = self.command_name();
        let mut aborted = self.aborted.subscribe();
        let result = async {
            if *aborted.borrow_and_update() {
                bail!("OCR was aborted before {} started", command_name);
            }

            let mut command = Command::new(&self.command);
            command
                .arg("--force-ocr")
                .arg(&job.input_path)
                .arg(&job.output_path)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            // Our own process group, so that a Ctrl-C at the terminal only
            // reaches us.
            #[cfg(unix)]
            command.process_group(0);

            let child = command
                .spawn()
                .with_context(|| format!("cannot run {}", command_name))?;
            let pid = child.id();
            let output = tokio::select! {
                output = child.wait_with_output() => {
                    output.with_context(|| format!("error waiting for {}", command_name))?
                }
                Ok(()) = async { aborted.wait_for(|aborted| *aborted).await.map(|_| ()) } => {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                    bail!("{} was aborted", command_name);
                }
            };
            check_for_command_failure(&command_name, &output)
        }
        .await;

        match result {
            Ok(()) => {
                info!(path = ?job.input_path, "OCR completed");
                Ok(())
            }
            Err(err) => Err(OcrFailure::new(&job.input_path, format!("{:#}", err))),
        }
    }
}

/// Kill the process group led by `pid`, including anything `ocrmypdf`
/// started itself.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: `killpg` only sends a signal; it touches no memory of ours.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(pid, "cannot kill process group: {}", std::io::Error::last_os_error());
    }
}

/// Elsewhere, `kill_on_drop` kills the child itself.
#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn job(tmp: &Path) -> Job {
        Job {
            input_path: tmp.join("in.pdf"),
            output_path: tmp.join("out.pdf"),
        }
    }

    #[tokio::test]
    async fn missing_executable_is_a_failure_value() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = OcrmypdfEngine::new(tmp.path().join("no-such-ocr-tool"));
        let failure = engine.ocr_file(&job(tmp.path())).await.unwrap_err();
        assert_eq!(failure.path, tmp.path().join("in.pdf"));
        assert!(failure.cause.contains("cannot run no-such-ocr-tool"), "{}", failure.cause);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_value() {
        let tmp = tempfile::tempdir().unwrap();
        // `false` ignores its arguments and exits with status 1.
        let engine = OcrmypdfEngine::new("false");
        let failure = engine.ocr_file(&job(tmp.path())).await.unwrap_err();
        assert!(failure.cause.contains("exit code 1"), "{}", failure.cause);
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = OcrmypdfEngine::new("true");
        engine.ocr_file(&job(tmp.path())).await.unwrap();
    }

    /// Write an OCR "tool" which just hangs.
    fn hanging_tool(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt as _;

        let path = dir.join("hang.sh");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn abort_kills_running_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(OcrmypdfEngine::new(hanging_tool(tmp.path())));
        let running = tokio::spawn({
            let engine = engine.clone();
            let job = job(tmp.path());
            async move { engine.ocr_file(&job).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        engine.abort();
        let failure = tokio::time::timeout(std::time::Duration::from_secs(5), running)
            .await
            .expect("abort did not stop the job")
            .unwrap()
            .unwrap_err();
        assert!(failure.cause.contains("was aborted"), "{}", failure.cause);

        // Later jobs never start.
        let failure = engine.ocr_file(&job(tmp.path())).await.unwrap_err();
        assert!(failure.cause.contains("aborted before"), "{}", failure.cause);
    }

    #[test]
    fn default_command_is_ocrmypdf() {
        assert_eq!(OcrmypdfEngine::default().command_name(), "ocrmypdf");
    }
}
