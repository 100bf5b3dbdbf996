use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use clipkeep_core::PNG_DATA_URI_PREFIX;
use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

pub const HELPER_TIMEOUT: Duration = Duration::from_secs(5);

/// External executable that reads the clipboard bitmap and prints it as a
/// single `data:image/png;base64,...` line.
#[derive(Debug, Clone)]
pub struct ImageHelper {
    path: PathBuf,
    timeout: Duration,
}

impl ImageHelper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: HELPER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the helper once. Any failure is logged and reported as `None`.
    pub async fn capture(&self) -> Option<String> {
        let run = Command::new(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(helper = %self.path.display(), "image helper failed to start: {err}");
                return None;
            }
            Err(_) => {
                warn!(
                    helper = %self.path.display(),
                    "image helper timed out after {:?}", self.timeout
                );
                return None;
            }
        };

        parse_helper_output(output.status.success(), &output.stdout, &output.stderr)
    }
}

/// Accepts only a clean exit with no stderr and a PNG data URI on the first line.
pub fn parse_helper_output(success: bool, stdout: &[u8], stderr: &[u8]) -> Option<String> {
    if !success {
        debug!("image helper exited with failure");
        return None;
    }

    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.trim().is_empty() {
        debug!(stderr = %stderr.trim(), "image helper reported an error");
        return None;
    }

    let stdout = std::str::from_utf8(stdout).ok()?;
    let line = stdout.lines().next()?.trim();
    if line.len() > PNG_DATA_URI_PREFIX.len() && line.starts_with(PNG_DATA_URI_PREFIX) {
        Some(line.to_owned())
    } else {
        debug!("image helper output is not a PNG data URI");
        None
    }
}
