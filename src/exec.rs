//! Bounded subprocess execution for the external diagnostics tools
//! (mandoc, man, apropos, pkg_info).
//!
//! Standard output is captured up to a byte cap under an absolute
//! wall-clock deadline; standard error goes to the null device so tool
//! error chatter can never surface as a 200-status body. The child is
//! killed on timeout and always reaped.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub(crate) enum ExecError {
    #[error("cannot spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exceeded its deadline")]
    Timeout { tool: String },
    #[error("reading {tool} output: {source}")]
    Read {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} produced no output")]
    Empty { tool: String },
}

/// Runs `path` with `argv`, returning captured stdout. Success requires
/// non-empty output and completion within `timeout`.
pub(crate) async fn exec(
    path: &Path,
    argv: &[&str],
    max_output_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ExecError> {
    let tool = path.display().to_string();
    let deadline = Instant::now() + timeout;

    let mut child = Command::new(path)
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut output = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut truncated = false;

    let failure = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Some(ExecError::Timeout { tool: tool.clone() });
        }

        match tokio::time::timeout(remaining, stdout.read(&mut chunk)).await {
            Err(_) => break Some(ExecError::Timeout { tool: tool.clone() }),
            Ok(Ok(0)) => break None,
            Ok(Ok(n)) => {
                let room = max_output_bytes - output.len();
                output.extend_from_slice(&chunk[..n.min(room)]);
                if output.len() >= max_output_bytes {
                    debug!(tool = %tool, cap = max_output_bytes, "output truncated at cap");
                    truncated = true;
                    break None;
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(source)) => {
                break Some(ExecError::Read {
                    tool: tool.clone(),
                    source,
                })
            }
        }
    };

    // A truncated child may still be writing into a full pipe; it gets the
    // same kill as a failed one so the reap below cannot block.
    if failure.is_some() || truncated {
        if let Err(e) = child.start_kill() {
            warn!(tool = %tool, error = %e, "kill after failure");
        }
    }

    // Always reap; after EOF this returns promptly, after a kill it
    // collects the corpse.
    match child.wait().await {
        Ok(status) => debug!(tool = %tool, %status, bytes = output.len(), "child reaped"),
        Err(e) => warn!(tool = %tool, error = %e, "wait failed"),
    }

    if let Some(err) = failure {
        return Err(err);
    }
    if output.is_empty() {
        return Err(ExecError::Empty { tool });
    }
    Ok(output)
}
