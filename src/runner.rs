//! External command execution with live output streaming.
//!
//! Commands are interpreted through `sh -c`, exactly as the operator typed
//! them; escaping is the caller's responsibility (single-operator trust
//! model). Output is pushed into the project's [`LogSink`] line by line as
//! the OS delivers it, never buffered until completion. Ordering is
//! guaranteed per stream; stdout and stderr may interleave.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::errors::ProcessError;
use crate::logs::LogSink;

/// Handle to a long-running server process.
///
/// Dropping the handle terminates the process; [`ProcessHandle::stop`]
/// terminates it and waits for the OS to reap it. A stop through the handle
/// never fires the exit notification returned by [`spawn_server`].
pub struct ProcessHandle {
    kill_tx: oneshot::Sender<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Terminate the process and await its exit.
    pub async fn stop(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.kill_tx.send(ack_tx).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Run a bounded command to completion, streaming its output into `sink`.
///
/// Exit code 0 resolves as success. Any non-zero code appends
/// `Exited with status N` to the sink and fails with
/// [`ProcessError::NonZeroExit`]. A command that cannot be started at all
/// fails with [`ProcessError::StartFailed`] without emitting output.
pub async fn run(command: &str, cwd: &Path, sink: &Arc<LogSink>) -> Result<(), ProcessError> {
    let mut child = shell_command(command, cwd)
        .spawn()
        .map_err(ProcessError::StartFailed)?;
    let pumps = spawn_pumps(&mut child, sink);

    let status = child.wait().await.map_err(ProcessError::Wait)?;
    // Drain both streams before reporting the exit so the terminal log line
    // lands after the command's own output.
    for pump in pumps {
        let _ = pump.await;
    }

    if status.success() {
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        sink.append(&format!("Exited with status {}\n", code));
        Err(ProcessError::NonZeroExit { code })
    }
}

/// Spawn a long-running server process without blocking the caller.
///
/// The child's environment gets `PORT=<port>`. Returns the kill handle and a
/// oneshot receiver that fires with the exit code iff the process exits on
/// its own with a non-zero status; a clean self-exit or a deliberate stop
/// resolves the receiver with a channel-closed error instead.
pub fn spawn_server(
    command: &str,
    cwd: &Path,
    port: u16,
    sink: &Arc<LogSink>,
) -> Result<(ProcessHandle, oneshot::Receiver<i32>), ProcessError> {
    let mut child = shell_command(command, cwd)
        .env("PORT", port.to_string())
        .spawn()
        .map_err(ProcessError::StartFailed)?;
    let pumps = spawn_pumps(&mut child, sink);

    let (kill_tx, kill_rx) = oneshot::channel::<oneshot::Sender<()>>();
    let (exit_tx, exit_rx) = oneshot::channel::<i32>();
    let sink = Arc::clone(sink);

    tokio::spawn(async move {
        tokio::select! {
            ack = kill_rx => {
                // Deliberate stop (or the handle was dropped): kill, reap,
                // acknowledge. exit_tx is dropped unfired.
                let _ = child.kill().await;
                let _ = child.wait().await;
                if let Ok(ack_tx) = ack {
                    let _ = ack_tx.send(());
                }
            }
            status = child.wait() => {
                for pump in pumps {
                    let _ = pump.await;
                }
                if let Ok(status) = status
                    && !status.success()
                {
                    let code = status.code().unwrap_or(-1);
                    sink.append(&format!("Exited with status {}\n", code));
                    let _ = exit_tx.send(code);
                }
            }
        }
    });

    Ok((ProcessHandle { kill_tx }, exit_rx))
}

fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn one pump task per captured stream. Lines are appended in the order
/// the OS delivers them on that stream.
fn spawn_pumps(child: &mut Child, sink: &Arc<LogSink>) -> Vec<JoinHandle<()>> {
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump_lines(stdout, Arc::clone(sink), false)));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump_lines(stderr, Arc::clone(sink), true)));
    }
    pumps
}

async fn pump_lines<R: AsyncRead + Unpin>(stream: R, sink: Arc<LogSink>, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            sink.append(&classify_stderr(&line));
        } else {
            sink.append(&format!("{}\n", line));
        }
    }
}

/// Tag stderr lines that look like errors so operators can skim the log.
/// Heuristic and presentation-only; success is decided by the exit code.
fn classify_stderr(line: &str) -> String {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("fatal") {
        format!("ERROR: {}\n", line)
    } else {
        format!("{}\n", line)
    }
}
