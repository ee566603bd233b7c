//! Per-project log sink: in-memory accumulation, durable append-only file,
//! and live fan-out to dashboard viewers.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::ws::{WsMessage, broadcast_message};

/// Accumulates one project's textual log and publishes each increment.
///
/// Appends never fail the caller: a durable-write error is reported through
/// `tracing` and swallowed, since logging must not abort a deployment. The
/// durable file lives under the project's working directory and therefore
/// only exists once the clone has created it; earlier appends keep their
/// in-memory and broadcast copies.
pub struct LogSink {
    project: String,
    file: PathBuf,
    buffer: Mutex<String>,
    tx: broadcast::Sender<WsMessage>,
}

impl LogSink {
    pub fn new(project: &str, file: PathBuf, tx: broadcast::Sender<WsMessage>) -> Self {
        Self {
            project: project.to_string(),
            file,
            buffer: Mutex::new(String::new()),
            tx,
        }
    }

    /// Append a chunk: in-memory, durable (fire-and-forget), broadcast.
    pub fn append(&self, chunk: &str) {
        {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.push_str(chunk);
        }

        if let Err(e) = self.append_durable(chunk) {
            tracing::warn!(
                project = %self.project,
                path = %self.file.display(),
                error = %e,
                "failed to persist log chunk"
            );
        }

        broadcast_message(
            &self.tx,
            WsMessage::LogUpdate {
                project: self.project.clone(),
                chunk: chunk.to_string(),
            },
        );
    }

    fn append_durable(&self, chunk: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)?;
        file.write_all(chunk.as_bytes())
    }

    /// Full accumulated log. Falls back to the durable file when the
    /// in-memory buffer is empty (e.g. after a dashboard restart).
    pub fn snapshot(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if buffer.is_empty() {
            self.load().unwrap_or_default()
        } else {
            buffer.clone()
        }
    }

    /// Read the durable log file from disk, if present.
    pub fn load(&self) -> Option<String> {
        std::fs::read_to_string(&self.file).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sink_in(dir: &std::path::Path) -> (LogSink, broadcast::Receiver<WsMessage>) {
        let (tx, rx) = broadcast::channel(16);
        (LogSink::new("demo", dir.join("deploy.log"), tx), rx)
    }

    #[test]
    fn append_accumulates_in_memory() {
        let dir = tempdir().unwrap();
        let (sink, _rx) = sink_in(dir.path());
        sink.append("Cloning...\n");
        sink.append("done\n");
        assert_eq!(sink.snapshot(), "Cloning...\ndone\n");
    }

    #[test]
    fn append_persists_to_the_durable_file() {
        let dir = tempdir().unwrap();
        let (sink, _rx) = sink_in(dir.path());
        sink.append("line 1\n");
        sink.append("line 2\n");
        assert_eq!(sink.load().as_deref(), Some("line 1\nline 2\n"));
    }

    #[test]
    fn append_broadcasts_each_chunk() {
        let dir = tempdir().unwrap();
        let (sink, mut rx) = sink_in(dir.path());
        sink.append("hello\n");
        match rx.try_recv().unwrap() {
            WsMessage::LogUpdate { project, chunk } => {
                assert_eq!(project, "demo");
                assert_eq!(chunk, "hello\n");
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn durable_write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = broadcast::channel(16);
        // Parent directory does not exist, so every durable append fails.
        let sink = LogSink::new(
            "demo",
            dir.path().join("missing").join("deploy.log"),
            tx,
        );
        sink.append("still recorded\n");
        assert_eq!(sink.snapshot(), "still recorded\n");
        assert!(sink.load().is_none());
    }

    #[test]
    fn snapshot_rehydrates_from_disk_when_memory_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deploy.log");
        std::fs::write(&path, "history from a previous run\n").unwrap();

        let (tx, _rx) = broadcast::channel(16);
        let sink = LogSink::new("demo", path, tx);
        assert_eq!(sink.snapshot(), "history from a previous run\n");
    }

    #[test]
    fn in_memory_buffer_wins_over_the_durable_file() {
        let dir = tempdir().unwrap();
        let (sink, _rx) = sink_in(dir.path());
        sink.append("fresh\n");
        // Even if the file diverges, snapshot reflects this process's log.
        std::fs::write(dir.path().join("deploy.log"), "stale\n").unwrap();
        assert_eq!(sink.snapshot(), "fresh\n");
    }
}
