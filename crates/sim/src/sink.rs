//! Observation sinks: a plain text log file and the SQLite store. Both are
//! non-blocking hand-offs to a writer task, so a slow or stuck target never
//! holds up a tick.

use std::io;
use std::path::{Path, PathBuf};

use greenhouse_core::{ObservationSink, SinkError};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::db::{now_unix, Db};

/// Sink type the host controller is built with.
pub type HostSink = Box<dyn ObservationSink + Send + Sync>;

fn queue_error<T>(e: TrySendError<T>) -> SinkError {
    match e {
        TrySendError::Full(_) => SinkError::Full,
        TrySendError::Closed(_) => SinkError::Closed,
    }
}

// ---------------------------------------------------------------------------
// Text file
// ---------------------------------------------------------------------------

/// Queues lines for the text log writer.
pub struct FileSink {
    tx: mpsc::Sender<String>,
}

impl FileSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ObservationSink for FileSink {
    fn append(&mut self, line: &str) -> Result<(), SinkError> {
        self.tx.try_send(line.to_string()).map_err(queue_error)
    }
}

/// Spawn the task appending a [`FileSink`]'s lines to `path`, creating parent
/// directories on first use. The file stays open between lines and is
/// reopened after a failed write.
pub fn spawn_file_writer(path: impl Into<PathBuf>, capacity: usize) -> (FileSink, JoinHandle<()>) {
    let path = path.into();
    let (sink, mut rx) = FileSink::channel(capacity);

    let handle = tokio::spawn(async move {
        let mut file = None;
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_line(&path, &mut file, &line).await {
                warn!(path = %path.display(), "text log: write failed: {e}");
                file = None;
            }
        }
        debug!("text log writer stopped");
    });

    (sink, handle)
}

async fn write_line(path: &Path, file: &mut Option<File>, line: &str) -> io::Result<()> {
    if file.is_none() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        *file = Some(OpenOptions::new().create(true).append(true).open(path).await?);
    }
    if let Some(f) = file.as_mut() {
        f.write_all(format!("{line}\n").as_bytes()).await?;
        f.flush().await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SQLite store (fire-and-forget)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PendingLine {
    pub logged_at: i64,
    pub line: String,
}

/// Queues lines for the store writer without ever waiting on the database.
pub struct StoreSink {
    tx: mpsc::Sender<PendingLine>,
}

impl StoreSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PendingLine>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ObservationSink for StoreSink {
    fn append(&mut self, line: &str) -> Result<(), SinkError> {
        let pending = PendingLine {
            logged_at: now_unix(),
            line: line.to_string(),
        };
        self.tx.try_send(pending).map_err(queue_error)
    }
}

/// Spawn the task draining a [`StoreSink`] into `db`. The task ends once
/// every sender has been dropped.
pub fn spawn_store_writer(db: Db, capacity: usize) -> (StoreSink, JoinHandle<()>) {
    let (sink, mut rx) = StoreSink::channel(capacity);

    let handle = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            if let Err(e) = db.insert_observation(p.logged_at, &p.line).await {
                warn!("store: insert_observation failed: {e:#}");
            }
        }
        debug!("store writer stopped");
    });

    (sink, handle)
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Writes every line to each inner sink. All sinks are attempted; the first
/// error (if any) is returned.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<HostSink>,
}

impl FanOut {
    pub fn push(&mut self, sink: HostSink) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ObservationSink for FanOut {
    fn append(&mut self, line: &str) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.append(line) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts lines into a shared counter.
    struct CountingSink(Arc<AtomicUsize>);

    impl ObservationSink for CountingSink {
        fn append(&mut self, _line: &str) -> Result<(), SinkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ClosedSink;

    impl ObservationSink for ClosedSink {
        fn append(&mut self, _line: &str) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }
    }

    // -- FileSink -----------------------------------------------------------

    #[tokio::test]
    async fn file_writer_creates_dirs_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("greenhouse_log.txt");
        let (mut sink, handle) = spawn_file_writer(&path, 16);

        sink.append("06:00:00 - soil humidity: 30.0%").unwrap();
        sink.append("06:10:00 - soil humidity: 31.5%").unwrap();
        drop(sink);
        handle.await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "06:00:00 - soil humidity: 30.0%\n06:10:00 - soil humidity: 31.5%\n"
        );
    }

    #[tokio::test]
    async fn file_writer_survives_unwritable_target() {
        let dir = tempfile::tempdir().unwrap();
        // The target is a directory, so every open fails inside the writer.
        let (mut sink, handle) = spawn_file_writer(dir.path(), 4);
        sink.append("x").unwrap();
        sink.append("y").unwrap();
        drop(sink);
        handle.await.unwrap();
    }

    #[test]
    fn file_sink_full_then_closed() {
        let (mut sink, rx) = FileSink::channel(1);
        sink.append("first").unwrap();
        assert!(matches!(sink.append("second"), Err(SinkError::Full)));

        drop(rx);
        assert!(matches!(sink.append("third"), Err(SinkError::Closed)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_append_returns_while_target_blocks() {
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("log.fifo");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success());

        // Opening a FIFO for writing blocks until a reader shows up.
        let (mut sink, handle) = spawn_file_writer(&fifo, 8);
        let started = Instant::now();
        sink.append("06:00:00 - soil humidity: 30.0%").unwrap();
        sink.append("06:10:00 - soil humidity: 31.5%").unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        // Attach a reader so the writer can finish.
        let reader = tokio::task::spawn_blocking(move || std::fs::read_to_string(fifo).unwrap());
        drop(sink);
        handle.await.unwrap();
        assert_eq!(
            reader.await.unwrap(),
            "06:00:00 - soil humidity: 30.0%\n06:10:00 - soil humidity: 31.5%\n"
        );
    }

    // -- StoreSink ----------------------------------------------------------

    #[test]
    fn store_sink_full_then_closed() {
        let (mut sink, rx) = StoreSink::channel(1);
        sink.append("first").unwrap();
        assert!(matches!(sink.append("second"), Err(SinkError::Full)));

        drop(rx);
        assert!(matches!(sink.append("third"), Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn store_writer_persists_lines() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let (mut sink, handle) = spawn_store_writer(db.clone(), 16);
        for i in 0..3 {
            sink.append(&format!("line {i}")).unwrap();
        }
        drop(sink);
        handle.await.unwrap();

        assert_eq!(db.count_observations().await.unwrap(), 3);
        let rows = db.recent_observations(1).await.unwrap();
        assert_eq!(rows[0].line, "line 2");
    }

    // -- FanOut -------------------------------------------------------------

    #[test]
    fn fan_out_attempts_every_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fan = FanOut::default();
        fan.push(Box::new(ClosedSink));
        fan.push(Box::new(CountingSink(Arc::clone(&count))));
        assert!(!fan.is_empty());

        assert!(matches!(fan.append("line"), Err(SinkError::Closed)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_fan_out_accepts() {
        let mut fan = FanOut::default();
        assert!(fan.is_empty());
        fan.append("line").unwrap();
    }
}
