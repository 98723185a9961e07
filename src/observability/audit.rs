//! Append-only audit log with an in-memory mirror
//!
//! - Every event is written to the durable file before it becomes visible
//!   in memory; both happen under one lock, so snapshots always see a
//!   consistent prefix of the history.
//! - One event per line: `YYYY-MM-DD HH:MM:SS,mmm - LEVEL - message`.
//! - The memory buffer is seeded from the durable file at startup and is
//!   never pruned during a run.
//! - A failed durable write is reported on the console only; the event is
//!   still kept in memory and the caller is never failed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDateTime};

use super::logger::{Logger, Severity};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FIELD_SEPARATOR: &str = " - ";

/// A single audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    timestamp: Option<NaiveDateTime>,
    severity: Severity,
    message: String,
}

impl LogEvent {
    /// Create an event stamped with the current local time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Some(Local::now().naive_local()),
            severity,
            message: message.into(),
        }
    }

    /// Event time. `None` for lines replayed verbatim from an unrecognized format.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Render the durable line (without the trailing newline).
    pub fn to_line(&self) -> String {
        match self.timestamp {
            Some(ts) => format!(
                "{},{:03}{sep}{}{sep}{}",
                ts.format(TIMESTAMP_FORMAT),
                ts.and_utc().timestamp_subsec_millis(),
                self.severity,
                escape_message(&self.message),
                sep = FIELD_SEPARATOR,
            ),
            None => self.message.clone(),
        }
    }

    /// Parse a durable line. Lines in an unknown format are kept verbatim
    /// as untimed INFO events so replay never drops history.
    pub fn parse_line(line: &str) -> Self {
        Self::parse_structured(line).unwrap_or_else(|| Self {
            timestamp: None,
            severity: Severity::Info,
            message: line.to_string(),
        })
    }

    fn parse_structured(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, FIELD_SEPARATOR);
        let ts = parts.next()?;
        let severity = parts.next()?.parse::<Severity>().ok()?;
        let message = parts.next()?;

        let timestamp =
            NaiveDateTime::parse_from_str(&ts.replacen(',', ".", 1), "%Y-%m-%d %H:%M:%S%.f")
                .ok()?;

        Some(Self {
            timestamp: Some(timestamp),
            severity,
            message: unescape_message(message),
        })
    }
}

fn escape_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_message(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Durable, append-only line store behind the audit log.
pub trait DurableLog: Send {
    /// Append one line. The line is visible to a fresh reader after this returns.
    fn append_line(&mut self, line: &str) -> io::Result<()>;

    /// Sync buffered data to durable storage.
    fn sync(&mut self) -> io::Result<()>;
}

/// File-backed durable log. Every append is flushed and synced.
#[derive(Debug)]
pub struct FileDurableLog {
    file: File,
}

impl FileDurableLog {
    /// Open or create the log file in append mode, creating parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        // A torn final line must not absorb the next event.
        if !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        Ok(Self { file })
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl DurableLog for FileDurableLog {
    fn append_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.file.write_all(buf.as_bytes())?;
        self.file.sync_data()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Read every event from an existing durable file, in insertion order.
///
/// A missing file yields an empty history. Bytes that are not valid UTF-8
/// (a torn write, a foreign encoding) are replaced rather than failing the load.
pub fn load_from_durable_store(path: &Path) -> io::Result<Vec<LogEvent>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut events = Vec::new();
    for raw in BufReader::new(file).split(b'\n') {
        let raw = raw?;
        let line = String::from_utf8_lossy(&raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            continue;
        }
        events.push(LogEvent::parse_line(line));
    }
    Ok(events)
}

struct AuditInner {
    durable: Box<dyn DurableLog>,
    events: Vec<LogEvent>,
}

/// Process-wide audit log. The only writer of audit events.
pub struct AuditLog {
    path: Option<PathBuf>,
    inner: Mutex<AuditInner>,
}

impl AuditLog {
    /// Open the durable file at `path`, seeding memory with its prior contents.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let history = load_from_durable_store(&path)?;
        let durable = FileDurableLog::open(&path)?;

        Logger::info(
            "AUDIT_LOG_LOADED",
            &[
                ("entries", &history.len().to_string()),
                ("path", &path.display().to_string()),
            ],
        );

        let mut log = Self::with_durable(Box::new(durable), history);
        log.path = Some(path);
        Ok(log)
    }

    /// Build a log over an arbitrary durable store with a pre-loaded history.
    pub fn with_durable(durable: Box<dyn DurableLog>, history: Vec<LogEvent>) -> Self {
        Self {
            path: None,
            inner: Mutex::new(AuditInner {
                durable,
                events: history,
            }),
        }
    }

    /// Path of the durable file, when file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, AuditInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event: durable file first, then memory, then console.
    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let event = LogEvent::new(severity, message);
        let line = event.to_line();

        {
            let mut inner = self.lock();
            if let Err(e) = inner.durable.append_line(&line) {
                Logger::error(
                    "AUDIT_WRITE_FAILED",
                    &[("error", &e.to_string()), ("line", &line)],
                );
            }
            inner.events.push(event);
        }

        Logger::log(severity, "AUDIT", &[("message", &line)]);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(Severity::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.append(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(Severity::Error, message);
    }

    /// Full in-memory history since startup, including replayed entries.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.lock().events.clone()
    }

    /// History rendered as durable lines, each terminated by `\n`.
    pub fn snapshot_text(&self) -> String {
        let inner = self.lock();
        let mut text = String::new();
        for event in &inner.events {
            text.push_str(&event.to_line());
            text.push('\n');
        }
        text
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Sync the durable file. Called once more at shutdown.
    pub fn sync(&self) -> io::Result<()> {
        self.lock().durable.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct BrokenDurableLog;

    impl DurableLog for BrokenDurableLog {
        fn append_line(&mut self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn sync(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_line_format() {
        let event = LogEvent::new(Severity::Warning, "Unknown IP access: 10.0.0.9");
        let line = event.to_line();
        assert!(line.ends_with(" - WARNING - Unknown IP access: 10.0.0.9"));
        // "YYYY-MM-DD HH:MM:SS,mmm"
        let ts = line.split(FIELD_SEPARATOR).next().unwrap();
        assert_eq!(ts.len(), 23);
        assert_eq!(&ts[19..20], ",");
    }

    #[test]
    fn test_parse_line_restores_event() {
        let event = LogEvent::new(Severity::Error, "boom - with dashes\nand a newline \\ slash");
        let parsed = LogEvent::parse_line(&event.to_line());
        assert_eq!(parsed.severity(), Severity::Error);
        assert_eq!(parsed.message(), event.message());
        assert_eq!(
            parsed.timestamp().map(|t| t.and_utc().timestamp_millis()),
            event.timestamp().map(|t| t.and_utc().timestamp_millis())
        );
    }

    #[test]
    fn test_parse_line_keeps_foreign_lines_verbatim() {
        let parsed = LogEvent::parse_line("something an operator typed by hand");
        assert_eq!(parsed.timestamp(), None);
        assert_eq!(parsed.to_line(), "something an operator typed by hand");
    }

    #[test]
    fn test_reopen_replays_history_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("server_logs.txt");

        {
            let log = AuditLog::open(&path).unwrap();
            log.info("first");
            log.warning("second");
            log.error("third");
        }

        let log = AuditLog::open(&path).unwrap();
        let messages: Vec<_> = log.snapshot().iter().map(|e| e.message().to_string()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);

        log.info("fourth");
        let reloaded = load_from_durable_store(&path).unwrap();
        assert_eq!(reloaded.len(), 4);
        assert_eq!(reloaded[3].message(), "fourth");
    }

    #[test]
    fn test_snapshot_text_matches_durable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.txt");

        let log = AuditLog::open(&path).unwrap();
        log.info("Uploaded file: reports/a.pdf");
        log.warning("File not found: reports/b.pdf");

        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(log.snapshot_text(), on_disk);
    }

    #[test]
    fn test_durable_failure_does_not_lose_memory_event() {
        let log = AuditLog::with_durable(Box::new(BrokenDurableLog), Vec::new());
        log.info("still recorded");
        assert_eq!(log.len(), 1);
        assert!(log.sync().is_err());
    }

    #[test]
    fn test_invalid_utf8_line_does_not_block_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.txt");
        let mut bytes = b"2024-01-01 10:00:00,123 - INFO - Server started\n".to_vec();
        bytes.extend_from_slice(b"2024-01-01 10:00:01,000 - INFO - Uploaded file: raport\xc5\n");
        fs::write(&path, bytes).unwrap();

        let log = AuditLog::open(&path).unwrap();
        let events = log.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message(), "Server started");
        assert_eq!(events[1].message(), "Uploaded file: raport\u{FFFD}");

        log.info("Server started");
        assert_eq!(load_from_durable_store(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_torn_last_line_is_not_merged_with_next_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.txt");
        fs::write(&path, "2024-01-01 10:00:00,123 - INFO - Server started\nhalf-writ").unwrap();

        let log = AuditLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        log.info("Server started");

        let reloaded = load_from_durable_store(&path).unwrap();
        let messages: Vec<_> = reloaded.iter().map(|e| e.message().to_string()).collect();
        assert_eq!(messages, vec!["Server started", "half-writ", "Server started"]);
        assert_eq!(log.snapshot_text(), fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let events = load_from_durable_store(&dir.path().join("absent.txt")).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_not_torn() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.txt");
        let log = Arc::new(AuditLog::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.info(format!("thread {} event {}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 200);
        let reloaded: Vec<_> = load_from_durable_store(&path)
            .unwrap()
            .iter()
            .map(LogEvent::to_line)
            .collect();
        let in_memory: Vec<_> = log.snapshot().iter().map(LogEvent::to_line).collect();
        assert_eq!(reloaded, in_memory);
    }
}
