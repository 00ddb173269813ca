//! PartitionStore — day-partitioned, append-only JSONL storage
//!
//! One file per UTC day under the configured directory. Appends write one
//! complete line per call; scans reopen files on every call and skip lines
//! that do not parse.
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use phi_audit::{AuditConfig, PartitionStore};
//! use phi_audit::store::DateRange;
//!
//! fn main() -> phi_audit::Result<()> {
//!     let store = PartitionStore::open(AuditConfig::new("/var/log/phi-audit"))?;
//!
//!     let range = DateRange::new(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
//!     );
//!     let mut scan = store.scan(range);
//!     for event in &mut scan {
//!         let event = event?;
//!         println!("{} {}", event.timestamp, event.event_type);
//!     }
//!     println!("skipped {} malformed lines", scan.stats().records_skipped);
//!     Ok(())
//! }
//! ```

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::schema::{AuditEvent, RecordPayload};

/// Inclusive range of UTC calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// Days touched by `[start, end]`
    pub fn covering(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(start.date_naive(), end.date_naive())
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Days in ascending order; empty when `start > end`
    pub fn days(&self) -> Vec<NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(|d| *d <= end).collect()
    }
}

/// Counters collected while scanning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub partitions_visited: u64,
    pub partitions_missing: u64,
    pub records_read: u64,
    pub records_skipped: u64,
}

impl ScanStats {
    pub fn merge(&mut self, other: ScanStats) {
        self.partitions_visited += other.partitions_visited;
        self.partitions_missing += other.partitions_missing;
        self.records_read += other.records_read;
        self.records_skipped += other.records_skipped;
    }
}

/// Day-partitioned audit store
///
/// Thread-safe: share across tasks via `Arc<PartitionStore>`.
pub struct PartitionStore {
    config: AuditConfig,
    append_lock: Mutex<()>,
}

impl PartitionStore {
    /// Open a store over `config.log_dir`
    ///
    /// The directory is created on first append, not here, so opening a
    /// store never touches the filesystem.
    pub fn open(config: AuditConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            append_lock: Mutex::new(()),
        })
    }

    // ─── Write Operations ───

    /// Append a redacted payload to the partition for `at`'s UTC date
    ///
    /// The line is written with a single `write_all` to a file opened in
    /// append mode, inside an exclusive section, so concurrent appenders
    /// never interleave partial lines. Returns the event as persisted.
    pub fn append(&self, payload: RecordPayload, at: DateTime<Utc>) -> Result<AuditEvent> {
        // Persisted precision is microseconds
        let at = at.trunc_subsecs(6);
        let event = AuditEvent {
            event_type: payload.event_type().to_string(),
            timestamp: at,
            event_id: Some(Uuid::new_v4()),
            fields: payload.into_fields()?,
        };
        let line = event.to_json_line()?;
        let path = self.config.partition_path(at.date_naive());

        let _guard = self.append_lock.lock();
        self.write_line(&path, &line).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Partition append failed");
            AuditError::AuditWriteFailed(format!("{}: {e}", path.display()))
        })?;

        debug!(
            partition = %path.display(),
            event_type = %event.event_type,
            "Appended audit event"
        );
        Ok(event)
    }

    fn write_line(&self, path: &Path, line: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.config.log_dir)?;
        let mut file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        // A torn tail from an interrupted append gets terminated first,
        // in the same write, so this record starts on its own line
        let buf = if ends_mid_line(&mut file)? {
            warn!(path = %path.display(), "Sealing unterminated partition tail");
            let mut sealed = Vec::with_capacity(line.len() + 1);
            sealed.push(b'\n');
            sealed.extend_from_slice(line);
            Cow::Owned(sealed)
        } else {
            Cow::Borrowed(line)
        };
        file.write_all(&buf)?;
        if self.config.sync_on_write {
            file.sync_data()?;
        }
        Ok(())
    }

    // ─── Read Operations ───

    /// Lazily read every partition in `range`, oldest day first
    pub fn scan(&self, range: DateRange) -> PartitionScan<'_> {
        PartitionScan {
            config: &self.config,
            dates: range.days().into_iter(),
            current: None,
            buf: Vec::new(),
            stats: ScanStats::default(),
            failed: false,
        }
    }

    /// Dates that currently have a partition file, ascending
    pub fn partition_dates(&self) -> Result<Vec<NaiveDate>> {
        let entries = match fs::read_dir(&self.config.log_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_unavailable(&self.config.log_dir, &e)),
        };

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage_unavailable(&self.config.log_dir, &e))?;
            if let Some(date) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.config.parse_partition_file_name(name))
            {
                dates.push(date);
            }
        }
        dates.sort_unstable();
        Ok(dates)
    }

    /// Get a reference to the config
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn storage_unavailable(path: &Path, err: &io::Error) -> AuditError {
    AuditError::StorageUnavailable(format!("{}: {err}", path.display()))
}

/// Iterator over the events of a date range
///
/// Yields `Err` at most once, for an I/O failure other than a missing
/// partition, and then ends.
pub struct PartitionScan<'a> {
    config: &'a AuditConfig,
    dates: std::vec::IntoIter<NaiveDate>,
    current: Option<OpenPartition>,
    buf: Vec<u8>,
    stats: ScanStats,
    failed: bool,
}

struct OpenPartition {
    date: NaiveDate,
    reader: BufReader<File>,
    line_no: u64,
}

impl PartitionScan<'_> {
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn open_next(&mut self) -> Option<Result<()>> {
        loop {
            let date = self.dates.next()?;
            let path = self.config.partition_path(date);
            match File::open(&path) {
                Ok(file) => {
                    self.stats.partitions_visited += 1;
                    self.current = Some(OpenPartition {
                        date,
                        reader: BufReader::new(file),
                        line_no: 0,
                    });
                    return Some(Ok(()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.stats.partitions_missing += 1;
                }
                Err(e) => return Some(Err(storage_unavailable(&path, &e))),
            }
        }
    }
}

impl Iterator for PartitionScan<'_> {
    type Item = Result<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if self.current.is_none() {
                match self.open_next()? {
                    Ok(()) => {}
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            let Some(partition) = self.current.as_mut() else {
                continue;
            };

            self.buf.clear();
            let read = match partition.reader.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    self.failed = true;
                    let path = self.config.partition_path(partition.date);
                    return Some(Err(storage_unavailable(&path, &e)));
                }
            };
            if read == 0 {
                self.current = None;
                continue;
            }

            partition.line_no += 1;
            let terminated = self.buf.last() == Some(&b'\n');
            let parsed = std::str::from_utf8(&self.buf)
                .map_err(|e| AuditError::Serialization(e.to_string()))
                .and_then(|line| {
                    let line = line.trim();
                    if line.is_empty() {
                        Ok(None)
                    } else {
                        AuditEvent::from_json_line(line).map(Some)
                    }
                });

            match parsed {
                Ok(Some(event)) => {
                    self.stats.records_read += 1;
                    return Some(Ok(event));
                }
                Ok(None) => {}
                Err(e) if !terminated => {
                    // Tail of an append still in flight
                    debug!(
                        date = %partition.date,
                        line = partition.line_no,
                        error = %e,
                        "Ignoring unterminated partition tail"
                    );
                }
                Err(e) => {
                    self.stats.records_skipped += 1;
                    debug!(
                        date = %partition.date,
                        line = partition.line_no,
                        error = %e,
                        "Skipping malformed audit record"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::{mask_address, truncate_message};
    use crate::schema::{ApiRequestRecord, ErrorRecord};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn api_payload(path: &str) -> RecordPayload {
        RecordPayload::ApiRequest(ApiRequestRecord {
            method: truncate_message("GET", 200),
            path: truncate_message(path, 200),
            status_code: 200,
            duration_seconds: 0.25,
            client_ip: mask_address(Some("10.0.0.7")),
        })
    }

    #[test]
    fn test_date_range_days() {
        let range = DateRange::new(day(2024, 2, 28), day(2024, 3, 1));
        assert_eq!(range.days(), vec![day(2024, 2, 28), day(2024, 2, 29), day(2024, 3, 1)]);
        assert!(DateRange::new(day(2024, 3, 2), day(2024, 3, 1)).days().is_empty());
        assert_eq!(DateRange::single(day(2024, 1, 1)).days().len(), 1);
    }

    #[test]
    fn test_append_places_event_by_write_date() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let written = store.append(api_payload("/a"), at).unwrap();
        assert_eq!(written.timestamp, at);
        assert!(written.event_id.is_some());
        assert!(dir.path().join("audit_20240101.jsonl").exists());

        let next = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        store.append(api_payload("/b"), next).unwrap();
        assert!(dir.path().join("audit_20240102.jsonl").exists());

        assert_eq!(store.partition_dates().unwrap(), vec![day(2024, 1, 1), day(2024, 1, 2)]);
    }

    #[test]
    fn test_scan_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        let path = dir.path().join("audit_20240101.jsonl");

        let mut content = String::from("{not json\n");
        for i in 0..5 {
            content.push_str(&format!(
                "{{\"event_type\":\"api_request\",\"timestamp\":\"2024-01-01T0{i}:00:00Z\"}}\n"
            ));
        }
        fs::write(&path, content).unwrap();

        let mut scan = store.scan(DateRange::single(day(2024, 1, 1)));
        let events: Vec<_> = (&mut scan).collect::<Result<_>>().unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(scan.stats().records_skipped, 1);
        assert_eq!(scan.stats().records_read, 5);
    }

    #[test]
    fn test_scan_missing_partitions_are_empty() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path().join("never-created"))).unwrap();

        let mut scan = store.scan(DateRange::new(day(2020, 1, 1), day(2020, 1, 10)));
        assert!(scan.next().is_none());
        assert_eq!(scan.stats().partitions_missing, 10);
        assert!(store.partition_dates().unwrap().is_empty());
    }

    #[test]
    fn test_scan_orders_partitions_ascending() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();

        // Write the later day first
        store.append(api_payload("/late"), Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap()).unwrap();
        store.append(api_payload("/early"), Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()).unwrap();

        let paths: Vec<String> = store
            .scan(DateRange::new(day(2024, 1, 1), day(2024, 1, 3)))
            .map(|e| e.unwrap().field_str("path").unwrap().to_string())
            .collect();
        assert_eq!(paths, vec!["/early", "/late"]);
    }

    #[test]
    fn test_scan_ignores_unterminated_tail() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        let path = dir.path().join("audit_20240101.jsonl");

        fs::write(
            &path,
            "{\"event_type\":\"error\",\"timestamp\":\"2024-01-01T01:00:00Z\"}\n{\"event_type\":\"err",
        )
        .unwrap();

        let mut scan = store.scan(DateRange::single(day(2024, 1, 1)));
        assert_eq!((&mut scan).count(), 1);
        assert_eq!(scan.stats().records_skipped, 0);
    }

    #[test]
    fn test_append_after_torn_tail_starts_new_line() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        let path = dir.path().join("audit_20240101.jsonl");
        fs::write(&path, "{\"event_type\":\"error\",\"timest").unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        store.append(api_payload("/after-crash"), at).unwrap();
        store.append(api_payload("/next"), at).unwrap();

        let mut scan = store.scan(DateRange::single(day(2024, 1, 1)));
        let paths: Vec<String> = (&mut scan)
            .map(|e| e.unwrap().field_str("path").unwrap().to_string())
            .collect();
        assert_eq!(paths, vec!["/after-crash", "/next"]);
        assert_eq!(scan.stats().records_skipped, 1);

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn test_scan_reports_unreadable_storage() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("file");
        fs::write(&not_a_dir, "x").unwrap();
        let store = PartitionStore::open(AuditConfig::new(&not_a_dir)).unwrap();

        let mut scan = store.scan(DateRange::single(day(2024, 1, 1)));
        assert!(matches!(scan.next(), Some(Err(AuditError::StorageUnavailable(_)))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_append_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("file");
        fs::write(&not_a_dir, "x").unwrap();
        let store = PartitionStore::open(AuditConfig::new(&not_a_dir)).unwrap();

        let payload = RecordPayload::Error(ErrorRecord {
            error_type: truncate_message("Io", 200),
            error_message: truncate_message("disk", 200),
            path: None,
            method: None,
            session_id: None,
        });
        let err = store.append(payload, Utc::now()).unwrap_err();
        assert!(matches!(err, AuditError::AuditWriteFailed(_)));
    }

    #[test]
    fn test_concurrent_appends_keep_lines_whole() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(PartitionStore::open(AuditConfig::new(dir.path())).unwrap());
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(api_payload(&format!("/t{t}/{i}")), at).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut scan = store.scan(DateRange::single(day(2024, 1, 1)));
        assert_eq!((&mut scan).filter(|e| e.is_ok()).count(), 400);
        assert_eq!(scan.stats().records_skipped, 0);
    }
}
