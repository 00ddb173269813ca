//! Query engine — bounded, most-recent-first pages over a time window
//!
//! Partitions are visited newest day first. Write-time partitioning means
//! every event in an older partition is strictly older than every event in a
//! newer one, so once a full day has been scanned and `limit` matches are
//! held, no older day can contribute.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::schema::AuditEvent;
use crate::store::{DateRange, PartitionStore};

/// Upper bound on heap slots reserved up front; larger pages grow on demand
const MAX_PREALLOCATED: usize = 1024;

/// Time window plus filters for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event_type: Option<String>,
    pub limit: usize,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, limit: usize) -> Self {
        Self {
            start,
            end,
            event_type: None,
            limit,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.start <= event.timestamp
            && event.timestamp <= self.end
            && self
                .event_type
                .as_deref()
                .map_or(true, |t| t == event.event_type)
    }
}

/// Result of [`query`]
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Most recent first
    pub events: Vec<AuditEvent>,
    /// Equal to `events.len()`; never more than the limit
    pub total_count: usize,
    /// More matches were seen, or older days were left unvisited
    pub truncated: bool,
    pub skipped_records: u64,
}

impl QueryPage {
    fn empty() -> Self {
        Self {
            events: Vec::new(),
            total_count: 0,
            truncated: false,
            skipped_records: 0,
        }
    }
}

/// Heap entry ordered by (timestamp, write sequence)
struct Ranked {
    timestamp: DateTime<Utc>,
    seq: u64,
    event: AuditEvent,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.seq).cmp(&(other.timestamp, other.seq))
    }
}

/// Run a bounded query against the store
///
/// An inverted window or a zero limit yields an empty page. Within the same
/// timestamp, later-written events rank as more recent.
pub fn query(store: &PartitionStore, window: &QueryWindow) -> Result<QueryPage> {
    if window.start > window.end || window.limit == 0 {
        return Ok(QueryPage::empty());
    }

    let days = DateRange::covering(window.start, window.end).days();
    // Min-heap of the `limit` most recent matches
    let mut kept: BinaryHeap<Reverse<Ranked>> =
        BinaryHeap::with_capacity(window.limit.min(MAX_PREALLOCATED) + 1);
    let mut truncated = false;
    let mut skipped = 0;
    let mut seq = 0u64;

    for (visited, day) in days.iter().rev().enumerate() {
        let mut scan = store.scan(DateRange::single(*day));
        for event in &mut scan {
            let event = event?;
            seq += 1;
            if !window.matches(&event) {
                continue;
            }
            kept.push(Reverse(Ranked {
                timestamp: event.timestamp,
                seq,
                event,
            }));
            if kept.len() > window.limit {
                kept.pop();
                truncated = true;
            }
        }
        skipped += scan.stats().records_skipped;

        if kept.len() >= window.limit {
            if visited + 1 < days.len() {
                truncated = true;
            }
            break;
        }
    }

    // Ascending over Reverse<_> is descending over timestamps
    let events: Vec<AuditEvent> = kept
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(ranked)| ranked.event)
        .collect();

    debug!(
        returned = events.len(),
        truncated,
        skipped,
        "Audit query complete"
    );

    Ok(QueryPage {
        total_count: events.len(),
        events,
        truncated,
        skipped_records: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::redact::truncate_message;
    use crate::schema::{ErrorRecord, RecordPayload};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn error_payload(kind: &str) -> RecordPayload {
        RecordPayload::Error(ErrorRecord {
            error_type: truncate_message(kind, 200),
            error_message: truncate_message("x", 200),
            path: None,
            method: None,
            session_id: None,
        })
    }

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_results_span_partitions_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        for (d, h) in [(1, 9), (2, 9), (3, 9), (1, 18)] {
            store.append(error_payload(&format!("{d}-{h}")), t(d, h)).unwrap();
        }

        let page = query(&store, &QueryWindow::new(t(1, 0), t(3, 23), 10)).unwrap();
        let kinds: Vec<&str> = page.events.iter().map(|e| e.field_str("error_type").unwrap()).collect();
        assert_eq!(kinds, vec!["3-9", "2-9", "1-18", "1-9"]);
        assert_eq!(page.total_count, 4);
        assert!(!page.truncated);
    }

    #[test]
    fn test_limit_keeps_most_recent_and_stops_early() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        for d in 1..=5 {
            for h in 0..4 {
                store.append(error_payload(&format!("{d}-{h}")), t(d, h)).unwrap();
            }
        }

        let page = query(&store, &QueryWindow::new(t(1, 0), t(5, 23), 6)).unwrap();
        assert_eq!(page.total_count, 6);
        assert!(page.truncated);
        assert_eq!(page.events[0].timestamp, t(5, 3));
        assert_eq!(page.events[5].timestamp, t(4, 2));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        for h in [8, 9, 10, 11] {
            store.append(error_payload("e"), t(1, h)).unwrap();
        }

        let page = query(&store, &QueryWindow::new(t(1, 9), t(1, 10), 10)).unwrap();
        assert_eq!(page.total_count, 2);

        let narrow = query(&store, &QueryWindow::new(t(1, 9), t(1, 9), 10)).unwrap();
        assert_eq!(narrow.total_count, 1);
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        store.append(error_payload("e"), t(1, 9)).unwrap();

        let page = query(&store, &QueryWindow::new(t(1, 10), t(1, 9), 10)).unwrap();
        assert_eq!(page, QueryPage::empty());
    }

    #[test]
    fn test_event_type_filter() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        store.append(error_payload("e"), t(1, 9)).unwrap();
        store
            .append(
                RecordPayload::EncryptionOperation(crate::schema::EncryptionRecord {
                    operation: truncate_message("encrypt", 200),
                    encryption_type: truncate_message("nilql", 200),
                    data_hash: truncate_message("h", 200),
                    success: true,
                }),
                t(1, 10),
            )
            .unwrap();

        let window = QueryWindow::new(t(1, 0), t(1, 23), 10).with_event_type("encryption_operation");
        let page = query(&store, &window).unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.events[0].event_type, "encryption_operation");

        let none = query(&store, &QueryWindow::new(t(1, 0), t(1, 23), 10).with_event_type("login")).unwrap();
        assert_eq!(none.total_count, 0);
    }

    #[test]
    fn test_same_timestamp_later_write_ranks_first() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        store.append(error_payload("first"), t(1, 9)).unwrap();
        store.append(error_payload("second"), t(1, 9)).unwrap();

        let page = query(&store, &QueryWindow::new(t(1, 0), t(1, 23), 1)).unwrap();
        assert_eq!(page.events[0].field_str("error_type"), Some("second"));
        assert!(page.truncated);
    }

    #[test]
    fn test_huge_limit_does_not_preallocate() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        store.append(error_payload("e"), t(1, 9)).unwrap();

        let page = query(&store, &QueryWindow::new(t(1, 0), t(1, 23), usize::MAX)).unwrap();
        assert_eq!(page.total_count, 1);
        assert!(!page.truncated);
    }

    #[test]
    fn test_window_before_any_partition() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::open(AuditConfig::new(dir.path())).unwrap();
        store.append(error_payload("e"), t(10, 9)).unwrap();

        let start = t(1, 0) - Duration::days(365);
        let page = query(&store, &QueryWindow::new(start, t(1, 0), 100)).unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.events.is_empty());
    }
}
