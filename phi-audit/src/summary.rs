//! Aggregator — rollup statistics over a reporting window
//!
//! Always a full scan: counts are only correct if every record in the window
//! is seen, so there is no limit here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::schema::{timestamp_format, AuditEvent, EventType};
use crate::store::{DateRange, PartitionStore, ScanStats};

/// Window the report covers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPeriod {
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub start: DateTime<Utc>,
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub end: DateTime<Utc>,
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryTotals {
    pub total_events: u64,
    pub medical_queries: u64,
    pub errors: u64,
    pub attestations: u64,
    pub attestations_verified: u64,
    pub api_requests: u64,
    pub encryption_operations: u64,
    /// Events whose type is outside the known set
    pub other: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Mean of `processing_time_ms` over medical queries, 0 when none
    pub average_processing_time_ms: f64,
    pub total_processing_time_ms: f64,
    /// Medical queries that carried a usable `processing_time_ms`
    pub timed_queries: u64,
    pub total_request_duration_seconds: f64,
}

/// Static guarantees repeated on every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceFlags {
    pub phi_exposed: bool,
    pub all_operations_logged: bool,
    pub encryption_enabled: bool,
}

impl Default for ComplianceFlags {
    fn default() -> Self {
        Self {
            phi_exposed: false,
            all_operations_logged: true,
            encryption_enabled: true,
        }
    }
}

/// Rollup over a window; recomputed per request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub period: ReportPeriod,
    pub totals: SummaryTotals,
    pub by_type: BTreeMap<String, u64>,
    pub performance: PerformanceStats,
    pub compliance: ComplianceFlags,
    pub skipped_records: u64,
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub generated_at: DateTime<Utc>,
}

/// Running totals fed one event at a time
#[derive(Debug, Default)]
pub struct Accumulator {
    totals: SummaryTotals,
    by_type: BTreeMap<String, u64>,
    processing_ms: f64,
    timed_queries: u64,
    request_seconds: f64,
}

impl Accumulator {
    pub fn observe(&mut self, event: &AuditEvent) {
        self.totals.total_events += 1;
        *self.by_type.entry(event.event_type.clone()).or_default() += 1;

        match event.kind() {
            Some(EventType::MedicalQuery) => {
                self.totals.medical_queries += 1;
                if let Some(ms) = event
                    .field_f64("processing_time_ms")
                    .filter(|ms| ms.is_finite() && *ms >= 0.0)
                {
                    self.processing_ms += ms;
                    self.timed_queries += 1;
                }
            }
            Some(EventType::Error) => self.totals.errors += 1,
            Some(EventType::AttestationVerification) => {
                self.totals.attestations += 1;
                if event.field_bool("verification_result") == Some(true) {
                    self.totals.attestations_verified += 1;
                }
            }
            Some(EventType::ApiRequest) => {
                self.totals.api_requests += 1;
                if let Some(secs) = event.field_f64("duration_seconds").filter(|s| s.is_finite()) {
                    self.request_seconds += secs;
                }
            }
            Some(EventType::EncryptionOperation) => self.totals.encryption_operations += 1,
            None => self.totals.other += 1,
        }
    }

    pub fn finish(
        self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stats: ScanStats,
        generated_at: DateTime<Utc>,
    ) -> SummaryReport {
        let average = if self.timed_queries == 0 {
            0.0
        } else {
            round2(self.processing_ms / self.timed_queries as f64)
        };
        let hours = if end > start {
            (end - start).num_seconds() as f64 / 3600.0
        } else {
            0.0
        };

        SummaryReport {
            period: ReportPeriod { start, end, hours },
            totals: self.totals,
            by_type: self.by_type,
            performance: PerformanceStats {
                average_processing_time_ms: average,
                total_processing_time_ms: self.processing_ms,
                timed_queries: self.timed_queries,
                total_request_duration_seconds: round2(self.request_seconds),
            },
            compliance: ComplianceFlags::default(),
            skipped_records: stats.records_skipped,
            generated_at,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Summarize every event with `start <= timestamp <= end`
pub fn summarize(
    store: &PartitionStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    generated_at: DateTime<Utc>,
) -> Result<SummaryReport> {
    let mut acc = Accumulator::default();
    let mut scan = store.scan(DateRange::covering(start, end));

    for event in &mut scan {
        let event = event?;
        if start <= event.timestamp && event.timestamp <= end {
            acc.observe(&event);
        }
    }

    let stats = scan.stats();
    debug!(
        partitions = stats.partitions_visited,
        records = stats.records_read,
        skipped = stats.records_skipped,
        "Audit summary scan complete"
    );
    Ok(acc.finish(start, end, stats, generated_at))
}
