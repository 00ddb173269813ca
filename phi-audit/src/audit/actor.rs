//! AuditActor — single writer for the audit log, plus the read surface
//!
//! Appends are funnelled through one actor task so there is exactly one
//! writer per process. Reads never go through the actor: `list_events`,
//! `get_summary` and `get_compliance_snapshot` scan partitions directly on
//! the blocking pool.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use phi_audit::audit::{AuditActor, ApiRequest, MedicalQuery};
//! use phi_audit::AuditConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = AuditActor::spawn(AuditConfig::new("/var/log/phi-audit")).await?;
//!
//!     // Raw values go in; redaction happens inside the writer
//!     handle.record_event(MedicalQuery {
//!         query_id: "q-42".into(),
//!         session_id: "sess-raw-token".into(),
//!         processing_time_ms: 1200,
//!         attestation_included: true,
//!         encrypted_query_hash: "9f86d081".into(),
//!     }).await?;
//!
//!     // Fire-and-forget from a request path
//!     handle.record_event_detached(ApiRequest {
//!         method: "POST".into(),
//!         path: "/api/v1/query".into(),
//!         status_code: 200,
//!         duration: Duration::from_millis(35),
//!         client_ip: Some("203.0.113.7".into()),
//!     }).await;
//!
//!     let page = handle.list_events(24, None, 100).await?;
//!     let summary = handle.get_summary(24).await?;
//!     println!("{} events, {} queries", page.total_count, summary.totals.medical_queries);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::query::{query, QueryWindow};
use crate::redact::RedactionPolicy;
use crate::store::PartitionStore;
use crate::summary::{summarize, SummaryReport};

use super::types::*;

/// Window used for the metrics block of the compliance snapshot
const COMPLIANCE_WINDOW_HOURS: u32 = 24;

// ─── Messages ───

enum AuditMsg {
    Append {
        event: NewEvent,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
}

// ─── Actor ───

/// Audit actor, owner of the write path
pub struct AuditActor {
    store: Arc<PartitionStore>,
    clock: Arc<dyn Clock>,
    policy: RedactionPolicy,
    rx: mpsc::Receiver<AuditMsg>,
}

impl AuditActor {
    /// Spawn the audit actor on the system clock
    pub async fn spawn(config: AuditConfig) -> Result<AuditHandle> {
        Self::spawn_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Spawn the audit actor with an explicit time source
    pub async fn spawn_with_clock(config: AuditConfig, clock: Arc<dyn Clock>) -> Result<AuditHandle> {
        let policy = RedactionPolicy::from_config(&config);
        let capacity = config.channel_capacity;
        let store = Arc::new(PartitionStore::open(config)?);

        let (tx, rx) = mpsc::channel(capacity);
        let actor = Self {
            store: Arc::clone(&store),
            clock: Arc::clone(&clock),
            policy,
            rx,
        };
        tokio::spawn(actor.run());
        info!(
            log_dir = %store.config().log_dir.display(),
            capacity,
            "AuditActor spawned"
        );

        Ok(AuditHandle {
            tx,
            store,
            clock,
            policy,
        })
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                AuditMsg::Append { event, reply } => {
                    let result = self.handle_append(event).await;
                    if let Err(e) = &result {
                        warn!(error = %e, "Failed to write audit event");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
            }
        }
        info!("AuditActor stopped");
    }

    async fn handle_append(&self, event: NewEvent) -> Result<()> {
        let payload = event.redact(&self.policy);
        let at = self.clock.now_utc();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.append(payload, at))
            .await
            .map_err(|e| AuditError::AuditWriteFailed(format!("append task failed: {e}")))??;
        Ok(())
    }
}

// ─── Handle ───

/// Thread-safe handle to the audit log
///
/// Cheap to clone; create one at startup with [`AuditActor::spawn`] and pass
/// it to whatever needs to record or read events.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditMsg>,
    store: Arc<PartitionStore>,
    clock: Arc<dyn Clock>,
    policy: RedactionPolicy,
}

impl AuditHandle {
    /// Record an event and wait until it is on disk
    ///
    /// Errors are for the caller's information only; an audited operation
    /// should not fail because its audit record could not be written.
    pub async fn record_event(&self, event: impl Into<NewEvent>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AuditMsg::Append {
                event: event.into(),
                reply: Some(reply),
            })
            .await
            .map_err(|_| AuditError::ActorUnavailable("AuditActor".into()))?;
        rx.await
            .map_err(|_| AuditError::ActorUnavailable("AuditActor dropped".into()))?
    }

    /// Record an event without waiting for the write (fire-and-forget)
    pub async fn record_event_detached(&self, event: impl Into<NewEvent>) {
        let msg = AuditMsg::Append {
            event: event.into(),
            reply: None,
        };
        if self.tx.send(msg).await.is_err() {
            warn!("AuditActor unavailable, audit event dropped");
        }
    }

    /// Most recent events of the last `hours_back` hours, newest first
    ///
    /// `hours_back` must be in `1..=max_hours_back` and `limit` in
    /// `1..=max_limit`. A filter naming a type that was never written yields
    /// an empty page.
    pub async fn list_events(
        &self,
        hours_back: u32,
        event_type: Option<&str>,
        limit: usize,
    ) -> Result<EventPage> {
        self.check_hours_back(hours_back)?;
        let max_limit = self.store.config().max_limit;
        if limit == 0 || limit > max_limit {
            return Err(AuditError::InvalidQuery(format!(
                "limit must be between 1 and {max_limit}, got {limit}"
            )));
        }

        let end = self.clock.now_utc();
        let start = end - Duration::hours(i64::from(hours_back));
        let mut window = QueryWindow::new(start, end, limit);
        if let Some(event_type) = event_type {
            window = window.with_event_type(event_type);
        }

        let store = Arc::clone(&self.store);
        let page = tokio::task::spawn_blocking(move || query(&store, &window)).await??;

        Ok(EventPage {
            total_count: page.total_count,
            truncated: page.truncated,
            skipped_records: page.skipped_records,
            entries: page.events.into_iter().map(EventEntry::from).collect(),
            period_start: start,
            period_end: end,
        })
    }

    /// Rollup of the last `hours_back` hours
    pub async fn get_summary(&self, hours_back: u32) -> Result<SummaryReport> {
        self.check_hours_back(hours_back)?;
        self.summary_for(hours_back).await
    }

    /// Structural compliance findings plus last-24h metrics
    ///
    /// The findings hold by construction and are always returned. When the
    /// metrics scan fails, `metrics` is `None` and the reason is attached.
    pub async fn get_compliance_snapshot(&self) -> ComplianceSnapshot {
        match self.summary_for(COMPLIANCE_WINDOW_HOURS).await {
            Ok(summary) => {
                let metrics = ComplianceMetrics::from_summary(COMPLIANCE_WINDOW_HOURS, &summary);
                ComplianceSnapshot::new(summary.generated_at, &self.policy, Ok(metrics))
            }
            Err(e) => {
                warn!(error = %e, "Compliance metrics unavailable");
                ComplianceSnapshot::new(self.clock.now_utc(), &self.policy, Err(e))
            }
        }
    }

    /// Get a reference to the underlying store
    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    async fn summary_for(&self, hours_back: u32) -> Result<SummaryReport> {
        let end = self.clock.now_utc();
        let start = end - Duration::hours(i64::from(hours_back));
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || summarize(&store, start, end, end)).await?
    }

    fn check_hours_back(&self, hours_back: u32) -> Result<()> {
        let max = self.store.config().max_hours_back;
        if hours_back == 0 || hours_back > max {
            return Err(AuditError::InvalidQuery(format!(
                "hours_back must be between 1 and {max}, got {hours_back}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuditHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditHandle")
            .field("log_dir", &self.store.config().log_dir)
            .field("policy", &self.policy)
            .finish()
    }
}
