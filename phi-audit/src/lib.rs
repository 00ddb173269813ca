//! # PHI Audit
//!
//! Append-only audit log for services that handle protected health
//! information. Records are redacted before they are written, stored as
//! day-partitioned JSON Lines, and read back as bounded pages or rollups.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                 phi-audit                 │
//! ├─────────────────────┬─────────────────────┤
//! │     AuditActor      │     AuditHandle     │
//! │  (redact, stamp,    │  (list_events,      │
//! │   single writer)    │   summary, report)  │
//! ├─────────────────────┼──────────┬──────────┤
//! │      Redactor       │  Query   │ Summary  │
//! ├─────────────────────┴──────────┴──────────┤
//! │              PartitionStore               │
//! │  (O_APPEND lines, lazy tolerant scans)    │
//! ├───────────────────────────────────────────┤
//! │       <log_dir>/audit_YYYYMMDD.jsonl      │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phi_audit::{AuditActor, AuditConfig};
//! use phi_audit::audit::ErrorEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = AuditActor::spawn(AuditConfig::from_env()?).await?;
//!
//!     handle.record_event_detached(ErrorEvent {
//!         error_type: "DecryptionError".into(),
//!         error_message: "ciphertext rejected".into(),
//!         path: Some("/api/v1/query".into()),
//!         method: Some("POST".into()),
//!         session_id: Some("sess-raw".into()),
//!     }).await;
//!
//!     let errors = handle.list_events(24, Some("error"), 50).await?;
//!     let snapshot = handle.get_compliance_snapshot().await;
//!     println!("{} errors, status {}", errors.total_count, snapshot.compliance_status);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Redaction by construction**: session ids hashed, addresses masked,
//!   free text length-capped before serialization
//! - **Atomic appends**: one `write_all` per line on an append-mode file
//! - **Tolerant reads**: malformed lines are counted and skipped
//! - **Bounded queries**: newest day first, stops once the page is full
//! - **Railway Programming**: All operations return `Result<T, AuditError>`

pub mod clock;
pub mod config;
pub mod error;
pub mod query;
pub mod redact;
pub mod schema;
pub mod store;
pub mod summary;

#[cfg(feature = "audit")]
pub mod audit;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuditConfig;
pub use error::{AuditError, Result};
pub use schema::{AuditEvent, EventType};
pub use store::PartitionStore;
pub use summary::SummaryReport;

#[cfg(feature = "audit")]
pub use audit::{AuditActor, AuditHandle, EventSink, NewEvent};
