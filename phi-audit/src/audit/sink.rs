//! The `EventSink` seam request handlers record through
//!
//! Handlers take `&dyn EventSink` (or `Arc<dyn EventSink>`) instead of a
//! concrete handle, so tests can capture events without touching disk.

use async_trait::async_trait;

use crate::error::Result;

use super::actor::AuditHandle;
use super::types::NewEvent;

/// Destination for audit events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record one event; the result is informational
    async fn record(&self, event: NewEvent) -> Result<()>;
}

#[async_trait]
impl EventSink for AuditHandle {
    async fn record(&self, event: NewEvent) -> Result<()> {
        self.record_event(event).await
    }
}
