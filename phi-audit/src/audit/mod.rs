//! Writer actor, read surface and event types
//!
//! Every audited operation hands a raw [`NewEvent`] to the [`AuditHandle`];
//! redaction, timestamping and the append happen behind it.

pub mod types;
pub mod actor;
pub mod sink;

pub use actor::{AuditActor, AuditHandle};
pub use sink::EventSink;
pub use types::{
    ApiRequest, AttestationVerification, ComplianceSnapshot, CustomEvent, EncryptionOperation,
    ErrorEvent, EventEntry, EventPage, FieldValue, MedicalQuery, NewEvent,
};
