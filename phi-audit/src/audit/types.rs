//! Audit domain types: raw input events, pages and the compliance snapshot
//!
//! Input structs carry raw values exactly as the calling operation has them.
//! [`NewEvent::redact`] is the single place they turn into persisted records.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::redact::{mask_address, truncate_message, BoundedText, RedactionPolicy, UNKNOWN};
use crate::schema::{
    timestamp_format, ApiRequestRecord, AttestationRecord, AuditEvent, EncryptionRecord,
    ErrorRecord, EventType, GenericRecord, MedicalQueryRecord, RecordPayload, RESERVED_KEYS,
};
use crate::summary::SummaryReport;

/// Longest custom `event_type` kept
const MAX_CUSTOM_TYPE_LEN: usize = 64;
/// Prepended to custom event types that collide with a known type
pub const CUSTOM_TYPE_PREFIX: &str = "custom:";

/// Custom-event keys hashed like session ids
const SESSION_KEYS: [&str; 3] = ["session_id", "session_token", "session"];
/// Custom-event keys masked like client addresses
const ADDRESS_KEYS: [&str; 4] = ["client_ip", "ip_address", "ip", "remote_addr"];

// ─── Raw Input Events ───

/// HTTP request seen by the surrounding service
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration: Duration,
    pub client_ip: Option<String>,
}

/// Completed medical query; the query text itself never enters here
#[derive(Debug, Clone, PartialEq)]
pub struct MedicalQuery {
    pub query_id: String,
    pub session_id: String,
    pub processing_time_ms: u64,
    pub attestation_included: bool,
    pub encrypted_query_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttestationVerification {
    pub attestation_id: String,
    pub verification_result: bool,
    pub enclave_hash: String,
}

/// Failure of an audited operation
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub error_type: String,
    pub error_message: String,
    pub path: Option<String>,
    pub method: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionOperation {
    pub operation: String,
    pub encryption_type: String,
    pub data_hash: String,
    pub success: bool,
}

/// Scalar value of a custom event field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl FieldValue {
    fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Event outside the known set
#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    pub event_type: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl CustomEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Event handed to the writer, one variant per event type
#[derive(Debug, Clone, PartialEq)]
pub enum NewEvent {
    ApiRequest(ApiRequest),
    MedicalQuery(MedicalQuery),
    AttestationVerification(AttestationVerification),
    Error(ErrorEvent),
    EncryptionOperation(EncryptionOperation),
    Custom(CustomEvent),
}

macro_rules! into_new_event {
    ($($variant:ident => $ty:ty),* $(,)?) => {$(
        impl From<$ty> for NewEvent {
            fn from(event: $ty) -> Self {
                NewEvent::$variant(event)
            }
        }
    )*};
}

into_new_event! {
    ApiRequest => ApiRequest,
    MedicalQuery => MedicalQuery,
    AttestationVerification => AttestationVerification,
    Error => ErrorEvent,
    EncryptionOperation => EncryptionOperation,
    Custom => CustomEvent,
}

impl NewEvent {
    /// Known type, `None` for custom events
    pub fn kind(&self) -> Option<EventType> {
        match self {
            Self::ApiRequest(_) => Some(EventType::ApiRequest),
            Self::MedicalQuery(_) => Some(EventType::MedicalQuery),
            Self::AttestationVerification(_) => Some(EventType::AttestationVerification),
            Self::Error(_) => Some(EventType::Error),
            Self::EncryptionOperation(_) => Some(EventType::EncryptionOperation),
            Self::Custom(_) => None,
        }
    }

    /// Apply every redaction this event type requires
    pub fn redact(self, policy: &RedactionPolicy) -> RecordPayload {
        let text = |raw: &str| policy.message(raw);
        match self {
            Self::ApiRequest(e) => RecordPayload::ApiRequest(ApiRequestRecord {
                method: text(&e.method),
                path: text(&e.path),
                status_code: e.status_code,
                duration_seconds: (e.duration.as_secs_f64() * 1000.0).round() / 1000.0,
                client_ip: mask_address(e.client_ip.as_deref()),
            }),
            Self::MedicalQuery(e) => RecordPayload::MedicalQuery(MedicalQueryRecord {
                query_id: text(&e.query_id),
                session_id: policy.session(&e.session_id),
                processing_time_ms: e.processing_time_ms,
                attestation_included: e.attestation_included,
                encrypted_query_hash: text(&e.encrypted_query_hash),
                compliance: "HIPAA",
                phi_exposed: false,
            }),
            Self::AttestationVerification(e) => {
                RecordPayload::AttestationVerification(AttestationRecord {
                    attestation_id: text(&e.attestation_id),
                    verification_result: e.verification_result,
                    enclave_hash: text(&e.enclave_hash),
                    trust_level: if e.verification_result { "TEE_verified" } else { "unverified" },
                })
            }
            Self::Error(e) => RecordPayload::Error(ErrorRecord {
                error_type: text(&e.error_type),
                error_message: text(&e.error_message),
                path: e.path.as_deref().map(text),
                method: e.method.as_deref().map(text),
                session_id: e.session_id.as_deref().map(|s| policy.session(s)),
            }),
            Self::EncryptionOperation(e) => RecordPayload::EncryptionOperation(EncryptionRecord {
                operation: text(&e.operation),
                encryption_type: text(&e.encryption_type),
                data_hash: text(&e.data_hash),
                success: e.success,
            }),
            Self::Custom(e) => RecordPayload::Generic(redact_custom(e, policy)),
        }
    }
}

/// Persisted type name for a custom event
///
/// Names of the known types are moved under [`CUSTOM_TYPE_PREFIX`]; only the
/// typed records may be written as `medical_query`, `error` and so on.
fn custom_type_name(raw: &str) -> BoundedText {
    let name = raw.trim();
    if name.is_empty() {
        truncate_message(UNKNOWN, MAX_CUSTOM_TYPE_LEN)
    } else if EventType::from_name(name).is_some() {
        truncate_message(&format!("{CUSTOM_TYPE_PREFIX}{name}"), MAX_CUSTOM_TYPE_LEN)
    } else {
        truncate_message(name, MAX_CUSTOM_TYPE_LEN)
    }
}

fn redact_custom(event: CustomEvent, policy: &RedactionPolicy) -> GenericRecord {
    let event_type = custom_type_name(&event.event_type);
    if event_type.as_str() != event.event_type.trim() {
        debug!(event_type = %event_type, "Renamed custom audit event type");
    }

    let mut fields = Map::new();
    for (key, value) in event.fields {
        if RESERVED_KEYS.contains(&key.as_str()) {
            debug!(key = %key, "Dropping reserved key from custom audit event");
            continue;
        }
        let lower = key.to_ascii_lowercase();
        let redacted = if SESSION_KEYS.contains(&lower.as_str()) {
            Value::String(policy.session(&value.as_text()).to_string())
        } else if ADDRESS_KEYS.contains(&lower.as_str()) {
            Value::String(mask_address(Some(&value.as_text())).to_string())
        } else {
            match value {
                FieldValue::Text(s) => Value::String(policy.message(&s).to_string()),
                FieldValue::Integer(i) => Value::from(i),
                FieldValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
                FieldValue::Bool(b) => Value::Bool(b),
            }
        };
        fields.insert(policy.message(&key).to_string(), redacted);
    }

    GenericRecord::from_redacted(event_type, fields)
}

// ─── Read-Side Views ───

/// One entry of an [`EventPage`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEntry {
    pub event_type: String,
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    pub details: Map<String, Value>,
}

impl From<AuditEvent> for EventEntry {
    fn from(event: AuditEvent) -> Self {
        Self {
            event_type: event.event_type,
            timestamp: event.timestamp,
            event_id: event.event_id,
            details: event.fields,
        }
    }
}

/// Most-recent-first page returned by `list_events`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPage {
    pub entries: Vec<EventEntry>,
    /// Number of entries returned; bounded by the requested limit
    pub total_count: usize,
    /// More matches were seen, or may exist in days not visited
    pub truncated: bool,
    pub skipped_records: u64,
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub period_start: DateTime<Utc>,
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub period_end: DateTime<Utc>,
}

/// Structural guarantees upheld by construction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceFindings {
    pub phi_in_logs: bool,
    pub session_ids_hashed: bool,
    pub client_ips_masked: bool,
    pub error_messages_bounded: bool,
    pub append_only: bool,
    pub all_operations_logged: bool,
}

/// Redaction limits in force
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactionSettings {
    pub session_token_len: usize,
    pub max_message_len: usize,
    /// Messages are length-capped, not content-scanned
    pub message_strategy: &'static str,
}

/// Last-24h counters attached to the snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceMetrics {
    pub window_hours: u32,
    pub total_queries: u64,
    pub total_errors: u64,
    pub attestations: u64,
    pub attestations_verified: u64,
    pub skipped_records: u64,
}

impl ComplianceMetrics {
    pub fn from_summary(window_hours: u32, summary: &SummaryReport) -> Self {
        Self {
            window_hours,
            total_queries: summary.totals.medical_queries,
            total_errors: summary.totals.errors,
            attestations: summary.totals.attestations,
            attestations_verified: summary.totals.attestations_verified,
            skipped_records: summary.skipped_records,
        }
    }
}

/// Point-in-time compliance report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceSnapshot {
    pub report_type: &'static str,
    #[serde(serialize_with = "timestamp_format::serialize")]
    pub generated_at: DateTime<Utc>,
    pub compliance_status: &'static str,
    pub findings: ComplianceFindings,
    pub redaction: RedactionSettings,
    /// `None` when the metrics scan failed; see `metrics_error`
    pub metrics: Option<ComplianceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
    pub recommendations: Vec<&'static str>,
}

impl ComplianceSnapshot {
    pub fn new(
        generated_at: DateTime<Utc>,
        policy: &RedactionPolicy,
        metrics: Result<ComplianceMetrics>,
    ) -> Self {
        let (metrics, metrics_error) = match metrics {
            Ok(m) => (Some(m), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            report_type: "HIPAA_Compliance",
            generated_at,
            compliance_status: "compliant",
            findings: ComplianceFindings {
                phi_in_logs: false,
                session_ids_hashed: true,
                client_ips_masked: true,
                error_messages_bounded: true,
                append_only: true,
                all_operations_logged: true,
            },
            redaction: RedactionSettings {
                session_token_len: policy.session_token_len,
                max_message_len: policy.max_message_len,
                message_strategy: "length_cap",
            },
            metrics,
            metrics_error,
            recommendations: vec![
                "Continue monitoring audit logs daily",
                "Review access patterns monthly",
                "Update attestation keys quarterly",
            ],
        }
    }
}
