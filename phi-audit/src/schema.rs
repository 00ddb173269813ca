//! Record schemas for partition lines
//!
//! Each event type has:
//! - A record struct holding only redacted or non-sensitive values
//! - A variant in [`RecordPayload`], the only thing the store will append
//!
//! [`AuditEvent`] is the on-disk shape: `event_type`, `timestamp`,
//! `event_id` and the per-type fields flattened into one JSON object.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AuditError, Result};
use crate::redact::{BoundedText, MaskedAddress, SessionToken};

// ─── Event Types ───

/// Closed set of event types known to aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ApiRequest,
    MedicalQuery,
    AttestationVerification,
    Error,
    EncryptionOperation,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        Self::ApiRequest,
        Self::MedicalQuery,
        Self::AttestationVerification,
        Self::Error,
        Self::EncryptionOperation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiRequest => "api_request",
            Self::MedicalQuery => "medical_query",
            Self::AttestationVerification => "attestation_verification",
            Self::Error => "error",
            Self::EncryptionOperation => "encryption_operation",
        }
    }

    /// Parse a persisted `event_type`; `None` for anything outside the set
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Per-Type Records ───
//
// Every caller-supplied string is a `BoundedText`, so no field can outgrow
// the truncation limit.

/// `api_request`: security monitoring of the HTTP surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRequestRecord {
    pub method: BoundedText,
    pub path: BoundedText,
    pub status_code: u16,
    pub duration_seconds: f64,
    pub client_ip: MaskedAddress,
}

/// `medical_query`: one processed query, never its plaintext
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicalQueryRecord {
    pub query_id: BoundedText,
    pub session_id: SessionToken,
    pub processing_time_ms: u64,
    pub attestation_included: bool,
    pub encrypted_query_hash: BoundedText,
    pub compliance: &'static str,
    pub phi_exposed: bool,
}

/// `attestation_verification`: outcome of a TEE attestation check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttestationRecord {
    pub attestation_id: BoundedText,
    pub verification_result: bool,
    pub enclave_hash: BoundedText,
    pub trust_level: &'static str,
}

/// `error`: failed operation, message length-capped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub error_type: BoundedText,
    pub error_message: BoundedText,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<BoundedText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<BoundedText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionToken>,
}

/// `encryption_operation`: encrypt/decrypt bookkeeping, hashes only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncryptionRecord {
    pub operation: BoundedText,
    pub encryption_type: BoundedText,
    pub data_hash: BoundedText,
    pub success: bool,
}

/// Fallback for event types outside [`EventType`]
///
/// Only built by redaction, which truncates every string value and applies
/// the matching transform to sensitive keys.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRecord {
    event_type: BoundedText,
    fields: Map<String, Value>,
}

impl GenericRecord {
    pub(crate) fn from_redacted(event_type: BoundedText, fields: Map<String, Value>) -> Self {
        Self { event_type, fields }
    }

    pub fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Redacted payload ready to be appended
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    ApiRequest(ApiRequestRecord),
    MedicalQuery(MedicalQueryRecord),
    AttestationVerification(AttestationRecord),
    Error(ErrorRecord),
    EncryptionOperation(EncryptionRecord),
    Generic(GenericRecord),
}

impl RecordPayload {
    /// Persisted `event_type` for this payload
    pub fn event_type(&self) -> &str {
        match self {
            Self::ApiRequest(_) => EventType::ApiRequest.as_str(),
            Self::MedicalQuery(_) => EventType::MedicalQuery.as_str(),
            Self::AttestationVerification(_) => EventType::AttestationVerification.as_str(),
            Self::Error(_) => EventType::Error.as_str(),
            Self::EncryptionOperation(_) => EventType::EncryptionOperation.as_str(),
            Self::Generic(g) => g.event_type(),
        }
    }

    /// Flatten into the field map stored next to `event_type`/`timestamp`
    pub fn into_fields(self) -> Result<Map<String, Value>> {
        let value = match self {
            Self::ApiRequest(r) => serde_json::to_value(r)?,
            Self::MedicalQuery(r) => serde_json::to_value(r)?,
            Self::AttestationVerification(r) => serde_json::to_value(r)?,
            Self::Error(r) => serde_json::to_value(r)?,
            Self::EncryptionOperation(r) => serde_json::to_value(r)?,
            Self::Generic(g) => return Ok(g.fields),
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(AuditError::Internal(format!(
                "record did not serialize to an object: {other}"
            ))),
        }
    }
}

// ─── Persisted Event ───

/// Keys owned by the envelope; never allowed inside `fields`
pub const RESERVED_KEYS: [&str; 3] = ["event_type", "timestamp", "event_id"];

/// One line of a partition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,

    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AuditEvent {
    /// Known type, or `None` for records outside the closed set
    pub fn kind(&self) -> Option<EventType> {
        EventType::from_name(&self.event_type)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Numeric field as `f64`; `None` when absent or not a number
    pub fn field_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn field_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Parse one partition line; rejects an empty `event_type`
    pub fn from_json_line(line: &str) -> Result<Self> {
        let event: AuditEvent = serde_json::from_str(line)?;
        if event.event_type.trim().is_empty() {
            return Err(AuditError::Serialization("empty event_type".into()));
        }
        Ok(event)
    }

    /// Serialize as one newline-terminated line
    pub fn to_json_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// RFC 3339 in UTC with microseconds on write; naive ISO-8601 accepted on read
/// and taken as UTC.
pub mod timestamp_format {
    use super::*;

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
