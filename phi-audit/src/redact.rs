//! Redaction — pure transforms applied before anything reaches a partition
//!
//! Each function is total: every input, including empty or absent, maps to a
//! defined output. The output newtypes have no public constructor, so a record
//! struct holding a [`SessionToken`], [`MaskedAddress`] or [`BoundedText`] can
//! only have been built from redacted data.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AuditConfig;

/// Placeholder for absent session ids and addresses
pub const UNKNOWN: &str = "unknown";
/// Placeholder for addresses that do not parse
pub const UNPARSEABLE_ADDRESS: &str = "xxx.xxx.xxx.xxx";
/// Appended to messages cut by [`truncate_message`]
pub const TRUNCATION_MARKER: &str = "...";
/// Default number of hex characters kept from the session digest
pub const DEFAULT_TOKEN_LEN: usize = 16;

/// Opaque, stable stand-in for a session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionToken(String);

/// Client address with the host portion discarded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MaskedAddress(String);

/// Free text with a hard length cap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BoundedText(String);

macro_rules! redacted_str {
    ($($ty:ty),*) => {$(
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    )*};
}

redacted_str!(SessionToken, MaskedAddress, BoundedText);

/// Hash a session id into a short deterministic token
///
/// SHA-256, lowercase hex, first `len` characters (clamped to 1..=64).
/// Empty input maps to [`UNKNOWN`].
pub fn redact_session_id(raw: &str, len: usize) -> SessionToken {
    if raw.is_empty() {
        return SessionToken(UNKNOWN.to_string());
    }
    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    let len = len.clamp(1, digest.len());
    SessionToken(digest[..len].to_string())
}

/// [`redact_session_id`] for optional input
pub fn redact_optional_session_id(raw: Option<&str>, len: usize) -> SessionToken {
    redact_session_id(raw.unwrap_or_default(), len)
}

/// Keep the network part of an address, drop the host part
///
/// - IPv4 keeps the first three octets: `10.1.2.xxx`
/// - IPv6 keeps the /48 prefix: `2001:db8:85a3::xxxx`
/// - empty, absent or `"unknown"` → [`UNKNOWN`]
/// - anything else → [`UNPARSEABLE_ADDRESS`]
pub fn mask_address(raw: Option<&str>) -> MaskedAddress {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() || raw.eq_ignore_ascii_case(UNKNOWN) {
        return MaskedAddress(UNKNOWN.to_string());
    }

    let masked = match raw.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.xxx")
        }
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => {
                let [a, b, c, _] = v4.octets();
                format!("{a}.{b}.{c}.xxx")
            }
            None => {
                let s = v6.segments();
                format!("{:x}:{:x}:{:x}::xxxx", s[0], s[1], s[2])
            }
        },
        Err(_) => UNPARSEABLE_ADDRESS.to_string(),
    };
    MaskedAddress(masked)
}

/// Cap `raw` at `limit` characters, appending [`TRUNCATION_MARKER`] when cut
///
/// Blunt length defense against ciphertext or stack traces leaking into the
/// log; it does not look at content.
pub fn truncate_message(raw: &str, limit: usize) -> BoundedText {
    match raw.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut text = String::with_capacity(cut + TRUNCATION_MARKER.len());
            text.push_str(&raw[..cut]);
            text.push_str(TRUNCATION_MARKER);
            BoundedText(text)
        }
        None => BoundedText(raw.to_string()),
    }
}

/// Limits applied by the writer when redacting an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionPolicy {
    pub max_message_len: usize,
    pub session_token_len: usize,
}

impl RedactionPolicy {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            max_message_len: config.max_message_len,
            session_token_len: config.session_token_len,
        }
    }

    pub fn session(&self, raw: &str) -> SessionToken {
        redact_session_id(raw, self.session_token_len)
    }

    pub fn message(&self, raw: &str) -> BoundedText {
        truncate_message(raw, self.max_message_len)
    }
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            max_message_len: 200,
            session_token_len: DEFAULT_TOKEN_LEN,
        }
    }
}
