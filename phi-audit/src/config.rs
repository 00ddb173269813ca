//! Configuration for the audit subsystem

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{AuditError, Result};

/// Environment variable overriding the log directory in [`AuditConfig::from_env`]
pub const ENV_LOG_DIR: &str = "PHI_AUDIT_LOG_DIR";
/// Environment variable overriding the message truncation limit
pub const ENV_MESSAGE_LIMIT: &str = "PHI_AUDIT_MESSAGE_LIMIT";
/// Environment variable enabling fsync after every append
pub const ENV_SYNC_ON_WRITE: &str = "PHI_AUDIT_SYNC_ON_WRITE";

/// Audit subsystem configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Directory holding one partition file per UTC day
    pub log_dir: PathBuf,

    /// Partition file name prefix (`audit_20240101.jsonl`)
    pub file_prefix: String,

    /// Maximum characters kept from free-text messages before the `...` marker
    pub max_message_len: usize,

    /// Hex characters kept from the session id digest
    pub session_token_len: usize,

    /// fsync the partition file after every append
    pub sync_on_write: bool,

    /// Writer actor mailbox capacity
    pub channel_capacity: usize,

    /// Largest look-back accepted by `list_events` / `get_summary`
    pub max_hours_back: u32,

    /// Largest page accepted by `list_events`
    pub max_limit: usize,
}

impl AuditConfig {
    /// Create config with sensible defaults
    ///
    /// # Arguments
    /// * `log_dir` - Directory for partition files.
    ///   Structure created lazily on first write:
    ///   ```text
    ///   log_dir/
    ///   ├── audit_20240101.jsonl
    ///   ├── audit_20240102.jsonl
    ///   └── ...
    ///   ```
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
            file_prefix: "audit_".to_string(),
            max_message_len: 200,
            session_token_len: 16,
            sync_on_write: false,
            channel_capacity: 512,
            max_hours_back: 168, // 7 days
            max_limit: 1000,
        }
    }

    /// Build from `PHI_AUDIT_*` environment variables, falling back to `logs/`
    pub fn from_env() -> Result<Self> {
        let log_dir = std::env::var(ENV_LOG_DIR).unwrap_or_else(|_| "logs".to_string());
        let mut config = Self::new(log_dir);

        if let Ok(raw) = std::env::var(ENV_MESSAGE_LIMIT) {
            let limit = raw.parse::<usize>().map_err(|e| {
                AuditError::Config(format!("{ENV_MESSAGE_LIMIT}={raw}: {e}"))
            })?;
            config = config.with_max_message_len(limit);
        }

        if let Ok(raw) = std::env::var(ENV_SYNC_ON_WRITE) {
            let sync = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
            config = config.with_sync_on_write(sync);
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the message truncation limit
    pub fn with_max_message_len(mut self, limit: usize) -> Self {
        self.max_message_len = limit;
        self
    }

    /// Override the session token length
    pub fn with_session_token_len(mut self, len: usize) -> Self {
        self.session_token_len = len;
        self
    }

    /// Enable or disable fsync after every append
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Override the writer mailbox capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check invariants that the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        if self.max_message_len == 0 {
            return Err(AuditError::Config("max_message_len must be positive".into()));
        }
        // SHA-256 hex is 64 characters
        if self.session_token_len == 0 || self.session_token_len > 64 {
            return Err(AuditError::Config(format!(
                "session_token_len must be in 1..=64, got {}",
                self.session_token_len
            )));
        }
        if self.channel_capacity == 0 {
            return Err(AuditError::Config("channel_capacity must be positive".into()));
        }
        if self.max_hours_back == 0 || self.max_limit == 0 {
            return Err(AuditError::Config("query bounds must be positive".into()));
        }
        Ok(())
    }

    /// File name of the partition for `date`
    pub fn partition_file_name(&self, date: NaiveDate) -> String {
        format!("{}{}.jsonl", self.file_prefix, date.format("%Y%m%d"))
    }

    /// Full path of the partition for `date`
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.log_dir.join(self.partition_file_name(date))
    }

    /// Inverse of [`partition_file_name`](Self::partition_file_name)
    pub fn parse_partition_file_name(&self, name: &str) -> Option<NaiveDate> {
        let stem = name.strip_prefix(&self.file_prefix)?.strip_suffix(".jsonl")?;
        NaiveDate::parse_from_str(stem, "%Y%m%d").ok()
    }
}
