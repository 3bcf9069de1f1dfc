//! Error types for the mail queue worker.
//!
//! Configuration problems are fatal to a run, delivery problems are recorded
//! on the queue item and retried later, recording problems are logged and
//! dropped.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate a [`crate::config::RunConfiguration`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration document is not valid TOML or has wrongly typed keys.
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A settings-table value could not be parsed.
    #[error("invalid value '{value}' for setting {key}")]
    InvalidValue { key: &'static str, value: String },

    /// The settings source could not be queried.
    #[error("settings unavailable: {0}")]
    Unavailable(String),

    /// Parsed, but no SMTP server is configured.
    #[error("SMTP server is not configured")]
    MissingSmtpServer,
}

impl ConfigError {
    /// True for failures to read or parse the source, false for a source that
    /// parsed but fails validation.
    pub fn is_load_error(&self) -> bool {
        !matches!(self, ConfigError::MissingSmtpServer)
    }
}

/// Failure to deliver one queued message.
///
/// `Display` renders only the reason, it is embedded verbatim into the
/// item's `error_result`.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("message has no recipients")]
    NoRecipients,

    #[error("{0}")]
    Build(String),

    #[error("cannot read attachment {}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Transport(String),
}

/// Failure while writing a history note for a contact.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to look up contact {contact_id}: {reason}")]
    Lookup { contact_id: String, reason: String },

    #[error("failed to persist history note for contact {contact_id}: {reason}")]
    Persist { contact_id: String, reason: String },
}

/// Run-level failure that aborts the whole run.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load mail queue: {0}")]
    QueueLoad(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_error_display_is_bare_reason() {
        let e = DeliveryError::Transport("connection refused".to_string());
        assert_eq!(e.to_string(), "connection refused");
    }

    #[test]
    fn missing_server_is_not_a_load_error() {
        assert!(!ConfigError::MissingSmtpServer.is_load_error());
        let e = ConfigError::InvalidValue {
            key: "mailq_smtp_port",
            value: "abc".to_string(),
        };
        assert!(e.is_load_error());
    }
}
