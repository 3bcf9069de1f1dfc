use std::path::PathBuf;

use crate::error::DeliveryError;

pub mod smtp;

pub use smtp::{DryRunMailer, SmtpMailer};

/// Where and how to connect for a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    /// (user, password), only set when a user is configured.
    pub credentials: Option<(String, String)>,
    pub use_ssl: bool,
}

/// A fully resolved message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    /// Present only when the file existed at construction time.
    pub attachment: Option<PathBuf>,
}

/// Delivery capability: send a message or fail with a reason.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &OutgoingMessage, endpoint: &SmtpEndpoint)
        -> Result<(), DeliveryError>;
}

#[cfg(test)]
pub use recording::RecordingMailer;

#[cfg(test)]
mod recording {
    use std::sync::Mutex;

    use super::{Mailer, OutgoingMessage, SmtpEndpoint};
    use crate::error::DeliveryError;

    /// Captures messages instead of sending them. Recipients listed in
    /// `fail_for` produce a transport error with the configured reason.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMessage>>,
        fail_for: Vec<(String, String)>,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_for(mut self, recipient: &str, reason: &str) -> Self {
            self.fail_for
                .push((recipient.to_string(), reason.to_string()));
            self
        }

        pub fn sent(&self) -> Vec<OutgoingMessage> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    impl Mailer for RecordingMailer {
        fn send(
            &self,
            message: &OutgoingMessage,
            _endpoint: &SmtpEndpoint,
        ) -> Result<(), DeliveryError> {
            if let Some((_, reason)) = self
                .fail_for
                .iter()
                .find(|(rcpt, _)| message.to.iter().any(|to| to == rcpt))
            {
                return Err(DeliveryError::Transport(reason.clone()));
            }
            self.sent
                .lock()
                .map_err(|_| DeliveryError::Transport("recording mailer poisoned".to_string()))?
                .push(message.clone());
            Ok(())
        }
    }
}
