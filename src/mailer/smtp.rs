use std::fs;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{Mailer, OutgoingMessage, SmtpEndpoint};
use crate::error::DeliveryError;

/// Port on which `use_ssl` means TLS from the first byte instead of STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Blocking SMTP delivery through lettre.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpMailer;

impl Mailer for SmtpMailer {
    fn send(&self, message: &OutgoingMessage, endpoint: &SmtpEndpoint) -> Result<(), DeliveryError> {
        let email = build_message(message)?;
        let mailer = transport(endpoint)?;
        mailer
            .send(&email)
            .map_err(|e| DeliveryError::Transport(format!("SMTP send error: {}", e)))?;
        Ok(())
    }
}

/// Builds every message like [`SmtpMailer`] but only logs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunMailer;

impl Mailer for DryRunMailer {
    fn send(&self, message: &OutgoingMessage, endpoint: &SmtpEndpoint) -> Result<(), DeliveryError> {
        let email = build_message(message)?;
        log::info!(
            "[dry-run] Would send '{}' to {} via {}:{} ({} bytes)",
            message.subject,
            message.to.join(", "),
            endpoint.host,
            endpoint.port,
            email.formatted().len()
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Turn an [`OutgoingMessage`] into a MIME message.
pub fn build_message(message: &OutgoingMessage) -> Result<Message, DeliveryError> {
    if message.to.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&message.from)?)
        .subject(message.subject.clone());
    for rcpt in &message.to {
        builder = builder.to(parse_mailbox(rcpt)?);
    }

    let content_type = if message.is_html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    let email = match &message.attachment {
        None => builder.header(content_type).body(message.body.clone()),
        Some(path) => {
            let bytes = fs::read(path).map_err(|source| DeliveryError::Attachment {
                path: path.clone(),
                source,
            })?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string());
            let octet = ContentType::parse("application/octet-stream")
                .map_err(|e| DeliveryError::Build(e.to_string()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(content_type)
                            .body(message.body.clone()),
                    )
                    .singlepart(Attachment::new(filename).body(bytes, octet)),
            )
        }
    };

    email.map_err(|e| DeliveryError::Build(format!("Failed to build email: {}", e)))
}

fn transport(endpoint: &SmtpEndpoint) -> Result<SmtpTransport, DeliveryError> {
    let builder = if endpoint.use_ssl {
        let relay = if endpoint.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&endpoint.host)
        } else {
            SmtpTransport::starttls_relay(&endpoint.host)
        };
        relay.map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {}", e)))?
    } else {
        SmtpTransport::builder_dangerous(endpoint.host.as_str())
    };

    let mut builder = builder.port(endpoint.port).timeout(Some(SEND_TIMEOUT));
    if let Some((user, password)) = &endpoint.credentials {
        builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn message(to: &[&str]) -> OutgoingMessage {
        OutgoingMessage {
            from: "crm@example.com".to_string(),
            to: to.iter().map(|s| s.to_string()).collect(),
            subject: "Quarterly report".to_string(),
            body: "Numbers attached".to_string(),
            is_html: false,
            attachment: None,
        }
    }

    fn render(email: &Message) -> String {
        String::from_utf8_lossy(&email.formatted()).into_owned()
    }

    #[test]
    fn dry_run_validates_without_sending() {
        let endpoint = SmtpEndpoint {
            host: "unreachable.invalid".to_string(),
            port: 25,
            credentials: None,
            use_ssl: false,
        };
        assert!(DryRunMailer.send(&message(&["a@x.com"]), &endpoint).is_ok());
        assert!(matches!(
            DryRunMailer.send(&message(&["not an address"]), &endpoint),
            Err(DeliveryError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn plain_message_with_many_recipients() {
        let email = build_message(&message(&["a@x.com", "b@x.com"])).unwrap();
        let raw = render(&email);
        assert!(raw.contains("a@x.com"));
        assert!(raw.contains("b@x.com"));
        assert!(raw.contains("text/plain"));
        assert_eq!(email.envelope().to().len(), 2);
    }

    #[test]
    fn html_flag_sets_content_type() {
        let mut msg = message(&["a@x.com"]);
        msg.is_html = true;
        msg.body = "<b>hi</b>".to_string();
        let raw = render(&build_message(&msg).unwrap());
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let err = build_message(&message(&["not an address"])).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
        assert!(err.to_string().contains("not an address"));
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let err = build_message(&message(&[])).unwrap_err();
        assert!(matches!(err, DeliveryError::NoRecipients));
    }

    #[test]
    fn attachment_is_embedded() {
        let path = std::env::temp_dir().join(format!("mailq-attach-{}.txt", std::process::id()));
        fs::write(&path, b"attachment-payload").unwrap();
        let mut msg = message(&["a@x.com"]);
        msg.attachment = Some(path.clone());
        let raw = render(&build_message(&msg).unwrap());
        let _ = fs::remove_file(&path);
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains(path.file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn vanished_attachment_is_an_error() {
        let mut msg = message(&["a@x.com"]);
        msg.attachment = Some(PathBuf::from("/nonexistent/mailq/file.pdf"));
        let err = build_message(&msg).unwrap_err();
        assert!(matches!(err, DeliveryError::Attachment { .. }));
    }
}
