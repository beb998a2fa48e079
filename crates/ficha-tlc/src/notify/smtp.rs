use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{ConfirmationMessage, NotifyError, Notifier};
use crate::config::MailConfig;

/// Sends confirmations through an authenticated STARTTLS relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipient: Mailbox,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("from", &self.from.to_string())
            .field("recipient", &self.recipient.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;
        let recipient = parse_mailbox(&config.recipient)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|err| NotifyError::Transport(err.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(config.timeout))
            .build();

        Ok(Self {
            transport,
            from,
            recipient,
        })
    }

    fn build(&self, message: &ConfirmationMessage) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.recipient.clone())
            .subject(message.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body())
            .map_err(|err| NotifyError::Message(err.to_string()))
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, NotifyError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|_| NotifyError::Address(raw.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        debug!(registration_id = %message.registration_id, "confirmation mail sent");
        Ok(())
    }
}
