//! Outgoing mail: broadcasts and payment reminders.
//!
//! Delivery goes through the [`Mailer`] trait. [`OutboxMailer`] keeps every
//! message per tenant so it can be inspected through the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use estateerp_core::TenantId;

use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("mail transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMail {
    pub message_id: Uuid,
    pub message: MailMessage,
    pub sent_at: DateTime<Utc>,
}

pub trait Mailer: Send + Sync {
    fn send(&self, tenant_id: TenantId, message: MailMessage) -> Result<Uuid, MailError>;
}

impl<M> Mailer for std::sync::Arc<M>
where
    M: Mailer + ?Sized,
{
    fn send(&self, tenant_id: TenantId, message: MailMessage) -> Result<Uuid, MailError> {
        (**self).send(tenant_id, message)
    }
}

/// Rough shape check: one `@` with text on both sides and a dotted domain.
pub fn is_plausible_address(address: &str) -> bool {
    let Some((local, domain)) = address.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

#[derive(Debug, Default)]
pub struct OutboxMailer {
    outbox: InMemoryTenantStore<Uuid, SentMail>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent for the tenant, oldest first.
    pub fn outbox(&self, tenant_id: TenantId) -> Vec<SentMail> {
        let mut out = self.outbox.list(tenant_id);
        out.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.message_id.cmp(&b.message_id)));
        out
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, tenant_id: TenantId, message: MailMessage) -> Result<Uuid, MailError> {
        if !is_plausible_address(&message.to) {
            return Err(MailError::InvalidRecipient(message.to));
        }
        let message_id = Uuid::now_v7();
        info!(
            tenant_id = %tenant_id,
            %message_id,
            to = %message.to,
            subject = %message.subject,
            "mail queued"
        );
        self.outbox.upsert(
            tenant_id,
            message_id,
            SentMail {
                message_id,
                message,
                sent_at: Utc::now(),
            },
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> MailMessage {
        MailMessage {
            from: "accounts@estate.example".to_string(),
            to: to.to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        }
    }

    #[test]
    fn outbox_is_per_tenant() {
        let mailer = OutboxMailer::new();
        let a = TenantId::new();
        let b = TenantId::new();

        mailer.send(a, message("one@example.in")).unwrap();
        mailer.send(a, message("two@example.in")).unwrap();
        mailer.send(b, message("three@example.in")).unwrap();

        let sent: Vec<_> = mailer.outbox(a).into_iter().map(|m| m.message.to).collect();
        assert_eq!(sent, vec!["one@example.in", "two@example.in"]);
        assert_eq!(mailer.outbox(b).len(), 1);
    }

    #[test]
    fn malformed_recipients_are_rejected() {
        let mailer = OutboxMailer::new();
        let t = TenantId::new();
        for bad in ["", "no-at-sign", "a@b", "a@@b.in", "x y@z.in", "@z.in"] {
            assert!(matches!(
                mailer.send(t, message(bad)),
                Err(MailError::InvalidRecipient(_))
            ));
        }
        assert!(mailer.outbox(t).is_empty());
    }
}
