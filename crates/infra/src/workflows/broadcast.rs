//! Broadcast mail to leads and customers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use estateerp_core::TenantId;
use estateerp_crm::LeadStatus;

use super::WorkflowError;
use crate::mail::{MailError, MailMessage, Mailer};
use crate::projections::{CustomersProjection, LeadsProjection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Audience {
    /// Leads, optionally only those at one pipeline stage.
    Leads {
        #[serde(default)]
        status: Option<LeadStatus>,
    },
    /// Active customers.
    Customers,
    Everyone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub audience: Audience,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub sent: usize,
    pub without_email: usize,
    pub rejected: Vec<String>,
}

/// Send one message per distinct address in the audience.
pub fn send_broadcast(
    leads: &LeadsProjection,
    customers: &CustomersProjection,
    mailer: &dyn Mailer,
    from: &str,
    tenant_id: TenantId,
    broadcast: &Broadcast,
) -> Result<BroadcastReport, WorkflowError> {
    if broadcast.subject.trim().is_empty() {
        return Err(WorkflowError::Validation("subject cannot be empty".to_string()));
    }
    if broadcast.body.trim().is_empty() {
        return Err(WorkflowError::Validation("body cannot be empty".to_string()));
    }

    let mut addresses: Vec<Option<String>> = Vec::new();
    if matches!(broadcast.audience, Audience::Leads { .. } | Audience::Everyone) {
        let status = match broadcast.audience {
            Audience::Leads { status } => status,
            _ => None,
        };
        addresses.extend(leads.list(tenant_id, status).into_iter().map(|l| l.email));
    }
    if matches!(broadcast.audience, Audience::Customers | Audience::Everyone) {
        addresses.extend(
            customers
                .list(tenant_id)
                .into_iter()
                .filter(|c| c.active)
                .map(|c| c.email),
        );
    }

    let mut report = BroadcastReport {
        recipients: addresses.len(),
        ..BroadcastReport::default()
    };
    let mut distinct = BTreeSet::new();
    for address in addresses {
        match address.map(|a| a.trim().to_ascii_lowercase()).filter(|a| !a.is_empty()) {
            Some(a) => {
                distinct.insert(a);
            }
            None => report.without_email += 1,
        }
    }

    for to in distinct {
        let message = MailMessage {
            from: from.to_string(),
            to,
            subject: broadcast.subject.trim().to_string(),
            body: broadcast.body.clone(),
        };
        match mailer.send(tenant_id, message) {
            Ok(_) => report.sent += 1,
            Err(MailError::InvalidRecipient(addr)) => report.rejected.push(addr),
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        tenant_id = %tenant_id,
        recipients = report.recipients,
        sent = report.sent,
        without_email = report.without_email,
        rejected = report.rejected.len(),
        "broadcast dispatched"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::r#trait::EventStore;
    use std::sync::Arc;

    use chrono::Utc;
    use estateerp_crm::{
        CaptureLead, Customer, CustomerCommand, CustomerDetails, CustomerId, Lead, LeadCommand,
        LeadId, RegisterCustomer,
    };

    use crate::mail::OutboxMailer;
    use crate::numbering::NumberSeries;
    use crate::projections::ReadModels;
    use crate::streams;
    use crate::workflows::testing::{TestDispatcher, dispatcher};

    fn lead(d: &TestDispatcher, t: TenantId, name: &str, email: Option<&str>) {
        let id = LeadId::generate();
        d.dispatch::<Lead>(
            t,
            id.0,
            streams::LEAD,
            LeadCommand::CaptureLead(CaptureLead {
                tenant_id: t,
                lead_id: id,
                name: name.to_string(),
                phone: Some("9822000000".to_string()),
                email: email.map(str::to_string),
                source: Some("expo".to_string()),
                interest: None,
                budget: None,
                status: None,
                occurred_at: Utc::now(),
            }),
            |_, a| Lead::empty(LeadId::new(a)),
        )
        .unwrap();
    }

    fn customer(d: &TestDispatcher, t: TenantId, name: &str, email: &str) {
        let id = CustomerId::generate();
        d.dispatch::<Customer>(
            t,
            id.0,
            streams::CUSTOMER,
            CustomerCommand::RegisterCustomer(RegisterCustomer {
                tenant_id: t,
                customer_id: id,
                details: CustomerDetails {
                    name: name.to_string(),
                    email: Some(email.to_string()),
                    phone: None,
                    gstin: None,
                    address: None,
                    state: None,
                },
                occurred_at: Utc::now(),
            }),
            |_, a| Customer::empty(CustomerId::new(a)),
        )
        .unwrap();
    }

    #[test]
    fn broadcast_mails_each_address_once() {
        let d = dispatcher();
        let t = TenantId::new();
        lead(&d, t, "Ravi", Some("ravi@example.in"));
        lead(&d, t, "Sunita", None);
        customer(&d, t, "Ravi K", "RAVI@example.in");
        customer(&d, t, "Farah", "farah@example.in");

        let models = ReadModels::new(Arc::new(NumberSeries::new()));
        models.rebuild(&d.store().load_all().unwrap());
        let mailer = OutboxMailer::new();

        let report = send_broadcast(
            &models.leads,
            &models.customers,
            &mailer,
            "sales@estate.example",
            t,
            &Broadcast {
                audience: Audience::Everyone,
                subject: "Tower C launch".to_string(),
                body: "Bookings open this Sunday.".to_string(),
            },
        )
        .unwrap();

        assert_eq!(report.recipients, 4);
        assert_eq!(report.without_email, 1);
        assert_eq!(report.sent, 2);
        let to: Vec<_> = mailer.outbox(t).into_iter().map(|m| m.message.to).collect();
        assert_eq!(to.len(), 2);
        assert!(to.contains(&"farah@example.in".to_string()));
        assert!(to.contains(&"ravi@example.in".to_string()));
    }

    #[test]
    fn lead_audience_can_be_narrowed_by_stage() {
        let d = dispatcher();
        let t = TenantId::new();
        lead(&d, t, "Ravi", Some("ravi@example.in"));
        customer(&d, t, "Farah", "farah@example.in");

        let models = ReadModels::new(Arc::new(NumberSeries::new()));
        models.rebuild(&d.store().load_all().unwrap());
        let mailer = OutboxMailer::new();
        let send = |audience| {
            send_broadcast(
                &models.leads,
                &models.customers,
                &mailer,
                "sales@estate.example",
                t,
                &Broadcast {
                    audience,
                    subject: "Hi".to_string(),
                    body: "Hello".to_string(),
                },
            )
            .unwrap()
        };

        assert_eq!(send(Audience::Leads { status: Some(LeadStatus::Won) }).sent, 0);
        assert_eq!(send(Audience::Leads { status: Some(LeadStatus::New) }).sent, 1);
        assert_eq!(send(Audience::Customers).sent, 1);
        assert_eq!(mailer.outbox(t).len(), 2);
    }
}
