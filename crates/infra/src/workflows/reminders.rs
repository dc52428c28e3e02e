//! Payment reminders for overdue pending invoices.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use estateerp_core::TenantId;
use estateerp_core::money::format_inr;
use estateerp_crm::CustomerId;

use super::WorkflowError;
use crate::mail::{MailError, MailMessage, Mailer};
use crate::projections::{CustomersProjection, InvoiceReadModel, InvoicesProjection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderSent {
    pub invoice_number: String,
    pub to: String,
    pub days_overdue: i64,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderSkipped {
    pub invoice_number: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub sent: Vec<ReminderSent>,
    pub skipped: Vec<ReminderSkipped>,
}

fn reminder_body(invoice: &InvoiceReadModel, days_overdue: i64) -> String {
    format!(
        "Dear {},\n\nInvoice {} dated {} was due on {} and is {} day(s) overdue.\n\
         Amount outstanding: Rs. {}\n\nPlease arrange the payment at the earliest. \
         Ignore this message if it has already been made.\n",
        invoice.customer_name,
        invoice.number,
        invoice.invoice_date,
        invoice.due_date,
        days_overdue,
        format_inr(invoice.outstanding),
    )
}

/// Mail every customer whose pending invoice is more than `grace_days` past due.
///
/// Customers without a usable email address are reported as skipped.
pub fn send_payment_reminders(
    invoices: &InvoicesProjection,
    customers: &CustomersProjection,
    mailer: &dyn Mailer,
    from: &str,
    tenant_id: TenantId,
    today: NaiveDate,
    grace_days: u32,
) -> Result<ReminderReport, WorkflowError> {
    let mut report = ReminderReport::default();

    for invoice in invoices.overdue(tenant_id, today) {
        let days_overdue = invoice.days_overdue(today);
        if days_overdue <= i64::from(grace_days) {
            continue;
        }
        let email = customers
            .get(tenant_id, &CustomerId::new(invoice.customer_id))
            .and_then(|c| c.email)
            .filter(|e| !e.trim().is_empty());
        let Some(to) = email else {
            report.skipped.push(ReminderSkipped {
                invoice_number: invoice.number.clone(),
                reason: "customer has no email address".to_string(),
            });
            continue;
        };

        let message = MailMessage {
            from: from.to_string(),
            to: to.clone(),
            subject: format!("Payment reminder: invoice {}", invoice.number),
            body: reminder_body(&invoice, days_overdue),
        };
        match mailer.send(tenant_id, message) {
            Ok(message_id) => report.sent.push(ReminderSent {
                invoice_number: invoice.number.clone(),
                to,
                days_overdue,
                message_id,
            }),
            Err(MailError::InvalidRecipient(addr)) => report.skipped.push(ReminderSkipped {
                invoice_number: invoice.number.clone(),
                reason: format!("invalid email address '{addr}'"),
            }),
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        tenant_id = %tenant_id,
        %today,
        sent = report.sent.len(),
        skipped = report.skipped.len(),
        "payment reminders dispatched"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::r#trait::EventStore;
    use std::sync::Arc;

    use chrono::Utc;
    use estateerp_crm::{Customer, CustomerCommand, CustomerDetails, RegisterCustomer};
    use estateerp_invoicing::{
        CreateInvoice, Invoice, InvoiceCommand, InvoiceId, InvoiceItem, IssueInvoice,
    };

    use crate::mail::OutboxMailer;
    use crate::numbering::NumberSeries;
    use crate::projections::ReadModels;
    use crate::streams;
    use crate::workflows::testing::{TestDispatcher, dispatcher};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn customer(d: &TestDispatcher, t: TenantId, name: &str, email: Option<&str>) -> CustomerId {
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
                    email: email.map(str::to_string),
                    phone: Some("9876543210".to_string()),
                    gstin: None,
                    address: None,
                    state: Some("Maharashtra".to_string()),
                },
                occurred_at: Utc::now(),
            }),
            |_, a| Customer::empty(CustomerId::new(a)),
        )
        .unwrap();
        id
    }

    fn pending_invoice(d: &TestDispatcher, t: TenantId, number: &str, customer: CustomerId, name: &str, due: NaiveDate) {
        let id = InvoiceId::generate();
        let make = |_: TenantId, a| Invoice::empty(InvoiceId::new(a));
        d.dispatch::<Invoice>(
            t,
            id.0,
            streams::INVOICE,
            InvoiceCommand::CreateInvoice(CreateInvoice {
                tenant_id: t,
                invoice_id: id,
                number: number.to_string(),
                customer_id: customer.0,
                customer_name: name.to_string(),
                customer_gstin: None,
                place_of_supply: None,
                company_state: "Maharashtra".to_string(),
                invoice_date: date(1),
                due_date: due,
                property_id: None,
                items: vec![InvoiceItem {
                    description: "Booking instalment".to_string(),
                    hsn_sac: "995411".to_string(),
                    quantity: 1,
                    unit_price: 5_00_000_00,
                    discount: 0,
                    gst_rate: 500,
                }],
                occurred_at: Utc::now(),
            }),
            make,
        )
        .unwrap();
        d.dispatch::<Invoice>(
            t,
            id.0,
            streams::INVOICE,
            InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id: t,
                invoice_id: id,
                occurred_at: Utc::now(),
            }),
            make,
        )
        .unwrap();
    }

    #[test]
    fn reminders_go_to_customers_past_the_grace_period() {
        let d = dispatcher();
        let t = TenantId::new();
        let meera = customer(&d, t, "Meera Joshi", Some("meera@example.in"));
        let anil = customer(&d, t, "Anil Shah", None);
        let late = customer(&d, t, "Late Payer", Some("late@example.in"));
        pending_invoice(&d, t, "INV/00001", meera, "Meera Joshi", date(5));
        pending_invoice(&d, t, "INV/00002", anil, "Anil Shah", date(5));
        // within the grace period
        pending_invoice(&d, t, "INV/00003", late, "Late Payer", date(18));
        // not due yet
        pending_invoice(&d, t, "INV/00004", meera, "Meera Joshi", date(31));

        let models = ReadModels::new(Arc::new(NumberSeries::new()));
        models.rebuild(&d.store().load_all().unwrap());
        let mailer = OutboxMailer::new();

        let report = send_payment_reminders(
            &models.invoices,
            &models.customers,
            &mailer,
            "accounts@estate.example",
            t,
            date(20),
            3,
        )
        .unwrap();

        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].invoice_number, "INV/00001");
        assert_eq!(report.sent[0].days_overdue, 15);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].invoice_number, "INV/00002");

        let outbox = mailer.outbox(t);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].message.to, "meera@example.in");
        assert!(outbox[0].message.body.contains("INV/00001"));
        assert!(mailer.outbox(TenantId::new()).is_empty());
    }
}
