//! Invoices read model: the receivables register.
//!
//! Tracks every invoice of a tenant with its payments and outstanding amount.
//! `overdue` is derived on read from the caller's date.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_core::{AggregateId, Paise, TenantId};
use estateerp_events::EventEnvelope;
use estateerp_invoicing::{
    InvoiceEvent, InvoiceId, InvoiceLine, InvoiceStatus, InvoiceTotals, Payment, SupplyKind,
};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::numbering::NumberSeries;
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: AggregateId,
    pub customer_name: String,
    pub customer_gstin: Option<String>,
    pub place_of_supply: Option<String>,
    pub company_state: String,
    pub supply_kind: SupplyKind,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub property_id: Option<AggregateId>,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub payments: Vec<Payment>,
    pub total_paid: Paise,
    pub outstanding: Paise,
    pub status: InvoiceStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl InvoiceReadModel {
    /// Pending with money still due after the due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Pending && self.outstanding > 0 && self.due_date < today
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.is_overdue(today) {
            (today - self.due_date).num_days()
        } else {
            0
        }
    }
}

/// Receivables at a glance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceivablesSummary {
    pub open_count: usize,
    pub total_outstanding: Paise,
    pub overdue_count: usize,
    pub overdue_amount: Paise,
}

#[derive(Debug)]
pub struct InvoicesProjection {
    store: InMemoryTenantStore<InvoiceId, InvoiceReadModel>,
    cursors: StreamCursors,
    numbers: Arc<NumberSeries>,
}

impl InvoicesProjection {
    pub fn new(numbers: Arc<NumberSeries>) -> Self {
        Self {
            store: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
            numbers,
        }
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(tenant_id, invoice_id)
    }

    /// Invoices by date then number, optionally filtered by status.
    pub fn list(&self, tenant_id: TenantId, status: Option<InvoiceStatus>) -> Vec<InvoiceReadModel> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .collect();
        out.sort_by(|a, b| {
            a.invoice_date
                .cmp(&b.invoice_date)
                .then_with(|| a.number.cmp(&b.number))
        });
        out
    }

    pub fn for_customer(&self, tenant_id: TenantId, customer_id: AggregateId) -> Vec<InvoiceReadModel> {
        let mut out = self.list(tenant_id, None);
        out.retain(|i| i.customer_id == customer_id);
        out
    }

    /// Overdue invoices, most overdue first.
    pub fn overdue(&self, tenant_id: TenantId, today: NaiveDate) -> Vec<InvoiceReadModel> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|i| i.is_overdue(today))
            .collect();
        out.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.number.cmp(&b.number)));
        out
    }

    pub fn summary(&self, tenant_id: TenantId, today: NaiveDate) -> ReceivablesSummary {
        let mut summary = ReceivablesSummary::default();
        for invoice in self.store.list(tenant_id) {
            if invoice.status != InvoiceStatus::Pending {
                continue;
            }
            summary.open_count += 1;
            summary.total_outstanding += invoice.outstanding;
            if invoice.is_overdue(today) {
                summary.overdue_count += 1;
                summary.overdue_amount += invoice.outstanding;
            }
        }
        summary
    }

    fn modify(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        f: impl FnOnce(&mut InvoiceReadModel),
    ) {
        self.store.update(tenant_id, invoice_id, |slot| {
            if let Some(rm) = slot {
                f(rm);
            }
        });
    }
}

impl Projection for InvoicesProjection {
    fn name(&self) -> &'static str {
        "invoicing.invoices"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::INVOICE || !self.cursors.admit(envelope)? {
            return Ok(());
        }
        let ev: InvoiceEvent = decode(envelope)?;
        let tenant_id = envelope.tenant_id();

        match ev {
            InvoiceEvent::InvoiceCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.invoice_id.0)?;
                self.numbers.observe(tenant_id, &e.number);
                let grand_total = e.totals.grand_total;
                self.store.upsert(
                    tenant_id,
                    e.invoice_id,
                    InvoiceReadModel {
                        invoice_id: e.invoice_id,
                        number: e.number,
                        customer_id: e.customer_id,
                        customer_name: e.customer_name,
                        customer_gstin: e.customer_gstin,
                        place_of_supply: e.place_of_supply.map(|s| s.name().to_string()),
                        company_state: e.company_state.name().to_string(),
                        supply_kind: e.supply_kind,
                        invoice_date: e.invoice_date,
                        due_date: e.due_date,
                        property_id: e.property_id,
                        lines: e.lines,
                        totals: e.totals,
                        payments: vec![],
                        total_paid: 0,
                        outstanding: grand_total,
                        status: InvoiceStatus::Draft,
                        cancel_reason: None,
                        created_at: e.occurred_at,
                        issued_at: None,
                    },
                );
            }
            InvoiceEvent::DraftRevised(e) => {
                ensure_scope(envelope, e.tenant_id, e.invoice_id.0)?;
                self.modify(tenant_id, e.invoice_id, |rm| {
                    rm.due_date = e.due_date;
                    rm.lines = e.lines;
                    rm.totals = e.totals;
                    rm.outstanding = e.totals.grand_total;
                });
            }
            InvoiceEvent::InvoiceIssued(e) => {
                ensure_scope(envelope, e.tenant_id, e.invoice_id.0)?;
                self.modify(tenant_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Pending;
                    rm.issued_at = Some(e.occurred_at);
                });
            }
            InvoiceEvent::PaymentRecorded(e) => {
                ensure_scope(envelope, e.tenant_id, e.invoice_id.0)?;
                self.modify(tenant_id, e.invoice_id, |rm| {
                    rm.payments.push(e.payment);
                    rm.total_paid = e.new_total_paid;
                    rm.outstanding = (rm.totals.grand_total - e.new_total_paid).max(0);
                });
            }
            InvoiceEvent::InvoicePaid(e) => {
                ensure_scope(envelope, e.tenant_id, e.invoice_id.0)?;
                self.modify(tenant_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Paid;
                    rm.outstanding = 0;
                });
            }
            InvoiceEvent::InvoiceCancelled(e) => {
                ensure_scope(envelope, e.tenant_id, e.invoice_id.0)?;
                self.modify(tenant_id, e.invoice_id, |rm| {
                    rm.status = InvoiceStatus::Cancelled;
                    rm.cancel_reason = e.reason;
                    rm.outstanding = 0;
                });
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
