//! Cross-aggregate workflows run after a command commits.
//!
//! Each workflow reads the committed events (or loaded aggregates) and
//! dispatches follow-up commands: vouchers for invoices and payslips, stock
//! movements for production, mail for reminders and broadcasts. Follow-up
//! vouchers get ids derived from their source document, so running a workflow
//! twice for the same event posts nothing new.

pub mod broadcast;
pub mod manufacturing;
pub mod payroll;
pub mod reminders;
pub mod sales;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use estateerp_accounting::{
    ChartCommand, ChartId, ChartOfAccounts, CreateVoucher, SeedDefaultChart, Voucher,
    VoucherCommand, VoucherEntry, VoucherId, VoucherKind,
};
use estateerp_core::{AggregateRoot, TenantId};
use estateerp_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::mail::MailError;
use crate::numbering::NumberSeries;
use crate::streams;

pub use broadcast::{Audience, Broadcast, BroadcastReport, send_broadcast};
pub use manufacturing::complete_production;
pub use payroll::post_payslip_events;
pub use reminders::{ReminderReport, send_payment_reminders};
pub use sales::post_invoice_events;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to decode committed event: {0}")]
    Decode(String),
}

/// Ledger heads used by automatic posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingAccounts {
    pub cash: String,
    pub bank: String,
    pub debtors: String,
    pub sales: String,
    pub output_cgst: String,
    pub output_sgst: String,
    pub output_igst: String,
    pub salaries: String,
    pub salary_payable: String,
    pub pf_payable: String,
    pub esi_payable: String,
    pub pt_payable: String,
}

impl Default for PostingAccounts {
    fn default() -> Self {
        Self {
            cash: "1001".to_string(),
            bank: "1101".to_string(),
            debtors: "1201".to_string(),
            sales: "4001".to_string(),
            output_cgst: "2101".to_string(),
            output_sgst: "2102".to_string(),
            output_igst: "2103".to_string(),
            salaries: "6001".to_string(),
            salary_payable: "2201".to_string(),
            pf_payable: "2202".to_string(),
            esi_payable: "2203".to_string(),
            pt_payable: "2204".to_string(),
        }
    }
}

/// Seed the default chart of accounts if the tenant has none yet.
pub fn ensure_default_chart<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
) -> Result<(), DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let chart_id = ChartId::for_tenant(tenant_id);
    dispatcher.dispatch::<ChartOfAccounts>(
        tenant_id,
        chart_id.0,
        streams::CHART,
        ChartCommand::SeedDefaultChart(SeedDefaultChart {
            tenant_id,
            chart_id,
            occurred_at: Utc::now(),
        }),
        |_, id| ChartOfAccounts::empty(ChartId::new(id)),
    )?;
    Ok(())
}

/// Refuse entries whose heads are missing from the tenant's chart or inactive.
pub fn ensure_postable<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    entries: &[VoucherEntry],
) -> Result<(), DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let chart: ChartOfAccounts = dispatcher.load(tenant_id, ChartId::for_tenant(tenant_id).0, |_, id| {
        ChartOfAccounts::empty(ChartId::new(id))
    })?;
    chart.ensure_postable(entries)?;
    Ok(())
}

/// A voucher a workflow wants to exist, keyed by its source document.
#[derive(Debug, Clone)]
pub(crate) struct AutoVoucher {
    pub source: String,
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub narration: String,
    pub entries: Vec<VoucherEntry>,
    pub occurred_at: DateTime<Utc>,
}

impl AutoVoucher {
    pub fn voucher_id(&self) -> VoucherId {
        voucher_id_for(&self.source)
    }
}

pub fn voucher_id_for(source: &str) -> VoucherId {
    VoucherId::new(estateerp_core::AggregateId::derived("voucher", source))
}

/// Create and post the voucher unless it already exists.
///
/// Returns the voucher id when a new voucher was posted.
pub(crate) fn post_auto_voucher<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    numbers: &NumberSeries,
    tenant_id: TenantId,
    voucher: AutoVoucher,
) -> Result<Option<VoucherId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let voucher_id = voucher.voucher_id();
    let make = |_: TenantId, id| Voucher::empty(VoucherId::new(id));

    let existing: Voucher = dispatcher.load(tenant_id, voucher_id.0, make)?;
    if existing.version() > 0 {
        return Ok(None);
    }
    ensure_postable(dispatcher, tenant_id, &voucher.entries)?;

    let number = numbers.next(tenant_id, voucher.kind.prefix());
    dispatcher.dispatch::<Voucher>(
        tenant_id,
        voucher_id.0,
        streams::VOUCHER,
        VoucherCommand::CreateVoucher(CreateVoucher {
            tenant_id,
            voucher_id,
            number: number.clone(),
            kind: voucher.kind,
            date: voucher.date,
            narration: voucher.narration,
            entries: voucher.entries,
            reference: Some(voucher.source.clone()),
            post: true,
            occurred_at: voucher.occurred_at,
        }),
        make,
    )?;

    info!(
        tenant_id = %tenant_id,
        voucher_id = %voucher_id,
        %number,
        source = %voucher.source,
        "posted automatic voucher"
    );
    Ok(Some(voucher_id))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use estateerp_events::InMemoryEventBus;

    use super::*;
    use crate::event_store::InMemoryEventStore;

    pub type TestDispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    pub fn dispatcher() -> TestDispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    pub fn posted_vouchers(d: &TestDispatcher, tenant_id: TenantId) -> Vec<estateerp_accounting::VoucherPosted> {
        d.store()
            .load_tenant(tenant_id)
            .unwrap()
            .into_iter()
            .filter(|e| e.aggregate_type == streams::VOUCHER)
            .filter_map(|e| match serde_json::from_value::<estateerp_accounting::VoucherEvent>(e.payload).ok()? {
                estateerp_accounting::VoucherEvent::VoucherPosted(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn journal(source: &str) -> AutoVoucher {
        AutoVoucher {
            source: source.to_string(),
            kind: VoucherKind::Journal,
            date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            narration: "test".to_string(),
            entries: vec![VoucherEntry::debit("6001", 500), VoucherEntry::credit("2201", 500)],
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn auto_vouchers_are_posted_once_per_source() {
        let d = dispatcher();
        let numbers = NumberSeries::new();
        let t = TenantId::new();
        ensure_default_chart(&d, t).unwrap();

        let first = post_auto_voucher(&d, &numbers, t, journal("payslip:1")).unwrap();
        assert_eq!(first, Some(voucher_id_for("payslip:1")));
        assert_eq!(post_auto_voucher(&d, &numbers, t, journal("payslip:1")).unwrap(), None);
        post_auto_voucher(&d, &numbers, t, journal("payslip:2")).unwrap();

        let posted = posted_vouchers(&d, t);
        assert_eq!(posted.len(), 2);
        assert_eq!(numbers.next(t, "JV"), "JV/00003");
    }

    #[test]
    fn auto_vouchers_refuse_missing_or_inactive_heads() {
        let d = dispatcher();
        let numbers = NumberSeries::new();
        let t = TenantId::new();

        // no chart yet, so no head exists
        let err = post_auto_voucher(&d, &numbers, t, journal("payslip:1")).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        ensure_default_chart(&d, t).unwrap();
        let chart_id = ChartId::for_tenant(t);
        d.dispatch::<ChartOfAccounts>(
            t,
            chart_id.0,
            streams::CHART,
            ChartCommand::DeactivateHead(estateerp_accounting::DeactivateHead {
                tenant_id: t,
                chart_id,
                code: "2201".to_string(),
                occurred_at: Utc::now(),
            }),
            |_, id| ChartOfAccounts::empty(ChartId::new(id)),
        )
        .unwrap();

        let err = post_auto_voucher(&d, &numbers, t, journal("payslip:1")).unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert!(posted_vouchers(&d, t).is_empty());
    }

    #[test]
    fn default_chart_seeding_is_repeatable() {
        let d = dispatcher();
        let t = TenantId::new();
        ensure_default_chart(&d, t).unwrap();
        ensure_default_chart(&d, t).unwrap();

        let chart: ChartOfAccounts = d
            .load(t, ChartId::for_tenant(t).0, |_, id| ChartOfAccounts::empty(ChartId::new(id)))
            .unwrap();
        assert!(chart.head("1201").is_some());
    }
}
