//! Sales posting: issued invoices become Sales vouchers, recorded payments
//! become Receipt vouchers.

use serde_json::Value as JsonValue;
use tracing::debug;

use estateerp_accounting::{VoucherEntry, VoucherId, VoucherKind};
use estateerp_core::TenantId;
use estateerp_events::{EventBus, EventEnvelope};
use estateerp_invoicing::{InvoiceEvent, InvoiceId, InvoiceTotals, Payment};

use super::{AutoVoucher, PostingAccounts, WorkflowError, ensure_default_chart, post_auto_voucher};
use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, StoredEvent};
use crate::numbering::NumberSeries;
use crate::streams;

/// Dr debtors for the grand total; Cr sales for the taxable value and each
/// output tax head for its share. Zero lines are left out.
pub fn sales_entries(accounts: &PostingAccounts, totals: &InvoiceTotals) -> Vec<VoucherEntry> {
    let mut entries = vec![VoucherEntry::debit(&accounts.debtors, totals.grand_total)];
    for (head, amount) in [
        (&accounts.sales, totals.taxable),
        (&accounts.output_cgst, totals.tax.cgst),
        (&accounts.output_sgst, totals.tax.sgst),
        (&accounts.output_igst, totals.tax.igst),
    ] {
        if amount > 0 {
            entries.push(VoucherEntry::credit(head, amount));
        }
    }
    entries
}

/// Dr cash or bank, Cr debtors.
pub fn receipt_entries(accounts: &PostingAccounts, payment: &Payment) -> Vec<VoucherEntry> {
    let received_into = if payment.mode.is_cash() {
        &accounts.cash
    } else {
        &accounts.bank
    };
    vec![
        VoucherEntry::debit(received_into, payment.amount),
        VoucherEntry::credit(&accounts.debtors, payment.amount),
    ]
}

pub fn sales_source(invoice_id: InvoiceId) -> String {
    format!("invoice:{invoice_id}")
}

pub fn receipt_source(invoice_id: InvoiceId, payment_no: u32) -> String {
    format!("payment:{invoice_id}:{payment_no}")
}

/// Post vouchers for the invoice events in `committed`.
///
/// Returns the ids of newly posted vouchers; events that were already posted
/// are skipped.
pub fn post_invoice_events<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    numbers: &NumberSeries,
    accounts: &PostingAccounts,
    tenant_id: TenantId,
    committed: &[StoredEvent],
) -> Result<Vec<VoucherId>, WorkflowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut posted = Vec::new();
    let mut chart_ready = false;

    for stored in committed.iter().filter(|e| e.aggregate_type == streams::INVOICE) {
        let event: InvoiceEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| WorkflowError::Decode(e.to_string()))?;

        let voucher = match event {
            InvoiceEvent::InvoiceIssued(e) => {
                if e.totals.grand_total <= 0 {
                    debug!(tenant_id = %tenant_id, invoice_id = %e.invoice_id, "zero-value invoice, nothing to post");
                    continue;
                }
                AutoVoucher {
                    source: sales_source(e.invoice_id),
                    kind: VoucherKind::Sales,
                    date: e.occurred_at.date_naive(),
                    narration: format!("Sales invoice {}", e.number),
                    entries: sales_entries(accounts, &e.totals),
                    occurred_at: e.occurred_at,
                }
            }
            InvoiceEvent::PaymentRecorded(e) => AutoVoucher {
                source: receipt_source(e.invoice_id, e.payment.payment_no),
                kind: VoucherKind::Receipt,
                date: e.payment.paid_on,
                narration: format!(
                    "Receipt against {} ({})",
                    e.number,
                    e.payment.reference.trim()
                ),
                entries: receipt_entries(accounts, &e.payment),
                occurred_at: e.occurred_at,
            },
            _ => continue,
        };

        if !chart_ready {
            ensure_default_chart(dispatcher, tenant_id)?;
            chart_ready = true;
        }
        if let Some(id) = post_auto_voucher(dispatcher, numbers, tenant_id, voucher)? {
            posted.push(id);
        }
    }

    Ok(posted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testing::{TestDispatcher, dispatcher, posted_vouchers};
    use chrono::{NaiveDate, Utc};
    use estateerp_accounting::check_balance;
    use estateerp_core::AggregateId;
    use estateerp_invoicing::{
        CreateInvoice, Invoice, InvoiceCommand, InvoiceItem, IssueInvoice, PaymentMode,
        RecordPayment, SupplyKind, compute_lines,
    };
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(price: i64, rate: u32) -> InvoiceItem {
        InvoiceItem {
            description: "Flat A-1203 consideration".to_string(),
            hsn_sac: "995411".to_string(),
            quantity: 1,
            unit_price: price,
            discount: 0,
            gst_rate: rate,
        }
    }

    fn run(d: &TestDispatcher, t: TenantId, id: InvoiceId, cmd: InvoiceCommand) -> Vec<StoredEvent> {
        d.dispatch::<Invoice>(t, id.0, streams::INVOICE, cmd, |_, a| Invoice::empty(InvoiceId::new(a)))
            .unwrap()
    }

    fn create(t: TenantId, id: InvoiceId, place: &str) -> InvoiceCommand {
        InvoiceCommand::CreateInvoice(CreateInvoice {
            tenant_id: t,
            invoice_id: id,
            number: "INV/00001".to_string(),
            customer_id: AggregateId::new(),
            customer_name: "Meera Joshi".to_string(),
            customer_gstin: None,
            place_of_supply: Some(place.to_string()),
            company_state: "Maharashtra".to_string(),
            invoice_date: date(2026, 4, 1),
            due_date: date(2026, 4, 30),
            property_id: None,
            items: vec![item(10_00_000_00, 1800), item(50_000_00, 500)],
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn issuing_posts_a_balanced_sales_voucher_with_igst_for_inter_state() {
        let d = dispatcher();
        let numbers = NumberSeries::new();
        let accounts = PostingAccounts::default();
        let t = TenantId::new();
        let id = InvoiceId::generate();

        run(&d, t, id, create(t, id, "Karnataka"));
        let issued = run(&d, t, id, InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id: t,
            invoice_id: id,
            occurred_at: Utc::now(),
        }));

        let ids = post_invoice_events(&d, &numbers, &accounts, t, &issued).unwrap();
        assert_eq!(ids, vec![super::super::voucher_id_for(&sales_source(id))]);

        let posted = posted_vouchers(&d, t);
        assert_eq!(posted.len(), 1);
        let v = &posted[0];
        assert_eq!(v.kind, VoucherKind::Sales);
        assert_eq!(v.number, "SV/00001");
        let heads: Vec<&str> = v.entries.iter().map(|e| e.head_code.as_str()).collect();
        assert_eq!(heads, vec!["1201", "4001", "2103"]);
        // 10,00,000 @ 18% + 50,000 @ 5%
        assert_eq!(v.total, 10_50_000_00 + 1_80_000_00 + 2_500_00);

        // re-running the same events posts nothing new
        assert!(post_invoice_events(&d, &numbers, &accounts, t, &issued).unwrap().is_empty());
        assert_eq!(posted_vouchers(&d, t).len(), 1);
    }

    #[test]
    fn payments_post_receipts_to_cash_or_bank() {
        let d = dispatcher();
        let numbers = NumberSeries::new();
        let accounts = PostingAccounts::default();
        let t = TenantId::new();
        let id = InvoiceId::generate();

        run(&d, t, id, create(t, id, "Maharashtra"));
        run(&d, t, id, InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id: t,
            invoice_id: id,
            occurred_at: Utc::now(),
        }));
        let pay = |amount, mode| {
            InvoiceCommand::RecordPayment(RecordPayment {
                tenant_id: t,
                invoice_id: id,
                amount,
                mode,
                reference: "r".to_string(),
                paid_on: date(2026, 4, 10),
                occurred_at: Utc::now(),
            })
        };
        let first = run(&d, t, id, pay(1_00_000_00, PaymentMode::Cash));
        let second = run(&d, t, id, pay(2_00_000_00, PaymentMode::Upi));

        let mut all = first.clone();
        all.extend(second);
        assert_eq!(post_invoice_events(&d, &numbers, &accounts, t, &all).unwrap().len(), 2);

        let receipts: Vec<_> = posted_vouchers(&d, t)
            .into_iter()
            .filter(|v| v.kind == VoucherKind::Receipt)
            .collect();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].entries[0].head_code, "1001");
        assert_eq!(receipts[1].entries[0].head_code, "1101");
        assert!(receipts.iter().all(|v| v.entries[1].head_code == "1201"));
        assert_eq!(receipts[1].date, date(2026, 4, 10));
    }

    proptest! {
        #[test]
        fn sales_vouchers_always_balance(
            prices in prop::collection::vec(1i64..5_00_00_000_00, 1..6),
            rates in prop::collection::vec(prop::sample::select(vec![0u32, 500, 1200, 1800, 2800]), 6),
            inter_state in any::<bool>(),
        ) {
            let items: Vec<_> = prices.iter().zip(&rates).map(|(p, r)| item(*p, *r)).collect();
            let kind = if inter_state { SupplyKind::InterState } else { SupplyKind::IntraState };
            let (_, totals) = compute_lines(&items, kind).unwrap();

            let entries = sales_entries(&PostingAccounts::default(), &totals);
            prop_assert_eq!(check_balance(&entries).unwrap(), totals.grand_total);
        }
    }
}
