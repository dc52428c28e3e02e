//! Payroll posting: approved payslips accrue salary, paid payslips settle it.

use serde_json::Value as JsonValue;

use estateerp_accounting::{VoucherEntry, VoucherId, VoucherKind};
use estateerp_core::TenantId;
use estateerp_events::{EventBus, EventEnvelope};
use estateerp_hr::{PayslipBreakdown, PayslipEvent, PayslipId};

use super::{AutoVoucher, PostingAccounts, WorkflowError, ensure_default_chart, post_auto_voucher};
use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, StoredEvent};
use crate::numbering::NumberSeries;
use crate::streams;

/// Dr salaries for gross; Cr salary payable for net and each statutory
/// payable for its deduction.
pub fn accrual_entries(accounts: &PostingAccounts, breakdown: &PayslipBreakdown) -> Vec<VoucherEntry> {
    let mut entries = vec![VoucherEntry::debit(&accounts.salaries, breakdown.gross)];
    for (head, amount) in [
        (&accounts.salary_payable, breakdown.net),
        (&accounts.pf_payable, breakdown.pf),
        (&accounts.esi_payable, breakdown.esi),
        (&accounts.pt_payable, breakdown.professional_tax),
    ] {
        if amount > 0 {
            entries.push(VoucherEntry::credit(head, amount));
        }
    }
    entries
}

pub fn accrual_source(payslip_id: PayslipId) -> String {
    format!("payslip:{payslip_id}")
}

pub fn settlement_source(payslip_id: PayslipId) -> String {
    format!("payslip-paid:{payslip_id}")
}

pub fn post_payslip_events<S, B>(
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

    for stored in committed.iter().filter(|e| e.aggregate_type == streams::PAYSLIP) {
        let event: PayslipEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| WorkflowError::Decode(e.to_string()))?;

        let voucher = match event {
            PayslipEvent::PayslipApproved(e) if e.breakdown.gross > 0 => AutoVoucher {
                source: accrual_source(e.payslip_id),
                kind: VoucherKind::Journal,
                date: e.period.last_day(),
                narration: format!("Salary for {}", e.period),
                entries: accrual_entries(accounts, &e.breakdown),
                occurred_at: e.occurred_at,
            },
            PayslipEvent::PayslipPaid(e) if e.net > 0 => AutoVoucher {
                source: settlement_source(e.payslip_id),
                kind: VoucherKind::Payment,
                date: e.paid_on,
                narration: match e.reference.as_deref() {
                    Some(r) => format!("Salary paid for {} ({r})", e.period),
                    None => format!("Salary paid for {}", e.period),
                },
                entries: vec![
                    VoucherEntry::debit(&accounts.salary_payable, e.net),
                    VoucherEntry::credit(&accounts.bank, e.net),
                ],
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
    use crate::workflows::testing::{dispatcher, posted_vouchers};
    use chrono::{NaiveDate, Utc};
    use estateerp_accounting::check_balance;
    use estateerp_hr::{
        ApprovePayslip, EmployeeId, GeneratePayslip, MarkPayslipPaid, PayPeriod, Payslip,
        PayslipCommand, SalaryStructure, compute_payslip,
    };
    use proptest::prelude::*;

    fn structure(basic: i64) -> SalaryStructure {
        SalaryStructure {
            basic,
            hra: basic / 2,
            special_allowance: 3_000_00,
            other_allowance: 0,
            pf_enrolled: true,
        }
    }

    #[test]
    fn approval_accrues_and_payment_settles_salary() {
        let d = dispatcher();
        let numbers = NumberSeries::new();
        let accounts = PostingAccounts::default();
        let t = TenantId::new();
        let employee_id = EmployeeId::generate();
        let period = PayPeriod::new(2026, 3).unwrap();
        let id = PayslipId::for_period(employee_id, period);
        let make = |_: TenantId, a| Payslip::empty(PayslipId::new(a));

        d.dispatch::<Payslip>(t, id.0, streams::PAYSLIP, PayslipCommand::GeneratePayslip(GeneratePayslip {
            tenant_id: t,
            payslip_id: id,
            employee_id,
            employee_code: "E-007".to_string(),
            employee_name: "Kavya Rao".to_string(),
            joined_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            terminated_on: None,
            period,
            structure: structure(12_000_00),
            working_days: 31,
            paid_days: 31,
            occurred_at: Utc::now(),
        }), make)
        .unwrap();
        let mut committed = d
            .dispatch::<Payslip>(t, id.0, streams::PAYSLIP, PayslipCommand::ApprovePayslip(ApprovePayslip {
                tenant_id: t,
                payslip_id: id,
                occurred_at: Utc::now(),
            }), make)
            .unwrap();
        committed.extend(
            d.dispatch::<Payslip>(t, id.0, streams::PAYSLIP, PayslipCommand::MarkPayslipPaid(MarkPayslipPaid {
                tenant_id: t,
                payslip_id: id,
                paid_on: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
                reference: Some("NEFT-1".to_string()),
                occurred_at: Utc::now(),
            }), make)
            .unwrap(),
        );

        let ids = post_payslip_events(&d, &numbers, &accounts, t, &committed).unwrap();
        assert_eq!(ids.len(), 2);

        let posted = posted_vouchers(&d, t);
        let accrual = &posted[0];
        assert_eq!(accrual.kind, VoucherKind::Journal);
        assert_eq!(accrual.date, period.last_day());
        assert_eq!(accrual.entries[0].head_code, "6001");
        assert!(accrual.entries.iter().any(|e| e.head_code == "2202" && e.credit == 1_440_00));

        let settlement = &posted[1];
        assert_eq!(settlement.kind, VoucherKind::Payment);
        assert_eq!(settlement.entries[0].head_code, "2201");
        assert_eq!(settlement.entries[1].head_code, "1101");
        assert_eq!(settlement.total, accrual.entries[1].credit);
    }

    proptest! {
        #[test]
        fn salary_accruals_always_balance(
            basic in 1_000_00i64..2_00_000_00,
            hra in 0i64..1_00_000_00,
            special in 0i64..50_000_00,
            working in 20u32..=31,
            absent in 0u32..20,
            month in 1u32..=12,
            pf in any::<bool>(),
        ) {
            let s = SalaryStructure { basic, hra, special_allowance: special, other_allowance: 0, pf_enrolled: pf };
            let period = PayPeriod::new(2026, month).unwrap();
            let paid = working.saturating_sub(absent).max(1);
            let breakdown = compute_payslip(&s, working, paid, period).unwrap();
            prop_assume!(breakdown.net > 0);

            let entries = accrual_entries(&PostingAccounts::default(), &breakdown);
            prop_assert_eq!(check_balance(&entries).unwrap(), breakdown.gross);
        }
    }
}
