//! Accounting read models: account balances, trial balance, ledger statements
//! and the voucher register.
//!
//! Balances are signed, debit-positive. Only posted vouchers move balances; a
//! cancelled posted voucher is reversed.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use estateerp_accounting::{
    AccountGroup, AccountNature, ChartEvent, VoucherEntry, VoucherEvent, VoucherId, VoucherKind,
    VoucherStatus,
};
use estateerp_core::{Paise, TenantId};
use estateerp_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::numbering::NumberSeries;
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub code: String,
    pub name: String,
    pub group: String,
    pub nature: AccountNature,
    pub active: bool,
    /// Signed opening balance.
    pub opening: Paise,
    pub debits: Paise,
    pub credits: Paise,
}

impl AccountBalance {
    /// Signed closing balance: opening + debits − credits.
    pub fn balance(&self) -> Paise {
        self.opening + self.debits - self.credits
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalanceRow {
    pub code: String,
    pub name: String,
    pub debit: Paise,
    pub credit: Paise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Paise,
    pub total_credit: Paise,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerLine {
    pub date: NaiveDate,
    pub voucher_id: VoucherId,
    pub number: String,
    pub kind: VoucherKind,
    pub narration: String,
    pub debit: Paise,
    pub credit: Paise,
    /// Running signed balance after this line.
    pub balance: Paise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatement {
    pub head_code: String,
    pub head_name: String,
    pub opening: Paise,
    pub lines: Vec<LedgerLine>,
    pub closing: Paise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherReadModel {
    pub voucher_id: VoucherId,
    pub number: String,
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub narration: String,
    pub entries: Vec<VoucherEntry>,
    pub reference: Option<String>,
    pub status: VoucherStatus,
    pub total: Paise,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AccountingProjection {
    groups: InMemoryTenantStore<String, AccountGroup>,
    accounts: InMemoryTenantStore<String, AccountBalance>,
    vouchers: InMemoryTenantStore<VoucherId, VoucherReadModel>,
    chart_cursors: StreamCursors,
    voucher_cursors: StreamCursors,
    numbers: Arc<NumberSeries>,
}

impl AccountingProjection {
    pub fn new(numbers: Arc<NumberSeries>) -> Self {
        Self {
            groups: InMemoryTenantStore::new(),
            accounts: InMemoryTenantStore::new(),
            vouchers: InMemoryTenantStore::new(),
            chart_cursors: StreamCursors::new(),
            voucher_cursors: StreamCursors::new(),
            numbers,
        }
    }

    pub fn groups(&self, tenant_id: TenantId) -> Vec<AccountGroup> {
        let mut out = self.groups.list(tenant_id);
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn account(&self, tenant_id: TenantId, code: &str) -> Option<AccountBalance> {
        self.accounts.get(tenant_id, &code.to_string())
    }

    /// Every head with its balance, by code.
    pub fn accounts(&self, tenant_id: TenantId) -> Vec<AccountBalance> {
        let mut out = self.accounts.list(tenant_id);
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn trial_balance(&self, tenant_id: TenantId) -> TrialBalance {
        let mut rows = Vec::new();
        let (mut total_debit, mut total_credit) = (0, 0);
        for account in self.accounts(tenant_id) {
            let balance = account.balance();
            if balance == 0 {
                continue;
            }
            let (debit, credit) = if balance > 0 { (balance, 0) } else { (0, -balance) };
            total_debit += debit;
            total_credit += credit;
            rows.push(TrialBalanceRow {
                code: account.code,
                name: account.name,
                debit,
                credit,
            });
        }
        TrialBalance {
            rows,
            total_debit,
            total_credit,
        }
    }

    /// Posted entries of one head in date order with a running balance.
    ///
    /// Entries before `from` are folded into the opening balance; entries after
    /// `to` are left out.
    pub fn ledger(
        &self,
        tenant_id: TenantId,
        code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Option<LedgerStatement> {
        let account = self.account(tenant_id, code)?;
        let mut posted = self.vouchers(tenant_id, None, Some(VoucherStatus::Posted));
        posted.retain(|v| to.is_none_or(|to| v.date <= to));

        let mut opening = account.opening;
        let mut running = opening;
        let mut lines = Vec::new();
        for voucher in posted {
            for entry in voucher.entries.iter().filter(|e| e.head_code == account.code) {
                if from.is_some_and(|from| voucher.date < from) {
                    opening += entry.signed();
                    running = opening;
                    continue;
                }
                running += entry.signed();
                lines.push(LedgerLine {
                    date: voucher.date,
                    voucher_id: voucher.voucher_id,
                    number: voucher.number.clone(),
                    kind: voucher.kind,
                    narration: entry
                        .narration
                        .clone()
                        .unwrap_or_else(|| voucher.narration.clone()),
                    debit: entry.debit,
                    credit: entry.credit,
                    balance: running,
                });
            }
        }

        Some(LedgerStatement {
            head_code: account.code,
            head_name: account.name,
            opening,
            lines,
            closing: running,
        })
    }

    pub fn voucher(&self, tenant_id: TenantId, voucher_id: &VoucherId) -> Option<VoucherReadModel> {
        self.vouchers.get(tenant_id, voucher_id)
    }

    /// The voucher register: by date then number.
    pub fn vouchers(
        &self,
        tenant_id: TenantId,
        kind: Option<VoucherKind>,
        status: Option<VoucherStatus>,
    ) -> Vec<VoucherReadModel> {
        let mut out: Vec<_> = self
            .vouchers
            .list(tenant_id)
            .into_iter()
            .filter(|v| kind.is_none_or(|k| v.kind == k))
            .filter(|v| status.is_none_or(|s| v.status == s))
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.number.cmp(&b.number)));
        out
    }

    /// Add (`sign = 1`) or remove (`sign = -1`) the entries' effect on balances.
    fn post_entries(&self, tenant_id: TenantId, entries: &[VoucherEntry], sign: Paise) {
        for entry in entries {
            let applied = self.accounts.update(tenant_id, entry.head_code.clone(), |slot| {
                let Some(account) = slot else {
                    return false;
                };
                account.debits += sign * entry.debit;
                account.credits += sign * entry.credit;
                true
            });
            if applied != Some(true) {
                warn!(
                    tenant_id = %tenant_id,
                    head_code = %entry.head_code,
                    "posting to a head missing from the chart; balance not tracked"
                );
            }
        }
    }

    fn apply_chart(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<ChartEvent>(envelope)? {
            ChartEvent::GroupCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.chart_id.0)?;
                self.groups.upsert(tenant_id, e.group.code.clone(), e.group);
            }
            ChartEvent::HeadCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.chart_id.0)?;
                let head = e.head;
                self.accounts.upsert(
                    tenant_id,
                    head.code.clone(),
                    AccountBalance {
                        opening: head.opening_side.signed(head.opening_balance),
                        code: head.code,
                        name: head.name,
                        group: head.group,
                        nature: head.nature,
                        active: head.active,
                        debits: 0,
                        credits: 0,
                    },
                );
            }
            ChartEvent::HeadRenamed(e) => {
                ensure_scope(envelope, e.tenant_id, e.chart_id.0)?;
                self.accounts.update(tenant_id, e.code, |slot| {
                    if let Some(account) = slot {
                        account.name = e.name;
                    }
                });
            }
            ChartEvent::HeadDeactivated(e) => {
                ensure_scope(envelope, e.tenant_id, e.chart_id.0)?;
                self.accounts.update(tenant_id, e.code, |slot| {
                    if let Some(account) = slot {
                        account.active = false;
                    }
                });
            }
        }
        Ok(())
    }

    fn apply_voucher(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<VoucherEvent>(envelope)? {
            VoucherEvent::VoucherCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.voucher_id.0)?;
                self.numbers.observe(tenant_id, &e.number);
                let total = e.entries.iter().map(|x| x.debit).sum();
                self.vouchers.upsert(
                    tenant_id,
                    e.voucher_id,
                    VoucherReadModel {
                        voucher_id: e.voucher_id,
                        number: e.number,
                        kind: e.kind,
                        date: e.date,
                        narration: e.narration,
                        entries: e.entries,
                        reference: e.reference,
                        status: VoucherStatus::Draft,
                        total,
                        cancel_reason: None,
                        created_at: e.occurred_at,
                    },
                );
            }
            VoucherEvent::VoucherPosted(e) => {
                ensure_scope(envelope, e.tenant_id, e.voucher_id.0)?;
                self.post_entries(tenant_id, &e.entries, 1);
                self.vouchers.update(tenant_id, e.voucher_id, |slot| {
                    if let Some(v) = slot {
                        v.status = VoucherStatus::Posted;
                        v.entries = e.entries;
                        v.total = e.total;
                    }
                });
            }
            VoucherEvent::VoucherCancelled(e) => {
                ensure_scope(envelope, e.tenant_id, e.voucher_id.0)?;
                if e.was_posted {
                    self.post_entries(tenant_id, &e.entries, -1);
                }
                self.vouchers.update(tenant_id, e.voucher_id, |slot| {
                    if let Some(v) = slot {
                        v.status = VoucherStatus::Cancelled;
                        v.cancel_reason = Some(e.reason);
                    }
                });
            }
        }
        Ok(())
    }
}

impl Projection for AccountingProjection {
    fn name(&self) -> &'static str {
        "accounting.ledger"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let cursors = match envelope.aggregate_type() {
            streams::CHART => &self.chart_cursors,
            streams::VOUCHER => &self.voucher_cursors,
            _ => return Ok(()),
        };
        if !cursors.admit(envelope)? {
            return Ok(());
        }
        if envelope.aggregate_type() == streams::CHART {
            self.apply_chart(envelope)?;
        } else {
            self.apply_voucher(envelope)?;
        }
        cursors.advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.groups.clear_tenant(tenant_id);
        self.accounts.clear_tenant(tenant_id);
        self.vouchers.clear_tenant(tenant_id);
        self.chart_cursors.clear_tenant(tenant_id);
        self.voucher_cursors.clear_tenant(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use estateerp_accounting::{
        AccountHead, ChartId, HeadCreated, VoucherCancelled, VoucherCreated,
        VoucherPosted,
    };
    use estateerp_core::AggregateId;
    use estateerp_events::StreamPosition;
    use uuid::Uuid;

    struct Feed {
        projection: AccountingProjection,
        tenant_id: TenantId,
        seqs: std::collections::HashMap<AggregateId, u64>,
    }

    impl Feed {
        fn new() -> Self {
            Self {
                projection: AccountingProjection::new(Arc::new(NumberSeries::new())),
                tenant_id: TenantId::new(),
                seqs: Default::default(),
            }
        }

        fn push(&mut self, aggregate_id: AggregateId, aggregate_type: &str, payload: JsonValue) {
            let seq = self.seqs.entry(aggregate_id).or_insert(0);
            *seq += 1;
            let env = EventEnvelope::new(
                Uuid::now_v7(),
                StreamPosition::new(self.tenant_id, aggregate_id, aggregate_type, *seq),
                "test",
                Utc::now(),
                payload,
            );
            self.projection.apply_envelope(&env).unwrap();
        }

        fn head(&mut self, code: &str, nature: AccountNature, opening: Paise) {
            let chart_id = ChartId::for_tenant(self.tenant_id);
            let ev = ChartEvent::HeadCreated(HeadCreated {
                tenant_id: self.tenant_id,
                chart_id,
                head: AccountHead {
                    code: code.to_string(),
                    name: format!("Head {code}"),
                    group: "G".to_string(),
                    nature,
                    opening_balance: opening,
                    opening_side: nature.normal_side(),
                    active: true,
                },
                occurred_at: Utc::now(),
            });
            self.push(chart_id.0, streams::CHART, serde_json::to_value(ev).unwrap());
        }

        fn posted(&mut self, number: &str, date: NaiveDate, entries: Vec<VoucherEntry>) -> VoucherId {
            let voucher_id = VoucherId::generate();
            let created = VoucherEvent::VoucherCreated(VoucherCreated {
                tenant_id: self.tenant_id,
                voucher_id,
                number: number.to_string(),
                kind: VoucherKind::Journal,
                date,
                narration: "test".to_string(),
                entries: entries.clone(),
                reference: None,
                occurred_at: Utc::now(),
            });
            let total = entries.iter().map(|e| e.debit).sum();
            let posted = VoucherEvent::VoucherPosted(VoucherPosted {
                tenant_id: self.tenant_id,
                voucher_id,
                number: number.to_string(),
                kind: VoucherKind::Journal,
                date,
                entries,
                total,
                occurred_at: Utc::now(),
            });
            self.push(voucher_id.0, streams::VOUCHER, serde_json::to_value(created).unwrap());
            self.push(voucher_id.0, streams::VOUCHER, serde_json::to_value(posted).unwrap());
            voucher_id
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    #[test]
    fn posted_vouchers_move_balances_and_keep_trial_balance_even() {
        let mut feed = Feed::new();
        feed.head("1001", AccountNature::Asset, 50_000);
        feed.head("3001", AccountNature::Equity, 50_000);
        feed.head("4001", AccountNature::Income, 0);

        feed.posted(
            "JV/00001",
            day(2),
            vec![VoucherEntry::debit("1001", 10_000), VoucherEntry::credit("4001", 10_000)],
        );

        let t = feed.tenant_id;
        let cash = feed.projection.account(t, "1001").unwrap();
        assert_eq!(cash.balance(), 60_000);
        assert_eq!(feed.projection.account(t, "3001").unwrap().balance(), -50_000);

        let tb = feed.projection.trial_balance(t);
        assert!(tb.is_balanced());
        assert_eq!(tb.total_debit, 60_000);
        assert_eq!(tb.rows.len(), 3);
    }

    #[test]
    fn ledger_runs_in_date_order_and_cancellation_reverses() {
        let mut feed = Feed::new();
        feed.head("1001", AccountNature::Asset, 0);
        feed.head("4001", AccountNature::Income, 0);

        feed.posted(
            "JV/00002",
            day(9),
            vec![VoucherEntry::debit("1001", 300), VoucherEntry::credit("4001", 300)],
        );
        let first = feed.posted(
            "JV/00001",
            day(3),
            vec![VoucherEntry::debit("1001", 1_000), VoucherEntry::credit("4001", 1_000)],
        );

        let t = feed.tenant_id;
        let statement = feed.projection.ledger(t, "1001", None, None).unwrap();
        let balances: Vec<_> = statement.lines.iter().map(|l| (l.number.as_str(), l.balance)).collect();
        assert_eq!(balances, vec![("JV/00001", 1_000), ("JV/00002", 1_300)]);

        let from_mid = feed.projection.ledger(t, "1001", Some(day(5)), None).unwrap();
        assert_eq!(from_mid.opening, 1_000);
        assert_eq!(from_mid.lines.len(), 1);
        assert_eq!(from_mid.closing, 1_300);

        let cancelled = VoucherEvent::VoucherCancelled(VoucherCancelled {
            tenant_id: t,
            voucher_id: first,
            reason: "duplicate".to_string(),
            was_posted: true,
            entries: vec![VoucherEntry::debit("1001", 1_000), VoucherEntry::credit("4001", 1_000)],
            occurred_at: Utc::now(),
        });
        feed.push(first.0, streams::VOUCHER, serde_json::to_value(cancelled).unwrap());

        assert_eq!(feed.projection.account(t, "1001").unwrap().balance(), 300);
        assert_eq!(feed.projection.ledger(t, "1001", None, None).unwrap().lines.len(), 1);
        assert_eq!(
            feed.projection.voucher(t, &first).unwrap().status,
            VoucherStatus::Cancelled
        );
    }
}
