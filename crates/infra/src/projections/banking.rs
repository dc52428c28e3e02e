use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_banking::{
    BankAccountEvent, BankAccountId, ChequeBook, ChequeLeaf, ChequeStatus, ReconciliationSummary,
    StatementLine, summarize,
};
use estateerp_core::{Paise, TenantId};
use estateerp_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankAccountReadModel {
    pub account_id: BankAccountId,
    pub bank_name: String,
    pub account_number: String,
    pub ifsc: String,
    pub ledger_head: String,
    pub opening_balance: Paise,
    pub cheque_books: Vec<ChequeBook>,
    /// Every leaf of every registered book, by leaf number.
    pub leaves: Vec<ChequeLeaf>,
    pub lines: Vec<StatementLine>,
    pub last_import_at: Option<DateTime<Utc>>,
    pub last_import_skipped: u32,
}

impl BankAccountReadModel {
    pub fn summary(&self) -> ReconciliationSummary {
        summarize(self.opening_balance, &self.lines)
    }

    pub fn unreconciled(&self) -> impl Iterator<Item = &StatementLine> {
        self.lines.iter().filter(|l| l.reconciled_with.is_none())
    }

    fn leaf_mut(&mut self, leaf: u64) -> Option<&mut ChequeLeaf> {
        self.leaves.iter_mut().find(|l| l.leaf == leaf)
    }

    fn line_mut(&mut self, line_id: u64) -> Option<&mut StatementLine> {
        self.lines.iter_mut().find(|l| l.line_id == line_id)
    }
}

#[derive(Debug, Default)]
pub struct BankAccountsProjection {
    store: InMemoryTenantStore<BankAccountId, BankAccountReadModel>,
    cursors: StreamCursors,
}

impl BankAccountsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, account_id: &BankAccountId) -> Option<BankAccountReadModel> {
        self.store.get(tenant_id, account_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<BankAccountReadModel> {
        let mut out = self.store.list(tenant_id);
        out.sort_by(|a, b| (&a.bank_name, &a.account_number).cmp(&(&b.bank_name, &b.account_number)));
        out
    }

    fn modify(
        &self,
        tenant_id: TenantId,
        account_id: BankAccountId,
        f: impl FnOnce(&mut BankAccountReadModel),
    ) {
        self.store.update(tenant_id, account_id, |slot| {
            if let Some(rm) = slot {
                f(rm);
            }
        });
    }
}

impl Projection for BankAccountsProjection {
    fn name(&self) -> &'static str {
        "banking.accounts"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::BANK_ACCOUNT || !self.cursors.admit(envelope)? {
            return Ok(());
        }
        let ev: BankAccountEvent = decode(envelope)?;
        let tenant_id = envelope.tenant_id();

        match ev {
            BankAccountEvent::BankAccountOpened(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.store.upsert(
                    tenant_id,
                    e.account_id,
                    BankAccountReadModel {
                        account_id: e.account_id,
                        bank_name: e.bank_name,
                        account_number: e.account_number,
                        ifsc: e.ifsc,
                        ledger_head: e.ledger_head,
                        opening_balance: e.opening_balance,
                        cheque_books: vec![],
                        leaves: vec![],
                        lines: vec![],
                        last_import_at: None,
                        last_import_skipped: 0,
                    },
                );
            }
            BankAccountEvent::ChequeBookRegistered(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    let book = e.book;
                    rm.leaves.extend((book.first_leaf..=book.last_leaf()).map(|leaf| ChequeLeaf {
                        leaf,
                        book_no: book.book_no,
                        status: ChequeStatus::Unused,
                        payee: None,
                        amount: 0,
                        issued_on: None,
                        cleared_on: None,
                    }));
                    rm.leaves.sort_by_key(|l| l.leaf);
                    rm.cheque_books.push(book);
                });
            }
            BankAccountEvent::ChequeIssued(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    if let Some(leaf) = rm.leaf_mut(e.leaf) {
                        leaf.status = ChequeStatus::Issued;
                        leaf.payee = Some(e.payee);
                        leaf.amount = e.amount;
                        leaf.issued_on = Some(e.date);
                    }
                });
            }
            BankAccountEvent::ChequeCancelled(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    if let Some(leaf) = rm.leaf_mut(e.leaf) {
                        leaf.status = ChequeStatus::Cancelled;
                    }
                });
            }
            BankAccountEvent::ChequeCleared(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    if let Some(leaf) = rm.leaf_mut(e.leaf) {
                        leaf.status = ChequeStatus::Cleared;
                        leaf.cleared_on = Some(e.date);
                    }
                });
            }
            BankAccountEvent::StatementImported(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    rm.lines.extend(e.lines);
                    rm.last_import_at = Some(e.occurred_at);
                    rm.last_import_skipped = e.skipped_duplicates;
                });
            }
            BankAccountEvent::LineReconciled(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    if let Some(line) = rm.line_mut(e.line_id) {
                        line.reconciled_with = Some(e.voucher_id);
                    }
                });
            }
            BankAccountEvent::LineUnreconciled(e) => {
                ensure_scope(envelope, e.tenant_id, e.account_id.0)?;
                self.modify(tenant_id, e.account_id, |rm| {
                    if let Some(line) = rm.line_mut(e.line_id) {
                        line.reconciled_with = None;
                    }
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
