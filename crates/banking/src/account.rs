use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Paise, TenantId, define_aggregate_id,
};
use estateerp_events::Event;

use crate::reconcile::TxnDirection;

define_aggregate_id!(
    /// Bank account identifier.
    BankAccountId
);

/// IFSC: four bank letters, a literal `0`, six branch characters.
pub fn validate_ifsc(raw: &str) -> Result<String, DomainError> {
    let ifsc = raw.trim().to_ascii_uppercase();
    let bytes = ifsc.as_bytes();
    let ok = bytes.len() == 11
        && bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4] == b'0'
        && bytes[5..].iter().all(u8::is_ascii_alphanumeric);
    if ok {
        Ok(ifsc)
    } else {
        Err(DomainError::validation(format!("invalid IFSC code: {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChequeStatus {
    Unused,
    Issued,
    Cleared,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeBook {
    pub book_no: u32,
    pub first_leaf: u64,
    pub leaf_count: u32,
}

impl ChequeBook {
    pub fn last_leaf(&self) -> u64 {
        self.first_leaf + u64::from(self.leaf_count) - 1
    }

    fn overlaps(&self, first: u64, last: u64) -> bool {
        self.first_leaf <= last && first <= self.last_leaf()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeLeaf {
    pub leaf: u64,
    pub book_no: u32,
    pub status: ChequeStatus,
    pub payee: Option<String>,
    pub amount: Paise,
    pub issued_on: Option<NaiveDate>,
    pub cleared_on: Option<NaiveDate>,
}

/// A statement line as supplied by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLineInput {
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub withdrawal: Paise,
    pub deposit: Paise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub line_id: u64,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub withdrawal: Paise,
    pub deposit: Paise,
    pub reconciled_with: Option<AggregateId>,
}

impl StatementLine {
    pub fn direction(&self) -> TxnDirection {
        if self.deposit > 0 {
            TxnDirection::Deposit
        } else {
            TxnDirection::Withdrawal
        }
    }

    pub fn amount(&self) -> Paise {
        self.deposit.max(self.withdrawal)
    }

    /// Signed effect on the statement balance.
    pub fn net(&self) -> Paise {
        self.deposit - self.withdrawal
    }

    fn fingerprint(&self) -> (NaiveDate, Paise, Paise, String) {
        fingerprint(self.date, self.withdrawal, self.deposit, self.reference.as_deref())
    }
}

fn fingerprint(
    date: NaiveDate,
    withdrawal: Paise,
    deposit: Paise,
    reference: Option<&str>,
) -> (NaiveDate, Paise, Paise, String) {
    (
        date,
        withdrawal,
        deposit,
        reference.map(str::trim).unwrap_or_default().to_ascii_uppercase(),
    )
}

/// Aggregate root: BankAccount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    id: BankAccountId,
    tenant_id: Option<TenantId>,
    bank_name: String,
    account_number: String,
    ledger_head: String,
    opening_balance: Paise,
    books: Vec<ChequeBook>,
    leaves: BTreeMap<u64, ChequeLeaf>,
    lines: BTreeMap<u64, StatementLine>,
    next_line_id: u64,
    version: u64,
    created: bool,
}

impl BankAccount {
    pub fn empty(id: BankAccountId) -> Self {
        Self {
            id,
            tenant_id: None,
            bank_name: String::new(),
            account_number: String::new(),
            ledger_head: String::new(),
            opening_balance: 0,
            books: Vec::new(),
            leaves: BTreeMap::new(),
            lines: BTreeMap::new(),
            next_line_id: 1,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn bank_name(&self) -> &str {
        &self.bank_name
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    /// Chart-of-accounts head this account posts to.
    pub fn ledger_head(&self) -> &str {
        &self.ledger_head
    }

    pub fn opening_balance(&self) -> Paise {
        self.opening_balance
    }

    pub fn cheque_books(&self) -> &[ChequeBook] {
        &self.books
    }

    pub fn leaf(&self, leaf: u64) -> Option<&ChequeLeaf> {
        self.leaves.get(&leaf)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &ChequeLeaf> {
        self.leaves.values()
    }

    pub fn line(&self, line_id: u64) -> Option<&StatementLine> {
        self.lines.get(&line_id)
    }

    pub fn lines(&self) -> impl Iterator<Item = &StatementLine> {
        self.lines.values()
    }
}

impl AggregateRoot for BankAccount {
    type Id = BankAccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBankAccount {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub bank_name: String,
    pub account_number: String,
    pub ifsc: String,
    pub ledger_head: String,
    pub opening_balance: Paise,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterChequeBook {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub first_leaf: u64,
    pub leaf_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCheque {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub leaf: u64,
    pub payee: String,
    pub amount: Paise,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCheque {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub leaf: u64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkChequeCleared {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub leaf: u64,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatement {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub lines: Vec<StatementLineInput>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileLine {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub line_id: u64,
    pub voucher_id: AggregateId,
    /// The voucher's movement on the account's ledger head.
    pub amount: Paise,
    pub direction: TxnDirection,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreconcileLine {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub line_id: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountCommand {
    OpenBankAccount(OpenBankAccount),
    RegisterChequeBook(RegisterChequeBook),
    IssueCheque(IssueCheque),
    CancelCheque(CancelCheque),
    MarkChequeCleared(MarkChequeCleared),
    ImportStatement(ImportStatement),
    ReconcileLine(ReconcileLine),
    UnreconcileLine(UnreconcileLine),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountOpened {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub bank_name: String,
    pub account_number: String,
    pub ifsc: String,
    pub ledger_head: String,
    pub opening_balance: Paise,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeBookRegistered {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub book: ChequeBook,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeIssued {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub leaf: u64,
    pub payee: String,
    pub amount: Paise,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeCancelled {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub leaf: u64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeCleared {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub leaf: u64,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementImported {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub lines: Vec<StatementLine>,
    pub skipped_duplicates: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReconciled {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub line_id: u64,
    pub voucher_id: AggregateId,
    pub amount: Paise,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUnreconciled {
    pub tenant_id: TenantId,
    pub account_id: BankAccountId,
    pub line_id: u64,
    pub voucher_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountEvent {
    BankAccountOpened(BankAccountOpened),
    ChequeBookRegistered(ChequeBookRegistered),
    ChequeIssued(ChequeIssued),
    ChequeCancelled(ChequeCancelled),
    ChequeCleared(ChequeCleared),
    StatementImported(StatementImported),
    LineReconciled(LineReconciled),
    LineUnreconciled(LineUnreconciled),
}

impl Event for BankAccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BankAccountEvent::BankAccountOpened(_) => "banking.account.opened",
            BankAccountEvent::ChequeBookRegistered(_) => "banking.account.cheque_book_registered",
            BankAccountEvent::ChequeIssued(_) => "banking.account.cheque_issued",
            BankAccountEvent::ChequeCancelled(_) => "banking.account.cheque_cancelled",
            BankAccountEvent::ChequeCleared(_) => "banking.account.cheque_cleared",
            BankAccountEvent::StatementImported(_) => "banking.account.statement_imported",
            BankAccountEvent::LineReconciled(_) => "banking.account.line_reconciled",
            BankAccountEvent::LineUnreconciled(_) => "banking.account.line_unreconciled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BankAccountEvent::BankAccountOpened(e) => e.occurred_at,
            BankAccountEvent::ChequeBookRegistered(e) => e.occurred_at,
            BankAccountEvent::ChequeIssued(e) => e.occurred_at,
            BankAccountEvent::ChequeCancelled(e) => e.occurred_at,
            BankAccountEvent::ChequeCleared(e) => e.occurred_at,
            BankAccountEvent::StatementImported(e) => e.occurred_at,
            BankAccountEvent::LineReconciled(e) => e.occurred_at,
            BankAccountEvent::LineUnreconciled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BankAccount {
    type Command = BankAccountCommand;
    type Event = BankAccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BankAccountEvent::BankAccountOpened(e) => {
                self.id = e.account_id;
                self.tenant_id = Some(e.tenant_id);
                self.bank_name = e.bank_name.clone();
                self.account_number = e.account_number.clone();
                self.ledger_head = e.ledger_head.clone();
                self.opening_balance = e.opening_balance;
                self.created = true;
            }
            BankAccountEvent::ChequeBookRegistered(e) => {
                for leaf in e.book.first_leaf..=e.book.last_leaf() {
                    self.leaves.insert(
                        leaf,
                        ChequeLeaf {
                            leaf,
                            book_no: e.book.book_no,
                            status: ChequeStatus::Unused,
                            payee: None,
                            amount: 0,
                            issued_on: None,
                            cleared_on: None,
                        },
                    );
                }
                self.books.push(e.book.clone());
            }
            BankAccountEvent::ChequeIssued(e) => {
                if let Some(leaf) = self.leaves.get_mut(&e.leaf) {
                    leaf.status = ChequeStatus::Issued;
                    leaf.payee = Some(e.payee.clone());
                    leaf.amount = e.amount;
                    leaf.issued_on = Some(e.date);
                }
            }
            BankAccountEvent::ChequeCancelled(e) => {
                if let Some(leaf) = self.leaves.get_mut(&e.leaf) {
                    leaf.status = ChequeStatus::Cancelled;
                }
            }
            BankAccountEvent::ChequeCleared(e) => {
                if let Some(leaf) = self.leaves.get_mut(&e.leaf) {
                    leaf.status = ChequeStatus::Cleared;
                    leaf.cleared_on = Some(e.date);
                }
            }
            BankAccountEvent::StatementImported(e) => {
                for line in &e.lines {
                    self.next_line_id = self.next_line_id.max(line.line_id + 1);
                    self.lines.insert(line.line_id, line.clone());
                }
            }
            BankAccountEvent::LineReconciled(e) => {
                if let Some(line) = self.lines.get_mut(&e.line_id) {
                    line.reconciled_with = Some(e.voucher_id);
                }
            }
            BankAccountEvent::LineUnreconciled(e) => {
                if let Some(line) = self.lines.get_mut(&e.line_id) {
                    line.reconciled_with = None;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BankAccountCommand::OpenBankAccount(cmd) => self.handle_open(cmd),
            BankAccountCommand::RegisterChequeBook(cmd) => self.handle_register_book(cmd),
            BankAccountCommand::IssueCheque(cmd) => self.handle_issue(cmd),
            BankAccountCommand::CancelCheque(cmd) => self.handle_cancel_cheque(cmd),
            BankAccountCommand::MarkChequeCleared(cmd) => self.handle_clear(cmd),
            BankAccountCommand::ImportStatement(cmd) => self.handle_import(cmd),
            BankAccountCommand::ReconcileLine(cmd) => self.handle_reconcile(cmd),
            BankAccountCommand::UnreconcileLine(cmd) => self.handle_unreconcile(cmd),
        }
    }
}

impl BankAccount {
    fn ensure_existing(&self, tenant_id: TenantId, account_id: BankAccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn existing_leaf(&self, leaf: u64) -> Result<&ChequeLeaf, DomainError> {
        self.leaves
            .get(&leaf)
            .ok_or_else(|| DomainError::validation(format!("cheque leaf {leaf} is not registered")))
    }

    fn existing_line(&self, line_id: u64) -> Result<&StatementLine, DomainError> {
        self.lines
            .get(&line_id)
            .ok_or_else(|| DomainError::validation(format!("statement line {line_id} not found")))
    }

    fn handle_open(&self, cmd: &OpenBankAccount) -> Result<Vec<BankAccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bank account already exists"));
        }
        let bank_name = cmd.bank_name.trim();
        if bank_name.is_empty() {
            return Err(DomainError::validation("bank name cannot be empty"));
        }
        let account_number: String = cmd.account_number.chars().filter(|c| !c.is_whitespace()).collect();
        if !(9..=18).contains(&account_number.len()) || !account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation("account number must be 9 to 18 digits"));
        }
        let ledger_head = cmd.ledger_head.trim().to_ascii_uppercase();
        if ledger_head.is_empty() {
            return Err(DomainError::validation("ledger head cannot be empty"));
        }

        Ok(vec![BankAccountEvent::BankAccountOpened(BankAccountOpened {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            bank_name: bank_name.to_string(),
            account_number,
            ifsc: validate_ifsc(&cmd.ifsc)?,
            ledger_head,
            opening_balance: cmd.opening_balance,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_book(&self, cmd: &RegisterChequeBook) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        if cmd.leaf_count == 0 || cmd.leaf_count > 1000 {
            return Err(DomainError::validation("a cheque book holds 1 to 1000 leaves"));
        }
        if cmd.first_leaf == 0 {
            return Err(DomainError::validation("leaf numbers start at 1"));
        }
        let last = cmd
            .first_leaf
            .checked_add(u64::from(cmd.leaf_count) - 1)
            .ok_or_else(|| DomainError::validation("leaf range overflow"))?;
        if let Some(existing) = self.books.iter().find(|b| b.overlaps(cmd.first_leaf, last)) {
            return Err(DomainError::conflict(format!(
                "leaves {}..={} overlap cheque book {} ({}..={})",
                cmd.first_leaf,
                last,
                existing.book_no,
                existing.first_leaf,
                existing.last_leaf()
            )));
        }

        Ok(vec![BankAccountEvent::ChequeBookRegistered(ChequeBookRegistered {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            book: ChequeBook {
                book_no: self.books.len() as u32 + 1,
                first_leaf: cmd.first_leaf,
                leaf_count: cmd.leaf_count,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueCheque) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        let leaf = self.existing_leaf(cmd.leaf)?;
        if leaf.status != ChequeStatus::Unused {
            return Err(DomainError::invariant(format!(
                "cheque {} is {:?} and cannot be issued",
                cmd.leaf, leaf.status
            )));
        }
        let payee = cmd.payee.trim();
        if payee.is_empty() {
            return Err(DomainError::validation("payee cannot be empty"));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("cheque amount must be positive"));
        }

        Ok(vec![BankAccountEvent::ChequeIssued(ChequeIssued {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            leaf: cmd.leaf,
            payee: payee.to_string(),
            amount: cmd.amount,
            date: cmd.date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel_cheque(&self, cmd: &CancelCheque) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        let leaf = self.existing_leaf(cmd.leaf)?;
        match leaf.status {
            ChequeStatus::Unused | ChequeStatus::Issued => {}
            ChequeStatus::Cleared => {
                return Err(DomainError::invariant("a cleared cheque cannot be cancelled"));
            }
            ChequeStatus::Cancelled => {
                return Err(DomainError::conflict("cheque is already cancelled"));
            }
        }

        Ok(vec![BankAccountEvent::ChequeCancelled(ChequeCancelled {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            leaf: cmd.leaf,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_clear(&self, cmd: &MarkChequeCleared) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        let leaf = self.existing_leaf(cmd.leaf)?;
        if leaf.status != ChequeStatus::Issued {
            return Err(DomainError::invariant("only issued cheques can be cleared"));
        }
        if leaf.issued_on.is_some_and(|issued| cmd.date < issued) {
            return Err(DomainError::validation("clearing date precedes the issue date"));
        }

        Ok(vec![BankAccountEvent::ChequeCleared(ChequeCleared {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            leaf: cmd.leaf,
            date: cmd.date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_import(&self, cmd: &ImportStatement) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("statement has no lines"));
        }

        let mut seen: std::collections::HashSet<_> = self.lines.values().map(StatementLine::fingerprint).collect();
        let mut next_id = self.next_line_id;
        let mut lines = Vec::new();
        let mut skipped = 0u32;

        for (idx, input) in cmd.lines.iter().enumerate() {
            if input.withdrawal < 0 || input.deposit < 0 {
                return Err(DomainError::validation(format!("line {}: amounts cannot be negative", idx + 1)));
            }
            if (input.withdrawal > 0) == (input.deposit > 0) {
                return Err(DomainError::validation(format!(
                    "line {}: exactly one of withdrawal or deposit must be set",
                    idx + 1
                )));
            }
            let key = fingerprint(input.date, input.withdrawal, input.deposit, input.reference.as_deref());
            if !seen.insert(key) {
                skipped += 1;
                continue;
            }
            lines.push(StatementLine {
                line_id: next_id,
                date: input.date,
                description: input.description.trim().to_string(),
                reference: input
                    .reference
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
                withdrawal: input.withdrawal,
                deposit: input.deposit,
                reconciled_with: None,
            });
            next_id += 1;
        }

        Ok(vec![BankAccountEvent::StatementImported(StatementImported {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            lines,
            skipped_duplicates: skipped,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reconcile(&self, cmd: &ReconcileLine) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        let line = self.existing_line(cmd.line_id)?;
        if line.reconciled_with.is_some() {
            return Err(DomainError::conflict(format!("line {} is already reconciled", cmd.line_id)));
        }
        if self.lines.values().any(|l| l.reconciled_with == Some(cmd.voucher_id)) {
            return Err(DomainError::conflict("voucher is already matched to another line"));
        }
        if cmd.direction != line.direction() {
            return Err(DomainError::validation(format!(
                "voucher is a {:?} but line {} is a {:?}",
                cmd.direction,
                cmd.line_id,
                line.direction()
            )));
        }
        if cmd.amount != line.amount() {
            return Err(DomainError::validation(format!(
                "voucher amount {} does not match line amount {}",
                cmd.amount,
                line.amount()
            )));
        }

        Ok(vec![BankAccountEvent::LineReconciled(LineReconciled {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            line_id: cmd.line_id,
            voucher_id: cmd.voucher_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unreconcile(&self, cmd: &UnreconcileLine) -> Result<Vec<BankAccountEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.account_id)?;
        let line = self.existing_line(cmd.line_id)?;
        let voucher_id = line
            .reconciled_with
            .ok_or_else(|| DomainError::invariant(format!("line {} is not reconciled", cmd.line_id)))?;

        Ok(vec![BankAccountEvent::LineUnreconciled(LineUnreconciled {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            line_id: cmd.line_id,
            voucher_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    struct Fixture {
        account: BankAccount,
        tenant_id: TenantId,
        account_id: BankAccountId,
    }

    impl Fixture {
        fn open() -> Self {
            let tenant_id = TenantId::new();
            let account_id = BankAccountId::generate();
            let mut account = BankAccount::empty(account_id);
            execute(
                &mut account,
                &BankAccountCommand::OpenBankAccount(OpenBankAccount {
                    tenant_id,
                    account_id,
                    bank_name: "HDFC Bank".to_string(),
                    account_number: "5010 0123 4567 89".to_string(),
                    ifsc: "hdfc0001234".to_string(),
                    ledger_head: "1101".to_string(),
                    opening_balance: 10_000_00,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
            Self { account, tenant_id, account_id }
        }

        fn run(&mut self, command: BankAccountCommand) -> Result<Vec<BankAccountEvent>, DomainError> {
            execute(&mut self.account, &command)
        }

        fn register_book(&mut self, first_leaf: u64, leaf_count: u32) -> Result<Vec<BankAccountEvent>, DomainError> {
            self.run(BankAccountCommand::RegisterChequeBook(RegisterChequeBook {
                tenant_id: self.tenant_id,
                account_id: self.account_id,
                first_leaf,
                leaf_count,
                occurred_at: Utc::now(),
            }))
        }

        fn import(&mut self, lines: Vec<StatementLineInput>) -> Result<Vec<BankAccountEvent>, DomainError> {
            self.run(BankAccountCommand::ImportStatement(ImportStatement {
                tenant_id: self.tenant_id,
                account_id: self.account_id,
                lines,
                occurred_at: Utc::now(),
            }))
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn deposit(d: u32, amount: Paise, reference: &str) -> StatementLineInput {
        StatementLineInput {
            date: day(d),
            description: "NEFT CR".to_string(),
            reference: Some(reference.to_string()),
            withdrawal: 0,
            deposit: amount,
        }
    }

    #[test]
    fn ifsc_format_is_enforced() {
        assert_eq!(validate_ifsc(" sbin0005943 ").unwrap(), "SBIN0005943");
        assert!(validate_ifsc("SBIN1005943").is_err());
        assert!(validate_ifsc("SBI00005943").is_err());
        assert!(validate_ifsc("SBIN000594").is_err());
    }

    #[test]
    fn overlapping_cheque_books_are_rejected() {
        let mut fx = Fixture::open();
        fx.register_book(100001, 50).unwrap();
        let err = fx.register_book(100040, 25).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        fx.register_book(100051, 25).unwrap();
        assert_eq!(fx.account.cheque_books().len(), 2);
    }

    #[test]
    fn cheque_lifecycle() {
        let mut fx = Fixture::open();
        fx.register_book(500, 10).unwrap();
        let (tenant_id, account_id) = (fx.tenant_id, fx.account_id);

        fx.run(BankAccountCommand::IssueCheque(IssueCheque {
            tenant_id,
            account_id,
            leaf: 501,
            payee: "UltraTech Cement".to_string(),
            amount: 2_50_000_00,
            date: day(3),
            occurred_at: Utc::now(),
        }))
        .unwrap();

        let reissue = fx.run(BankAccountCommand::IssueCheque(IssueCheque {
            tenant_id,
            account_id,
            leaf: 501,
            payee: "Someone else".to_string(),
            amount: 1_00,
            date: day(4),
            occurred_at: Utc::now(),
        }));
        assert!(reissue.is_err());

        fx.run(BankAccountCommand::MarkChequeCleared(MarkChequeCleared {
            tenant_id,
            account_id,
            leaf: 501,
            date: day(6),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(fx.account.leaf(501).unwrap().status, ChequeStatus::Cleared);

        let cancel_cleared = fx.run(BankAccountCommand::CancelCheque(CancelCheque {
            tenant_id,
            account_id,
            leaf: 501,
            reason: None,
            occurred_at: Utc::now(),
        }));
        assert!(cancel_cleared.is_err());

        fx.run(BankAccountCommand::CancelCheque(CancelCheque {
            tenant_id,
            account_id,
            leaf: 502,
            reason: Some("spoiled".to_string()),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(fx.account.leaf(502).unwrap().status, ChequeStatus::Cancelled);
    }

    #[test]
    fn duplicate_statement_lines_are_skipped() {
        let mut fx = Fixture::open();
        fx.import(vec![deposit(1, 5_000_00, "UTR1"), deposit(2, 7_500_00, "UTR2")]).unwrap();
        let events = fx
            .import(vec![deposit(2, 7_500_00, "utr2"), deposit(3, 1_000_00, "UTR3")])
            .unwrap();

        match &events[0] {
            BankAccountEvent::StatementImported(e) => {
                assert_eq!(e.skipped_duplicates, 1);
                assert_eq!(e.lines.len(), 1);
                assert_eq!(e.lines[0].line_id, 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(fx.account.lines().count(), 3);
    }

    #[test]
    fn line_needs_exactly_one_side() {
        let mut fx = Fixture::open();
        let mut both = deposit(1, 5_00, "X");
        both.withdrawal = 5_00;
        assert!(fx.import(vec![both]).is_err());
    }

    #[test]
    fn reconcile_requires_matching_amount_and_unused_voucher() {
        let mut fx = Fixture::open();
        fx.import(vec![deposit(1, 5_000_00, "UTR1"), deposit(2, 5_000_00, "UTR2")]).unwrap();
        let (tenant_id, account_id) = (fx.tenant_id, fx.account_id);
        let voucher_id = AggregateId::new();

        let reconcile_as = |line_id: u64, amount: Paise, direction: TxnDirection| {
            BankAccountCommand::ReconcileLine(ReconcileLine {
                tenant_id,
                account_id,
                line_id,
                voucher_id,
                amount,
                direction,
                occurred_at: Utc::now(),
            })
        };
        let reconcile = |line_id: u64, amount: Paise| reconcile_as(line_id, amount, TxnDirection::Deposit);

        assert!(matches!(fx.run(reconcile(1, 4_999_00)), Err(DomainError::Validation(_))));
        assert!(matches!(
            fx.run(reconcile_as(1, 5_000_00, TxnDirection::Withdrawal)),
            Err(DomainError::Validation(_))
        ));
        fx.run(reconcile(1, 5_000_00)).unwrap();
        assert!(matches!(fx.run(reconcile(2, 5_000_00)), Err(DomainError::Conflict(_))));

        fx.run(BankAccountCommand::UnreconcileLine(UnreconcileLine {
            tenant_id,
            account_id,
            line_id: 1,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        fx.run(reconcile(2, 5_000_00)).unwrap();
        assert_eq!(fx.account.line(2).unwrap().reconciled_with, Some(voucher_id));
        assert_eq!(fx.account.line(1).unwrap().reconciled_with, None);
    }
}
