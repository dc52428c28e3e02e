use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, Paise, TenantId, define_aggregate_id};
use estateerp_events::Event;

use crate::chart::EntrySide;

define_aggregate_id!(
    /// Voucher identifier (aggregate id).
    VoucherId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    Payment,
    Receipt,
    Journal,
    Contra,
    Sales,
    Purchase,
    DebitNote,
    CreditNote,
}

impl VoucherKind {
    /// Prefix of the voucher number series, e.g. `JV/00012`.
    pub fn prefix(self) -> &'static str {
        match self {
            VoucherKind::Payment => "PV",
            VoucherKind::Receipt => "RV",
            VoucherKind::Journal => "JV",
            VoucherKind::Contra => "CV",
            VoucherKind::Sales => "SV",
            VoucherKind::Purchase => "PU",
            VoucherKind::DebitNote => "DN",
            VoucherKind::CreditNote => "CN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Draft,
    Posted,
    Cancelled,
}

/// One line of a voucher. Exactly one of `debit`/`credit` is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherEntry {
    pub head_code: String,
    #[serde(default)]
    pub debit: Paise,
    #[serde(default)]
    pub credit: Paise,
    #[serde(default)]
    pub narration: Option<String>,
}

impl VoucherEntry {
    pub fn debit(head_code: impl Into<String>, amount: Paise) -> Self {
        Self {
            head_code: head_code.into(),
            debit: amount,
            credit: 0,
            narration: None,
        }
    }

    pub fn credit(head_code: impl Into<String>, amount: Paise) -> Self {
        Self {
            head_code: head_code.into(),
            debit: 0,
            credit: amount,
            narration: None,
        }
    }

    pub fn side(&self) -> EntrySide {
        if self.debit > 0 {
            EntrySide::Debit
        } else {
            EntrySide::Credit
        }
    }

    pub fn amount(&self) -> Paise {
        self.debit.max(self.credit)
    }

    /// Debit-positive signed amount.
    pub fn signed(&self) -> Paise {
        self.debit - self.credit
    }
}

/// Shape checks every entry must pass, balanced or not.
fn validate_entries(entries: &[VoucherEntry]) -> Result<Vec<VoucherEntry>, DomainError> {
    if entries.len() < 2 {
        return Err(DomainError::validation("a voucher needs at least two entries"));
    }
    entries
        .iter()
        .map(|e| {
            let head_code = e.head_code.trim().to_ascii_uppercase();
            if head_code.is_empty() {
                return Err(DomainError::validation("entry head code cannot be empty"));
            }
            if e.debit < 0 || e.credit < 0 {
                return Err(DomainError::validation("entry amounts cannot be negative"));
            }
            if (e.debit > 0) == (e.credit > 0) {
                return Err(DomainError::validation(format!(
                    "entry for '{head_code}' must have an amount on exactly one side"
                )));
            }
            Ok(VoucherEntry {
                head_code,
                debit: e.debit,
                credit: e.credit,
                narration: e.narration.clone(),
            })
        })
        .collect()
}

/// Server-side balance check: Σdebit == Σcredit, with at least one of each.
///
/// Sums are taken in `i128` so no combination of `i64` entries can overflow.
/// Returns the voucher total.
pub fn check_balance(entries: &[VoucherEntry]) -> Result<Paise, DomainError> {
    let debits: i128 = entries.iter().map(|e| e.debit as i128).sum();
    let credits: i128 = entries.iter().map(|e| e.credit as i128).sum();

    if !entries.iter().any(|e| e.debit > 0) || !entries.iter().any(|e| e.credit > 0) {
        return Err(DomainError::invariant(
            "a voucher needs at least one debit and one credit",
        ));
    }
    if debits != credits {
        return Err(DomainError::invariant(format!(
            "debits must equal credits (debit {debits}, credit {credits})"
        )));
    }
    Paise::try_from(debits).map_err(|_| DomainError::invariant("voucher total overflow"))
}

/// Aggregate root: Voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    id: VoucherId,
    tenant_id: Option<TenantId>,
    number: String,
    kind: VoucherKind,
    date: Option<NaiveDate>,
    entries: Vec<VoucherEntry>,
    status: VoucherStatus,
    version: u64,
    created: bool,
}

impl Voucher {
    pub fn empty(id: VoucherId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            kind: VoucherKind::Journal,
            date: None,
            entries: Vec::new(),
            status: VoucherStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn kind(&self) -> VoucherKind {
        self.kind
    }

    pub fn status(&self) -> VoucherStatus {
        self.status
    }

    pub fn entries(&self) -> &[VoucherEntry] {
        &self.entries
    }
}

impl AggregateRoot for Voucher {
    type Id = VoucherId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub number: String,
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub narration: String,
    pub entries: Vec<VoucherEntry>,
    /// Source document, e.g. `invoice:<id>`.
    pub reference: Option<String>,
    /// Create and post in one step.
    pub post: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherCommand {
    CreateVoucher(CreateVoucher),
    PostVoucher(PostVoucher),
    CancelVoucher(CancelVoucher),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherCreated {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub number: String,
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub narration: String,
    pub entries: Vec<VoucherEntry>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VoucherPosted. Repeats the entries so balance projections need no
/// other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherPosted {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub number: String,
    pub kind: VoucherKind,
    pub date: NaiveDate,
    pub entries: Vec<VoucherEntry>,
    pub total: Paise,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherCancelled {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub reason: String,
    /// Set when the voucher had been posted; its effect must be reversed.
    pub was_posted: bool,
    pub entries: Vec<VoucherEntry>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherEvent {
    VoucherCreated(VoucherCreated),
    VoucherPosted(VoucherPosted),
    VoucherCancelled(VoucherCancelled),
}

impl Event for VoucherEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VoucherEvent::VoucherCreated(_) => "accounting.voucher.created",
            VoucherEvent::VoucherPosted(_) => "accounting.voucher.posted",
            VoucherEvent::VoucherCancelled(_) => "accounting.voucher.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VoucherEvent::VoucherCreated(e) => e.occurred_at,
            VoucherEvent::VoucherPosted(e) => e.occurred_at,
            VoucherEvent::VoucherCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Voucher {
    type Command = VoucherCommand;
    type Event = VoucherEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VoucherEvent::VoucherCreated(e) => {
                self.id = e.voucher_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.kind = e.kind;
                self.date = Some(e.date);
                self.entries = e.entries.clone();
                self.status = VoucherStatus::Draft;
                self.created = true;
            }
            VoucherEvent::VoucherPosted(_) => {
                self.status = VoucherStatus::Posted;
            }
            VoucherEvent::VoucherCancelled(_) => {
                self.status = VoucherStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VoucherCommand::CreateVoucher(cmd) => self.handle_create(cmd),
            VoucherCommand::PostVoucher(cmd) => self.handle_post(cmd),
            VoucherCommand::CancelVoucher(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Voucher {
    fn ensure_existing(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != voucher_id {
            return Err(DomainError::invariant("voucher_id mismatch"));
        }
        Ok(())
    }

    fn posted_event(
        &self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        number: &str,
        kind: VoucherKind,
        date: NaiveDate,
        entries: &[VoucherEntry],
        occurred_at: DateTime<Utc>,
    ) -> Result<VoucherEvent, DomainError> {
        let total = check_balance(entries)?;
        Ok(VoucherEvent::VoucherPosted(VoucherPosted {
            tenant_id,
            voucher_id,
            number: number.to_string(),
            kind,
            date,
            entries: entries.to_vec(),
            total,
            occurred_at,
        }))
    }

    fn handle_create(&self, cmd: &CreateVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("voucher already exists"));
        }
        let number = cmd.number.trim().to_string();
        if number.is_empty() {
            return Err(DomainError::validation("voucher number cannot be empty"));
        }
        let entries = validate_entries(&cmd.entries)?;

        let mut events = vec![VoucherEvent::VoucherCreated(VoucherCreated {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            number: number.clone(),
            kind: cmd.kind,
            date: cmd.date,
            narration: cmd.narration.trim().to_string(),
            entries: entries.clone(),
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })];

        if cmd.post {
            events.push(self.posted_event(
                cmd.tenant_id,
                cmd.voucher_id,
                &number,
                cmd.kind,
                cmd.date,
                &entries,
                cmd.occurred_at,
            )?);
        }

        Ok(events)
    }

    fn handle_post(&self, cmd: &PostVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.voucher_id)?;
        match self.status {
            VoucherStatus::Draft => {}
            VoucherStatus::Posted => return Err(DomainError::conflict("voucher is already posted")),
            VoucherStatus::Cancelled => {
                return Err(DomainError::invariant("cancelled vouchers cannot be posted"));
            }
        }
        let date = self
            .date
            .ok_or_else(|| DomainError::invariant("voucher has no date"))?;

        Ok(vec![self.posted_event(
            cmd.tenant_id,
            cmd.voucher_id,
            &self.number,
            self.kind,
            date,
            &self.entries,
            cmd.occurred_at,
        )?])
    }

    fn handle_cancel(&self, cmd: &CancelVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.voucher_id)?;
        if self.status == VoucherStatus::Cancelled {
            return Err(DomainError::conflict("voucher is already cancelled"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }

        Ok(vec![VoucherEvent::VoucherCancelled(VoucherCancelled {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            reason: cmd.reason.trim().to_string(),
            was_posted: self.status == VoucherStatus::Posted,
            entries: self.entries.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;
    use proptest::prelude::*;

    fn create(entries: Vec<VoucherEntry>, post: bool) -> (TenantId, VoucherId, VoucherCommand) {
        let tenant_id = TenantId::new();
        let voucher_id = VoucherId::generate();
        let cmd = VoucherCommand::CreateVoucher(CreateVoucher {
            tenant_id,
            voucher_id,
            number: "JV/00001".to_string(),
            kind: VoucherKind::Journal,
            date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            narration: "Site material".to_string(),
            entries,
            reference: None,
            post,
            occurred_at: Utc::now(),
        });
        (tenant_id, voucher_id, cmd)
    }

    #[test]
    fn create_and_post_in_one_step() {
        let (_, voucher_id, cmd) = create(
            vec![VoucherEntry::debit("5001", 10_000), VoucherEntry::credit("1101", 10_000)],
            true,
        );
        let mut voucher = Voucher::empty(voucher_id);
        let events = execute(&mut voucher, &cmd).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], VoucherEvent::VoucherPosted(p) if p.total == 10_000));
        assert_eq!(voucher.status(), VoucherStatus::Posted);
    }

    #[test]
    fn unbalanced_draft_cannot_be_posted() {
        let (tenant_id, voucher_id, cmd) = create(
            vec![VoucherEntry::debit("5001", 10_000), VoucherEntry::credit("1101", 9_000)],
            false,
        );
        let mut voucher = Voucher::empty(voucher_id);
        execute(&mut voucher, &cmd).unwrap();

        let err = voucher
            .handle(&VoucherCommand::PostVoucher(PostVoucher {
                tenant_id,
                voucher_id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits") => {}
            other => panic!("expected balance violation, got {other:?}"),
        }
    }

    #[test]
    fn entry_with_both_sides_is_rejected() {
        let mut both = VoucherEntry::debit("5001", 100);
        both.credit = 100;
        let (_, voucher_id, cmd) = create(vec![both, VoucherEntry::credit("1101", 100)], false);
        assert!(matches!(
            Voucher::empty(voucher_id).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn cancelling_posted_voucher_flags_reversal() {
        let (tenant_id, voucher_id, cmd) = create(
            vec![VoucherEntry::debit("1001", 500), VoucherEntry::credit("4001", 500)],
            true,
        );
        let mut voucher = Voucher::empty(voucher_id);
        execute(&mut voucher, &cmd).unwrap();

        let events = execute(
            &mut voucher,
            &VoucherCommand::CancelVoucher(CancelVoucher {
                tenant_id,
                voucher_id,
                reason: "wrong head".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(matches!(&events[0], VoucherEvent::VoucherCancelled(c) if c.was_posted));
        assert_eq!(voucher.status(), VoucherStatus::Cancelled);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Whatever entries are submitted, a voucher only reaches Posted when
        /// its debits equal its credits.
        #[test]
        fn posted_vouchers_are_always_balanced(
            debits in prop::collection::vec(1i64..1_000_000_000i64, 1..6),
            credits in prop::collection::vec(1i64..1_000_000_000i64, 1..6),
            force_balance in any::<bool>(),
        ) {
            let mut entries: Vec<VoucherEntry> = debits
                .iter()
                .map(|d| VoucherEntry::debit("5001", *d))
                .collect();
            entries.extend(credits.iter().map(|c| VoucherEntry::credit("1101", *c)));
            if force_balance {
                let diff: i64 = debits.iter().sum::<i64>() - credits.iter().sum::<i64>();
                if diff > 0 {
                    entries.push(VoucherEntry::credit("1101", diff));
                } else if diff < 0 {
                    entries.push(VoucherEntry::debit("5001", -diff));
                }
            }

            let (_, voucher_id, cmd) = create(entries, true);
            match Voucher::empty(voucher_id).handle(&cmd) {
                Ok(events) => {
                    for ev in &events {
                        if let VoucherEvent::VoucherPosted(p) = ev {
                            let dr: i128 = p.entries.iter().map(|e| e.debit as i128).sum();
                            let cr: i128 = p.entries.iter().map(|e| e.credit as i128).sum();
                            prop_assert_eq!(dr, cr);
                            prop_assert_eq!(dr, p.total as i128);
                        }
                    }
                }
                Err(err) => {
                    prop_assert!(!force_balance);
                    prop_assert!(matches!(err, DomainError::InvariantViolation(_)), "unexpected {:?}", err);
                }
            }
        }
    }
}
