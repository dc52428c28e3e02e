use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Paise, RateBps, TenantId,
    define_aggregate_id,
};
use estateerp_events::Event;

use crate::gst::{IndianState, SupplyKind, TaxBreakup, split_tax, validate_gst_rate};

define_aggregate_id!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

/// Invoice status lifecycle.
///
/// A Pending invoice with partial payments stays Pending; the read model
/// exposes the outstanding amount instead of a separate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Cheque,
    BankTransfer,
    Upi,
    Card,
}

impl PaymentMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "cash" => Some(Self::Cash),
            "cheque" | "check" => Some(Self::Cheque),
            "bank_transfer" | "neft" | "rtgs" | "imps" => Some(Self::BankTransfer),
            "upi" => Some(Self::Upi),
            "card" => Some(Self::Card),
            _ => None,
        }
    }

    /// Cash receipts go to the cash head; everything else to the bank.
    pub fn is_cash(self) -> bool {
        matches!(self, Self::Cash)
    }
}

/// Billable item as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    /// HSN (goods) or SAC (services) code.
    #[serde(default)]
    pub hsn_sac: String,
    pub quantity: u64,
    /// Unit price in paise.
    pub unit_price: Paise,
    #[serde(default)]
    pub discount: Paise,
    pub gst_rate: RateBps,
}

/// Item with its computed taxable value and tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub item: InvoiceItem,
    pub taxable: Paise,
    pub tax: TaxBreakup,
    pub total: Paise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub taxable: Paise,
    pub tax: TaxBreakup,
    pub grand_total: Paise,
}

/// Validate items and compute per-line tax for a supply kind.
pub fn compute_lines(
    items: &[InvoiceItem],
    kind: SupplyKind,
) -> Result<(Vec<InvoiceLine>, InvoiceTotals), DomainError> {
    if items.is_empty() {
        return Err(DomainError::validation("invoice needs at least one item"));
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut totals = InvoiceTotals::default();

    for (idx, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(DomainError::validation("item description cannot be empty"));
        }
        if item.quantity == 0 {
            return Err(DomainError::validation("item quantity must be positive"));
        }
        if item.unit_price <= 0 {
            return Err(DomainError::validation("item unit_price must be positive"));
        }
        if item.discount < 0 {
            return Err(DomainError::validation("item discount cannot be negative"));
        }
        validate_gst_rate(item.gst_rate)?;

        let gross = (item.quantity as i128)
            .checked_mul(item.unit_price as i128)
            .ok_or_else(|| DomainError::invariant("item amount overflow"))?;
        if (item.discount as i128) > gross {
            return Err(DomainError::validation("item discount exceeds its gross amount"));
        }
        let taxable = Paise::try_from(gross - item.discount as i128)
            .map_err(|_| DomainError::invariant("item amount overflow"))?;

        let tax = split_tax(taxable, item.gst_rate, kind);
        let total = taxable
            .checked_add(tax.total())
            .ok_or_else(|| DomainError::invariant("item amount overflow"))?;

        totals.taxable = totals
            .taxable
            .checked_add(taxable)
            .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        totals.tax.add(&tax);
        totals.grand_total = totals
            .grand_total
            .checked_add(total)
            .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;

        lines.push(InvoiceLine {
            line_no: idx as u32 + 1,
            item: item.clone(),
            taxable,
            tax,
            total,
        });
    }

    Ok((lines, totals))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_no: u32,
    pub amount: Paise,
    pub mode: PaymentMode,
    pub reference: String,
    pub paid_on: NaiveDate,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<AggregateId>,
    supply_kind: SupplyKind,
    status: InvoiceStatus,
    invoice_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    lines: Vec<InvoiceLine>,
    totals: InvoiceTotals,
    payments: Vec<Payment>,
    total_paid: Paise,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            supply_kind: SupplyKind::IntraState,
            status: InvoiceStatus::Draft,
            invoice_date: None,
            due_date: None,
            lines: Vec::new(),
            totals: InvoiceTotals::default(),
            payments: Vec::new(),
            total_paid: 0,
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

    pub fn customer_id(&self) -> Option<AggregateId> {
        self.customer_id
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn supply_kind(&self) -> SupplyKind {
        self.supply_kind
    }

    pub fn invoice_date(&self) -> Option<NaiveDate> {
        self.invoice_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn total_paid(&self) -> Paise {
        self.total_paid
    }

    pub fn outstanding(&self) -> Paise {
        (self.totals.grand_total - self.total_paid).max(0)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice (starts as Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: AggregateId,
    pub customer_name: String,
    pub customer_gstin: Option<String>,
    /// Customer's place of supply; blank means the company's own state.
    pub place_of_supply: Option<String>,
    pub company_state: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub property_id: Option<AggregateId>,
    pub items: Vec<InvoiceItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseDraft {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub due_date: Option<NaiveDate>,
    pub items: Vec<InvoiceItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueInvoice (Draft → Pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Paise,
    pub mode: PaymentMode,
    pub reference: String,
    pub paid_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    ReviseDraft(ReviseDraft),
    IssueInvoice(IssueInvoice),
    RecordPayment(RecordPayment),
    CancelInvoice(CancelInvoice),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: AggregateId,
    pub customer_name: String,
    pub customer_gstin: Option<String>,
    pub place_of_supply: Option<IndianState>,
    pub company_state: IndianState,
    pub supply_kind: SupplyKind,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub property_id: Option<AggregateId>,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DraftRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRevised {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub due_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceIssued. Carries what sales posting needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: AggregateId,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub payment: Payment,
    pub new_total_paid: Paise,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    DraftRevised(DraftRevised),
    InvoiceIssued(InvoiceIssued),
    PaymentRecorded(PaymentRecorded),
    InvoicePaid(InvoicePaid),
    InvoiceCancelled(InvoiceCancelled),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::DraftRevised(_) => "invoicing.invoice.draft_revised",
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRecorded(_) => "invoicing.invoice.payment_recorded",
            InvoiceEvent::InvoicePaid(_) => "invoicing.invoice.paid",
            InvoiceEvent::InvoiceCancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::DraftRevised(e) => e.occurred_at,
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(e) => e.occurred_at,
            InvoiceEvent::InvoicePaid(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.supply_kind = e.supply_kind;
                self.status = InvoiceStatus::Draft;
                self.invoice_date = Some(e.invoice_date);
                self.due_date = Some(e.due_date);
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.created = true;
            }
            InvoiceEvent::DraftRevised(e) => {
                self.due_date = Some(e.due_date);
                self.lines = e.lines.clone();
                self.totals = e.totals;
            }
            InvoiceEvent::InvoiceIssued(_) => {
                self.status = InvoiceStatus::Pending;
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.total_paid = e.new_total_paid;
            }
            InvoiceEvent::InvoicePaid(_) => {
                self.status = InvoiceStatus::Paid;
            }
            InvoiceEvent::InvoiceCancelled(_) => {
                self.status = InvoiceStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::ReviseDraft(cmd) => self.handle_revise(cmd),
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Invoice {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if cmd.customer_name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        if cmd.due_date < cmd.invoice_date {
            return Err(DomainError::validation("due date cannot precede the invoice date"));
        }
        let company_state = IndianState::parse(&cmd.company_state)
            .ok_or_else(|| DomainError::validation("company state cannot be empty"))?;
        let place_of_supply = cmd.place_of_supply.as_deref().and_then(IndianState::parse);
        let supply_kind = SupplyKind::between(&company_state, place_of_supply.as_ref());

        let (lines, totals) = compute_lines(&cmd.items, supply_kind)?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: cmd.number.trim().to_string(),
            customer_id: cmd.customer_id,
            customer_name: cmd.customer_name.trim().to_string(),
            customer_gstin: cmd.customer_gstin.clone(),
            place_of_supply,
            company_state,
            supply_kind,
            invoice_date: cmd.invoice_date,
            due_date: cmd.due_date,
            property_id: cmd.property_id,
            lines,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseDraft) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant("only draft invoices can be revised"));
        }

        let due_date = cmd.due_date.or(self.due_date).ok_or_else(|| {
            DomainError::invariant("draft invoice has no due date")
        })?;
        if self.invoice_date.is_some_and(|invoice_date| due_date < invoice_date) {
            return Err(DomainError::validation("due date cannot precede the invoice date"));
        }
        let (lines, totals) = compute_lines(&cmd.items, self.supply_kind)?;

        Ok(vec![InvoiceEvent::DraftRevised(DraftRevised {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            due_date,
            lines,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant("only draft invoices can be issued"));
        }
        let customer_id = self
            .customer_id
            .ok_or_else(|| DomainError::invariant("invoice has no customer"))?;

        let mut events = vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: self.number.clone(),
            customer_id,
            totals: self.totals,
            occurred_at: cmd.occurred_at,
        })];

        // Nothing to collect on a fully discounted invoice.
        if self.totals.grand_total == 0 {
            events.push(InvoiceEvent::InvoicePaid(InvoicePaid {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        if self.status != InvoiceStatus::Pending {
            return Err(DomainError::invariant(
                "payments can only be recorded against pending invoices",
            ));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if cmd.amount > self.outstanding() {
            return Err(DomainError::invariant("payment exceeds the outstanding amount"));
        }

        let new_total_paid = self.total_paid + cmd.amount;
        let mut events = vec![InvoiceEvent::PaymentRecorded(PaymentRecorded {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: self.number.clone(),
            payment: Payment {
                payment_no: self.payments.len() as u32 + 1,
                amount: cmd.amount,
                mode: cmd.mode,
                reference: cmd.reference.trim().to_string(),
                paid_on: cmd.paid_on,
            },
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })];

        if new_total_paid >= self.totals.grand_total {
            events.push(InvoiceEvent::InvoicePaid(InvoicePaid {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        match self.status {
            InvoiceStatus::Cancelled => {
                return Err(DomainError::conflict("invoice is already cancelled"));
            }
            InvoiceStatus::Paid => {
                return Err(DomainError::invariant("paid invoices cannot be cancelled"));
            }
            InvoiceStatus::Draft | InvoiceStatus::Pending => {}
        }
        if !self.payments.is_empty() {
            return Err(DomainError::invariant(
                "invoices with recorded payments cannot be cancelled",
            ));
        }

        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(price: Paise, rate: RateBps) -> InvoiceItem {
        InvoiceItem {
            description: "Flat 1204 booking".to_string(),
            hsn_sac: "995411".to_string(),
            quantity: 1,
            unit_price: price,
            discount: 0,
            gst_rate: rate,
        }
    }

    fn create(tenant_id: TenantId, invoice_id: InvoiceId, pos: Option<&str>) -> CreateInvoice {
        CreateInvoice {
            tenant_id,
            invoice_id,
            number: "INV/2026/001".to_string(),
            customer_id: AggregateId::new(),
            customer_name: "Asha Kulkarni".to_string(),
            customer_gstin: None,
            place_of_supply: pos.map(str::to_string),
            company_state: "Maharashtra".to_string(),
            invoice_date: date(2026, 4, 1),
            due_date: date(2026, 4, 30),
            property_id: None,
            items: vec![item(100_000, 1800)],
            occurred_at: Utc::now(),
        }
    }

    fn issued(pos: Option<&str>) -> (Invoice, TenantId, InvoiceId) {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut invoice = Invoice::empty(invoice_id);
        execute(&mut invoice, &InvoiceCommand::CreateInvoice(create(tenant_id, invoice_id, pos)))
            .unwrap();
        execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (invoice, tenant_id, invoice_id)
    }

    fn pay(tenant_id: TenantId, invoice_id: InvoiceId, amount: Paise) -> InvoiceCommand {
        InvoiceCommand::RecordPayment(RecordPayment {
            tenant_id,
            invoice_id,
            amount,
            mode: PaymentMode::Upi,
            reference: "UTR123".to_string(),
            paid_on: date(2026, 4, 10),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn intra_state_invoice_splits_cgst_and_sgst() {
        let (invoice, _, _) = issued(Some("maharashtra"));
        let totals = invoice.totals();
        assert_eq!(invoice.supply_kind(), SupplyKind::IntraState);
        assert_eq!(totals.taxable, 100_000);
        assert_eq!((totals.tax.cgst, totals.tax.sgst, totals.tax.igst), (9_000, 9_000, 0));
        assert_eq!(totals.grand_total, 118_000);
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
    }

    #[test]
    fn inter_state_invoice_charges_igst() {
        let (invoice, _, _) = issued(Some("29"));
        let totals = invoice.totals();
        assert_eq!(invoice.supply_kind(), SupplyKind::InterState);
        assert_eq!((totals.tax.cgst, totals.tax.sgst, totals.tax.igst), (0, 0, 18_000));
    }

    #[test]
    fn discount_reduces_taxable_value() {
        let mut it = item(10_000, 500);
        it.quantity = 3;
        it.discount = 5_000;
        let (lines, totals) = compute_lines(&[it], SupplyKind::InterState).unwrap();
        assert_eq!(lines[0].taxable, 25_000);
        assert_eq!(lines[0].tax.igst, 1_250);
        assert_eq!(totals.grand_total, 26_250);

        let mut bad = item(10_000, 500);
        bad.discount = 10_001;
        assert!(compute_lines(&[bad], SupplyKind::InterState).is_err());
        assert!(compute_lines(&[item(10_000, 1500)], SupplyKind::InterState).is_err());
    }

    #[test]
    fn partial_payment_keeps_invoice_pending_and_full_payment_marks_paid() {
        let (mut invoice, tenant_id, invoice_id) = issued(None);

        let events = execute(&mut invoice, &pay(tenant_id, invoice_id, 18_000)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
        assert_eq!(invoice.outstanding(), 100_000);

        let err = invoice.handle(&pay(tenant_id, invoice_id, 100_001)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let events = execute(&mut invoice, &pay(tenant_id, invoice_id, 100_000)).unwrap();
        assert!(matches!(events.last(), Some(InvoiceEvent::InvoicePaid(_))));
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payments().len(), 2);
    }

    #[test]
    fn draft_cannot_take_payments_and_can_be_revised() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create(tenant_id, invoice_id, Some("Goa"))),
        )
        .unwrap();

        assert!(invoice.handle(&pay(tenant_id, invoice_id, 1)).is_err());

        execute(
            &mut invoice,
            &InvoiceCommand::ReviseDraft(ReviseDraft {
                tenant_id,
                invoice_id,
                due_date: None,
                items: vec![item(50_000, 1200)],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(invoice.totals().tax.igst, 6_000);
        assert_eq!(invoice.due_date(), Some(date(2026, 4, 30)));
    }

    #[test]
    fn cannot_cancel_after_payment() {
        let (mut invoice, tenant_id, invoice_id) = issued(None);
        execute(&mut invoice, &pay(tenant_id, invoice_id, 1_000)).unwrap();

        let cancel = InvoiceCommand::CancelInvoice(CancelInvoice {
            tenant_id,
            invoice_id,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(invoice.handle(&cancel).is_err());
    }

    #[test]
    fn due_date_before_invoice_date_is_rejected() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut cmd = create(tenant_id, invoice_id, None);
        cmd.due_date = date(2026, 3, 1);
        let err = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::CreateInvoice(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn revised_due_date_cannot_precede_the_invoice_date() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create(tenant_id, invoice_id, None)),
        )
        .unwrap();

        let revise = |due_date| {
            InvoiceCommand::ReviseDraft(ReviseDraft {
                tenant_id,
                invoice_id,
                due_date: Some(due_date),
                items: vec![item(100_000, 1800)],
                occurred_at: Utc::now(),
            })
        };
        let err = invoice.handle(&revise(date(2026, 1, 1))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(invoice.due_date(), Some(date(2026, 4, 30)));

        execute(&mut invoice, &revise(date(2026, 4, 1))).unwrap();
        assert_eq!(invoice.invoice_date(), Some(date(2026, 4, 1)));
        assert_eq!(invoice.due_date(), Some(date(2026, 4, 1)));
    }

    #[test]
    fn fully_discounted_invoice_is_paid_on_issue() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut invoice = Invoice::empty(invoice_id);
        let mut cmd = create(tenant_id, invoice_id, None);
        let mut free = item(100_000, 1800);
        free.discount = 100_000;
        cmd.items = vec![free];
        execute(&mut invoice, &InvoiceCommand::CreateInvoice(cmd)).unwrap();
        assert_eq!(invoice.totals().grand_total, 0);

        let events = execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], InvoiceEvent::InvoicePaid(_)));
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.outstanding(), 0);
    }
}
