use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Paise, TenantId, define_aggregate_id,
};
use estateerp_events::Event;

use crate::voucher::VoucherEntry;

define_aggregate_id!(
    /// Chart of accounts identifier. One chart per tenant, see [`ChartId::for_tenant`].
    ChartId
);

impl ChartId {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::derived("chart", &tenant_id.to_string()))
    }
}

/// High-level account nature (determines the normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountNature {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountNature {
    pub fn normal_side(self) -> EntrySide {
        match self {
            AccountNature::Asset | AccountNature::Expense => EntrySide::Debit,
            AccountNature::Liability | AccountNature::Equity | AccountNature::Income => {
                EntrySide::Credit
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    /// Debit-positive signed amount.
    pub fn signed(self, amount: Paise) -> Paise {
        match self {
            EntrySide::Debit => amount,
            EntrySide::Credit => -amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub code: String,
    pub name: String,
    pub nature: AccountNature,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHead {
    pub code: String,
    pub name: String,
    pub group: String,
    pub nature: AccountNature,
    pub opening_balance: Paise,
    pub opening_side: EntrySide,
    pub active: bool,
}

/// Aggregate root: ChartOfAccounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartOfAccounts {
    id: ChartId,
    tenant_id: Option<TenantId>,
    groups: BTreeMap<String, AccountGroup>,
    heads: BTreeMap<String, AccountHead>,
    version: u64,
}

impl ChartOfAccounts {
    pub fn empty(id: ChartId) -> Self {
        Self {
            id,
            tenant_id: None,
            groups: BTreeMap::new(),
            heads: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn group(&self, code: &str) -> Option<&AccountGroup> {
        self.groups.get(code)
    }

    pub fn head(&self, code: &str) -> Option<&AccountHead> {
        self.heads.get(code)
    }

    pub fn heads(&self) -> impl Iterator<Item = &AccountHead> {
        self.heads.values()
    }

    /// Every entry must name an existing, active head.
    pub fn ensure_postable(&self, entries: &[VoucherEntry]) -> Result<(), DomainError> {
        for entry in entries {
            let code = entry.head_code.trim();
            match self.heads.get(code) {
                None => {
                    return Err(DomainError::validation(format!("unknown ledger head '{code}'")));
                }
                Some(head) if !head.active => {
                    return Err(DomainError::invariant(format!(
                        "ledger head '{code}' is inactive"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl AggregateRoot for ChartOfAccounts {
    type Id = ChartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub name: String,
    pub nature: AccountNature,
    pub parent: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHead {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub name: String,
    pub group: String,
    pub opening_balance: Paise,
    pub opening_side: Option<EntrySide>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameHead {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateHead {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Create whatever part of [`default_chart`] does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedDefaultChart {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartCommand {
    CreateGroup(CreateGroup),
    CreateHead(CreateHead),
    RenameHead(RenameHead),
    DeactivateHead(DeactivateHead),
    SeedDefaultChart(SeedDefaultChart),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub group: AccountGroup,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadCreated {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub head: AccountHead,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRenamed {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadDeactivated {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartEvent {
    GroupCreated(GroupCreated),
    HeadCreated(HeadCreated),
    HeadRenamed(HeadRenamed),
    HeadDeactivated(HeadDeactivated),
}

impl Event for ChartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChartEvent::GroupCreated(_) => "accounting.chart.group_created",
            ChartEvent::HeadCreated(_) => "accounting.chart.head_created",
            ChartEvent::HeadRenamed(_) => "accounting.chart.head_renamed",
            ChartEvent::HeadDeactivated(_) => "accounting.chart.head_deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ChartEvent::GroupCreated(e) => e.occurred_at,
            ChartEvent::HeadCreated(e) => e.occurred_at,
            ChartEvent::HeadRenamed(e) => e.occurred_at,
            ChartEvent::HeadDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ChartOfAccounts {
    type Command = ChartCommand;
    type Event = ChartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ChartEvent::GroupCreated(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.groups.insert(e.group.code.clone(), e.group.clone());
            }
            ChartEvent::HeadCreated(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.heads.insert(e.head.code.clone(), e.head.clone());
            }
            ChartEvent::HeadRenamed(e) => {
                if let Some(head) = self.heads.get_mut(&e.code) {
                    head.name = e.name.clone();
                }
            }
            ChartEvent::HeadDeactivated(e) => {
                if let Some(head) = self.heads.get_mut(&e.code) {
                    head.active = false;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ChartCommand::CreateGroup(cmd) => self.handle_create_group(cmd),
            ChartCommand::CreateHead(cmd) => self.handle_create_head(cmd),
            ChartCommand::RenameHead(cmd) => self.handle_rename(cmd),
            ChartCommand::DeactivateHead(cmd) => self.handle_deactivate(cmd),
            ChartCommand::SeedDefaultChart(cmd) => self.handle_seed(cmd),
        }
    }
}

fn normalize_code(code: &str) -> Result<String, DomainError> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(DomainError::validation("account code cannot be empty"));
    }
    Ok(code)
}

impl ChartOfAccounts {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn existing_head(&self, code: &str) -> Result<&AccountHead, DomainError> {
        let code = normalize_code(code)?;
        self.heads
            .get(&code)
            .ok_or_else(|| DomainError::validation(format!("unknown account head '{code}'")))
    }

    fn handle_create_group(&self, cmd: &CreateGroup) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        let code = normalize_code(&cmd.code)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("group name cannot be empty"));
        }
        if self.groups.contains_key(&code) {
            return Err(DomainError::conflict(format!("group '{code}' already exists")));
        }
        let parent = match cmd.parent.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => {
                let p = normalize_code(p)?;
                let parent = self
                    .groups
                    .get(&p)
                    .ok_or_else(|| DomainError::validation(format!("unknown parent group '{p}'")))?;
                if parent.nature != cmd.nature {
                    return Err(DomainError::validation(
                        "a group must share its parent's nature",
                    ));
                }
                Some(p)
            }
            None => None,
        };

        Ok(vec![ChartEvent::GroupCreated(GroupCreated {
            tenant_id: cmd.tenant_id,
            chart_id: cmd.chart_id,
            group: AccountGroup {
                code,
                name: cmd.name.trim().to_string(),
                nature: cmd.nature,
                parent,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_create_head(&self, cmd: &CreateHead) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        let code = normalize_code(&cmd.code)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("head name cannot be empty"));
        }
        if self.heads.contains_key(&code) {
            return Err(DomainError::conflict(format!("account head '{code}' already exists")));
        }
        if cmd.opening_balance < 0 {
            return Err(DomainError::validation(
                "opening balance cannot be negative (use the opening side)",
            ));
        }
        let group_code = normalize_code(&cmd.group)?;
        let group = self
            .groups
            .get(&group_code)
            .ok_or_else(|| DomainError::validation(format!("unknown group '{group_code}'")))?;

        Ok(vec![ChartEvent::HeadCreated(HeadCreated {
            tenant_id: cmd.tenant_id,
            chart_id: cmd.chart_id,
            head: AccountHead {
                code,
                name: cmd.name.trim().to_string(),
                group: group_code,
                nature: group.nature,
                opening_balance: cmd.opening_balance,
                opening_side: cmd.opening_side.unwrap_or(group.nature.normal_side()),
                active: true,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameHead) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        let head = self.existing_head(&cmd.code)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("head name cannot be empty"));
        }
        Ok(vec![ChartEvent::HeadRenamed(HeadRenamed {
            tenant_id: cmd.tenant_id,
            chart_id: cmd.chart_id,
            code: head.code.clone(),
            name: cmd.name.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateHead) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        let head = self.existing_head(&cmd.code)?;
        if !head.active {
            return Err(DomainError::conflict(format!(
                "account head '{}' is already inactive",
                head.code
            )));
        }
        Ok(vec![ChartEvent::HeadDeactivated(HeadDeactivated {
            tenant_id: cmd.tenant_id,
            chart_id: cmd.chart_id,
            code: head.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_seed(&self, cmd: &SeedDefaultChart) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        let (groups, heads) = default_chart();
        let mut events = Vec::new();

        for group in groups {
            if !self.groups.contains_key(&group.code) {
                events.push(ChartEvent::GroupCreated(GroupCreated {
                    tenant_id: cmd.tenant_id,
                    chart_id: cmd.chart_id,
                    group,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }
        for head in heads {
            if !self.heads.contains_key(&head.code) {
                events.push(ChartEvent::HeadCreated(HeadCreated {
                    tenant_id: cmd.tenant_id,
                    chart_id: cmd.chart_id,
                    head,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }

        Ok(events)
    }
}

/// The seeded chart: the groups and heads automatic posting relies on.
pub fn default_chart() -> (Vec<AccountGroup>, Vec<AccountHead>) {
    use AccountNature::*;

    let group = |code: &str, name: &str, nature, parent: Option<&str>| AccountGroup {
        code: code.to_string(),
        name: name.to_string(),
        nature,
        parent: parent.map(str::to_string),
    };
    let groups = vec![
        group("CA", "Current Assets", Asset, None),
        group("CASH", "Cash-in-Hand", Asset, Some("CA")),
        group("BANK", "Bank Accounts", Asset, Some("CA")),
        group("DEBTORS", "Sundry Debtors", Asset, Some("CA")),
        group("STOCK", "Stock-in-Hand", Asset, Some("CA")),
        group("FA", "Fixed Assets", Asset, None),
        group("CL", "Current Liabilities", Liability, None),
        group("DUTIES", "Duties and Taxes", Liability, Some("CL")),
        group("PAYABLES", "Sundry Creditors and Payables", Liability, Some("CL")),
        group("ADVANCES", "Advances from Customers", Liability, Some("CL")),
        group("CAPITAL", "Capital Account", Equity, None),
        group("SALES", "Sales Accounts", Income, None),
        group("OTHER_INCOME", "Indirect Income", Income, None),
        group("DIRECT_EXP", "Direct Expenses", Expense, None),
        group("INDIRECT_EXP", "Indirect Expenses", Expense, None),
    ];

    let nature_of = |g: &str| {
        groups
            .iter()
            .find(|x| x.code == g)
            .map(|x| x.nature)
            .unwrap_or(Asset)
    };
    let heads = [
        ("1001", "Cash", "CASH"),
        ("1101", "Bank Account", "BANK"),
        ("1201", "Sundry Debtors", "DEBTORS"),
        ("1301", "Stock in Hand", "STOCK"),
        ("2101", "Output CGST", "DUTIES"),
        ("2102", "Output SGST", "DUTIES"),
        ("2103", "Output IGST", "DUTIES"),
        ("2201", "Salary Payable", "PAYABLES"),
        ("2202", "PF Payable", "DUTIES"),
        ("2203", "ESI Payable", "DUTIES"),
        ("2204", "Professional Tax Payable", "DUTIES"),
        ("2301", "Booking Advances", "ADVANCES"),
        ("3001", "Capital", "CAPITAL"),
        ("4001", "Property Sales", "SALES"),
        ("4101", "Interest Income", "OTHER_INCOME"),
        ("5001", "Construction Materials", "DIRECT_EXP"),
        ("6001", "Salaries and Wages", "INDIRECT_EXP"),
        ("6101", "Bank Charges", "INDIRECT_EXP"),
    ]
    .into_iter()
    .map(|(code, name, g)| {
        let nature = nature_of(g);
        AccountHead {
            code: code.to_string(),
            name: name.to_string(),
            group: g.to_string(),
            nature,
            opening_balance: 0,
            opening_side: nature.normal_side(),
            active: true,
        }
    })
    .collect();

    (groups, heads)
}
