use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, define_aggregate_id};
use estateerp_events::Event;
use estateerp_invoicing::{IndianState, validate_gstin};

use crate::contact::{normalize_email, normalize_phone};

define_aggregate_id!(
    /// Customer identifier.
    CustomerId
);

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    tenant_id: Option<TenantId>,
    name: String,
    email: Option<String>,
    gstin: Option<String>,
    state: Option<IndianState>,
    active: bool,
    version: u64,
    created: bool,
}

impl Customer {
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            email: None,
            gstin: None,
            state: None,
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn gstin(&self) -> Option<&str> {
        self.gstin.as_deref()
    }

    /// Place of supply used on invoices.
    pub fn state(&self) -> Option<&IndianState> {
        self.state.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Contact and tax details shared by register and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    /// Explicit state; derived from the GSTIN when absent.
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub details: CustomerDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub details: CustomerDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateCustomer(UpdateCustomer),
    DeactivateCustomer(DeactivateCustomer),
}

/// Normalised customer profile as stored in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<IndianState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub profile: CustomerProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub profile: CustomerProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDeactivated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    CustomerUpdated(CustomerUpdated),
    CustomerDeactivated(CustomerDeactivated),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "crm.customer.registered",
            CustomerEvent::CustomerUpdated(_) => "crm.customer.updated",
            CustomerEvent::CustomerDeactivated(_) => "crm.customer.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::CustomerUpdated(e) => e.occurred_at,
            CustomerEvent::CustomerDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.tenant_id = Some(e.tenant_id);
                self.set_profile(&e.profile);
                self.active = true;
                self.created = true;
            }
            CustomerEvent::CustomerUpdated(e) => self.set_profile(&e.profile),
            CustomerEvent::CustomerDeactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateCustomer(cmd) => self.handle_update(cmd),
            CustomerCommand::DeactivateCustomer(cmd) => self.handle_deactivate(cmd),
        }
    }
}

/// Validate details; the state comes from the explicit field, else the GSTIN.
fn build_profile(details: &CustomerDetails) -> Result<CustomerProfile, DomainError> {
    let name = details.name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("customer name cannot be empty"));
    }
    let gstin = details
        .gstin
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(validate_gstin)
        .transpose()?;
    let state = details
        .state
        .as_deref()
        .and_then(IndianState::parse)
        .or_else(|| gstin.as_deref().and_then(IndianState::parse));

    Ok(CustomerProfile {
        name: name.to_string(),
        email: normalize_email(details.email.as_deref())?,
        phone: normalize_phone(details.phone.as_deref())?,
        gstin,
        address: details
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        state,
    })
}

impl Customer {
    fn set_profile(&mut self, profile: &CustomerProfile) {
        self.name = profile.name.clone();
        self.email = profile.email.clone();
        self.gstin = profile.gstin.clone();
        self.state = profile.state.clone();
    }

    fn ensure_existing(&self, tenant_id: TenantId, customer_id: CustomerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            profile: build_profile(&cmd.details)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.customer_id)?;
        if !self.active {
            return Err(DomainError::invariant("inactive customers cannot be updated"));
        }
        Ok(vec![CustomerEvent::CustomerUpdated(CustomerUpdated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            profile: build_profile(&cmd.details)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.customer_id)?;
        if !self.active {
            return Err(DomainError::conflict("customer is already inactive"));
        }
        Ok(vec![CustomerEvent::CustomerDeactivated(CustomerDeactivated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
