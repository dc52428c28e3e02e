use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_core::{Paise, TenantId};
use estateerp_crm::{CustomerEvent, CustomerId, FollowUp, LeadEvent, LeadId, LeadStatus};
use estateerp_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CustomersProjection<S = InMemoryTenantStore<CustomerId, CustomerReadModel>>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl CustomersProjection {
    pub fn new() -> Self {
        Self::with_store(InMemoryTenantStore::new())
    }
}

impl<S> CustomersProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(tenant_id, customer_id)
    }

    /// All customers, by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<CustomerReadModel> {
        let mut out = self.store.list(tenant_id);
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.customer_id.cmp(&b.customer_id)));
        out
    }
}

impl<S> Projection for CustomersProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    fn name(&self) -> &'static str {
        "crm.customers"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::CUSTOMER || !self.cursors.admit(envelope)? {
            return Ok(());
        }
        let ev: CustomerEvent = decode(envelope)?;
        let tenant_id = envelope.tenant_id();

        match ev {
            CustomerEvent::CustomerRegistered(e) => {
                ensure_scope(envelope, e.tenant_id, e.customer_id.0)?;
                let p = e.profile;
                self.store.upsert(
                    tenant_id,
                    e.customer_id,
                    CustomerReadModel {
                        customer_id: e.customer_id,
                        name: p.name,
                        email: p.email,
                        phone: p.phone,
                        gstin: p.gstin,
                        address: p.address,
                        state: p.state.map(|s| s.name().to_string()),
                        active: true,
                        registered_at: e.occurred_at,
                    },
                );
            }
            CustomerEvent::CustomerUpdated(e) => {
                ensure_scope(envelope, e.tenant_id, e.customer_id.0)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    let p = e.profile;
                    rm.name = p.name;
                    rm.email = p.email;
                    rm.phone = p.phone;
                    rm.gstin = p.gstin;
                    rm.address = p.address;
                    rm.state = p.state.map(|s| s.name().to_string());
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::CustomerDeactivated(e) => {
                ensure_scope(envelope, e.tenant_id, e.customer_id.0)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.active = false;
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadReadModel {
    pub lead_id: LeadId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub interest: Option<String>,
    pub budget: Option<Paise>,
    pub status: LeadStatus,
    pub agent: Option<String>,
    pub follow_ups: Vec<FollowUp>,
    pub next_follow_up: Option<NaiveDate>,
    pub customer_id: Option<CustomerId>,
    pub captured_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LeadsProjection<S = InMemoryTenantStore<LeadId, LeadReadModel>>
where
    S: TenantStore<LeadId, LeadReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl LeadsProjection {
    pub fn new() -> Self {
        Self::with_store(InMemoryTenantStore::new())
    }
}

impl<S> LeadsProjection<S>
where
    S: TenantStore<LeadId, LeadReadModel>,
{
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, lead_id: &LeadId) -> Option<LeadReadModel> {
        self.store.get(tenant_id, lead_id)
    }

    /// Leads in capture order, optionally filtered by stage.
    pub fn list(&self, tenant_id: TenantId, status: Option<LeadStatus>) -> Vec<LeadReadModel> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| status.is_none_or(|s| l.status == s))
            .collect();
        out.sort_by(|a, b| a.captured_at.cmp(&b.captured_at).then(a.lead_id.cmp(&b.lead_id)));
        out
    }

    /// Open leads whose next follow-up is due on or before `on`.
    pub fn due_follow_ups(&self, tenant_id: TenantId, on: NaiveDate) -> Vec<LeadReadModel> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| !matches!(l.status, LeadStatus::Won | LeadStatus::Lost))
            .filter(|l| l.next_follow_up.is_some_and(|d| d <= on))
            .collect();
        out.sort_by_key(|l| (l.next_follow_up, l.lead_id));
        out
    }

    fn modify(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut LeadReadModel),
    ) {
        if let Some(mut rm) = self.store.get(tenant_id, &lead_id) {
            f(&mut rm);
            rm.updated_at = at;
            self.store.upsert(tenant_id, lead_id, rm);
        }
    }
}

impl<S> Projection for LeadsProjection<S>
where
    S: TenantStore<LeadId, LeadReadModel>,
{
    fn name(&self) -> &'static str {
        "crm.leads"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::LEAD || !self.cursors.admit(envelope)? {
            return Ok(());
        }
        let ev: LeadEvent = decode(envelope)?;
        let tenant_id = envelope.tenant_id();

        match ev {
            LeadEvent::LeadCaptured(e) => {
                ensure_scope(envelope, e.tenant_id, e.lead_id.0)?;
                self.store.upsert(
                    tenant_id,
                    e.lead_id,
                    LeadReadModel {
                        lead_id: e.lead_id,
                        name: e.name,
                        phone: e.phone,
                        email: e.email,
                        source: e.source,
                        interest: e.interest,
                        budget: e.budget,
                        status: e.status,
                        agent: None,
                        follow_ups: vec![],
                        next_follow_up: None,
                        customer_id: None,
                        captured_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            LeadEvent::LeadAssigned(e) => {
                ensure_scope(envelope, e.tenant_id, e.lead_id.0)?;
                self.modify(tenant_id, e.lead_id, e.occurred_at, |rm| rm.agent = Some(e.agent));
            }
            LeadEvent::LeadStatusChanged(e) => {
                ensure_scope(envelope, e.tenant_id, e.lead_id.0)?;
                self.modify(tenant_id, e.lead_id, e.occurred_at, |rm| rm.status = e.to);
            }
            LeadEvent::FollowUpAdded(e) => {
                ensure_scope(envelope, e.tenant_id, e.lead_id.0)?;
                self.modify(tenant_id, e.lead_id, e.occurred_at, |rm| {
                    rm.next_follow_up = e.follow_up.next_follow_up;
                    rm.follow_ups.push(e.follow_up);
                });
            }
            LeadEvent::LeadConverted(e) => {
                ensure_scope(envelope, e.tenant_id, e.lead_id.0)?;
                self.modify(tenant_id, e.lead_id, e.occurred_at, |rm| {
                    rm.status = LeadStatus::Won;
                    rm.customer_id = Some(e.customer_id);
                    rm.next_follow_up = None;
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
