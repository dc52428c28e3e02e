//! Projections: event consumers that build tenant-isolated read models.
//!
//! Every projection is rebuildable from the event store and idempotent under
//! at-least-once delivery (per-stream cursors, see [`StreamCursors`]).

pub mod accounting;
pub mod banking;
pub mod crm;
pub mod cursor;
pub mod hr;
pub mod inventory;
pub mod invoices;
pub mod manufacturing;
pub mod property;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use estateerp_core::{AggregateId, TenantId};
use estateerp_events::EventEnvelope;

use crate::event_store::StoredEvent;
use crate::numbering::NumberSeries;

pub use accounting::{
    AccountBalance, AccountingProjection, LedgerLine, LedgerStatement, TrialBalance,
    VoucherReadModel,
};
pub use banking::{BankAccountReadModel, BankAccountsProjection};
pub use crm::{CustomerReadModel, CustomersProjection, LeadReadModel, LeadsProjection};
pub use cursor::StreamCursors;
pub use hr::{DepartmentReadModel, EmployeeReadModel, HrProjection, PayslipReadModel};
pub use inventory::{ItemReadModel, StockLevel, StockProjection};
pub use invoices::{InvoiceReadModel, InvoicesProjection};
pub use manufacturing::{BomReadModel, ManufacturingProjection, ProductionOrderReadModel};
pub use property::{ProjectReadModel, PropertiesProjection, PropertyReadModel};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// A read-model builder fed from the bus or from a replay.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop the tenant's records and cursors.
    fn clear_tenant(&self, tenant_id: TenantId);
}

pub(crate) fn decode<E: DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone())
        .map_err(|e| ProjectionError::Deserialize(e.to_string()))
}

/// The payload must belong to the stream it arrived on.
pub(crate) fn ensure_scope(
    envelope: &EventEnvelope<JsonValue>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(), ProjectionError> {
    if tenant_id != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    if aggregate_id != envelope.aggregate_id() {
        return Err(ProjectionError::TenantIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}

/// Every read model of the application, fed as one unit.
#[derive(Debug)]
pub struct ReadModels {
    pub customers: Arc<CustomersProjection>,
    pub leads: Arc<LeadsProjection>,
    pub properties: Arc<PropertiesProjection>,
    pub invoices: Arc<InvoicesProjection>,
    pub accounting: Arc<AccountingProjection>,
    pub stock: Arc<StockProjection>,
    pub manufacturing: Arc<ManufacturingProjection>,
    pub banking: Arc<BankAccountsProjection>,
    pub hr: Arc<HrProjection>,
}

impl ReadModels {
    pub fn new(numbers: Arc<NumberSeries>) -> Self {
        Self {
            customers: Arc::new(CustomersProjection::new()),
            leads: Arc::new(LeadsProjection::new()),
            properties: Arc::new(PropertiesProjection::new()),
            invoices: Arc::new(InvoicesProjection::new(numbers.clone())),
            accounting: Arc::new(AccountingProjection::new(numbers)),
            stock: Arc::new(StockProjection::new()),
            manufacturing: Arc::new(ManufacturingProjection::new()),
            banking: Arc::new(BankAccountsProjection::new()),
            hr: Arc::new(HrProjection::new()),
        }
    }

    fn all(&self) -> [&dyn Projection; 9] {
        [
            &*self.customers,
            &*self.leads,
            &*self.properties,
            &*self.invoices,
            &*self.accounting,
            &*self.stock,
            &*self.manufacturing,
            &*self.banking,
            &*self.hr,
        ]
    }

    /// Feed one envelope to every projection. Failures are logged, not fatal.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) {
        for projection in self.all() {
            if let Err(err) = projection.apply_envelope(envelope) {
                warn!(
                    projection = projection.name(),
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    sequence_number = envelope.sequence_number(),
                    error = %err,
                    "projection failed to apply event"
                );
            }
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        for projection in self.all() {
            projection.clear_tenant(tenant_id);
        }
    }

    /// Clear the tenants present in `events`, then replay them in commit order.
    pub fn rebuild(&self, events: &[StoredEvent]) {
        let mut tenants: Vec<TenantId> = events.iter().map(|e| e.tenant_id).collect();
        tenants.sort_by_key(|t| *t.as_uuid());
        tenants.dedup();
        for tenant_id in tenants {
            self.clear_tenant(tenant_id);
        }
        for stored in events {
            self.apply(&stored.to_envelope());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::r#trait::EventStore;
    use chrono::Utc;

    use estateerp_crm::{CaptureLead, ChangeLeadStatus, Lead, LeadCommand, LeadId, LeadStatus};
    use estateerp_events::EventBus;

    use crate::streams;
    use crate::workflows::testing::dispatcher;

    #[test]
    fn committed_events_reach_the_read_models_through_the_bus() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let models = ReadModels::new(Arc::new(NumberSeries::new()));
        let t = TenantId::new();
        let id = LeadId::generate();
        let make = |_: TenantId, a| Lead::empty(LeadId::new(a));

        d.dispatch::<Lead>(
            t,
            id.0,
            streams::LEAD,
            LeadCommand::CaptureLead(CaptureLead {
                tenant_id: t,
                lead_id: id,
                name: "Kavita Rao".to_string(),
                phone: Some("9833012345".to_string()),
                email: None,
                source: Some("hoarding".to_string()),
                interest: None,
                budget: None,
                status: None,
                occurred_at: Utc::now(),
            }),
            make,
        )
        .unwrap();
        d.dispatch::<Lead>(
            t,
            id.0,
            streams::LEAD,
            LeadCommand::ChangeLeadStatus(ChangeLeadStatus {
                tenant_id: t,
                lead_id: id,
                status: LeadStatus::Contacted,
                note: Some("called back, wants a site visit".to_string()),
                occurred_at: Utc::now(),
            }),
            make,
        )
        .unwrap();

        while let Ok(envelope) = sub.try_recv() {
            models.apply(&envelope);
        }

        let lead = models.leads.get(t, &id).unwrap();
        assert_eq!(lead.status, LeadStatus::Contacted);
        assert!(models.leads.get(TenantId::new(), &id).is_none());

        // replaying the same events again changes nothing
        models.rebuild(&d.store().load_all().unwrap());
        assert_eq!(models.leads.list(t, None).len(), 1);
    }
}
