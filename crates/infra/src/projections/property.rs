use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_core::{Paise, TenantId};
use estateerp_crm::CustomerId;
use estateerp_events::EventEnvelope;
use estateerp_property::{
    ProjectEvent, ProjectId, ProjectPhase, PropertyEvent, PropertyId, PropertyKind, PropertyStatus,
};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReadModel {
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub location: String,
    pub state: String,
    pub launch_date: Option<NaiveDate>,
    pub phase: ProjectPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyReadModel {
    pub property_id: PropertyId,
    pub project_id: ProjectId,
    pub unit_no: String,
    pub kind: PropertyKind,
    pub floor: Option<i32>,
    pub area_sqft: u32,
    pub rate_per_sqft: Paise,
    pub list_price: Paise,
    pub status: PropertyStatus,
    pub customer_id: Option<CustomerId>,
    pub agreed_price: Option<Paise>,
    pub booking_amount: Option<Paise>,
    pub booked_on: Option<NaiveDate>,
    pub registered_on: Option<NaiveDate>,
    pub registration_no: Option<String>,
}

/// Unit counts of one project by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub available: usize,
    pub blocked: usize,
    pub booked: usize,
    pub sold: usize,
    pub sold_value: Paise,
}

/// Projects and their units.
#[derive(Debug, Default)]
pub struct PropertiesProjection {
    projects: InMemoryTenantStore<ProjectId, ProjectReadModel>,
    units: InMemoryTenantStore<PropertyId, PropertyReadModel>,
    cursors: StreamCursors,
}

impl PropertiesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(&self, tenant_id: TenantId, project_id: &ProjectId) -> Option<ProjectReadModel> {
        self.projects.get(tenant_id, project_id)
    }

    pub fn projects(&self, tenant_id: TenantId) -> Vec<ProjectReadModel> {
        let mut out = self.projects.list(tenant_id);
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn unit(&self, tenant_id: TenantId, property_id: &PropertyId) -> Option<PropertyReadModel> {
        self.units.get(tenant_id, property_id)
    }

    /// Units ordered by unit number, optionally narrowed to a project and status.
    pub fn units(
        &self,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        status: Option<PropertyStatus>,
    ) -> Vec<PropertyReadModel> {
        let mut out: Vec<_> = self
            .units
            .list(tenant_id)
            .into_iter()
            .filter(|u| project_id.is_none_or(|p| u.project_id == p))
            .filter(|u| status.is_none_or(|s| u.status == s))
            .collect();
        out.sort_by(|a, b| a.unit_no.cmp(&b.unit_no));
        out
    }

    pub fn summary(&self, tenant_id: TenantId, project_id: ProjectId) -> InventorySummary {
        let mut summary = InventorySummary::default();
        for unit in self.units(tenant_id, Some(project_id), None) {
            match unit.status {
                PropertyStatus::Available => summary.available += 1,
                PropertyStatus::Blocked => summary.blocked += 1,
                PropertyStatus::Booked => summary.booked += 1,
                PropertyStatus::Sold => {
                    summary.sold += 1;
                    summary.sold_value += unit.agreed_price.unwrap_or(unit.list_price);
                }
            }
        }
        summary
    }

    fn apply_project(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<ProjectEvent>(envelope)? {
            ProjectEvent::ProjectCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.project_id.0)?;
                self.projects.upsert(
                    tenant_id,
                    e.project_id,
                    ProjectReadModel {
                        project_id: e.project_id,
                        code: e.code,
                        name: e.name,
                        location: e.location,
                        state: e.state.name().to_string(),
                        launch_date: e.launch_date,
                        phase: ProjectPhase::Planning,
                    },
                );
            }
            ProjectEvent::ProjectPhaseChanged(e) => {
                ensure_scope(envelope, e.tenant_id, e.project_id.0)?;
                self.projects.update(tenant_id, e.project_id, |slot| {
                    if let Some(p) = slot {
                        p.phase = e.to;
                    }
                });
            }
        }
        Ok(())
    }

    fn apply_unit(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let ev: PropertyEvent = decode(envelope)?;
        if let PropertyEvent::PropertyListed(e) = ev {
            ensure_scope(envelope, e.tenant_id, e.property_id.0)?;
            self.units.upsert(
                tenant_id,
                e.property_id,
                PropertyReadModel {
                    property_id: e.property_id,
                    project_id: e.project_id,
                    unit_no: e.unit_no,
                    kind: e.kind,
                    floor: e.floor,
                    area_sqft: e.area_sqft,
                    rate_per_sqft: e.rate_per_sqft,
                    list_price: e.list_price,
                    status: PropertyStatus::Available,
                    customer_id: None,
                    agreed_price: None,
                    booking_amount: None,
                    booked_on: None,
                    registered_on: None,
                    registration_no: None,
                },
            );
            return Ok(());
        }

        let (event_tenant, property_id) = match &ev {
            PropertyEvent::PropertyListed(e) => (e.tenant_id, e.property_id),
            PropertyEvent::PropertyHeld(e) => (e.tenant_id, e.property_id),
            PropertyEvent::PropertyReleased(e) => (e.tenant_id, e.property_id),
            PropertyEvent::PropertyBooked(e) => (e.tenant_id, e.property_id),
            PropertyEvent::BookingCancelled(e) => (e.tenant_id, e.property_id),
            PropertyEvent::PropertySold(e) => (e.tenant_id, e.property_id),
        };
        ensure_scope(envelope, event_tenant, property_id.0)?;

        self.units.update(tenant_id, property_id, |slot| {
            let Some(unit) = slot else {
                return;
            };
            match ev {
                PropertyEvent::PropertyListed(_) => {}
                PropertyEvent::PropertyHeld(_) => unit.status = PropertyStatus::Blocked,
                PropertyEvent::PropertyReleased(_) => unit.status = PropertyStatus::Available,
                PropertyEvent::PropertyBooked(e) => {
                    unit.status = PropertyStatus::Booked;
                    unit.customer_id = Some(e.customer_id);
                    unit.agreed_price = Some(e.agreed_price);
                    unit.booking_amount = Some(e.booking_amount);
                    unit.booked_on = Some(e.booked_on);
                }
                PropertyEvent::BookingCancelled(_) => {
                    unit.status = PropertyStatus::Available;
                    unit.customer_id = None;
                    unit.agreed_price = None;
                    unit.booking_amount = None;
                    unit.booked_on = None;
                }
                PropertyEvent::PropertySold(e) => {
                    unit.status = PropertyStatus::Sold;
                    unit.agreed_price = Some(e.sale_price);
                    unit.registered_on = Some(e.registered_on);
                    unit.registration_no = e.registration_no;
                }
            }
        });
        Ok(())
    }
}

impl Projection for PropertiesProjection {
    fn name(&self) -> &'static str {
        "property.inventory"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let project = envelope.aggregate_type() == streams::PROJECT;
        if !(project || envelope.aggregate_type() == streams::PROPERTY) {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }
        if project {
            self.apply_project(envelope)?;
        } else {
            self.apply_unit(envelope)?;
        }
        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.projects.clear_tenant(tenant_id);
        self.units.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
