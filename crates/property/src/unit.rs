use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, Paise, TenantId, define_aggregate_id};
use estateerp_crm::CustomerId;
use estateerp_events::Event;

use crate::project::ProjectId;

define_aggregate_id!(
    /// Property (sellable unit) identifier.
    PropertyId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Apartment,
    Villa,
    Plot,
    Shop,
    Office,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Available,
    Blocked,
    Booked,
    Sold,
}

/// `area × rate`, checked.
pub fn list_price(area_sqft: u32, rate_per_sqft: Paise) -> Result<Paise, DomainError> {
    (area_sqft as i64)
        .checked_mul(rate_per_sqft)
        .ok_or_else(|| DomainError::invariant("list price overflow"))
}

/// Aggregate root: Property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    id: PropertyId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    unit_no: String,
    status: PropertyStatus,
    list_price: Paise,
    customer_id: Option<CustomerId>,
    agreed_price: Paise,
    version: u64,
    created: bool,
}

impl Property {
    pub fn empty(id: PropertyId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            unit_no: String::new(),
            status: PropertyStatus::Available,
            list_price: 0,
            customer_id: None,
            agreed_price: 0,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn unit_no(&self) -> &str {
        &self.unit_no
    }

    pub fn status(&self) -> PropertyStatus {
        self.status
    }

    pub fn list_price(&self) -> Paise {
        self.list_price
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn agreed_price(&self) -> Paise {
        self.agreed_price
    }
}

impl AggregateRoot for Property {
    type Id = PropertyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListProperty {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub project_id: ProjectId,
    pub unit_no: String,
    pub kind: PropertyKind,
    pub floor: Option<i32>,
    pub area_sqft: u32,
    pub rate_per_sqft: Paise,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldProperty {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseProperty {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookProperty {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub customer_id: CustomerId,
    pub agreed_price: Paise,
    pub booking_amount: Paise,
    pub booked_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBooking {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSale {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub registered_on: NaiveDate,
    pub registration_no: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCommand {
    ListProperty(ListProperty),
    HoldProperty(HoldProperty),
    ReleaseProperty(ReleaseProperty),
    BookProperty(BookProperty),
    CancelBooking(CancelBooking),
    RegisterSale(RegisterSale),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyListed {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub project_id: ProjectId,
    pub unit_no: String,
    pub kind: PropertyKind,
    pub floor: Option<i32>,
    pub area_sqft: u32,
    pub rate_per_sqft: Paise,
    pub list_price: Paise,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyHeld {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyReleased {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBooked {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub customer_id: CustomerId,
    pub agreed_price: Paise,
    pub booking_amount: Paise,
    pub booked_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCancelled {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub customer_id: Option<CustomerId>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySold {
    pub tenant_id: TenantId,
    pub property_id: PropertyId,
    pub customer_id: Option<CustomerId>,
    pub sale_price: Paise,
    pub registered_on: NaiveDate,
    pub registration_no: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyEvent {
    PropertyListed(PropertyListed),
    PropertyHeld(PropertyHeld),
    PropertyReleased(PropertyReleased),
    PropertyBooked(PropertyBooked),
    BookingCancelled(BookingCancelled),
    PropertySold(PropertySold),
}

impl Event for PropertyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PropertyEvent::PropertyListed(_) => "property.unit.listed",
            PropertyEvent::PropertyHeld(_) => "property.unit.held",
            PropertyEvent::PropertyReleased(_) => "property.unit.released",
            PropertyEvent::PropertyBooked(_) => "property.unit.booked",
            PropertyEvent::BookingCancelled(_) => "property.unit.booking_cancelled",
            PropertyEvent::PropertySold(_) => "property.unit.sold",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PropertyEvent::PropertyListed(e) => e.occurred_at,
            PropertyEvent::PropertyHeld(e) => e.occurred_at,
            PropertyEvent::PropertyReleased(e) => e.occurred_at,
            PropertyEvent::PropertyBooked(e) => e.occurred_at,
            PropertyEvent::BookingCancelled(e) => e.occurred_at,
            PropertyEvent::PropertySold(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Property {
    type Command = PropertyCommand;
    type Event = PropertyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PropertyEvent::PropertyListed(e) => {
                self.id = e.property_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.unit_no = e.unit_no.clone();
                self.list_price = e.list_price;
                self.status = PropertyStatus::Available;
                self.created = true;
            }
            PropertyEvent::PropertyHeld(_) => {
                self.status = PropertyStatus::Blocked;
            }
            PropertyEvent::PropertyReleased(_) => {
                self.status = PropertyStatus::Available;
            }
            PropertyEvent::PropertyBooked(e) => {
                self.status = PropertyStatus::Booked;
                self.customer_id = Some(e.customer_id);
                self.agreed_price = e.agreed_price;
            }
            PropertyEvent::BookingCancelled(_) => {
                self.status = PropertyStatus::Available;
                self.customer_id = None;
                self.agreed_price = 0;
            }
            PropertyEvent::PropertySold(_) => {
                self.status = PropertyStatus::Sold;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PropertyCommand::ListProperty(cmd) => self.handle_list(cmd),
            PropertyCommand::HoldProperty(cmd) => self.handle_hold(cmd),
            PropertyCommand::ReleaseProperty(cmd) => self.handle_release(cmd),
            PropertyCommand::BookProperty(cmd) => self.handle_book(cmd),
            PropertyCommand::CancelBooking(cmd) => self.handle_cancel_booking(cmd),
            PropertyCommand::RegisterSale(cmd) => self.handle_sale(cmd),
        }
    }
}

impl Property {
    fn ensure_existing(&self, tenant_id: TenantId, property_id: PropertyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != property_id {
            return Err(DomainError::invariant("property_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[PropertyStatus], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "cannot {action} a unit that is {:?}",
                self.status
            )))
        }
    }

    fn handle_list(&self, cmd: &ListProperty) -> Result<Vec<PropertyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("property already listed"));
        }
        let unit_no = cmd.unit_no.trim().to_ascii_uppercase();
        if unit_no.is_empty() {
            return Err(DomainError::validation("unit number cannot be empty"));
        }
        if cmd.area_sqft == 0 {
            return Err(DomainError::validation("area must be positive"));
        }
        if cmd.rate_per_sqft <= 0 {
            return Err(DomainError::validation("rate per sq.ft must be positive"));
        }

        Ok(vec![PropertyEvent::PropertyListed(PropertyListed {
            tenant_id: cmd.tenant_id,
            property_id: cmd.property_id,
            project_id: cmd.project_id,
            unit_no,
            kind: cmd.kind,
            floor: cmd.floor,
            area_sqft: cmd.area_sqft,
            rate_per_sqft: cmd.rate_per_sqft,
            list_price: list_price(cmd.area_sqft, cmd.rate_per_sqft)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_hold(&self, cmd: &HoldProperty) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.property_id)?;
        self.ensure_status(&[PropertyStatus::Available], "hold")?;
        Ok(vec![PropertyEvent::PropertyHeld(PropertyHeld {
            tenant_id: cmd.tenant_id,
            property_id: cmd.property_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseProperty) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.property_id)?;
        self.ensure_status(&[PropertyStatus::Blocked], "release")?;
        Ok(vec![PropertyEvent::PropertyReleased(PropertyReleased {
            tenant_id: cmd.tenant_id,
            property_id: cmd.property_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_book(&self, cmd: &BookProperty) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.property_id)?;
        self.ensure_status(&[PropertyStatus::Available, PropertyStatus::Blocked], "book")?;
        if cmd.agreed_price <= 0 {
            return Err(DomainError::validation("agreed price must be positive"));
        }
        if cmd.booking_amount < 0 {
            return Err(DomainError::validation("booking amount cannot be negative"));
        }
        if cmd.booking_amount > cmd.agreed_price {
            return Err(DomainError::validation(
                "booking amount cannot exceed the agreed price",
            ));
        }
        Ok(vec![PropertyEvent::PropertyBooked(PropertyBooked {
            tenant_id: cmd.tenant_id,
            property_id: cmd.property_id,
            customer_id: cmd.customer_id,
            agreed_price: cmd.agreed_price,
            booking_amount: cmd.booking_amount,
            booked_on: cmd.booked_on,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel_booking(&self, cmd: &CancelBooking) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.property_id)?;
        self.ensure_status(&[PropertyStatus::Booked], "cancel the booking of")?;
        Ok(vec![PropertyEvent::BookingCancelled(BookingCancelled {
            tenant_id: cmd.tenant_id,
            property_id: cmd.property_id,
            customer_id: self.customer_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sale(&self, cmd: &RegisterSale) -> Result<Vec<PropertyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.property_id)?;
        self.ensure_status(&[PropertyStatus::Booked], "register the sale of")?;
        Ok(vec![PropertyEvent::PropertySold(PropertySold {
            tenant_id: cmd.tenant_id,
            property_id: cmd.property_id,
            customer_id: self.customer_id,
            sale_price: self.agreed_price,
            registered_on: cmd.registered_on,
            registration_no: cmd.registration_no.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    fn listed() -> (Property, TenantId, PropertyId) {
        let tenant_id = TenantId::new();
        let property_id = PropertyId::generate();
        let mut unit = Property::empty(property_id);
        execute(
            &mut unit,
            &PropertyCommand::ListProperty(ListProperty {
                tenant_id,
                property_id,
                project_id: ProjectId::generate(),
                unit_no: "b-1204".to_string(),
                kind: PropertyKind::Apartment,
                floor: Some(12),
                area_sqft: 1_050,
                rate_per_sqft: 9_500_00,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (unit, tenant_id, property_id)
    }

    fn book(tenant_id: TenantId, property_id: PropertyId, booking_amount: Paise) -> PropertyCommand {
        PropertyCommand::BookProperty(BookProperty {
            tenant_id,
            property_id,
            customer_id: CustomerId::generate(),
            agreed_price: 95_00_000_00,
            booking_amount,
            booked_on: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn list_price_is_area_times_rate() {
        let (unit, _, _) = listed();
        assert_eq!(unit.list_price(), 1_050 * 9_500_00);
        assert_eq!(unit.unit_no(), "B-1204");
    }

    #[test]
    fn booking_amount_cannot_exceed_agreed_price() {
        let (unit, tenant_id, property_id) = listed();
        assert!(unit.handle(&book(tenant_id, property_id, 95_00_000_01)).is_err());
    }

    #[test]
    fn hold_book_cancel_book_sell() {
        let (mut unit, tenant_id, property_id) = listed();
        execute(
            &mut unit,
            &PropertyCommand::HoldProperty(HoldProperty {
                tenant_id,
                property_id,
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(&mut unit, &book(tenant_id, property_id, 5_00_000_00)).unwrap();
        assert_eq!(unit.status(), PropertyStatus::Booked);
        assert!(unit.handle(&book(tenant_id, property_id, 0)).is_err());

        execute(
            &mut unit,
            &PropertyCommand::CancelBooking(CancelBooking {
                tenant_id,
                property_id,
                reason: Some("loan rejected".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(unit.status(), PropertyStatus::Available);
        assert!(unit.customer_id().is_none());

        execute(&mut unit, &book(tenant_id, property_id, 5_00_000_00)).unwrap();
        let events = execute(
            &mut unit,
            &PropertyCommand::RegisterSale(RegisterSale {
                tenant_id,
                property_id,
                registered_on: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                registration_no: Some("PUN-2026-8812".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(matches!(&events[0], PropertyEvent::PropertySold(s) if s.sale_price == 95_00_000_00));
        assert_eq!(unit.status(), PropertyStatus::Sold);
    }
}
