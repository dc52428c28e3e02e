//! Property inventory domain module (event-sourced): projects and their units.

pub mod project;
pub mod unit;

pub use project::{
    ChangeProjectPhase, CreateProject, Project, ProjectCommand, ProjectCreated, ProjectEvent,
    ProjectId, ProjectPhase, ProjectPhaseChanged,
};
pub use unit::{
    BookProperty, BookingCancelled, CancelBooking, HoldProperty, ListProperty, Property,
    PropertyBooked, PropertyCommand, PropertyEvent, PropertyHeld, PropertyId, PropertyKind,
    PropertyListed, PropertyReleased, PropertySold, PropertyStatus, RegisterSale,
    ReleaseProperty, list_price,
};
