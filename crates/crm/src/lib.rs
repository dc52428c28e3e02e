//! CRM domain module (event-sourced): customers and the sales lead pipeline.

pub mod contact;
pub mod customer;
pub mod lead;

pub use contact::{normalize_email, normalize_phone};
pub use customer::{
    Customer, CustomerCommand, CustomerDeactivated, CustomerDetails, CustomerEvent, CustomerId,
    CustomerProfile, CustomerRegistered, CustomerUpdated, DeactivateCustomer, RegisterCustomer,
    UpdateCustomer,
};
pub use lead::{
    AddFollowUp, AssignLead, CaptureLead, ChangeLeadStatus, ConvertLead, FollowUp, FollowUpAdded,
    Lead, LeadAssigned, LeadCaptured, LeadCommand, LeadConverted, LeadEvent, LeadId, LeadStatus,
    LeadStatusChanged,
};
