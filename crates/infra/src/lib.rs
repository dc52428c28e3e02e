//! Infrastructure layer: event store, dispatcher, read models, workflows,
//! data management, mail and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod data;
pub mod event_store;
pub mod mail;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod streams;
pub mod worker;
pub mod workflows;
