//! Application layer: the services that orchestrate the domain rules.
//!
//! [`engine::FulfillmentEngine`] wires every service from one set of
//! [`crate::domain::ports::Collaborators`] and one
//! [`crate::config::EngineConfig`]. Services hold no state between calls;
//! all coordination goes through the stores' compare-and-set methods.

pub mod authorization;
pub mod engine;
pub mod inventory;
pub mod non_critical;
pub mod numbering;
pub mod orders;
pub mod remittances;
pub mod reporting;
pub mod rotation;
