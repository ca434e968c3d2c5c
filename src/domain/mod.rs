//! Domain model: aggregates, state tables and the collaborator ports.
//!
//! Nothing in here performs I/O. Services in [`crate::application`] load
//! aggregates through [`ports`], apply the rules defined here and write the
//! result back through compare-and-set store methods.

pub mod actor;
pub mod commission;
pub mod history;
pub mod inventory;
pub mod money;
pub mod order;
pub mod payment_account;
pub mod ports;
pub mod remittance;
