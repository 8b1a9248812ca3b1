//! CLI command handlers

pub mod actions;
pub mod collaborators;
pub mod ledger;
pub mod payments;
pub mod queue;
