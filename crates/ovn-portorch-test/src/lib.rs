//! Scenario test infrastructure for the OVN port reconciler
//!
//! This crate provides:
//! - An in-process environment wiring the dispatcher to in-memory collaborators
//! - Fixtures for the port and network shapes the reconciler cares about
//! - Verification helpers for northbound rows, ledger entries and bindings

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
