//! OVN Port Orchestration - Logical Switch Port Reconciler
//!
//! Derives the northbound logical switch port rows (type, options, HA chassis
//! group) from tenant port configuration and keeps them converged as ports
//! and their allowed-address-pairs change.
//!
//! # Architecture
//!
//! ```text
//! [tenant events] ──> [Dispatcher] ──> per-network worker ──> [LspEngine]
//!                                                               │   │
//!                      [AddressIndex] <── classify ─────────────┘   │
//!                                                                   ↓
//!                        [RevisionLedger] <── guard ── [BackendPortStore]
//! ```
//!
//! # Key Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`lsp::AddressIndex`] | Per-network owners and claimants of each IP |
//! | [`lsp::classify`] | Pure normal / external / virtual decision |
//! | [`lsp::LspEngine`] | Diffs target rows against the backend and writes |
//! | [`dispatch::Dispatcher`] | Serializes events per network, in arrival order |
//! | [`ha_chassis_group::HaChassisGroupOrch`] | Default group lifecycle and drift repair |
//! | [`vif`] | VIF type and details for a bound host |
//! | [`dhcp::DhcpMtuSync`] | Keeps subnet DHCP `mtu` in step with the network |
//!
//! Collaborators (tenant store, revision ledger, northbound store, chassis
//! directory) are reached through the async traits in [`backend`]; in-memory
//! implementations live in [`memory`].

pub mod audit;
pub mod backend;
pub mod config;
pub mod daemon;
pub mod dhcp;
pub mod dispatch;
pub mod error;
pub mod ha_chassis_group;
pub mod lsp;
pub mod memory;
pub mod vif;

pub use config::PortOrchConfig;
pub use dispatch::{Completion, Dispatcher, Event};
pub use error::{BackendError, PortOrchError, Result};
pub use lsp::{LspEngine, ObjectOutcome, Outcome, ReconcileReport};
