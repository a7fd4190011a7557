//! Logical switch port derivation.
//!
//! The [`AddressIndex`] answers who owns and who claims an address, the
//! [`classify`] function turns a port plus the index into a
//! [`Classification`], and the [`LspEngine`] writes the resulting rows.

mod classifier;
mod engine;
mod index;
mod report;
mod types;

pub use classifier::{classify, ClassifierContext, ClassifyError};
pub use engine::{Collaborators, EngineConfig, LspEngine, NetworkState, ReconcileError};
pub use index::{AddressIndex, IndexDelta};
pub use report::{ObjectKind, ObjectOutcome, Outcome, ReconcileReport};
pub use types::{Classification, LspType, OPTION_VIRTUAL_IP, OPTION_VIRTUAL_PARENTS};
