//! Tenant-side types for the OVN logical switch port reconciler.
//!
//! This crate provides type-safe representations of the tenant objects the
//! reconciler consumes:
//!
//! - [`Port`]: A tenant port with its binding attributes and addresses
//! - [`VnicType`]: The VNIC type requested for a port binding
//! - [`BindingProfile`]: Typed capability set from the binding profile
//! - [`PortField`]: Names of port attributes that changed in an update
//! - [`Network`] / [`Subnet`]: Tenant networks with their subnets and MTU
//! - [`IpPrefix`]: CIDR prefixes with containment checks

mod ip;
mod network;
mod port;

pub use ip::IpPrefix;
pub use network::{Network, Subnet, DEFAULT_MTU};
pub use port::{BindingProfile, Capability, Port, PortField, VnicType};

/// Identifier of a tenant port.
pub type PortId = String;

/// Identifier of a tenant network.
pub type NetworkId = String;

/// Identifier of a tenant subnet.
pub type SubnetId = String;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VNIC type: {0}")]
    InvalidVnicType(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),
}
