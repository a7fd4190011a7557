//! VIF binding decision.
//!
//! Chooses how a port is plugged on its host: an OVS internal interface, a
//! DPDK vhost-user socket, or nothing when the port is not bound anywhere.

mod binding;

pub use binding::{
    decide_binding, vhostuser_socket_path, VifBinding, VifDetails, VifType, VHOSTUSER_IFACE_TYPES,
};
