//! Tenant network and subnet definitions.

use crate::{IpPrefix, NetworkId, SubnetId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Default MTU for tenant networks.
pub const DEFAULT_MTU: u32 = 1442;

/// A subnet of a tenant network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub network_id: NetworkId,
    pub cidr: IpPrefix,
    #[serde(default)]
    pub revision_number: u64,
}

impl Subnet {
    pub fn new(id: impl Into<SubnetId>, network_id: impl Into<NetworkId>, cidr: IpPrefix) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.into(),
            cidr,
            revision_number: 1,
        }
    }
}

/// A tenant network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub revision_number: u64,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

impl Network {
    pub fn new(id: impl Into<NetworkId>) -> Self {
        Self {
            id: id.into(),
            mtu: DEFAULT_MTU,
            revision_number: 1,
            subnets: Vec::new(),
        }
    }

    /// Adds a subnet with a generated identifier.
    pub fn with_subnet(mut self, cidr: IpPrefix) -> Self {
        let id = format!("{}-subnet-{}", self.id, self.subnets.len());
        let subnet = Subnet::new(id, self.id.clone(), cidr);
        self.subnets.push(subnet);
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Returns true if `ip` belongs to one of the network's subnets.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.subnets.iter().any(|s| s.cidr.contains(ip))
    }
}
