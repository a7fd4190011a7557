//! Per-network address-pair index.
//!
//! Tracks, for every IP of a network, the port owning it as a fixed IP and
//! the ports claiming it through allowed-address-pairs. Owners never count
//! as claimants of their own address.

use ovn_types::{Port, PortId};
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AddressClaim {
    owner: Option<PortId>,
    /// Insertion ordered, no duplicates
    claimants: Vec<PortId>,
}

impl AddressClaim {
    fn is_empty(&self) -> bool {
        self.owner.is_none() && self.claimants.is_empty()
    }
}

/// What a port update changed in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDelta {
    /// Allowed-address IPs that were added or removed
    pub touched_ips: BTreeSet<IpAddr>,
    /// Ports that lost ownership of a fixed IP to another port
    pub displaced_owners: Vec<PortId>,
}

impl IndexDelta {
    pub fn is_empty(&self) -> bool {
        self.touched_ips.is_empty() && self.displaced_owners.is_empty()
    }
}

/// Owners and claimants of every IP in one network.
///
/// All mutations are idempotent; removing a missing entry is a no-op.
#[derive(Debug, Clone, Default)]
pub struct AddressIndex {
    claims: HashMap<IpAddr, AddressClaim>,
}

impl AddressIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of IPs with an owner or at least one claimant.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Records `port_id` as owner of `ip`.
    ///
    /// Returns the previous owner if a different port held the address.
    pub fn record_fixed_ip(&mut self, ip: IpAddr, port_id: &str) -> Option<PortId> {
        let claim = self.claims.entry(ip).or_default();
        match claim.owner.replace(port_id.to_string()) {
            Some(previous) if previous != port_id => {
                warn!(
                    ip = %ip,
                    port = port_id,
                    previous_owner = %previous,
                    "Fixed IP already owned by another port, taking ownership"
                );
                Some(previous)
            }
            _ => None,
        }
    }

    pub fn remove_fixed_ip(&mut self, ip: IpAddr, port_id: &str) {
        if let Some(claim) = self.claims.get_mut(&ip) {
            if claim.owner.as_deref() == Some(port_id) {
                claim.owner = None;
            }
        }
        self.prune(ip);
    }

    pub fn add_claim(&mut self, ip: IpAddr, port_id: &str) {
        let claim = self.claims.entry(ip).or_default();
        if !claim.claimants.iter().any(|c| c == port_id) {
            claim.claimants.push(port_id.to_string());
        }
    }

    pub fn remove_claim(&mut self, ip: IpAddr, port_id: &str) {
        if let Some(claim) = self.claims.get_mut(&ip) {
            claim.claimants.retain(|c| c != port_id);
        }
        self.prune(ip);
    }

    pub fn find_owner(&self, ip: &IpAddr) -> Option<&PortId> {
        self.claims.get(ip).and_then(|c| c.owner.as_ref())
    }

    /// Claimants of `ip` in insertion order, owner excluded.
    pub fn find_claimants(&self, ip: &IpAddr) -> Vec<PortId> {
        match self.claims.get(ip) {
            Some(claim) => claim
                .claimants
                .iter()
                .filter(|c| claim.owner.as_ref() != Some(*c))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Brings the index from `old` to `new` for one port.
    pub fn apply_port(&mut self, old: Option<&Port>, new: &Port) -> IndexDelta {
        let mut delta = IndexDelta::default();
        let port_id = new.id.as_str();

        let old_fixed: BTreeSet<IpAddr> = old
            .map(|p| p.fixed_ips.iter().copied().collect())
            .unwrap_or_default();
        let new_fixed: BTreeSet<IpAddr> = new.fixed_ips.iter().copied().collect();

        for ip in old_fixed.difference(&new_fixed) {
            self.remove_fixed_ip(*ip, port_id);
        }
        for ip in &new.fixed_ips {
            if let Some(previous) = self.record_fixed_ip(*ip, port_id) {
                delta.displaced_owners.push(previous);
            }
        }

        let old_allowed = old.map(Port::allowed_ips).unwrap_or_default();
        let new_allowed = new.allowed_ips();

        for ip in old_allowed.iter().filter(|ip| !new_allowed.contains(ip)) {
            self.remove_claim(*ip, port_id);
            delta.touched_ips.insert(*ip);
        }
        for ip in new_allowed.iter().filter(|ip| !old_allowed.contains(ip)) {
            self.add_claim(*ip, port_id);
            delta.touched_ips.insert(*ip);
        }

        debug!(
            port = port_id,
            touched = delta.touched_ips.len(),
            "Address index updated"
        );
        delta
    }

    /// Drops every fixed IP and claim of `port`.
    pub fn forget_port(&mut self, port: &Port) -> IndexDelta {
        let mut delta = IndexDelta::default();
        for ip in &port.fixed_ips {
            self.remove_fixed_ip(*ip, &port.id);
        }
        for ip in port.allowed_ips() {
            self.remove_claim(ip, &port.id);
            delta.touched_ips.insert(ip);
        }
        delta
    }

    fn prune(&mut self, ip: IpAddr) {
        if self.claims.get(&ip).is_some_and(AddressClaim::is_empty) {
            self.claims.remove(&ip);
        }
    }
}
