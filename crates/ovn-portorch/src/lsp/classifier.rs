//! Port classifier.
//!
//! Pure decision of a port's type from its binding attributes and the
//! network's address index:
//!
//! 1. External-eligible VNIC without `switchdev` → external, default group
//! 2. Owns a fixed IP claimed by other ports → virtual
//! 3. Otherwise → normal
//!
//! Rule 1 wins over rule 2.

use super::index::AddressIndex;
use super::types::Classification;
use ovn_types::{Network, Port, PortId};
use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, info};

/// Input the classifier cannot act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("Port {port_id} address {ip} is outside every subnet of network {network_id}")]
    AddressOutsideNetwork {
        port_id: PortId,
        network_id: String,
        ip: IpAddr,
    },

    #[error("Port {port_id} belongs to network {port_network}, not {network_id}")]
    NetworkMismatch {
        port_id: PortId,
        port_network: String,
        network_id: String,
    },
}

/// Network-level input to [`classify`].
#[derive(Debug, Clone, Copy)]
pub struct ClassifierContext<'a> {
    pub network: &'a Network,
    pub default_ha_chassis_group: &'a str,
}

/// Computes the target classification of `port`.
pub fn classify(
    port: &Port,
    index: &AddressIndex,
    ctx: &ClassifierContext<'_>,
) -> Result<Classification, ClassifyError> {
    validate(port, ctx.network)?;

    let virtual_claim = find_virtual_claim(port, index);

    if port.is_external_candidate() {
        if let Some((ip, parents)) = &virtual_claim {
            info!(
                port = %port.id,
                virtual_ip = %ip,
                parents = ?parents,
                "External port owns a claimed address; keeping it external"
            );
        }
        if claims_peer_address(port, index) {
            info!(
                port = %port.id,
                "External port also claims another port's address"
            );
        }
        return Ok(Classification::External {
            ha_chassis_group: ctx.default_ha_chassis_group.to_string(),
        });
    }

    match virtual_claim {
        Some((virtual_ip, parents)) => Ok(Classification::Virtual {
            virtual_ip,
            parents,
        }),
        None => Ok(Classification::Normal),
    }
}

fn validate(port: &Port, network: &Network) -> Result<(), ClassifyError> {
    if port.network_id != network.id {
        return Err(ClassifyError::NetworkMismatch {
            port_id: port.id.clone(),
            port_network: port.network_id.clone(),
            network_id: network.id.clone(),
        });
    }

    for ip in port.fixed_ips.iter().chain(port.allowed_address_pairs.iter()) {
        if !network.contains(ip) {
            return Err(ClassifyError::AddressOutsideNetwork {
                port_id: port.id.clone(),
                network_id: network.id.clone(),
                ip: *ip,
            });
        }
    }
    Ok(())
}

/// First fixed IP, in assignment order, that other ports claim.
fn find_virtual_claim(port: &Port, index: &AddressIndex) -> Option<(IpAddr, Vec<PortId>)> {
    for ip in &port.fixed_ips {
        let parents: Vec<PortId> = index
            .find_claimants(ip)
            .into_iter()
            .filter(|c| *c != port.id)
            .collect();
        if !parents.is_empty() {
            return Some((*ip, parents));
        }
    }
    debug!(port = %port.id, "No claimed fixed IP");
    None
}

fn claims_peer_address(port: &Port, index: &AddressIndex) -> bool {
    port.allowed_ips()
        .iter()
        .any(|ip| index.find_owner(ip).is_some_and(|owner| *owner != port.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_types::{Capability, VnicType};
    use pretty_assertions::assert_eq;

    const GROUP: &str = "default_ha_chassis_group";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn network() -> Network {
        Network::new("n1").with_subnet("10.0.0.0/24".parse().unwrap())
    }

    fn ctx(network: &Network) -> ClassifierContext<'_> {
        ClassifierContext {
            network,
            default_ha_chassis_group: GROUP,
        }
    }

    fn index_with(ports: &[&Port]) -> AddressIndex {
        let mut index = AddressIndex::new();
        for port in ports {
            index.apply_port(None, port);
        }
        index
    }

    #[test]
    fn test_plain_port_is_normal() {
        let net = network();
        let port = Port::new("p", "n1").with_fixed_ip(ip("10.0.0.10"));
        let index = index_with(&[&port]);
        assert_eq!(classify(&port, &index, &ctx(&net)).unwrap(), Classification::Normal);
    }

    #[test]
    fn test_direct_port_is_external() {
        let net = network();
        let port = Port::new("p", "n1")
            .with_vnic_type(VnicType::Direct)
            .with_fixed_ip(ip("10.0.0.10"));
        let index = index_with(&[&port]);

        assert_eq!(
            classify(&port, &index, &ctx(&net)).unwrap(),
            Classification::External {
                ha_chassis_group: GROUP.to_string()
            }
        );
    }

    #[test]
    fn test_switchdev_port_is_normal() {
        let net = network();
        let port = Port::new("p", "n1")
            .with_vnic_type(VnicType::Direct)
            .with_capability(Capability::Switchdev)
            .with_fixed_ip(ip("10.0.0.10"));
        let index = index_with(&[&port]);
        assert_eq!(classify(&port, &index, &ctx(&net)).unwrap(), Classification::Normal);
    }

    #[test]
    fn test_owner_of_claimed_ip_is_virtual() {
        let net = network();
        let v = Port::new("v", "n1").with_fixed_ip(ip("10.0.0.55"));
        let m = Port::new("m", "n1")
            .with_fixed_ip(ip("10.0.0.11"))
            .with_allowed_address(ip("10.0.0.55"));
        let b = Port::new("b", "n1")
            .with_fixed_ip(ip("10.0.0.12"))
            .with_allowed_address(ip("10.0.0.55"));
        let index = index_with(&[&v, &m, &b]);

        assert_eq!(
            classify(&v, &index, &ctx(&net)).unwrap(),
            Classification::Virtual {
                virtual_ip: ip("10.0.0.55"),
                parents: vec!["m".to_string(), "b".to_string()],
            }
        );
        assert_eq!(classify(&m, &index, &ctx(&net)).unwrap(), Classification::Normal);
    }

    #[test]
    fn test_external_wins_over_virtual() {
        let net = network();
        let v = Port::new("v", "n1")
            .with_vnic_type(VnicType::Macvtap)
            .with_fixed_ip(ip("10.0.0.55"));
        let m = Port::new("m", "n1")
            .with_fixed_ip(ip("10.0.0.11"))
            .with_allowed_address(ip("10.0.0.55"));
        let index = index_with(&[&v, &m]);

        assert!(matches!(
            classify(&v, &index, &ctx(&net)).unwrap(),
            Classification::External { .. }
        ));
    }

    #[test]
    fn test_self_claim_does_not_make_virtual() {
        let net = network();
        let v = Port::new("v", "n1")
            .with_fixed_ip(ip("10.0.0.55"))
            .with_allowed_address(ip("10.0.0.55"));
        let index = index_with(&[&v]);
        assert_eq!(classify(&v, &index, &ctx(&net)).unwrap(), Classification::Normal);
    }

    #[test]
    fn test_first_claimed_fixed_ip_selected() {
        let net = network();
        let v = Port::new("v", "n1")
            .with_fixed_ip(ip("10.0.0.20"))
            .with_fixed_ip(ip("10.0.0.56"))
            .with_fixed_ip(ip("10.0.0.55"));
        let a = Port::new("a", "n1").with_allowed_address(ip("10.0.0.55"));
        let b = Port::new("b", "n1").with_allowed_address(ip("10.0.0.56"));
        let index = index_with(&[&v, &a, &b]);

        assert_eq!(
            classify(&v, &index, &ctx(&net)).unwrap(),
            Classification::Virtual {
                virtual_ip: ip("10.0.0.56"),
                parents: vec!["b".to_string()],
            }
        );
    }

    #[test]
    fn test_address_outside_network_rejected() {
        let net = network();
        let port = Port::new("p", "n1").with_allowed_address(ip("192.168.1.5"));
        let index = index_with(&[&port]);

        assert_eq!(
            classify(&port, &index, &ctx(&net)),
            Err(ClassifyError::AddressOutsideNetwork {
                port_id: "p".to_string(),
                network_id: "n1".to_string(),
                ip: ip("192.168.1.5"),
            })
        );
    }

    #[test]
    fn test_network_mismatch_rejected() {
        let net = network();
        let port = Port::new("p", "other");
        let index = AddressIndex::new();
        assert!(matches!(
            classify(&port, &index, &ctx(&net)),
            Err(ClassifyError::NetworkMismatch { .. })
        ));
    }
}
