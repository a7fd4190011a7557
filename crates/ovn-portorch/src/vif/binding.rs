//! VIF type and details for a bound host.

use crate::backend::Chassis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Interface types that mark a host as vhost-user capable.
pub const VHOSTUSER_IFACE_TYPES: [&str; 2] = ["dpdkvhostuser", "dpdkvhostuserclient"];

const NETDEV_DATAPATH: &str = "netdev";
const VHOSTUSER_PREFIX: &str = "vhu";
const SOCKET_NAME_LEN: usize = 14;

/// How the port is plugged on its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VifType {
    Ovs,
    #[serde(rename = "vhostuser")]
    VhostUser,
    Unbound,
    /// The port names a host that is not a registered chassis.
    BindingFailed,
}

impl VifType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VifType::Ovs => "ovs",
            VifType::VhostUser => "vhostuser",
            VifType::Unbound => "unbound",
            VifType::BindingFailed => "binding_failed",
        }
    }
}

impl fmt::Display for VifType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding details handed to the compute service.
///
/// Serializes to an object holding only the keys that are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VifDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_filter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhostuser_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhostuser_ovs_plug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhostuser_socket: Option<String>,
}

impl VifDetails {
    pub fn ovs() -> Self {
        Self {
            port_filter: Some(true),
            ..Default::default()
        }
    }

    pub fn vhostuser(socket: &Path) -> Self {
        Self {
            port_filter: Some(false),
            vhostuser_mode: Some("server".to_string()),
            vhostuser_ovs_plug: Some(true),
            vhostuser_socket: Some(socket.to_string_lossy().into_owned()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Details as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Binding decision for one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VifBinding {
    pub host: Option<String>,
    pub vif_type: VifType,
    pub vif_details: VifDetails,
}

/// Socket path for a vhost-user port: `<sock_dir>/` + the first 14 characters
/// of `"vhu" + port_id`.
pub fn vhostuser_socket_path(sock_dir: &Path, port_id: &str) -> PathBuf {
    let name: String = VHOSTUSER_PREFIX
        .chars()
        .chain(port_id.chars())
        .take(SOCKET_NAME_LEN)
        .collect();
    sock_dir.join(name)
}

fn supports_vhostuser(chassis: &Chassis) -> bool {
    chassis.datapath_type == NETDEV_DATAPATH
        && chassis
            .iface_types
            .iter()
            .any(|t| VHOSTUSER_IFACE_TYPES.contains(&t.as_str()))
}

/// Decides the binding for `port_id`.
///
/// `chassis` is the registered chassis for `host`, if one exists.
pub fn decide_binding(
    port_id: &str,
    host: Option<&str>,
    chassis: Option<&Chassis>,
    sock_dir: &Path,
) -> VifBinding {
    let Some(host) = host.filter(|h| !h.is_empty()) else {
        return VifBinding {
            host: None,
            vif_type: VifType::Unbound,
            vif_details: VifDetails::default(),
        };
    };

    let (vif_type, vif_details) = match chassis {
        None => (VifType::BindingFailed, VifDetails::default()),
        Some(chassis) if supports_vhostuser(chassis) => (
            VifType::VhostUser,
            VifDetails::vhostuser(&vhostuser_socket_path(sock_dir, port_id)),
        ),
        Some(_) => (VifType::Ovs, VifDetails::ovs()),
    };

    VifBinding {
        host: Some(host.to_string()),
        vif_type,
        vif_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOCK_DIR: &str = "/var/run/openvswitch";

    fn chassis(hostname: &str, datapath: &str, ifaces: &[&str]) -> Chassis {
        Chassis {
            hostname: hostname.to_string(),
            datapath_type: datapath.to_string(),
            iface_types: ifaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_socket_path_truncation() {
        let path = vhostuser_socket_path(Path::new(SOCK_DIR), "0a1b2c3d-4e5f-6789");
        assert_eq!(path, PathBuf::from("/var/run/openvswitch/vhu0a1b2c3d-4e"));

        let short = vhostuser_socket_path(Path::new(SOCK_DIR), "p1");
        assert_eq!(short, PathBuf::from("/var/run/openvswitch/vhup1"));
    }

    #[test]
    fn test_dpdk_host_binds_vhostuser() {
        let host = chassis(
            "dpdk-host",
            "netdev",
            &["dummy", "dummy-internal", "dpdkvhostuser"],
        );
        let binding = decide_binding("port-1", Some("dpdk-host"), Some(&host), Path::new(SOCK_DIR));

        assert_eq!(binding.vif_type, VifType::VhostUser);
        assert_eq!(
            binding.vif_details.to_json(),
            serde_json::json!({
                "port_filter": false,
                "vhostuser_mode": "server",
                "vhostuser_ovs_plug": true,
                "vhostuser_socket": "/var/run/openvswitch/vhuport-1",
            })
        );
    }

    #[test]
    fn test_vhostuser_client_type_counts() {
        let host = chassis("dpdk-host", "netdev", &["dpdkvhostuserclient"]);
        let binding = decide_binding("p", Some("dpdk-host"), Some(&host), Path::new(SOCK_DIR));
        assert_eq!(binding.vif_type, VifType::VhostUser);
    }

    #[test]
    fn test_vhostuser_requires_netdev() {
        let host = chassis("kernel-host", "system", &["dpdkvhostuser"]);
        let binding = decide_binding("p", Some("kernel-host"), Some(&host), Path::new(SOCK_DIR));
        assert_eq!(binding.vif_type, VifType::Ovs);
    }

    #[test]
    fn test_tunnel_only_host_binds_ovs() {
        let host = chassis(
            "invalid-host",
            "netdev",
            &["dummy", "dummy-internal", "geneve", "vxlan"],
        );
        let binding = decide_binding("p", Some("invalid-host"), Some(&host), Path::new(SOCK_DIR));

        assert_eq!(binding.vif_type, VifType::Ovs);
        assert_eq!(binding.vif_details.to_json(), serde_json::json!({"port_filter": true}));
    }

    #[test]
    fn test_no_host_is_unbound() {
        let binding = decide_binding("p", None, None, Path::new(SOCK_DIR));
        assert_eq!(binding.vif_type, VifType::Unbound);
        assert!(binding.vif_details.is_empty());
        assert_eq!(binding.vif_details.to_json(), serde_json::json!({}));

        let empty = decide_binding("p", Some(""), None, Path::new(SOCK_DIR));
        assert_eq!(empty.vif_type, VifType::Unbound);
    }

    #[test]
    fn test_unknown_host_fails_binding() {
        let binding = decide_binding("p", Some("ghost"), None, Path::new(SOCK_DIR));
        assert_eq!(binding.vif_type, VifType::BindingFailed);
        assert_eq!(binding.host.as_deref(), Some("ghost"));
        assert!(binding.vif_details.is_empty());
    }

    #[test]
    fn test_vif_type_strings() {
        assert_eq!(VifType::VhostUser.to_string(), "vhostuser");
        assert_eq!(
            serde_json::to_value(VifType::BindingFailed).unwrap(),
            serde_json::json!("binding_failed")
        );
        assert_eq!(
            serde_json::to_value(VifType::VhostUser).unwrap(),
            serde_json::json!("vhostuser")
        );
    }
}
