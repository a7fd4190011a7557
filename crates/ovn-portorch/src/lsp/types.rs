//! Port classification values and their rendering into northbound rows.

use crate::backend::LogicalSwitchPort;
use ovn_types::PortId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// LSP option holding the address a virtual port answers for.
pub const OPTION_VIRTUAL_IP: &str = "virtual-ip";
/// LSP option listing the ports allowed to claim the virtual address.
pub const OPTION_VIRTUAL_PARENTS: &str = "virtual-parents";

/// Value of the LSP `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LspType {
    #[default]
    #[serde(rename = "")]
    Normal,
    #[serde(rename = "external")]
    External,
    #[serde(rename = "virtual")]
    Virtual,
}

impl LspType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LspType::Normal => "",
            LspType::External => "external",
            LspType::Virtual => "virtual",
        }
    }
}

impl fmt::Display for LspType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LspType::Normal => f.write_str("normal"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Derived classification of a port.
///
/// Recomputed from scratch on every relevant event and rendered into a fresh
/// row; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classification {
    Normal,
    /// Served by an external chassis from the given HA group.
    External { ha_chassis_group: String },
    /// Answers for `virtual_ip` on behalf of `parents`, in discovery order.
    Virtual {
        virtual_ip: IpAddr,
        parents: Vec<PortId>,
    },
}

impl Classification {
    pub fn lsp_type(&self) -> LspType {
        match self {
            Classification::Normal => LspType::Normal,
            Classification::External { .. } => LspType::External,
            Classification::Virtual { .. } => LspType::Virtual,
        }
    }

    /// Renders the full row for `port_id`.
    pub fn to_row(&self, port_id: &str) -> LogicalSwitchPort {
        let mut options = BTreeMap::new();
        let mut ha_chassis_group = None;

        match self {
            Classification::Normal => {}
            Classification::External {
                ha_chassis_group: group,
            } => {
                ha_chassis_group = Some(group.clone());
            }
            Classification::Virtual {
                virtual_ip,
                parents,
            } => {
                options.insert(OPTION_VIRTUAL_IP.to_string(), virtual_ip.to_string());
                options.insert(OPTION_VIRTUAL_PARENTS.to_string(), parents.join(","));
            }
        }

        LogicalSwitchPort {
            name: port_id.to_string(),
            lsp_type: self.lsp_type(),
            options,
            ha_chassis_group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normal_row() {
        let row = Classification::Normal.to_row("p1");
        assert_eq!(row, LogicalSwitchPort::normal("p1"));
    }

    #[test]
    fn test_external_row() {
        let row = Classification::External {
            ha_chassis_group: "default_ha_chassis_group".to_string(),
        }
        .to_row("p1");

        assert_eq!(row.lsp_type, LspType::External);
        assert!(row.options.is_empty());
        assert_eq!(row.ha_chassis_group.as_deref(), Some("default_ha_chassis_group"));
    }

    #[test]
    fn test_virtual_row_joins_parents_in_order() {
        let row = Classification::Virtual {
            virtual_ip: "10.0.0.55".parse().unwrap(),
            parents: vec!["m".to_string(), "b".to_string()],
        }
        .to_row("v");

        assert_eq!(row.lsp_type, LspType::Virtual);
        assert_eq!(row.options.get(OPTION_VIRTUAL_IP).map(String::as_str), Some("10.0.0.55"));
        assert_eq!(row.options.get(OPTION_VIRTUAL_PARENTS).map(String::as_str), Some("m,b"));
        assert_eq!(row.ha_chassis_group, None);
    }

    #[test]
    fn test_lsp_type_strings() {
        assert_eq!(LspType::Normal.as_str(), "");
        assert_eq!(LspType::Normal.to_string(), "normal");
        assert_eq!(LspType::Virtual.to_string(), "virtual");
        assert_eq!(serde_json::to_value(LspType::External).unwrap(), serde_json::json!("external"));
    }
}
