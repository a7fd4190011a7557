//! Verification helpers for reconciler scenarios
//!
//! Provides assertion helpers over the northbound rows, the revision ledger
//! and the bindings published back to the tenant store

use crate::ScenarioEnv;
use ovn_portorch::backend::{BackendPortStore, LogicalSwitchPort, RevisionLedger};
use ovn_portorch::dhcp::DHCP_OPTION_MTU;
use ovn_portorch::lsp::{LspType, OPTION_VIRTUAL_IP, OPTION_VIRTUAL_PARENTS};
use ovn_portorch::vif::VifType;
use ovn_portorch::BackendError;
use std::collections::BTreeSet;
use std::net::IpAddr;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Expected logical switch port '{port_id}' not found")]
    RowNotFound { port_id: String },

    #[error("Logical switch port '{port_id}' should not exist")]
    UnexpectedRow { port_id: String },

    #[error("Type mismatch for '{port_id}': expected '{expected}', got '{actual}'")]
    TypeMismatch {
        port_id: String,
        expected: LspType,
        actual: LspType,
    },

    #[error("Option mismatch for {port_id}:{option}: expected {expected:?}, got {actual:?}")]
    OptionMismatch {
        port_id: String,
        option: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("HA chassis group mismatch for '{port_id}': expected {expected:?}, got {actual:?}")]
    GroupMismatch {
        port_id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("Members of group '{group}': expected {expected:?}, got {actual:?}")]
    MembershipMismatch {
        group: String,
        expected: BTreeSet<String>,
        actual: BTreeSet<String>,
    },

    #[error("Revision mismatch for '{object_id}': expected {expected:?}, got {actual:?}")]
    RevisionMismatch {
        object_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Binding mismatch for '{port_id}': expected {expected}, got {actual:?}")]
    BindingMismatch {
        port_id: String,
        expected: VifType,
        actual: Option<VifType>,
    },

    #[error("DHCP MTU mismatch for subnet '{subnet_id}': expected '{expected}', got {actual:?}")]
    DhcpMtuMismatch {
        subnet_id: String,
        expected: String,
        actual: Option<String>,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Northbound state verification helper
pub struct LspVerifier<'a> {
    env: &'a ScenarioEnv,
}

impl<'a> LspVerifier<'a> {
    pub fn new(env: &'a ScenarioEnv) -> Self {
        Self { env }
    }

    /// Fetches a row that must exist
    pub async fn row(&self, port_id: &str) -> VerifyResult<LogicalSwitchPort> {
        self.env
            .backend
            .get_port(port_id)
            .await?
            .ok_or_else(|| VerificationError::RowNotFound {
                port_id: port_id.to_string(),
            })
    }

    /// Verify a plain row: no options, no group
    pub async fn assert_normal(&self, port_id: &str) -> VerifyResult<()> {
        let row = self.row(port_id).await?;
        check_type(&row, LspType::Normal)?;
        check_group(&row, None)?;
        check_option(&row, OPTION_VIRTUAL_IP, None)?;
        check_option(&row, OPTION_VIRTUAL_PARENTS, None)
    }

    /// Verify an external row in `group`, also listed among its members
    pub async fn assert_external(&self, port_id: &str, group: &str) -> VerifyResult<()> {
        let row = self.row(port_id).await?;
        check_type(&row, LspType::External)?;
        check_group(&row, Some(group))?;
        check_option(&row, OPTION_VIRTUAL_IP, None)?;

        let members = self.env.backend.group_members(group).await?;
        if !members.contains(port_id) {
            let mut expected = members.clone();
            expected.insert(port_id.to_string());
            return Err(VerificationError::MembershipMismatch {
                group: group.to_string(),
                expected,
                actual: members,
            });
        }
        Ok(())
    }

    /// Verify a virtual row with the given address and parents, in order
    pub async fn assert_virtual(
        &self,
        port_id: &str,
        virtual_ip: IpAddr,
        parents: &[&str],
    ) -> VerifyResult<()> {
        let row = self.row(port_id).await?;
        check_type(&row, LspType::Virtual)?;
        check_group(&row, None)?;
        check_option(&row, OPTION_VIRTUAL_IP, Some(&virtual_ip.to_string()))?;
        check_option(&row, OPTION_VIRTUAL_PARENTS, Some(&parents.join(",")))
    }

    pub async fn assert_no_row(&self, port_id: &str) -> VerifyResult<()> {
        if self.env.backend.get_port(port_id).await?.is_some() {
            return Err(VerificationError::UnexpectedRow {
                port_id: port_id.to_string(),
            });
        }
        Ok(())
    }

    /// Verify the exact member set of a group
    pub async fn assert_group_members(&self, group: &str, expected: &[&str]) -> VerifyResult<()> {
        let actual = self.env.backend.group_members(group).await?;
        let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
        if actual != expected {
            return Err(VerificationError::MembershipMismatch {
                group: group.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the ledger entry of an object; `None` means no entry
    pub async fn assert_revision(&self, object_id: &str, expected: Option<u64>) -> VerifyResult<()> {
        let actual = self
            .env
            .ledger
            .get_revision(object_id)
            .await?
            .map(|row| row.revision);
        if actual != expected {
            return Err(VerificationError::RevisionMismatch {
                object_id: object_id.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the binding published to the tenant store
    pub fn assert_binding(&self, port_id: &str, expected: VifType) -> VerifyResult<()> {
        let actual = self.env.tenant.binding(port_id).map(|b| b.vif_type);
        if actual != Some(expected) {
            return Err(VerificationError::BindingMismatch {
                port_id: port_id.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub async fn assert_dhcp_mtu(&self, subnet_id: &str, mtu: u32) -> VerifyResult<()> {
        let expected = mtu.to_string();
        let actual = self
            .env
            .backend
            .get_dhcp_options(subnet_id)
            .await?
            .and_then(|opts| opts.options.get(DHCP_OPTION_MTU).cloned());
        if actual.as_deref() != Some(expected.as_str()) {
            return Err(VerificationError::DhcpMtuMismatch {
                subnet_id: subnet_id.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

fn check_type(row: &LogicalSwitchPort, expected: LspType) -> VerifyResult<()> {
    if row.lsp_type != expected {
        return Err(VerificationError::TypeMismatch {
            port_id: row.name.clone(),
            expected,
            actual: row.lsp_type,
        });
    }
    Ok(())
}

fn check_group(row: &LogicalSwitchPort, expected: Option<&str>) -> VerifyResult<()> {
    if row.ha_chassis_group.as_deref() != expected {
        return Err(VerificationError::GroupMismatch {
            port_id: row.name.clone(),
            expected: expected.map(String::from),
            actual: row.ha_chassis_group.clone(),
        });
    }
    Ok(())
}

fn check_option(row: &LogicalSwitchPort, option: &str, expected: Option<&str>) -> VerifyResult<()> {
    let actual = row.options.get(option);
    if actual.map(String::as_str) != expected {
        return Err(VerificationError::OptionMismatch {
            port_id: row.name.clone(),
            option: option.to_string(),
            expected: expected.map(String::from),
            actual: actual.cloned(),
        });
    }
    Ok(())
}
