//! DHCP MTU synchronization.
//!
//! Each subnet's DHCP options carry the network MTU. When the network MTU
//! changes the option is rewritten and the subnet's ledger row bumped; when
//! it already matches nothing is touched, so `updated_at` stays put.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::backend::{BackendPortStore, DhcpOptions, RevisionLedger};
use crate::error::BackendError;
use crate::lsp::Outcome;
use ovn_orch_common::{RetryError, RetryPolicy};
use ovn_types::{Network, Subnet, SubnetId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// DHCP option holding the interface MTU.
pub const DHCP_OPTION_MTU: &str = "mtu";

pub struct DhcpMtuSync {
    backend: Arc<dyn BackendPortStore>,
    ledger: Arc<dyn RevisionLedger>,
    retry: RetryPolicy,
}

impl DhcpMtuSync {
    pub fn new(
        backend: Arc<dyn BackendPortStore>,
        ledger: Arc<dyn RevisionLedger>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            ledger,
            retry,
        }
    }

    /// Brings every subnet of `network` to the network MTU.
    pub async fn sync(&self, network: &Network) -> Vec<(SubnetId, Outcome)> {
        let mut outcomes = Vec::with_capacity(network.subnets.len());
        for subnet in &network.subnets {
            let outcome = match self.sync_subnet(network, subnet).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(subnet = %subnet.id, error = %e, "DHCP MTU not applied");
                    Outcome::Failed(e.to_string())
                }
            };
            outcomes.push((subnet.id.clone(), outcome));
        }
        outcomes
    }

    async fn sync_subnet(
        &self,
        network: &Network,
        subnet: &Subnet,
    ) -> Result<Outcome, RetryError<BackendError>> {
        let current = self
            .retry
            .run("get_dhcp_options", || {
                self.backend.get_dhcp_options(&subnet.id)
            })
            .await?;

        let mtu = network.mtu.to_string();
        let mut target = current.clone().unwrap_or_else(|| DhcpOptions {
            subnet_id: subnet.id.clone(),
            cidr: subnet.cidr,
            options: Default::default(),
        });
        target.cidr = subnet.cidr;
        target.options.insert(DHCP_OPTION_MTU.to_string(), mtu.clone());

        if current.as_ref() == Some(&target) {
            debug!(subnet = %subnet.id, mtu = %mtu, "DHCP MTU already current");
            return Ok(Outcome::Unchanged);
        }

        let written = self
            .retry
            .run("put_dhcp_options", || {
                self.backend.put_dhcp_options(target.clone())
            })
            .await;
        if let Err(e) = written {
            audit_log!(AuditRecord::new(
                AuditCategory::NetworkConfig,
                "DhcpMtuSync",
                "put_dhcp_options"
            )
            .with_object_id(&subnet.id)
            .with_object_type("dhcp_options")
            .with_error(e.to_string()));
            return Err(e);
        }

        self.retry
            .run("bump_revision", || {
                self.ledger
                    .bump_if_newer(&subnet.id, network.revision_number)
            })
            .await?;

        audit_log!(AuditRecord::new(
            AuditCategory::NetworkConfig,
            "DhcpMtuSync",
            "put_dhcp_options"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(&subnet.id)
        .with_object_type("dhcp_options")
        .with_details(serde_json::json!({
            "network": &network.id,
            "mtu": &mtu,
        })));

        info!(subnet = %subnet.id, mtu = %mtu, "DHCP MTU updated");
        Ok(Outcome::Applied)
    }
}
