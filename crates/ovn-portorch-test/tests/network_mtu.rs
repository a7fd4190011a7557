//! Network MTU scenarios
//!
//! Tests that DHCP options of every subnet follow the network MTU

use ovn_portorch::backend::{BackendPortStore, DhcpOptions, RevisionLedger};
use ovn_portorch::dhcp::DHCP_OPTION_MTU;
use ovn_portorch::Outcome;
use ovn_portorch_test::{fixtures::network_fixtures, LspVerifier, ScenarioEnv};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

async fn env_with_dual_stack() -> ScenarioEnv {
    let env = ScenarioEnv::start().await.expect("Failed to start scenario");
    env.create_network(network_fixtures::dual_stack_network(
        "net-a",
        "10.0.0.0/24".parse().unwrap(),
        "fd00::/64".parse().unwrap(),
    ));
    env
}

#[tokio::test]
async fn test_mtu_change_updates_every_subnet() -> anyhow::Result<()> {
    let env = env_with_dual_stack().await;
    let verifier = LspVerifier::new(&env);

    let report = env.set_network_mtu("net-a", 9000).await?;

    for subnet_id in ["net-a-subnet-0", "net-a-subnet-1"] {
        assert_eq!(report.dhcp_outcome(subnet_id), Some(&Outcome::Applied));
        verifier.assert_dhcp_mtu(subnet_id, 9000).await?;
        // The network revision after one update
        verifier.assert_revision(subnet_id, Some(2)).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_same_mtu_leaves_ledger_untouched() -> anyhow::Result<()> {
    let env = env_with_dual_stack().await;

    env.set_network_mtu("net-a", 1400).await?;
    let before = env.ledger.get_revision("net-a-subnet-0").await?;
    let writes = env.backend.write_count();

    let report = env.set_network_mtu("net-a", 1400).await?;
    assert_eq!(report.dhcp_outcome("net-a-subnet-0"), Some(&Outcome::Unchanged));
    assert_eq!(report.dhcp_outcome("net-a-subnet-1"), Some(&Outcome::Unchanged));
    assert_eq!(env.backend.write_count(), writes);

    let after = env.ledger.get_revision("net-a-subnet-0").await?;
    assert_eq!(after, before);
    Ok(())
}

#[tokio::test]
async fn test_mtu_update_keeps_other_options() -> anyhow::Result<()> {
    let env = env_with_dual_stack().await;
    let verifier = LspVerifier::new(&env);

    let mut options = BTreeMap::new();
    options.insert("lease_time".to_string(), "43200".to_string());
    options.insert(DHCP_OPTION_MTU.to_string(), "1442".to_string());
    env.backend
        .put_dhcp_options(DhcpOptions {
            subnet_id: "net-a-subnet-0".to_string(),
            cidr: "10.0.0.0/24".parse().unwrap(),
            options,
        })
        .await?;

    env.set_network_mtu("net-a", 1300).await?;

    verifier.assert_dhcp_mtu("net-a-subnet-0", 1300).await?;
    let stored = env
        .backend
        .get_dhcp_options("net-a-subnet-0")
        .await?
        .expect("DHCP options missing");
    assert_eq!(
        stored.options.get("lease_time").map(String::as_str),
        Some("43200")
    );
    Ok(())
}

/// One subnet failing does not stop the other
#[tokio::test]
async fn test_mtu_write_failure_is_per_subnet() -> anyhow::Result<()> {
    let env = env_with_dual_stack().await;
    let verifier = LspVerifier::new(&env);
    let attempts = u64::from(env.config().retry.max_attempts);

    env.backend.fail_next_writes(attempts);
    let report = env.set_network_mtu("net-a", 9000).await?;

    assert!(matches!(
        report.dhcp_outcome("net-a-subnet-0"),
        Some(Outcome::Failed(_))
    ));
    assert_eq!(report.dhcp_outcome("net-a-subnet-1"), Some(&Outcome::Applied));
    verifier.assert_revision("net-a-subnet-0", None).await?;
    verifier.assert_dhcp_mtu("net-a-subnet-1", 9000).await?;

    // The next network event repairs the failed subnet.
    let report = env.set_network_mtu("net-a", 9000).await?;
    assert_eq!(report.dhcp_outcome("net-a-subnet-0"), Some(&Outcome::Applied));
    verifier.assert_dhcp_mtu("net-a-subnet-0", 9000).await?;
    Ok(())
}
