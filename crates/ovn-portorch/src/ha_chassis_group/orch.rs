//! HA chassis group orchestration logic.

use super::types::{HaChassisGroupEntry, SyncSummary};
use crate::backend::BackendPortStore;
use async_trait::async_trait;
use chrono::Utc;
use ovn_orch_common::{Orch, RetryPolicy, TaskError, TaskResult, TaskResultExt};
use ovn_types::PortId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HaChassisGroupOrchError {
    #[error("No backend set")]
    BackendNotSet,
    #[error("Group not ready: {0}")]
    GroupNotReady(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<HaChassisGroupOrchError> for TaskError {
    fn from(e: HaChassisGroupOrchError) -> Self {
        match &e {
            HaChassisGroupOrchError::BackendNotSet => TaskError::internal(e.to_string()),
            HaChassisGroupOrchError::GroupNotReady(_) => TaskError::deferred(e.to_string()),
            HaChassisGroupOrchError::Backend(_) => TaskError::backend(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HaChassisGroupOrchConfig {
    pub default_group: String,
    pub retry: RetryPolicy,
}

impl Default for HaChassisGroupOrchConfig {
    fn default() -> Self {
        Self {
            default_group: "default_ha_chassis_group".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HaChassisGroupOrchStats {
    pub groups_created: u64,
    pub members_added: u64,
    pub members_removed: u64,
    pub sync_runs: u64,
    pub sync_failures: u64,
}

pub struct HaChassisGroupOrch {
    config: HaChassisGroupOrchConfig,
    stats: HaChassisGroupOrchStats,
    backend: Option<Arc<dyn BackendPortStore>>,
    entry: Option<HaChassisGroupEntry>,
    sync_pending: bool,
}

impl HaChassisGroupOrch {
    pub fn new(config: HaChassisGroupOrchConfig) -> Self {
        Self {
            config,
            stats: HaChassisGroupOrchStats::default(),
            backend: None,
            entry: None,
            sync_pending: false,
        }
    }

    pub fn set_backend(&mut self, backend: Arc<dyn BackendPortStore>) {
        self.backend = Some(backend);
    }

    pub fn default_group(&self) -> &str {
        &self.config.default_group
    }

    /// Returns true once the default group is known to exist.
    pub fn is_ready(&self) -> bool {
        self.entry.is_some()
    }

    pub fn entry(&self) -> Option<&HaChassisGroupEntry> {
        self.entry.as_ref()
    }

    fn backend(&self) -> Result<Arc<dyn BackendPortStore>, HaChassisGroupOrchError> {
        self.backend
            .as_ref()
            .map(Arc::clone)
            .ok_or(HaChassisGroupOrchError::BackendNotSet)
    }

    /// Creates the default group on the backend if it is missing.
    ///
    /// Returns true if the group was created by this call.
    pub async fn ensure_default_group(&mut self) -> Result<bool, HaChassisGroupOrchError> {
        let backend = self.backend()?;
        let group = self.config.default_group.clone();

        let created = self
            .config
            .retry
            .run("ensure_group", || backend.ensure_group(&group))
            .await
            .map_err(|e| {
                let audit_record = AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "HaChassisGroupOrch",
                    "ensure_default_group",
                )
                .with_object_id(&group)
                .with_object_type("ha_chassis_group")
                .with_error(e.to_string());
                audit_log!(audit_record);
                HaChassisGroupOrchError::Backend(e.to_string())
            })?;

        if created {
            let audit_record = AuditRecord::new(
                AuditCategory::ResourceCreate,
                "HaChassisGroupOrch",
                "ensure_default_group",
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&group)
            .with_object_type("ha_chassis_group")
            .with_details(serde_json::json!({
                "group_name": group,
            }));
            audit_log!(audit_record);
            self.stats.groups_created += 1;
        } else {
            debug!(group = %group, "Default HA chassis group already present");
        }

        if self.entry.is_none() {
            self.entry = Some(HaChassisGroupEntry::new(group));
        }
        Ok(created)
    }

    /// Ports whose backend rows reference the default group.
    pub async fn expected_members(&self) -> Result<BTreeSet<PortId>, HaChassisGroupOrchError> {
        let backend = self.backend()?;
        let rows = self
            .config
            .retry
            .run("list_ports", || backend.list_ports())
            .await
            .map_err(|e| HaChassisGroupOrchError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter(|row| row.ha_chassis_group.as_deref() == Some(self.config.default_group.as_str()))
            .map(|row| row.name)
            .collect())
    }

    /// Brings the backend membership of the default group to `expected`.
    ///
    /// Each add or remove is attempted independently; the first failure is
    /// returned after the remaining changes were tried.
    pub async fn sync_membership(
        &mut self,
        expected: &BTreeSet<PortId>,
    ) -> Result<SyncSummary, HaChassisGroupOrchError> {
        if self.entry.is_none() {
            return Err(HaChassisGroupOrchError::GroupNotReady(
                self.config.default_group.clone(),
            ));
        }
        let backend = self.backend()?;
        let group = self.config.default_group.clone();
        self.stats.sync_runs += 1;

        let current = self
            .config
            .retry
            .run("group_members", || backend.group_members(&group))
            .await
            .map_err(|e| HaChassisGroupOrchError::Backend(e.to_string()))?;
        if let Some(entry) = self.entry.as_mut() {
            entry.members = current.clone();
        }

        let mut summary = SyncSummary::default();
        let mut first_error = None;

        for port_id in expected.difference(&current) {
            match self
                .config
                .retry
                .run("add_to_group", || backend.add_to_group(&group, port_id))
                .await
            {
                Ok(()) => {
                    let audit_record = AuditRecord::new(
                        AuditCategory::Maintenance,
                        "HaChassisGroupOrch",
                        "add_to_group",
                    )
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(port_id)
                    .with_object_type("ha_chassis_group_member")
                    .with_details(serde_json::json!({
                        "group_name": group,
                        "port": port_id,
                    }));
                    audit_log!(audit_record);
                    self.stats.members_added += 1;
                    if let Some(entry) = self.entry.as_mut() {
                        entry.add_member(port_id);
                    }
                    summary.added.push(port_id.clone());
                }
                Err(e) => {
                    warn!(group = %group, port = %port_id, error = %e, "Failed to add group member");
                    first_error.get_or_insert(HaChassisGroupOrchError::Backend(e.to_string()));
                }
            }
        }

        for port_id in current.difference(expected) {
            match self
                .config
                .retry
                .run("remove_from_group", || {
                    backend.remove_from_group(&group, port_id)
                })
                .await
            {
                Ok(()) => {
                    let audit_record = AuditRecord::new(
                        AuditCategory::Maintenance,
                        "HaChassisGroupOrch",
                        "remove_from_group",
                    )
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(port_id)
                    .with_object_type("ha_chassis_group_member")
                    .with_details(serde_json::json!({
                        "group_name": group,
                        "port": port_id,
                    }));
                    audit_log!(audit_record);
                    self.stats.members_removed += 1;
                    if let Some(entry) = self.entry.as_mut() {
                        entry.remove_member(port_id);
                    }
                    summary.removed.push(port_id.clone());
                }
                Err(e) => {
                    warn!(group = %group, port = %port_id, error = %e, "Failed to remove group member");
                    first_error.get_or_insert(HaChassisGroupOrchError::Backend(e.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            self.stats.sync_failures += 1;
            return Err(e);
        }

        if let Some(entry) = self.entry.as_mut() {
            entry.last_sync = Some(Utc::now());
        }
        if !summary.is_empty() {
            info!(
                group = %group,
                added = summary.added.len(),
                removed = summary.removed.len(),
                "HA chassis group membership repaired"
            );
        }
        Ok(summary)
    }

    pub fn stats(&self) -> &HaChassisGroupOrchStats {
        &self.stats
    }
}

#[async_trait]
impl Orch for HaChassisGroupOrch {
    fn name(&self) -> &str {
        "HaChassisGroupOrch"
    }

    async fn do_task(&mut self) {
        if self.entry.is_none() {
            if let Err(e) = self.ensure_default_group().await {
                warn!(error = %e, "Default HA chassis group not ensured, will retry");
                return;
            }
        }

        if !self.sync_pending {
            return;
        }

        let result: TaskResult<()> = match self.expected_members().await {
            Ok(expected) => self.sync_membership(&expected).await.map(|_| ()),
            Err(e) => Err(e),
        }
        .map_err(TaskError::from);

        match &result {
            Ok(()) => self.sync_pending = false,
            Err(e) => warn!(
                status = ?result.status(),
                error = %e,
                "HA chassis group sync failed, will retry"
            ),
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.entry.is_none() || self.sync_pending
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut tasks = Vec::new();
        if self.entry.is_none() {
            tasks.push(format!("ensure_group:{}", self.config.default_group));
        }
        if self.sync_pending {
            tasks.push(format!("sync_membership:{}", self.config.default_group));
        }
        tasks
    }

    fn on_timer(&mut self) {
        self.sync_pending = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, DhcpOptions, LogicalSwitchPort};
    use crate::error::BackendError;
    use crate::lsp::LspType;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const GROUP: &str = "default_ha_chassis_group";

    #[derive(Default)]
    struct MockBackend {
        groups: Mutex<BTreeSet<String>>,
        rows: Mutex<Vec<LogicalSwitchPort>>,
        members: Mutex<BTreeSet<PortId>>,
        unavailable: Mutex<bool>,
        refuse_removals: Mutex<bool>,
    }

    impl MockBackend {
        fn check(&self, op: &str) -> BackendResult<()> {
            if *self.unavailable.lock() {
                Err(BackendError::unavailable(op, "mock down"))
            } else {
                Ok(())
            }
        }

        fn external_row(name: &str) -> LogicalSwitchPort {
            LogicalSwitchPort {
                name: name.to_string(),
                lsp_type: LspType::External,
                options: Default::default(),
                ha_chassis_group: Some(GROUP.to_string()),
            }
        }
    }

    #[async_trait]
    impl BackendPortStore for MockBackend {
        async fn get_port(&self, port_id: &str) -> BackendResult<Option<LogicalSwitchPort>> {
            Ok(self.rows.lock().iter().find(|r| r.name == port_id).cloned())
        }
        async fn list_ports(&self) -> BackendResult<Vec<LogicalSwitchPort>> {
            self.check("list_ports")?;
            Ok(self.rows.lock().clone())
        }
        async fn put_port(&self, row: LogicalSwitchPort) -> BackendResult<()> {
            self.rows.lock().push(row);
            Ok(())
        }
        async fn delete_port(&self, port_id: &str) -> BackendResult<()> {
            self.rows.lock().retain(|r| r.name != port_id);
            Ok(())
        }
        async fn ensure_group(&self, group: &str) -> BackendResult<bool> {
            self.check("ensure_group")?;
            Ok(self.groups.lock().insert(group.to_string()))
        }
        async fn group_members(&self, _group: &str) -> BackendResult<BTreeSet<PortId>> {
            self.check("group_members")?;
            Ok(self.members.lock().clone())
        }
        async fn add_to_group(&self, _group: &str, port_id: &str) -> BackendResult<()> {
            self.check("add_to_group")?;
            self.members.lock().insert(port_id.to_string());
            Ok(())
        }
        async fn remove_from_group(&self, _group: &str, port_id: &str) -> BackendResult<()> {
            self.check("remove_from_group")?;
            if *self.refuse_removals.lock() {
                return Err(BackendError::unavailable("remove_from_group", "mock refused"));
            }
            self.members.lock().remove(port_id);
            Ok(())
        }
        async fn get_dhcp_options(&self, _subnet_id: &str) -> BackendResult<Option<DhcpOptions>> {
            Ok(None)
        }
        async fn put_dhcp_options(&self, _options: DhcpOptions) -> BackendResult<()> {
            Ok(())
        }
    }

    fn orch_with(backend: Arc<MockBackend>) -> HaChassisGroupOrch {
        let mut orch = HaChassisGroupOrch::new(HaChassisGroupOrchConfig {
            default_group: GROUP.to_string(),
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1)),
        });
        orch.set_backend(backend);
        orch
    }

    // ========== Group Lifecycle ==========

    #[tokio::test]
    async fn test_ensure_default_group() {
        let backend = Arc::new(MockBackend::default());
        let mut orch = orch_with(backend.clone());

        assert!(!orch.is_ready());
        assert!(orch.ensure_default_group().await.unwrap());
        assert!(!orch.ensure_default_group().await.unwrap());
        assert!(orch.is_ready());
        assert_eq!(orch.stats().groups_created, 1);
        assert!(backend.groups.lock().contains(GROUP));
    }

    #[tokio::test]
    async fn test_no_backend_set() {
        let mut orch = HaChassisGroupOrch::new(HaChassisGroupOrchConfig::default());
        assert!(matches!(
            orch.ensure_default_group().await,
            Err(HaChassisGroupOrchError::BackendNotSet)
        ));
    }

    #[tokio::test]
    async fn test_ensure_fails_when_backend_down() {
        let backend = Arc::new(MockBackend::default());
        *backend.unavailable.lock() = true;
        let mut orch = orch_with(backend);

        assert!(matches!(
            orch.ensure_default_group().await,
            Err(HaChassisGroupOrchError::Backend(_))
        ));
        assert!(!orch.is_ready());
    }

    // ========== Membership Sync ==========

    #[tokio::test]
    async fn test_sync_requires_group() {
        let mut orch = orch_with(Arc::new(MockBackend::default()));
        assert!(matches!(
            orch.sync_membership(&BTreeSet::new()).await,
            Err(HaChassisGroupOrchError::GroupNotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_repairs_drift() {
        let backend = Arc::new(MockBackend::default());
        backend.rows.lock().push(MockBackend::external_row("ext-1"));
        backend.rows.lock().push(LogicalSwitchPort::normal("plain"));
        backend.members.lock().insert("stale".to_string());

        let mut orch = orch_with(backend.clone());
        orch.ensure_default_group().await.unwrap();

        let expected = orch.expected_members().await.unwrap();
        assert_eq!(expected, BTreeSet::from(["ext-1".to_string()]));

        let summary = orch.sync_membership(&expected).await.unwrap();
        assert_eq!(summary.added, vec!["ext-1".to_string()]);
        assert_eq!(summary.removed, vec!["stale".to_string()]);
        assert_eq!(*backend.members.lock(), expected);
        assert!(orch.entry().unwrap().is_member("ext-1"));
        assert!(!orch.entry().unwrap().is_member("stale"));
        assert!(orch.entry().unwrap().last_sync.is_some());

        // Second run finds nothing to do
        let summary = orch.sync_membership(&expected).await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(orch.stats().sync_runs, 2);
        assert_eq!(orch.stats().members_added, 1);
        assert_eq!(orch.stats().members_removed, 1);
    }

    #[tokio::test]
    async fn test_partial_sync_tracks_backend_membership() {
        let backend = Arc::new(MockBackend::default());
        backend.rows.lock().push(MockBackend::external_row("ext-1"));
        backend.members.lock().insert("stale".to_string());
        *backend.refuse_removals.lock() = true;

        let mut orch = orch_with(backend.clone());
        orch.ensure_default_group().await.unwrap();
        let expected = orch.expected_members().await.unwrap();

        assert!(matches!(
            orch.sync_membership(&expected).await,
            Err(HaChassisGroupOrchError::Backend(_))
        ));
        let entry = orch.entry().unwrap();
        assert!(entry.is_member("ext-1"));
        assert!(entry.is_member("stale"));
        assert!(entry.last_sync.is_none());
        assert_eq!(orch.stats().sync_failures, 1);
    }

    // ========== Orch Trait ==========

    #[tokio::test]
    async fn test_orch_timer_drives_sync() {
        let backend = Arc::new(MockBackend::default());
        backend.rows.lock().push(MockBackend::external_row("ext-1"));
        let mut orch = orch_with(backend.clone());

        assert_eq!(orch.name(), "HaChassisGroupOrch");
        assert!(orch.has_pending_tasks());
        orch.do_task().await;
        assert!(!orch.has_pending_tasks());
        assert!(backend.members.lock().is_empty());

        orch.on_timer();
        assert_eq!(
            orch.dump_pending_tasks(),
            vec![format!("sync_membership:{}", GROUP)]
        );
        orch.do_task().await;
        assert!(!orch.has_pending_tasks());
        assert!(backend.members.lock().contains("ext-1"));
    }

    #[tokio::test]
    async fn test_failed_sync_stays_pending() {
        let backend = Arc::new(MockBackend::default());
        let mut orch = orch_with(backend.clone());
        orch.do_task().await;

        *backend.unavailable.lock() = true;
        orch.on_timer();
        orch.do_task().await;
        assert!(orch.has_pending_tasks());

        *backend.unavailable.lock() = false;
        orch.do_task().await;
        assert!(!orch.has_pending_tasks());
    }

    #[test]
    fn test_error_to_task_status() {
        use ovn_orch_common::TaskStatus;

        assert_eq!(
            TaskStatus::from(&TaskError::from(HaChassisGroupOrchError::BackendNotSet)),
            TaskStatus::Failed
        );
        assert_eq!(
            TaskStatus::from(&TaskError::from(HaChassisGroupOrchError::GroupNotReady(
                "g".to_string()
            ))),
            TaskStatus::NeedRetry
        );
        assert_eq!(
            TaskError::from(HaChassisGroupOrchError::Backend("down".to_string())),
            TaskError::backend("Backend error: down")
        );
    }
}
