//! Audit logging for northbound mutations.
//!
//! Every write the reconciler issues against the northbound store is recorded
//! as a structured [`AuditRecord`] and emitted on the `audit` tracing target,
//! so operators can reconstruct which event produced which row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    ResourceCreate,
    ResourceModify,
    ResourceDelete,
    /// Daemon start, stop and Orch registration
    SystemLifecycle,
    /// Network-level settings such as DHCP options
    NetworkConfig,
    /// Periodic drift repair
    Maintenance,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::ResourceCreate => "RESOURCE_CREATE",
            AuditCategory::ResourceModify => "RESOURCE_MODIFY",
            AuditCategory::ResourceDelete => "RESOURCE_DELETE",
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
            AuditCategory::NetworkConfig => "NETWORK_CONFIG",
            AuditCategory::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    /// Default until the action's result is known
    InProgress,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::InProgress => "in_progress",
        })
    }
}

/// Structured audit record.
///
/// Built with the `with_*` methods and emitted through [`audit_log!`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC time the record was created
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Component generating the event (e.g. "LspEngine")
    pub source: String,

    /// Operation performed (e.g. "put_port")
    pub action: String,

    pub outcome: AuditOutcome,

    /// Object identifier affected, such as a port or subnet UUID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Object type, such as "logical_switch_port" or "ha_chassis_group"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Error message if outcome is failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Create a new audit record with the current timestamp.
    ///
    /// The outcome defaults to InProgress until explicitly set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Set the error message and mark outcome as Failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    /// JSON form of the record, as carried in the `audit_json` field.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }

    /// Emits the record on the `audit` target.
    ///
    /// Success goes out at info, in-progress at debug, failure at warn.
    pub fn emit(&self) {
        let json = self.to_json();
        match self.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "audit",
                category = %self.category,
                source = %self.source,
                object = self.object_id.as_deref().unwrap_or("-"),
                audit_json = %json,
                "{} {}",
                self.action,
                self.outcome
            ),
            AuditOutcome::InProgress => tracing::debug!(
                target: "audit",
                category = %self.category,
                source = %self.source,
                object = self.object_id.as_deref().unwrap_or("-"),
                audit_json = %json,
                "{} {}",
                self.action,
                self.outcome
            ),
            AuditOutcome::Failure => tracing::warn!(
                target: "audit",
                category = %self.category,
                source = %self.source,
                object = self.object_id.as_deref().unwrap_or("-"),
                error = self.error.as_deref().unwrap_or(""),
                audit_json = %json,
                "{} {}",
                self.action,
                self.outcome
            ),
        }
    }
}

/// Emits an [`AuditRecord`](crate::audit::AuditRecord).
///
/// ```ignore
/// audit_log!(AuditRecord::new(AuditCategory::ResourceModify, "LspEngine", "put_port")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id(&port_id));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        $crate::audit::AuditRecord::emit(&$record)
    };
}

fn env_filter(log_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
}

/// Installs the JSON subscriber used in production.
///
/// `RUST_LOG` overrides `log_level`. Call once, before the first event.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_target(true),
        )
        .init();
}

/// Installs a multi-line human-readable subscriber.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}
