//! Outcome taxonomy for reconcile and maintenance work.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How one unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The backend was changed
    Success,
    /// Desired state already matched the backend; nothing written
    Unchanged,
    /// A newer revision was already applied
    Stale,
    /// The input could not be acted on
    InvalidEntry,
    /// The backend kept failing
    Failed,
    /// Work is left for a later round
    NeedRetry,
}

impl TaskStatus {
    /// True for every status that leaves the backend converged.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Unchanged | TaskStatus::Stale
        )
    }

    pub fn is_retryable(&self) -> bool {
        *self == TaskStatus::NeedRetry
    }

    /// True if another attempt with the same input cannot help.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::InvalidEntry | TaskStatus::Failed)
    }
}

/// Why a unit of work did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Rejected input: {message}")]
    Rejected { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    /// A precondition is not met yet
    #[error("Deferred: {reason}")]
    Deferred { reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TaskError {
    pub fn rejected(message: impl Into<String>) -> Self {
        TaskError::Rejected {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        TaskError::Backend {
            message: message.into(),
        }
    }

    pub fn deferred(reason: impl Into<String>) -> Self {
        TaskError::Deferred {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TaskError::Internal {
            message: message.into(),
        }
    }
}

impl From<&TaskError> for TaskStatus {
    fn from(e: &TaskError) -> Self {
        match e {
            TaskError::Rejected { .. } => TaskStatus::InvalidEntry,
            TaskError::Deferred { .. } => TaskStatus::NeedRetry,
            TaskError::Backend { .. } | TaskError::Internal { .. } => TaskStatus::Failed,
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Status view of a [`TaskResult`].
pub trait TaskResultExt {
    fn status(&self) -> TaskStatus;
}

impl<T> TaskResultExt for TaskResult<T> {
    fn status(&self) -> TaskStatus {
        match self {
            Ok(_) => TaskStatus::Success,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_converged_statuses() {
        for status in [TaskStatus::Success, TaskStatus::Unchanged, TaskStatus::Stale] {
            assert!(status.is_success(), "{:?}", status);
            assert!(!status.is_failure(), "{:?}", status);
        }
        assert!(TaskStatus::NeedRetry.is_retryable());
        assert!(!TaskStatus::NeedRetry.is_failure());
        assert!(TaskStatus::InvalidEntry.is_failure());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            TaskStatus::from(&TaskError::rejected("address outside subnet")),
            TaskStatus::InvalidEntry
        );
        assert_eq!(
            TaskStatus::from(&TaskError::deferred("group missing")),
            TaskStatus::NeedRetry
        );
        assert_eq!(
            TaskStatus::from(&TaskError::internal("no backend")),
            TaskStatus::Failed
        );
    }

    #[test]
    fn test_result_status() {
        let ok: TaskResult<u32> = Ok(7);
        assert_eq!(ok.status(), TaskStatus::Success);

        let err: TaskResult<u32> = Err(TaskError::backend("nb connection reset"));
        assert_eq!(err.status(), TaskStatus::Failed);
        assert_eq!(
            err.unwrap_err().to_string(),
            "Backend error: nb connection reset"
        );
    }
}
