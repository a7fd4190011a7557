//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for all orchestration agents.
///
/// Each Orch module implements this trait to participate in the daemon's
/// maintenance loop. Event-driven reconciliation runs on per-network
/// workers; Orchs own the state that outlives individual events.
///
/// # Lifecycle
///
/// 1. Construction: Orch is created with its backend handles
/// 2. Registration: Orch is registered with the daemon by priority
/// 3. Timer: `on_timer()` marks periodic work as pending
/// 4. Event Loop: `do_task()` is called while work is pending
/// 5. Shutdown: Orch is dropped
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending work.
    ///
    /// Implementations should drain everything marked pending and handle
    /// failures themselves (retry, log, leave pending for the next round).
    async fn do_task(&mut self);

    /// Returns the priority of this Orch (lower = higher priority).
    ///
    /// Default is 0 (highest priority).
    fn priority(&self) -> i32 {
        0
    }

    /// Returns true if this Orch has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }

    /// Called periodically by the daemon's timer.
    fn on_timer(&mut self) {
        // Default: no-op
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestOrch {
        name: String,
        pending: bool,
        task_count: usize,
    }

    #[async_trait]
    impl Orch for TestOrch {
        fn name(&self) -> &str {
            &self.name
        }

        async fn do_task(&mut self) {
            self.task_count += 1;
            self.pending = false;
        }

        fn has_pending_tasks(&self) -> bool {
            self.pending
        }

        fn on_timer(&mut self) {
            self.pending = true;
        }
    }

    #[tokio::test]
    async fn test_orch_trait() {
        let mut orch = TestOrch {
            name: "test".to_string(),
            pending: false,
            task_count: 0,
        };

        assert_eq!(orch.name(), "test");
        assert_eq!(orch.priority(), 0);
        assert!(!orch.has_pending_tasks());
        assert!(orch.dump_pending_tasks().is_empty());

        orch.on_timer();
        assert!(orch.has_pending_tasks());

        orch.do_task().await;
        assert_eq!(orch.task_count, 1);
        assert!(!orch.has_pending_tasks());
    }
}
