//! Common orchestration abstractions for the OVN port reconciler.
//!
//! This crate provides the core traits and types shared by the reconcilers
//! that drive the OVN northbound state:
//!
//! - [`Orch`]: Base trait for orchestration agents
//! - [`TaskStatus`] / [`TaskError`]: Result taxonomy for task processing
//! - [`RetryPolicy`]: Bounded exponential backoff around backend calls
//!
//! # Architecture
//!
//! The orchestration architecture follows an event-driven model:
//!
//! 1. The tenant layer reports a port or network change
//! 2. The change is queued on the owning network's worker
//! 3. The worker recomputes the derived state for every impacted port
//! 4. Differences are written to the northbound store, retried on failure
//! 5. Periodic maintenance (`Orch::on_timer`) repairs drift
//!
//! # Example
//!
//! ```ignore
//! use ovn_orch_common::{Orch, RetryPolicy};
//!
//! struct MyOrch {
//!     retry: RetryPolicy,
//! }
//!
//! #[async_trait]
//! impl Orch for MyOrch {
//!     fn name(&self) -> &str { "MyOrch" }
//!
//!     async fn do_task(&mut self) {
//!         let result = self.retry.run("write_row", || self.write_row()).await;
//!         if let Err(e) = result {
//!             log::error!("Failed: {}", e);
//!         }
//!     }
//! }
//! ```

mod orch;
mod retry;
mod task;

pub use orch::Orch;
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use task::{TaskError, TaskResult, TaskResultExt, TaskStatus};
