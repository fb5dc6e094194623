//! Job queue trait seam.
//!
//! The [`JobQueueApi`] trait is defined here in `conveyor-core` and
//! implemented by the HTTP client in `conveyor-client`. The worker loop
//! depends only on the trait, which keeps it testable with in-memory
//! doubles.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::result::AppResult;
use crate::types::{CompletionStatus, Job, JobAssignment};

/// Operations the worker loop performs against the remote job queue.
#[async_trait]
pub trait JobQueueApi: Send + Sync {
    /// Fetch the current list of candidate jobs.
    ///
    /// Entries are returned loosely typed exactly as the queue sent them;
    /// the caller parses each into a [`Job`] and skips malformed entries.
    async fn poll(&self) -> AppResult<Vec<Value>>;

    /// Attempt to claim a job for this worker.
    ///
    /// `Ok(None)` means the claim was benignly lost (another worker won
    /// the race); it is not an error.
    async fn claim(&self, job: &Job) -> AppResult<Option<JobAssignment>>;

    /// Report the terminal outcome of an assignment.
    async fn complete(
        &self,
        assignment_id: i64,
        status: CompletionStatus,
        result_payload: Map<String, Value>,
    ) -> AppResult<()>;
}
