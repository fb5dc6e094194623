//! Shared domain types exchanged with the job queue API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work as advertised by the queue's poll endpoint.
///
/// Immutable once received; the queue owns the job until it is claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Queue-assigned job identifier.
    pub id: i64,
    /// Job type identifier used for handler dispatch.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Untyped input payload; typed at handler dispatch.
    #[serde(rename = "inputPayload", default)]
    pub input_payload: Value,
}

/// The result of successfully claiming a job.
///
/// Represents this worker's exclusive ownership of the job until a result
/// is reported. Assignments are not renewed or heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAssignment {
    /// Queue-assigned assignment identifier.
    pub id: i64,
    /// Object-storage location for this assignment's outputs.
    #[serde(rename = "storageUri")]
    pub storage_uri: String,
    /// The claimed job, when echoed back by the queue.
    #[serde(default)]
    pub job: Option<Job>,
}

/// Terminal outcome of a processed job, as reported to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    /// The handler ran and produced a valid result.
    Succeeded,
    /// The job failed (handler error or payload validation failure).
    Failed,
}

/// Identity of the hosting task, as reported by the container runtime.
///
/// All fields are absent when running outside the managed execution
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskIdentity {
    /// Short task identifier (final segment of the task ARN).
    pub id: Option<String>,
    /// Full task ARN.
    pub arn: Option<String>,
    /// ARN of the cluster hosting the task.
    pub cluster_arn: Option<String>,
    /// Task definition family.
    pub family: Option<String>,
    /// Task definition revision.
    pub revision: Option<String>,
    /// Availability zone the task runs in.
    pub zone: Option<String>,
}

/// Per-job context handed to handlers alongside their typed input.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// The assignment being processed.
    pub assignment_id: i64,
    /// Object-storage location for the job's outputs.
    pub storage_uri: String,
    /// Region handlers should use for storage operations.
    pub region: String,
    /// Identity of the hosting task.
    pub task_identity: TaskIdentity,
}
