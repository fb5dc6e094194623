//! Built-in job handlers registered by the agent binary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use conveyor_core::AppError;
use conveyor_core::types::HandlerContext;
use conveyor_storage::{ResultUploader, StorageUri};
use conveyor_worker::JobHandler;

/// End-to-end verification handler for the `PROBE` job type.
///
/// Echoes the job payload back as the result and writes a small marker
/// file to the assignment's storage location, proving the full
/// claim/dispatch/upload/complete path works for this worker.
pub struct ProbeHandler {
    uploader: Arc<ResultUploader>,
}

impl ProbeHandler {
    /// Create a probe handler using the given uploader.
    pub fn new(uploader: Arc<ResultUploader>) -> Self {
        Self { uploader }
    }
}

#[async_trait]
impl JobHandler for ProbeHandler {
    type Input = Value;
    type Output = Value;

    fn job_type(&self) -> &str {
        "PROBE"
    }

    async fn run(&self, input: Value, ctx: &HandlerContext) -> Result<Value, AppError> {
        tracing::info!("Running probe for assignment {}", ctx.assignment_id);

        let marker = serde_json::json!({
            "assignmentId": ctx.assignment_id,
            "region": ctx.region,
            "taskId": ctx.task_identity.id,
            "zone": ctx.task_identity.zone,
            "echo": input,
        });

        let local = std::env::temp_dir().join(format!("probe-{}.json", ctx.assignment_id));
        tokio::fs::write(&local, serde_json::to_vec_pretty(&marker)?).await?;

        let dest = StorageUri::parse(&ctx.storage_uri)?
            .join("probe.json")
            .to_string();
        let uploaded = self.uploader.upload(&local, &dest).await?;

        let _ = tokio::fs::remove_file(&local).await;

        Ok(serde_json::json!({
            "echo": input,
            "probeUri": uploaded,
        }))
    }
}
