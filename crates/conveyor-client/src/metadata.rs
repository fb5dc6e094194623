//! Execution-environment identity lookup.
//!
//! When running as an ECS task, the container runtime exposes a metadata
//! endpoint whose URI arrives in `ECS_CONTAINER_METADATA_URI_V4`. One GET
//! against its `/task` path yields the task and cluster ARNs that claim
//! requests report to the queue.

use serde::Deserialize;

use conveyor_core::types::TaskIdentity;
use conveyor_core::{AppError, AppResult};

/// Environment variable carrying the metadata endpoint base URI.
const METADATA_URI_ENV: &str = "ECS_CONTAINER_METADATA_URI_V4";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskMetadataResponse {
    #[serde(rename = "TaskARN", default)]
    task_arn: Option<String>,
    #[serde(default)]
    cluster: Option<String>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    availability_zone: Option<String>,
}

/// Fetch the hosting task's identity from the metadata endpoint.
///
/// Fails when the metadata URI is not set (not running under ECS), the
/// endpoint is unreachable, or the response cannot be parsed.
pub async fn task_identity(http: &reqwest::Client) -> AppResult<TaskIdentity> {
    let base = std::env::var(METADATA_URI_ENV).map_err(|_| {
        AppError::not_found(format!("{METADATA_URI_ENV} is not set"))
    })?;

    let response = http
        .get(format!("{base}/task"))
        .send()
        .await
        .map_err(|e| AppError::transport(format!("Task metadata request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::protocol(format!(
            "Task metadata endpoint returned status {}",
            status.as_u16()
        )));
    }

    let body: TaskMetadataResponse = response.json().await.map_err(|e| {
        AppError::protocol(format!("Task metadata response was not valid JSON: {e}"))
    })?;

    Ok(identity_from_metadata(body))
}

/// Non-failing variant: an all-absent identity on any retrieval error.
pub async fn task_identity_or_unknown(http: &reqwest::Client) -> TaskIdentity {
    match task_identity(http).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!("Task identity unavailable: {}", e);
            TaskIdentity::default()
        }
    }
}

fn identity_from_metadata(meta: TaskMetadataResponse) -> TaskIdentity {
    let id = meta
        .task_arn
        .as_deref()
        .and_then(|arn| arn.rsplit('/').next())
        .map(str::to_string);

    TaskIdentity {
        id,
        arn: meta.task_arn,
        cluster_arn: meta.cluster,
        family: meta.family,
        revision: meta.revision,
        zone: meta.availability_zone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_is_final_arn_segment() {
        let identity = identity_from_metadata(TaskMetadataResponse {
            task_arn: Some(
                "arn:aws:ecs:ap-southeast-2:123456789012:task/render/0f3a9b".to_string(),
            ),
            cluster: Some("arn:aws:ecs:ap-southeast-2:123456789012:cluster/render".to_string()),
            family: Some("conveyor-worker".to_string()),
            revision: Some("7".to_string()),
            availability_zone: Some("ap-southeast-2a".to_string()),
        });

        assert_eq!(identity.id.as_deref(), Some("0f3a9b"));
        assert_eq!(identity.family.as_deref(), Some("conveyor-worker"));
        assert_eq!(identity.zone.as_deref(), Some("ap-southeast-2a"));
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let identity = identity_from_metadata(TaskMetadataResponse {
            task_arn: None,
            cluster: None,
            family: None,
            revision: None,
            availability_zone: None,
        });
        assert_eq!(identity, TaskIdentity::default());
    }

    #[test]
    fn test_metadata_response_parses_runtime_shape() {
        let meta: TaskMetadataResponse = serde_json::from_value(serde_json::json!({
            "TaskARN": "arn:aws:ecs:ap-southeast-2:1:task/c/abc",
            "Cluster": "arn:aws:ecs:ap-southeast-2:1:cluster/c",
            "Family": "worker",
            "Revision": "3",
            "AvailabilityZone": "ap-southeast-2b",
            "Containers": []
        }))
        .expect("parse");
        assert_eq!(meta.revision.as_deref(), Some("3"));
    }
}
