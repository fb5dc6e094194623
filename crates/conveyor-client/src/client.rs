//! Job queue HTTP client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use conveyor_auth::AuthSession;
use conveyor_core::traits::JobQueueApi;
use conveyor_core::types::{CompletionStatus, Job, JobAssignment, TaskIdentity};
use conveyor_core::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    jobs: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest<'a> {
    job_id: i64,
    ecs_task_arn: Option<&'a str>,
    ecs_cluster_arn: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ClaimResponse {
    #[serde(default)]
    assignment: Option<JobAssignment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest {
    status: CompletionStatus,
    result_payload: Map<String, Value>,
}

/// Authenticated client for the job queue endpoints.
///
/// Every request carries a bearer token obtained from the session; the
/// unauthenticated auth endpoints live in `conveyor-auth` and are never
/// called from here.
#[derive(Debug, Clone)]
pub struct JobClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<AuthSession>,
    identity: TaskIdentity,
}

impl JobClient {
    /// Create a client against the given API base URL.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: Arc<AuthSession>,
        identity: TaskIdentity,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session,
            identity,
        }
    }

    async fn bearer(&self) -> AppResult<String> {
        self.session.valid_token().await
    }
}

#[async_trait]
impl JobQueueApi for JobClient {
    /// GET the current candidate jobs, left loosely typed for the caller.
    async fn poll(&self) -> AppResult<Vec<Value>> {
        let token = self.bearer().await?;
        let url = format!("{}/jobs/poll", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::transport(format!("Poll request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::protocol(format!(
                "Poll returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: PollResponse = response
            .json()
            .await
            .map_err(|e| AppError::protocol(format!("Poll response was not valid JSON: {e}")))?;

        Ok(body.jobs)
    }

    /// Claim a job; `Ok(None)` when the queue declined (benign race loss).
    async fn claim(&self, job: &Job) -> AppResult<Option<JobAssignment>> {
        let token = self.bearer().await?;
        let url = format!("{}/jobs/assign", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&ClaimRequest {
                job_id: job.id,
                ecs_task_arn: self.identity.arn.as_deref(),
                ecs_cluster_arn: self.identity.cluster_arn.as_deref(),
            })
            .send()
            .await
            .map_err(|e| AppError::transport(format!("Claim request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::protocol(format!(
                "Claim for job {} returned status {}: {}",
                job.id,
                status.as_u16(),
                body
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::transport(format!("Claim response read failed: {e}")))?;

        // An empty body means no assignment was handed out.
        if text.trim().is_empty() {
            return Ok(None);
        }

        let body: ClaimResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::protocol(format!("Claim response was not valid JSON: {e}")))?;

        Ok(body.assignment)
    }

    /// Report the terminal outcome for an assignment. Not retried on
    /// failure; the caller logs and moves on.
    async fn complete(
        &self,
        assignment_id: i64,
        status: CompletionStatus,
        result_payload: Map<String, Value>,
    ) -> AppResult<()> {
        let token = self.bearer().await?;
        let url = format!("{}/jobs/assignments/{}/result", self.base_url, assignment_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&CompleteRequest {
                status,
                result_payload,
            })
            .send()
            .await
            .map_err(|e| AppError::transport(format!("Completion request failed: {e}")))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::protocol(format!(
                "Completion for assignment {} returned status {}: {}",
                assignment_id,
                http_status.as_u16(),
                body
            )));
        }

        tracing::debug!(
            "Reported {:?} for assignment {}",
            status,
            assignment_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_request_wire_shape() {
        let body = serde_json::to_value(ClaimRequest {
            job_id: 5,
            ecs_task_arn: Some("arn:aws:ecs:ap-southeast-2:1:task/c/abc"),
            ecs_cluster_arn: None,
        })
        .expect("serialize");

        assert_eq!(body["jobId"], 5);
        assert_eq!(body["ecsTaskArn"], "arn:aws:ecs:ap-southeast-2:1:task/c/abc");
        assert!(body["ecsClusterArn"].is_null());
    }

    #[test]
    fn test_complete_request_wire_shape() {
        let mut payload = Map::new();
        payload.insert("frames".to_string(), Value::from(10));
        let body = serde_json::to_value(CompleteRequest {
            status: CompletionStatus::Succeeded,
            result_payload: payload,
        })
        .expect("serialize");

        assert_eq!(body["status"], "SUCCEEDED");
        assert_eq!(body["resultPayload"]["frames"], 10);
    }

    #[test]
    fn test_claim_response_tolerates_missing_assignment() {
        let parsed: ClaimResponse = serde_json::from_str("{}").expect("parse");
        assert!(parsed.assignment.is_none());
    }

    #[test]
    fn test_poll_response_tolerates_missing_jobs() {
        let parsed: PollResponse = serde_json::from_str("{}").expect("parse");
        assert!(parsed.jobs.is_empty());
    }
}
