//! Worker runner — the poll → claim → dispatch → complete loop.
//!
//! One job at a time: the runner issues one blocking call after another
//! and runs exactly one handler invocation to completion before polling
//! again. Activity is tracked so the worker can shut itself down after a
//! configured idle period.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{self, Instant};

use conveyor_core::AppResult;
use conveyor_core::config::AgentConfig;
use conveyor_core::traits::JobQueueApi;
use conveyor_core::types::{HandlerContext, Job, TaskIdentity};

use crate::registry::HandlerRegistry;

/// Delay after a failed iteration. Deliberately shorter than the poll
/// interval so a transient fault does not stall the worker, while still
/// preventing a tight retry storm.
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// The top-level worker loop.
pub struct WorkerRunner {
    /// Remote queue operations.
    queue: Arc<dyn JobQueueApi>,
    /// Job-type dispatch table, read-only while the loop runs.
    registry: HandlerRegistry,
    /// Job types this worker claims.
    job_types: HashSet<String>,
    /// Sleep between polls that yield no matching work.
    poll_interval: Duration,
    /// Self-terminate after this much inactivity; `None` disables.
    idle_timeout: Option<Duration>,
    /// Region reported to handlers.
    region: String,
    /// Identity of the hosting task, reported to handlers.
    task_identity: TaskIdentity,
}

impl std::fmt::Debug for WorkerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner")
            .field("job_types", &self.job_types)
            .field("poll_interval", &self.poll_interval)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl WorkerRunner {
    /// Create a runner over a queue client and a fully-built registry.
    pub fn new(
        queue: Arc<dyn JobQueueApi>,
        registry: HandlerRegistry,
        config: &AgentConfig,
        task_identity: TaskIdentity,
    ) -> Self {
        Self {
            queue,
            registry,
            job_types: config.job_type_list().into_iter().collect(),
            poll_interval: config.poll_interval(),
            idle_timeout: config.idle_timeout(),
            region: config.aws_region.clone(),
            task_identity,
        }
    }

    /// Run until the idle timeout fires or the stop signal flips.
    ///
    /// Errors inside an iteration are logged and followed by a short
    /// backoff; they never terminate the loop.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            "Worker started (types={:?}, poll_interval={:?}, idle_timeout={:?})",
            self.job_types,
            self.poll_interval,
            self.idle_timeout
        );

        let mut last_activity = Instant::now();

        loop {
            if *stop.borrow() {
                tracing::info!("Worker received stop signal");
                break;
            }

            let worked = match self.run_iteration(&mut last_activity).await {
                Ok(worked) => worked,
                Err(e) => {
                    tracing::error!("Worker iteration failed: {}", e);
                    if self.idle_expired(last_activity) {
                        tracing::info!("Idle timeout reached, shutting down");
                        break;
                    }
                    if sleep_or_stop(&mut stop, ERROR_BACKOFF).await {
                        break;
                    }
                    continue;
                }
            };

            if self.idle_expired(last_activity) {
                tracing::info!("Idle timeout reached, shutting down");
                break;
            }

            // Drain-style: when work was found, poll again immediately.
            if !worked && sleep_or_stop(&mut stop, self.poll_interval).await {
                break;
            }
        }

        tracing::info!("Worker loop stopped");
    }

    /// One iteration: poll, select, claim, dispatch, complete.
    ///
    /// Returns whether a job was selected this iteration (which skips the
    /// poll-interval sleep).
    async fn run_iteration(&self, last_activity: &mut Instant) -> AppResult<bool> {
        let entries = self.queue.poll().await?;

        let Some(job) = select_job(&entries, &self.job_types) else {
            return Ok(false);
        };

        tracing::info!("Matched job {} of type '{}'", job.id, job.job_type);
        *last_activity = Instant::now();

        let assignment = match self.queue.claim(&job).await {
            Ok(Some(assignment)) => assignment,
            Ok(None) => {
                tracing::debug!("Job {} was claimed by another worker", job.id);
                return Ok(true);
            }
            Err(e) => {
                tracing::warn!("Failed to claim job {}: {}", job.id, e);
                return Ok(true);
            }
        };

        *last_activity = Instant::now();
        tracing::info!(
            "Claimed assignment {} for job {} (outputs at '{}')",
            assignment.id,
            job.id,
            assignment.storage_uri
        );

        let ctx = HandlerContext {
            assignment_id: assignment.id,
            storage_uri: assignment.storage_uri.clone(),
            region: self.region.clone(),
            task_identity: self.task_identity.clone(),
        };

        let outcome = self
            .registry
            .dispatch(&job.job_type, job.input_payload.clone(), &ctx)
            .await;
        tracing::info!("Job {} finished with {:?}", job.id, outcome.status);

        let completion = self
            .queue
            .complete(assignment.id, outcome.status, outcome.result_payload)
            .await;

        // Activity counts whether or not the completion call landed.
        *last_activity = Instant::now();
        completion?;

        Ok(true)
    }

    fn idle_expired(&self, last_activity: Instant) -> bool {
        match self.idle_timeout {
            Some(timeout) => last_activity.elapsed() >= timeout,
            None => false,
        }
    }
}

/// Select the first poll entry whose type this worker processes.
///
/// Malformed entries are logged and skipped without aborting the poll;
/// entries after the first match are left for the next iteration.
fn select_job(entries: &[Value], job_types: &HashSet<String>) -> Option<Job> {
    for entry in entries {
        let job: Job = match serde_json::from_value(entry.clone()) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("Skipping malformed poll entry: {}", e);
                continue;
            }
        };

        if job_types.contains(&job.job_type) {
            return Some(job);
        }
    }
    None
}

/// Sleep, waking early on a stop signal. Returns whether to stop.
///
/// A closed channel counts as a stop signal; otherwise a dropped sender
/// would cancel every sleep and turn the loop into a tight poll storm.
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = time::sleep(duration) => false,
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Map, json};
    use tokio::sync::Mutex;

    use conveyor_core::AppError;
    use conveyor_core::types::{CompletionStatus, JobAssignment};

    use crate::registry::JobHandler;

    struct StubQueue {
        batches: Mutex<VecDeque<Vec<Value>>>,
        poll_error: Option<AppError>,
        poll_calls: AtomicUsize,
        grant_claims: bool,
        claimed: Mutex<Vec<i64>>,
        completed: Mutex<Vec<(i64, CompletionStatus, Map<String, Value>)>>,
    }

    impl StubQueue {
        fn new(batches: Vec<Vec<Value>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                poll_error: None,
                poll_calls: AtomicUsize::new(0),
                grant_claims: true,
                claimed: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
            }
        }

        fn failing(poll_error: AppError) -> Self {
            let mut queue = Self::new(vec![]);
            queue.poll_error = Some(poll_error);
            queue
        }

        fn denying_claims(batches: Vec<Vec<Value>>) -> Self {
            let mut queue = Self::new(batches);
            queue.grant_claims = false;
            queue
        }
    }

    #[async_trait]
    impl JobQueueApi for StubQueue {
        async fn poll(&self) -> AppResult<Vec<Value>> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.poll_error {
                return Err(error.clone());
            }
            Ok(self.batches.lock().await.pop_front().unwrap_or_default())
        }

        async fn claim(&self, job: &Job) -> AppResult<Option<JobAssignment>> {
            self.claimed.lock().await.push(job.id);
            if self.grant_claims {
                Ok(Some(JobAssignment {
                    id: job.id + 100,
                    storage_uri: format!("s3://outputs/{}", job.id),
                    job: None,
                }))
            } else {
                Ok(None)
            }
        }

        async fn complete(
            &self,
            assignment_id: i64,
            status: CompletionStatus,
            result_payload: Map<String, Value>,
        ) -> AppResult<()> {
            self.completed
                .lock()
                .await
                .push((assignment_id, status, result_payload));
            Ok(())
        }
    }

    struct CountingHandler {
        job_type: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        type Input = Value;
        type Output = Value;

        fn job_type(&self) -> &str {
            self.job_type
        }

        async fn run(&self, _input: Value, _ctx: &HandlerContext) -> Result<Value, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    fn config(poll_ms: u64, idle_ms: u64) -> AgentConfig {
        AgentConfig {
            api_endpoint: "https://queue.example.com".to_string(),
            job_types: "TEST".to_string(),
            worker_username: "worker@example.com".to_string(),
            worker_password: "secret".to_string(),
            aws_region: "ap-southeast-2".to_string(),
            s3_endpoint: None,
            poll_interval_ms: poll_ms,
            idle_timeout_ms: idle_ms,
        }
    }

    fn runner_with(
        queue: Arc<StubQueue>,
        registry: HandlerRegistry,
        poll_ms: u64,
        idle_ms: u64,
    ) -> WorkerRunner {
        WorkerRunner::new(
            queue,
            registry,
            &config(poll_ms, idle_ms),
            TaskIdentity::default(),
        )
    }

    fn types(list: &[&str]) -> HashSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_select_job_takes_first_matching_entry() {
        let entries = vec![
            json!({"id": 4, "type": "OTHER"}),
            json!({"id": 5, "type": "TEST"}),
            json!({"id": 7, "type": "TEST"}),
        ];
        let job = select_job(&entries, &types(&["TEST"])).expect("match");
        assert_eq!(job.id, 5);
    }

    #[test]
    fn test_select_job_skips_malformed_entries() {
        let entries = vec![
            json!({"id": "not-a-number", "type": "TEST"}),
            json!("garbage"),
            json!({"id": 9, "type": "TEST"}),
        ];
        let job = select_job(&entries, &types(&["TEST"])).expect("match");
        assert_eq!(job.id, 9);
    }

    #[test]
    fn test_select_job_none_when_no_type_matches() {
        let entries = vec![json!({"id": 4, "type": "OTHER"})];
        assert!(select_job(&entries, &types(&["TEST"])).is_none());
    }

    #[tokio::test]
    async fn test_first_match_is_claimed_and_completed() {
        let queue = Arc::new(StubQueue::new(vec![vec![
            json!({"id": 5, "type": "TEST"}),
            json!({"id": 6, "type": "OTHER"}),
            json!({"id": 7, "type": "TEST"}),
        ]]));

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(CountingHandler {
            job_type: "TEST",
            calls: calls.clone(),
        });

        let runner = runner_with(queue.clone(), registry, 10, 60);
        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), runner.run(rx))
            .await
            .expect("idle shutdown");

        // Only the first matching entry from the batch is claimed; job 7
        // would be picked up on a later poll.
        assert_eq!(*queue.claimed.lock().await, vec![5]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let completed = queue.completed.lock().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].0, 105);
        assert_eq!(completed[0].1, CompletionStatus::Succeeded);
        assert_eq!(completed[0].2["ok"], true);
    }

    #[tokio::test]
    async fn test_denied_claim_abandons_the_job() {
        let queue = Arc::new(StubQueue::denying_claims(vec![vec![
            json!({"id": 5, "type": "TEST"}),
        ]]));

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(CountingHandler {
            job_type: "TEST",
            calls: calls.clone(),
        });

        let runner = runner_with(queue.clone(), registry, 10, 60);
        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), runner.run(rx))
            .await
            .expect("idle shutdown");

        assert_eq!(*queue.claimed.lock().await, vec![5]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(queue.completed.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_type_reports_failed_outcome() {
        let queue = Arc::new(StubQueue::new(vec![vec![
            json!({"id": 5, "type": "TEST"}),
        ]]));

        let runner = runner_with(queue.clone(), HandlerRegistry::new(), 10, 60);
        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), runner.run(rx))
            .await
            .expect("idle shutdown");

        let completed = queue.completed.lock().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1, CompletionStatus::Failed);
        assert!(
            completed[0].2["error"]
                .as_str()
                .expect("error message")
                .contains("No handler registered")
        );
    }

    #[tokio::test]
    async fn test_idle_timeout_stops_the_loop() {
        let queue = Arc::new(StubQueue::new(vec![]));
        let runner = runner_with(queue, HandlerRegistry::new(), 10, 50);
        let (_tx, rx) = watch::channel(false);

        tokio::time::timeout(Duration::from_secs(5), runner.run(rx))
            .await
            .expect("loop must stop once idle");
    }

    #[tokio::test]
    async fn test_zero_idle_timeout_never_self_terminates() {
        let queue = Arc::new(StubQueue::new(vec![]));
        let runner = Arc::new(runner_with(queue, HandlerRegistry::new(), 5, 0));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished(), "loop must keep running when idle shutdown is disabled");

        tx.send(true).expect("send stop");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("stop signal must end the loop")
            .expect("join");
    }

    #[tokio::test]
    async fn test_poll_errors_back_off_and_do_not_kill_the_loop() {
        let queue = Arc::new(StubQueue::failing(AppError::transport("connection refused")));
        // Idle timeout well above one backoff: the loop must survive
        // several failed iterations before stopping on inactivity.
        let runner = runner_with(queue, HandlerRegistry::new(), 10, 1_200);
        let (_tx, rx) = watch::channel(false);

        tokio::time::timeout(Duration::from_secs(10), runner.run(rx))
            .await
            .expect("loop stops via idle timeout despite persistent errors");
    }

    #[tokio::test]
    async fn test_rejected_login_backs_off_and_the_loop_continues() {
        // Auth failures surface through poll like any other iteration
        // error: logged, backed off, never fatal to the loop.
        let queue = Arc::new(StubQueue::failing(AppError::authentication(
            "Login failed with status 401: invalid credentials",
        )));
        let runner = runner_with(queue.clone(), HandlerRegistry::new(), 10, 1_200);
        let (_tx, rx) = watch::channel(false);

        tokio::time::timeout(Duration::from_secs(10), runner.run(rx))
            .await
            .expect("loop stops via idle timeout, not the auth error");

        assert!(
            queue.poll_calls.load(Ordering::SeqCst) >= 2,
            "loop must keep iterating after an authentication error"
        );
    }

    #[tokio::test]
    async fn test_dropped_stop_sender_halts_instead_of_spinning() {
        let queue = Arc::new(StubQueue::new(vec![]));
        let runner = runner_with(queue.clone(), HandlerRegistry::new(), 10, 0);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), runner.run(rx))
            .await
            .expect("closed stop channel must end the loop");

        // The loop must stop at the first sleep rather than skipping
        // every sleep and polling in a tight storm.
        assert!(queue.poll_calls.load(Ordering::SeqCst) <= 2);
    }
}
