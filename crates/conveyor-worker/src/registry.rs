//! Handler registry — typed dispatch at the job-processing boundary.
//!
//! Handlers declare their input and output payload types; the registry
//! deserializes the raw queue payload into the input type before the
//! handler runs and reduces the output to a JSON object afterwards. Every
//! failure mode reduces to a FAILED outcome at the caller — dispatch never
//! panics or propagates across the worker loop.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use conveyor_core::AppError;
use conveyor_core::types::{CompletionStatus, HandlerContext};

/// Trait for typed job handler implementations.
///
/// The associated types are the job type's payload contract: the raw
/// input must deserialize into `Input`, and `Output` must serialize into
/// a JSON object (or null, which becomes an empty object) for transport.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Typed input payload.
    type Input: DeserializeOwned + Send;
    /// Typed result payload.
    type Output: Serialize + Send;

    /// The job type this handler processes.
    fn job_type(&self) -> &str;

    /// Execute the job. Runs to completion; the registry imposes no
    /// timeout.
    async fn run(&self, input: Self::Input, ctx: &HandlerContext) -> Result<Self::Output, AppError>;
}

/// Error from handler dispatch. Always job-level, never process-level.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for the job type.
    #[error("No handler registered for job type '{0}'")]
    NoHandler(String),

    /// The raw payload did not match the handler's input type.
    #[error("Invalid input payload for job type '{job_type}': {reason}")]
    InvalidInput {
        /// The dispatched job type.
        job_type: String,
        /// Deserialization failure detail.
        reason: String,
    },

    /// The handler itself returned an error.
    #[error("Handler for job type '{job_type}' failed: {source}")]
    HandlerFailed {
        /// The dispatched job type.
        job_type: String,
        /// The handler's error.
        #[source]
        source: AppError,
    },

    /// The handler's return value did not reduce to a result object.
    #[error("Invalid output for job type '{job_type}': {reason}")]
    InvalidOutput {
        /// The dispatched job type.
        job_type: String,
        /// Serialization failure detail.
        reason: String,
    },
}

/// The reduced result of a dispatch, ready to report to the queue.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// SUCCEEDED or FAILED.
    pub status: CompletionStatus,
    /// Result payload for the completion call; carries an `error` field
    /// on failure.
    pub result_payload: Map<String, Value>,
}

/// Object-safe wrapper over a typed handler.
#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(
        &self,
        job_type: &str,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Map<String, Value>, DispatchError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: JobHandler> ErasedHandler for Typed<H> {
    async fn call(
        &self,
        job_type: &str,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Map<String, Value>, DispatchError> {
        let typed_input: H::Input =
            serde_json::from_value(input).map_err(|e| DispatchError::InvalidInput {
                job_type: job_type.to_string(),
                reason: e.to_string(),
            })?;

        let output =
            self.0
                .run(typed_input, ctx)
                .await
                .map_err(|e| DispatchError::HandlerFailed {
                    job_type: job_type.to_string(),
                    source: e,
                })?;

        let serialized =
            serde_json::to_value(&output).map_err(|e| DispatchError::InvalidOutput {
                job_type: job_type.to_string(),
                reason: e.to_string(),
            })?;

        match serialized {
            Value::Object(map) => Ok(map),
            // An empty-shape output is reported as an empty object.
            Value::Null => Ok(Map::new()),
            other => Err(DispatchError::InvalidOutput {
                job_type: job_type.to_string(),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }
}

/// Maps job types to handlers and validates payloads in both directions.
///
/// Built once at startup and read-only while the loop runs; a later
/// registration for the same type overwrites the earlier one.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn ErasedHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared job type. Last write wins.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let job_type = handler.job_type().to_string();
        tracing::info!("Registered job handler for type '{}'", job_type);
        self.handlers.insert(job_type, Box::new(Typed(handler)));
    }

    /// Check if a handler is registered for a job type.
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// The list of registered job types.
    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Dispatch a raw payload to the registered handler.
    pub async fn try_dispatch(
        &self,
        job_type: &str,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Map<String, Value>, DispatchError> {
        let handler = self
            .handlers
            .get(job_type)
            .ok_or_else(|| DispatchError::NoHandler(job_type.to_string()))?;

        handler.call(job_type, input, ctx).await
    }

    /// Dispatch and reduce every failure to a FAILED outcome.
    pub async fn dispatch(
        &self,
        job_type: &str,
        input: Value,
        ctx: &HandlerContext,
    ) -> DispatchOutcome {
        match self.try_dispatch(job_type, input, ctx).await {
            Ok(result_payload) => DispatchOutcome {
                status: CompletionStatus::Succeeded,
                result_payload,
            },
            Err(e) => {
                tracing::warn!("Dispatch for assignment {} failed: {}", ctx.assignment_id, e);
                let mut result_payload = Map::new();
                result_payload.insert("error".to_string(), Value::String(e.to_string()));
                DispatchOutcome {
                    status: CompletionStatus::Failed,
                    result_payload,
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
