use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{document::Operation, id::AttemptId, result::FetchPolicy};

/// One pending, not-yet-sent mutation.
///
/// This is the durable half of an enqueued mutation. The update function and the caller's
/// observer cannot be persisted; they live in a transient side table keyed by `attempt_id` and
/// update functions are re-resolved by operation name after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueuedEffect {
    pub attempt_id: AttemptId,
    pub operation: Operation,
    /// Already evaluated against the variables at enqueue time.
    pub optimistic_response: Option<Value>,
    #[serde(default)]
    pub fetch_policy: FetchPolicy,
    pub enqueued_at: DateTime<Utc>,
}

impl EnqueuedEffect {
    pub fn new(operation: Operation, optimistic_response: Option<Value>, fetch_policy: FetchPolicy) -> Self {
        let attempt_id = operation.context.attempt_id.unwrap_or_default();
        let operation = Operation { context: operation.context.durable(), ..operation };
        Self { attempt_id, operation, optimistic_response, fetch_policy, enqueued_at: Utc::now() }
    }

    pub fn operation_name(&self) -> Option<&str> { self.operation.name() }

    /// Result key of the first root field, used to label callback records.
    pub fn mutation_field(&self) -> Option<&str> { self.operation.document.first_root_field() }
}

impl fmt::Display for EnqueuedEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} [{:#}]", self.operation, self.attempt_id) }
}
