use offgrid_proto::FetchResult;
use serde_json::Value;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tracing::error;

use crate::error::LinkError;

/// Outcome of a mutation that the server confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessRecord {
    /// Result key of the mutation's first root field.
    pub mutation: Option<String>,
    /// Variables as they were sent, after identifier substitution.
    pub variables: Value,
    pub data: FetchResult,
    /// Whether a waiting caller received the result directly.
    pub notified: bool,
}

/// Outcome of a mutation that was discarded.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub mutation: Option<String>,
    pub variables: Value,
    pub error: LinkError,
    pub notified: bool,
}

/// Invoked once per settled mutation with exactly one of the two records set.
pub type OfflineCallback = Arc<dyn Fn(Option<&ErrorRecord>, Option<&SuccessRecord>) + Send + Sync>;

/// Run the host callback. A panicking callback is logged and otherwise ignored so that it can't
/// wedge the outbox.
pub(crate) fn invoke(callback: Option<&OfflineCallback>, error: Option<&ErrorRecord>, success: Option<&SuccessRecord>) {
    let Some(callback) = callback else { return };
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(error, success))).is_err() {
        error!("Offline callback panicked while handling {:?}", error.map(|e| &e.mutation).or(success.map(|s| &s.mutation)));
    }
}
