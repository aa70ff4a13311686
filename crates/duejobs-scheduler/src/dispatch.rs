use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Result, SchedulerError},
    registry::JobHandler,
    types::JobRecord,
};

/// Encode call arguments as the stored JSON array.
///
/// Sequences (arrays, tuples, `Vec`s) become the positional arguments, `()`
/// or `null` means no arguments, and any other value is a single argument.
pub fn encode_args<A: Serialize + ?Sized>(args: &A) -> Result<String> {
    let value = serde_json::to_value(args).map_err(SchedulerError::InvalidArgs)?;
    let seq = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    serde_json::to_string(&seq).map_err(SchedulerError::InvalidArgs)
}

/// Decode a stored argument blob. A JSON `null` is treated as no arguments.
pub fn decode_args(encoded: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(encoded)
        .map_err(|e| SchedulerError::MalformedArgs(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(SchedulerError::MalformedArgs(format!(
            "expected a JSON array, found {}",
            json_kind(&other)
        ))),
    }
}

/// Decode `job.args` and run `handler` with them.
///
/// Handler errors and panics come back as `HandlerFailure` / `HandlerPanicked`
/// so the caller can route them to the error observer.
pub async fn dispatch(handler: Arc<dyn JobHandler>, job: &JobRecord) -> Result<()> {
    let args = decode_args(&job.args)?;
    debug!(
        job_id = %job.job_id,
        job_type = %job.job_type,
        due_at = %job.due_at,
        run_at = ?job.run_at,
        argc = args.len(),
        "dispatching job"
    );

    match AssertUnwindSafe(handler.run(args)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(SchedulerError::HandlerFailure {
            job_type: job.job_type.clone(),
            source,
        }),
        Err(panic) => Err(SchedulerError::HandlerPanicked {
            job_type: job.job_type.clone(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
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
