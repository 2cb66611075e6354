//! `(name, args...)` commands answered on channel 0.

use crate::commands::{Console, Verdict};
use crate::ipc::client::Client;
use crate::ipc::value::Value;

/// Outcome of a simple response: the verdict and anything worth printing.
pub fn classify(value: &Value) -> (Verdict, Option<String>) {
    match value {
        Value::None => (Verdict::Success, None),
        Value::Bool(true) => (Verdict::Success, None),
        Value::Bool(false) => (Verdict::failed("daemon answered false"), None),
        Value::Int32(_) | Value::Int64(_) | Value::String(_) => (Verdict::Success, Some(value.to_string())),
        Value::Error(message) => (
            Verdict::Failed(String::from_utf8_lossy(message).into_owned()),
            None,
        ),
        other => (
            Verdict::failed(format!("unexpected {} response", other.type_code())),
            None,
        ),
    }
}

/// Print any payload and return the verdict.
pub fn finish(value: Value, console: &Console) -> Verdict {
    let (verdict, output) = classify(&value);
    if let Some(output) = output {
        console.line(output);
    }
    verdict
}

pub async fn run(client: &Client, request: Value, console: &Console) -> Verdict {
    match client.request(request).await {
        Ok(value) => finish(value, console),
        Err(e) => Verdict::from(e),
    }
}
