//! Shared reqwest plumbing for the HTTP collaborators.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use super::retry::{AttemptError, RetryPolicy, retry_with_policy};
use crate::{Error, Result};

/// Build the client shared by the registry and submodel collaborators.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// GET `url` and decode the body as JSON, retrying transient failures.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    url: &str,
) -> Result<Value> {
    retry_with_policy(policy, url, || async move {
        let response = client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {status}");
            return Err(if is_retryable_status(status) {
                AttemptError::Transient(message)
            } else {
                AttemptError::Permanent(message)
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AttemptError::Permanent(format!("invalid JSON body: {e}")))
    })
    .await
}
