//! Client for the fal.ai queue API.
//!
//! A request is submitted to `{base}/{model}`, its status polled until
//! `COMPLETED`, then the result fetched. The whole exchange runs under one
//! deadline. Nothing is retried.

use std::time::Duration;

use reqwest::{Client, Response, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::config::{CredentialsConfig, FalConfig};
use crate::domains::tools::error::{OperationError, ToolError};

/// Reply to a queue submission.
#[derive(Debug, Deserialize)]
struct QueueSubmission {
    request_id: String,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
}

/// One status poll.
#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
    #[serde(default)]
    logs: Option<Vec<QueueLog>>,
}

#[derive(Debug, Deserialize)]
struct QueueLog {
    message: String,
}

/// Async queue client shared by the remote image tools.
#[derive(Debug, Clone)]
pub struct FalClient {
    client: Client,
    base_url: String,
    has_key: bool,
    poll_interval: Duration,
    timeout: Duration,
}

impl FalClient {
    /// Build a client authenticating with the configured key.
    pub fn new(config: &FalConfig, credentials: &CredentialsConfig) -> Result<Self, ToolError> {
        let mut headers = header::HeaderMap::new();

        if let Some(ref key) = credentials.fal_key {
            let mut value = header::HeaderValue::from_str(&format!("Key {}", key))
                .map_err(|_| ToolError::internal("Invalid API key format"))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ToolError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            has_key: credentials.fal_key.is_some(),
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        })
    }

    /// Submit `arguments` to `model` and wait for the result payload.
    ///
    /// `action` names the operation in error messages ("generating image").
    #[instrument(skip(self, arguments))]
    pub async fn subscribe(
        &self,
        model: &str,
        arguments: &Value,
        action: &'static str,
    ) -> Result<Value, OperationError> {
        if !self.has_key {
            return Err(OperationError::MissingCredential);
        }

        match tokio::time::timeout(self.timeout, self.run_queue(model, arguments, action)).await {
            Ok(result) => result,
            Err(_) => Err(OperationError::Timeout {
                action,
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    async fn run_queue(
        &self,
        model: &str,
        arguments: &Value,
        action: &'static str,
    ) -> Result<Value, OperationError> {
        let submit_url = format!("{}/{}", self.base_url, model);
        debug!(url = %submit_url, "Submitting request");

        let response = self
            .client
            .post(&submit_url)
            .json(arguments)
            .send()
            .await
            .map_err(|e| OperationError::http(action, e))?;
        let submission: QueueSubmission = read_json(response, action).await?;
        info!(request_id = %submission.request_id, "Request queued");

        let status_url = submission.status_url.unwrap_or_else(|| {
            format!(
                "{}/{}/requests/{}/status",
                self.base_url, model, submission.request_id
            )
        });
        let response_url = submission.response_url.unwrap_or_else(|| {
            format!(
                "{}/{}/requests/{}",
                self.base_url, model, submission.request_id
            )
        });

        let mut logs_seen = 0;
        loop {
            let response = self
                .client
                .get(&status_url)
                .query(&[("logs", "1")])
                .send()
                .await
                .map_err(|e| OperationError::http(action, e))?;
            let status: QueueStatus = read_json(response, action).await?;

            if let Some(logs) = status.logs {
                for log in logs.iter().skip(logs_seen) {
                    info!(target: "fal", "{}", log.message);
                }
                logs_seen = logs_seen.max(logs.len());
            }

            if status.status == "COMPLETED" {
                break;
            }
            debug!(status = %status.status, "Waiting for result");
            tokio::time::sleep(self.poll_interval).await;
        }

        let response = self
            .client
            .get(&response_url)
            .send()
            .await
            .map_err(|e| OperationError::http(action, e))?;
        read_json(response, action).await
    }
}

/// Reject non-2xx replies, then decode the JSON body.
async fn read_json<T>(response: Response, action: &'static str) -> Result<T, OperationError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OperationError::Api {
            action,
            status: status.as_u16(),
            body,
        });
    }

    let value: Value = response
        .json()
        .await
        .map_err(|e| OperationError::http(action, e))?;
    serde_json::from_value(value.clone())
        .map_err(|e| OperationError::UnexpectedResponse(format!("{} ({})", value, e)))
}
