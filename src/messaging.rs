//! # Messaging
//!
//! Outbound notification collaborators.
//!
//! - [`MessagingClient`]: posts a structured message to one chat channel
//!   ([`SlackClient`] talks to the Slack Web API)
//! - [`StatusReporter`]: records a successful deployment with a deployment
//!   status service ([`DeployStatusClient`])
//!
//! Both have a disabled variant for installations without credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Structured chat message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub title: String,
    /// Plain-text summary shown by clients that can't render attachments
    pub fallback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },
}

/// Posts messages to chat channels
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Post `attachment` to `channel`, returning the (channel id, message timestamp) pair
    async fn post_message(
        &self,
        channel: &str,
        attachment: &Attachment,
    ) -> Result<(String, String), MessagingError>;
}

/// Reports successful deployments
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn post_status(&self, name: &str, environment: &str, tag: &str)
        -> Result<(), MessagingError>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}

/// Slack Web API `chat.postMessage` client
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"***")
            .finish_non_exhaustive()
    }
}

impl SlackClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    attachments: [&'a Attachment; 1],
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    ts: String,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl MessagingClient for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        attachment: &Attachment,
    ) -> Result<(String, String), MessagingError> {
        let transport = |e: reqwest::Error| MessagingError::Transport {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        };

        let response: PostMessageResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel,
                attachments: [attachment],
            })
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;

        if !response.ok {
            return Err(MessagingError::Rejected {
                endpoint: self.endpoint.clone(),
                message: response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        debug!(channel, ts = %response.ts, "posted message");
        Ok((response.channel, response.ts))
    }
}

/// HTTP deployment status client
#[derive(Debug, Clone)]
pub struct DeployStatusClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DeployStatusClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct DeployStatus<'a> {
    name: &'a str,
    environment: &'a str,
    tag: &'a str,
}

#[async_trait]
impl StatusReporter for DeployStatusClient {
    async fn post_status(
        &self,
        name: &str,
        environment: &str,
        tag: &str,
    ) -> Result<(), MessagingError> {
        self.http
            .post(&self.endpoint)
            .json(&DeployStatus {
                name,
                environment,
                tag,
            })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MessagingError::Transport {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Messaging and status reporting turned off
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

#[async_trait]
impl MessagingClient for Disabled {
    async fn post_message(
        &self,
        channel: &str,
        _attachment: &Attachment,
    ) -> Result<(String, String), MessagingError> {
        debug!(channel, "messaging disabled, dropping message");
        Ok((channel.to_string(), String::new()))
    }
}

#[async_trait]
impl StatusReporter for Disabled {
    async fn post_status(
        &self,
        _name: &str,
        _environment: &str,
        _tag: &str,
    ) -> Result<(), MessagingError> {
        Ok(())
    }
}
