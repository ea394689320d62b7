// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Cloud API messages endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use wacast_config::model::WhatsAppConfig;
use wacast_core::{
    AdapterType, HealthStatus, MessageSender, PluginAdapter, SendOutcome, TemplateMessage,
    WacastError,
};

use crate::types::{ErrorResponse, SendRequest, SendResponse};

/// Upper bound on a single HTTP exchange; the dispatch pool applies its own,
/// usually shorter, send timeout on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Cloud API client implementing [`MessageSender`].
///
/// Does not retry: a repeated POST can deliver the same template twice.
/// Retrying is the dispatch pipeline's decision.
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl CloudApiClient {
    /// Build a client from the `[whatsapp]` config section.
    pub fn new(config: &WhatsAppConfig) -> Result<Self, WacastError> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| WacastError::Config("whatsapp.access_token is not set".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                WacastError::Config(format!("invalid access token header value: {e}"))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| WacastError::Vendor {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        })
    }

    fn messages_url(&self, sender_id: &str) -> String {
        format!("{}/{}/{}/messages", self.base_url, self.api_version, sender_id)
    }
}

#[async_trait]
impl PluginAdapter for CloudApiClient {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, WacastError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WacastError> {
        Ok(())
    }
}

#[async_trait]
impl MessageSender for CloudApiClient {
    async fn send_template(
        &self,
        sender_id: &str,
        message: &TemplateMessage,
    ) -> Result<SendOutcome, WacastError> {
        let request = SendRequest::from(message);
        let response = self
            .client
            .post(self.messages_url(sender_id))
            .json(&request)
            .send()
            .await
            .map_err(|e| WacastError::Vendor {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| WacastError::Vendor {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(status = %status, template = %message.template_name, "send response received");

        if status.is_success() {
            let parsed: SendResponse =
                serde_json::from_str(&body).map_err(|e| WacastError::Vendor {
                    message: format!("failed to parse send response: {e}"),
                    source: Some(Box::new(e)),
                })?;
            return parsed
                .messages
                .into_iter()
                .next()
                .map(|m| SendOutcome::Accepted { message_id: m.id })
                .ok_or_else(|| WacastError::Vendor {
                    message: "send response carried no message id".into(),
                    source: None,
                });
        }

        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => {
                debug!(code = err.error.code, status = %status, "send rejected");
                Ok(SendOutcome::Rejected(err.error))
            }
            Err(_) => {
                warn!(status = %status, body = %body, "unstructured vendor error");
                Err(WacastError::Vendor {
                    message: format!("API returned {status}: {body}"),
                    source: None,
                })
            }
        }
    }
}
