// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Outbound SMS
//!
//! Fire-and-forget delivery of OTP codes. [`Notifier::send`] validates the
//! message and returns immediately; delivery happens on a background task and
//! failures are only logged.
//!
//! - [`SmsGateway`]: HTTP gateway client (Onfon-style JSON API)
//! - [`LogNotifier`]: writes messages to the log, for development

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Parallel requests per message.
const MAX_CONCURRENT_SENDS: usize = 5;

/// Upper bound for delivering one message to all recipients.
const DELIVERY_DEADLINE: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("sms client error: {0}")]
    Client(String),
}

/// An SMS to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub destination_phones: Vec<String>,
    pub keyword: String,
    pub message: String,
}

impl SmsMessage {
    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.destination_phones.is_empty() {
            return Err(NotifyError::MissingField("destination phones"));
        }
        if self.message.is_empty() {
            return Err(NotifyError::MissingField("message"));
        }
        Ok(())
    }
}

/// Fire-and-forget message sender.
pub trait Notifier: Send + Sync {
    /// Validate and queue a message. Returns before delivery completes.
    fn send(&self, sms: SmsMessage) -> Result<(), NotifyError>;
}

/// Gateway credentials.
#[derive(Clone)]
pub struct SmsAuth {
    pub api_url: String,
    pub api_key: String,
    pub client_id: String,
    pub sender_id: String,
    pub access_key: String,
}

impl std::fmt::Debug for SmsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsAuth")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("sender_id", &self.sender_id)
            .finish_non_exhaustive()
    }
}

impl SmsAuth {
    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.api_url.is_empty() {
            return Err(NotifyError::MissingField("api url"));
        }
        if self.client_id.is_empty() {
            return Err(NotifyError::MissingField("client id"));
        }
        if self.api_key.is_empty() {
            return Err(NotifyError::MissingField("api key"));
        }
        if self.sender_id.is_empty() {
            return Err(NotifyError::MissingField("sender id"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageParameter<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GatewayPayload<'a> {
    sender_id: &'a str,
    is_unicode: bool,
    is_flash: bool,
    message_parameters: [MessageParameter<'a>; 1],
    api_key: &'a str,
    client_id: &'a str,
}

/// HTTP SMS gateway client.
#[derive(Clone)]
pub struct SmsGateway {
    auth: Arc<SmsAuth>,
    /// Prefix for every message (e.g. `[staging] `); empty in production.
    env_prefix: String,
    http: Client,
}

impl SmsGateway {
    pub fn new(auth: SmsAuth, env_prefix: impl Into<String>) -> Result<Self, NotifyError> {
        auth.validate()?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Client(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            auth: Arc::new(auth),
            env_prefix: env_prefix.into(),
            http,
        })
    }

    async fn deliver(&self, phone: String, text: Arc<str>) -> Result<(), NotifyError> {
        let payload = GatewayPayload {
            sender_id: &self.auth.sender_id,
            is_unicode: true,
            is_flash: true,
            message_parameters: [MessageParameter {
                number: &phone,
                text: &text,
            }],
            api_key: &self.auth.api_key,
            client_id: &self.auth.client_id,
        };

        let response = self
            .http
            .post(&self.auth.api_url)
            .header("AccessKey", &self.auth.access_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Client(format!("{phone}: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| NotifyError::Client(format!("{phone}: invalid response: {e}")))?;

        if gateway_accepted(&body) {
            debug!(phone = %phone, "sms accepted by gateway");
            Ok(())
        } else {
            Err(NotifyError::Client(format!("{phone}: gateway rejected message: {body}")))
        }
    }
}

/// The gateway reports success with `ErrorCode: 0` (number or string).
fn gateway_accepted(body: &Value) -> bool {
    match body.get("ErrorCode") {
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        Some(Value::String(s)) => s == "0",
        _ => false,
    }
}

impl Notifier for SmsGateway {
    fn send(&self, sms: SmsMessage) -> Result<(), NotifyError> {
        sms.validate()?;

        let gateway = self.clone();
        let text: Arc<str> = format!("{}{}", self.env_prefix, sms.message).into();
        let keyword = sms.keyword;

        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_SENDS));
            let mut tasks = tokio::task::JoinSet::new();
            for phone in sms.destination_phones {
                let gateway = gateway.clone();
                let text = Arc::clone(&text);
                let permits = Arc::clone(&permits);
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    gateway.deliver(phone, text).await
                });
            }

            let collect = async {
                while let Some(result) = tasks.join_next().await {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(keyword = %keyword, error = %e, "sms delivery failed"),
                        Err(e) => warn!(keyword = %keyword, error = %e, "sms task failed"),
                    }
                }
            };
            if tokio::time::timeout(DELIVERY_DEADLINE, collect).await.is_err() {
                warn!(keyword = %keyword, "sms delivery deadline exceeded");
            }
        });

        Ok(())
    }
}

/// Notifier that only logs. Codes are logged at debug level.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, sms: SmsMessage) -> Result<(), NotifyError> {
        sms.validate()?;
        info!(
            keyword = %sms.keyword,
            recipients = sms.destination_phones.len(),
            "sms not sent (no gateway configured)"
        );
        debug!(phones = ?sms.destination_phones, message = %sms.message, "sms body");
        Ok(())
    }
}
