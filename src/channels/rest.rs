use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::ChannelError;
use crate::dispatcher::ForwardingConfig;
use crate::message::Message;

/// JSON body posted to the user's endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RestPayload<'a> {
    message: &'a str,
    sender: &'a str,
    timestamp: &'a str,
    date_sent: &'a str,
    received_at: String,
}

impl<'a> RestPayload<'a> {
    fn new(message: &'a Message, received_at: DateTime<Utc>) -> Self {
        Self {
            message: &message.body,
            sender: &message.address,
            timestamp: &message.date,
            date_sent: &message.date_sent,
            received_at: received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Forwards messages to a user-supplied HTTP endpoint
pub struct RestChannel {
    client: reqwest::Client,
}

impl RestChannel {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn send(
        &self,
        config: &ForwardingConfig,
        message: &Message,
    ) -> Result<(), ChannelError> {
        // Everything that can fail locally is checked before any I/O
        let headers = parse_headers(&config.rest_api_headers)?;
        let method = parse_method(&config.rest_api_method)?;
        let url = config.rest_api_url.trim();
        let payload = RestPayload::new(message, Utc::now());

        debug!("Sending {} request to REST endpoint: {}", method, url);

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                service: "REST API",
                status: Some(status),
                detail,
            });
        }

        Ok(())
    }
}

/// Parse the user's header text, a JSON object of name to value.
/// Blank text means no extra headers.
pub fn parse_headers(text: &str) -> Result<HeaderMap, ChannelError> {
    let mut headers = HeaderMap::new();
    if text.trim().is_empty() {
        return Ok(headers);
    }

    let parsed: Value =
        serde_json::from_str(text).map_err(|e| ChannelError::InvalidHeaders(e.to_string()))?;
    let Value::Object(map) = parsed else {
        return Err(ChannelError::InvalidHeaders(
            "expected a JSON object of header names to values".to_string(),
        ));
    };

    for (name, value) in map {
        let value = match value {
            Value::String(s) => s,
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(ChannelError::InvalidHeader {
                    name,
                    reason: "value must be a string, number or boolean".to_string(),
                })
            }
            other => other.to_string(),
        };

        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ChannelError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|e| ChannelError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn parse_method(raw: &str) -> Result<Method, ChannelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Method::POST);
    }
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| ChannelError::InvalidMethod(raw.to_string()))
}
