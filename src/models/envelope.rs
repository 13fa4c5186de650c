//! Response envelope used by every backend endpoint
//!
//! `{ "success": bool, "data"?: T, "error"?: string, "message"?: string }`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Standard backend response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Returns `data`, or an `Api` error carrying the backend's reason.
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ClientError::Api(
                self.error
                    .or(self.message)
                    .unwrap_or_else(|| "Request was not successful".to_string()),
            ))
        }
    }
}

/// Decodes `data` out of an enveloped body.
///
/// Bodies without a `success` field are treated as bare payloads so plain
/// JSON endpoints can go through the same path.
pub fn unwrap_envelope<T: DeserializeOwned>(body: Value) -> Result<T> {
    let is_envelope = body
        .as_object()
        .is_some_and(|obj| obj.get("success").is_some_and(Value::is_boolean));

    if !is_envelope {
        return Ok(serde_json::from_value(body)?);
    }

    let envelope: ApiEnvelope<Value> = serde_json::from_value(body)?;
    let data = envelope.into_result()?.unwrap_or(Value::Null);
    Ok(serde_json::from_value(data)?)
}

/// Human-readable error text from a JSON error body: `error`, then
/// `message`, as long as either is a non-empty string.
pub fn error_message_from_body(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|field| {
        body.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}
