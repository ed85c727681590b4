//! Uniform response envelope
//!
//! Every command result is wrapped into `{ code, message, data, errors }`
//! the same way regardless of which handler produced it:
//! - `message` is the body's `message`, or "Success"
//! - `data` is the whole body for 200/201, otherwise null
//! - `errors` is the body's `errors` for 422, otherwise null

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::validation::ValidationErrors;

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_SERVER_ERROR: u16 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: u16,
    pub message: String,
    pub data: Option<Value>,
    pub errors: Option<Value>,
}

impl ApiResponse {
    /// Wrap a raw `(status, body)` pair
    pub fn wrap(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Success")
            .to_string();

        let data = match status {
            STATUS_OK | STATUS_CREATED => Some(body.clone()),
            _ => None,
        };

        let errors = if status == STATUS_UNPROCESSABLE {
            body.get("errors").cloned()
        } else {
            None
        };

        Self {
            code: status,
            message,
            data,
            errors,
        }
    }

    pub fn ok<T: Serialize>(body: &T) -> Result<Self> {
        let body = serde_json::to_value(body).context("Failed to serialize response body")?;
        Ok(Self::wrap(STATUS_OK, body))
    }

    pub fn created<T: Serialize>(body: &T) -> Result<Self> {
        let body = serde_json::to_value(body).context("Failed to serialize response body")?;
        Ok(Self::wrap(STATUS_CREATED, body))
    }

    pub fn validation_failed(errors: &ValidationErrors) -> Self {
        Self::wrap(
            STATUS_UNPROCESSABLE,
            json!({
                "message": errors.to_string(),
                "errors": errors,
            }),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::wrap(STATUS_NOT_FOUND, json!({ "message": message.into() }))
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::wrap(STATUS_SERVER_ERROR, json!({ "message": message.into() }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize response")
    }
}
