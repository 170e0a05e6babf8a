//! Outbound response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use super::{ApiError, INTERNAL_ERROR_MESSAGE};

/// `{ success, data?, error?, message? }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Envelope,
}

impl Response {
    /// 200 with `data`.
    pub fn ok<T: Serialize>(data: &T) -> Self {
        Self::success(200, data, None)
    }

    /// 201 with the created record.
    pub fn created<T: Serialize>(data: &T) -> Self {
        Self::success(201, data, None)
    }

    /// 200 with a message and optional data.
    pub fn done<T: Serialize>(message: impl Into<String>, data: Option<&T>) -> Self {
        match data {
            Some(data) => Self::success(200, data, Some(message.into())),
            None => Self {
                status: 200,
                body: Envelope {
                    success: true,
                    data: None,
                    error: None,
                    message: Some(message.into()),
                },
            },
        }
    }

    fn success<T: Serialize>(status: u16, data: &T, message: Option<String>) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status,
                body: Envelope {
                    success: true,
                    data: Some(data),
                    error: None,
                    message,
                },
            },
            Err(e) => {
                error!(error = %e, "failed to serialize response data");
                Self::failure(500, "internal_error", INTERNAL_ERROR_MESSAGE)
            }
        }
    }

    pub fn failure(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: Envelope {
                success: false,
                data: None,
                error: Some(code.to_string()),
                message: Some(message.into()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.body.success
    }
}

impl From<&ApiError> for Response {
    fn from(err: &ApiError) -> Self {
        Response::failure(err.status(), err.code(), err.public_message())
    }
}
