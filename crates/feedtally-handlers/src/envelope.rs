use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// `{"status": 1|0, "message": ..., "err_code": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: u8,
    pub message: String,
    pub err_code: u32,
    pub data: Value,
}

impl ResponseEnvelope {
    pub fn success(data: Value) -> Self {
        Self {
            status: 1,
            message: ErrorCode::Success.message().to_string(),
            err_code: ErrorCode::Success.code(),
            data,
        }
    }

    /// Clients key off `err_code`; `message` is the fixed label for that code.
    pub fn failure(code: ErrorCode) -> Self {
        Self {
            status: 0,
            message: code.message().to_string(),
            err_code: code.code(),
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}
