//! Error types for the durable sink

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// S001: Sink unreachable or connection failed
    S001Unreachable,
    /// S002: Configuration missing or invalid
    S002InvalidConfig,
    /// S003: Batch insert failed
    S003WriteFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S001Unreachable => "S001",
            Self::S002InvalidConfig => "S002",
            Self::S003WriteFailure => "S003",
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("[{code}] Durable sink unreachable: {reason}")]
    Unreachable { code: &'static str, reason: String },

    #[error("[{code}] Invalid sink configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    #[error("[{code}] Batch insert of {records} records failed: {reason}")]
    WriteFailure {
        code: &'static str,
        records: usize,
        reason: String,
    },
}

impl SinkError {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            code: ErrorCode::S001Unreachable.as_str(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::S002InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn write_failure(records: usize, reason: impl Into<String>) -> Self {
        Self::WriteFailure {
            code: ErrorCode::S003WriteFailure.as_str(),
            records,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { code, .. }
            | Self::InvalidConfig { code, .. }
            | Self::WriteFailure { code, .. } => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_code() {
        let err = SinkError::write_failure(3, "deadlock");
        assert_eq!(err.code(), "S003");
        assert_eq!(
            err.to_string(),
            "[S003] Batch insert of 3 records failed: deadlock"
        );
    }
}
