use feedtally_cache::CacheError;
use feedtally_core::ValidationError;
use thiserror::Error;

/// Machine-readable error codes carried in every response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    /// 1000: missing, malformed or oversized request
    Params,
    /// 3000: cache could not be reached
    CacheUnavailable,
    /// 3001: cache reachable but the command failed
    CacheExec,
}

impl ErrorCode {
    pub fn code(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Params => 1000,
            Self::CacheUnavailable => 3000,
            Self::CacheExec => 3001,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Params => "params err",
            Self::CacheUnavailable => "redis server abnormal",
            Self::CacheExec => "redis exec fail",
        }
    }
}

/// Why one ingest call failed.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    // 400-level: Client errors
    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("Payload size {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    // 500-level: Server errors
    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    #[error("Cache command failed: {message}")]
    CacheFailed { message: String },
}

impl IngestError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::CacheUnavailable { .. } | Self::CacheFailed { .. } => 503,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest { .. } | Self::PayloadTooLarge { .. } => ErrorCode::Params,
            Self::CacheUnavailable { .. } => ErrorCode::CacheUnavailable,
            Self::CacheFailed { .. } => ErrorCode::CacheExec,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<ValidationError> for IngestError {
    fn from(err: ValidationError) -> Self {
        Self::invalid(err.to_string())
    }
}

impl From<CacheError> for IngestError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Unavailable(_) => Self::CacheUnavailable {
                message: err.to_string(),
            },
            CacheError::Command(_) | CacheError::Contention { .. } => Self::CacheFailed {
                message: err.to_string(),
            },
        }
    }
}
