use chainmigrate_migration::LedgerError;

/// Structured RPC error types for programmatic handling.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid endpoint {endpoint}: {cause}")]
    InvalidEndpoint { endpoint: String, cause: String },

    #[error("Connection to {url} failed: {cause}")]
    ConnectionFailed { url: String, cause: String },

    #[error("{method} timed out after {elapsed_ms}ms")]
    Timeout { method: String, elapsed_ms: u64 },

    #[error("{method} HTTP {status}: {body}")]
    HttpError {
        method: String,
        status: u16,
        body: String,
    },

    #[error("{method} JSON-RPC error {code}: {message}")]
    JsonRpcError {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} response parse error in {field}: {cause}")]
    ParseError {
        method: String,
        field: String,
        cause: String,
    },
}

impl RpcError {
    pub(crate) fn parse(
        method: impl Into<String>,
        field: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::ParseError {
            method: method.into(),
            field: field.into(),
            cause: cause.into(),
        }
    }
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::JsonRpcError {
                method, message, ..
            } => LedgerError::Rejected {
                operation: method,
                reason: message,
            },
            RpcError::ParseError {
                method,
                field,
                cause,
            } => LedgerError::Malformed {
                field: format!("{method}.{field}"),
                cause,
            },
            other => LedgerError::Transport(other.to_string()),
        }
    }
}
