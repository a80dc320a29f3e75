/// Top-level provis error type.
///
/// All fallible operations in `provis-core` return [`Result<T, ProvisError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum ProvisError {
    /// Error talking to one of the remote APIs (lineage, registry, jobs).
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Invalid use of the lineage explorer.
    #[error("Lineage error: {0}")]
    Lineage(#[from] LineageError),

    /// Invalid use of the job monitor.
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the remote HTTP collaborators.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// The API answered 200 but its status envelope reported failure.
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// True when the API reported that the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

/// Errors from the lineage explorer.
#[derive(thiserror::Error, Debug)]
pub enum LineageError {
    /// A record id was empty.
    #[error("record id must not be empty")]
    EmptyId,

    /// An operation needs a root record but none has been set.
    #[error("no root record set")]
    NoRoot,
}

/// Errors from the job monitor.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    /// A session or batch id was empty.
    #[error("job id must not be empty")]
    EmptyId,
}

/// Errors in provis configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, ProvisError>`.
pub type Result<T> = std::result::Result<T, ProvisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_is_passed_through() {
        let err = ProvisError::from(ApiError::Rejected("no such record".into()));
        assert_eq!(err.to_string(), "API error: no such record");
    }

    #[test]
    fn not_found_only_for_404() {
        let not_found = ApiError::Http {
            status: 404,
            body: String::new(),
        };
        let server = ApiError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!server.is_not_found());
        assert!(!ApiError::Network("refused".into()).is_not_found());
    }
}
