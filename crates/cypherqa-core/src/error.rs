use std::fmt;

/// Core error type for the question-answering layer
#[derive(Debug)]
pub enum QaError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Caller input rejected before any I/O
    Validation(ValidationError),

    /// Text-generation backend failures
    Backend(BackendError),

    /// Graph store failures
    Store(StoreError),

    /// Internal system errors
    Internal(String),
}

pub type QaResult<T> = Result<T, QaError>;

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
    /// Missing required configuration parameter
    MissingParameter(String),

    /// Invalid configuration value
    InvalidValue {
        parameter: String,
        value: String,
        expected: String,
    },

    /// Configuration file not found
    FileNotFound(String),

    /// Invalid configuration format
    InvalidFormat(String),

    /// Environment variable resolution failed
    EnvironmentResolution(String),

    /// Credential resolution failed
    CredentialResolution(String),

    /// No backend implementation for the configured engine name
    UnsupportedEngine(String),
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty or whitespace-only question
    EmptyQuestion,

    /// Input too long
    TooLong { length: usize, max_length: usize },
}

/// Text-generation backend errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No completion within the configured bound
    Timeout { after_ms: u64 },

    /// Rate limit exceeded
    RateLimited { retry_after: Option<u64> },

    /// The backend refused the request as malformed
    InvalidRequest(String),

    /// Credentials missing or refused
    Unauthorized(String),

    /// Backend could not be reached
    Unreachable(String),

    /// Response did not have the expected shape
    MalformedResponse(String),

    /// Any other API error reported by the backend
    Api { status: Option<u16>, message: String },
}

/// Graph store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached or refused the session
    Unreachable(String),

    /// The store rejected the statement
    Syntax(String),

    /// Statement did not complete within the configured bound
    Timeout { after_ms: u64 },

    /// Row cap or server memory limit hit
    ResourceExceeded(String),

    /// Store-side failure not attributable to the statement
    Failed(String),
}

/// Flat classification of every failure the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    InvalidInput,
    Backend,
    UnparsableOutput,
    UnsafeQuery,
    Syntax,
    Timeout,
    ResourceExceeded,
    Config,
    Internal,
}

impl QaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QaError::Config(_) => ErrorKind::Config,
            QaError::Validation(_) => ErrorKind::InvalidInput,
            QaError::Backend(_) => ErrorKind::Backend,
            QaError::Store(e) => e.kind(),
            QaError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unreachable(_) => ErrorKind::Connectivity,
            StoreError::Failed(_) => ErrorKind::Internal,
            StoreError::Syntax(_) => ErrorKind::Syntax,
            StoreError::Timeout { .. } => ErrorKind::Timeout,
            StoreError::ResourceExceeded(_) => ErrorKind::ResourceExceeded,
        }
    }

    /// Classify a driver or server message.
    ///
    /// Neo4j reports failures as `Neo.<Classification>.<Category>.<Title>` status codes
    /// embedded in the message; driver-level failures carry plain I/O text.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let message = message.to_string();

        if lower.contains("memorypool")
            || lower.contains("outofmemory")
            || lower.contains("out of memory")
        {
            StoreError::ResourceExceeded(message)
        } else if lower.contains("transactiontimedout")
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            StoreError::Timeout { after_ms: 0 }
        } else if lower.contains("neo.clienterror.security")
            || lower.contains("authentication")
            || lower.contains("unauthorized")
        {
            StoreError::Unreachable(message)
        } else if lower.contains("neo.clienterror") || lower.contains("syntax") {
            StoreError::Syntax(message)
        } else if lower.contains("connection")
            || lower.contains("io error")
            || lower.contains("refused")
            || lower.contains("broken pipe")
            || lower.contains("unreachable")
            || lower.contains("dns")
            || lower.contains("routing")
        {
            StoreError::Unreachable(message)
        } else {
            StoreError::Failed(message)
        }
    }
}

impl fmt::Display for QaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QaError::Config(e) => write!(f, "Configuration error: {}", e),
            QaError::Validation(e) => write!(f, "Validation error: {}", e),
            QaError::Backend(e) => write!(f, "Backend error: {}", e),
            QaError::Store(e) => write!(f, "Graph store error: {}", e),
            QaError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingParameter(param) => {
                write!(f, "Missing required parameter: {}", param)
            }
            ConfigError::InvalidValue {
                parameter,
                value,
                expected,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for parameter '{}', expected: {}",
                    value, parameter, expected
                )
            }
            ConfigError::FileNotFound(file) => write!(f, "Configuration file not found: {}", file),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid configuration format: {}", msg),
            ConfigError::EnvironmentResolution(var) => {
                write!(f, "Failed to resolve environment variable: {}", var)
            }
            ConfigError::CredentialResolution(cred) => {
                write!(f, "Failed to resolve credential: {}", cred)
            }
            ConfigError::UnsupportedEngine(engine) => {
                write!(f, "Unsupported engine type: {}", engine)
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyQuestion => write!(f, "question must not be empty"),
            ValidationError::TooLong { length, max_length } => write!(
                f,
                "input too long: {} characters (max {})",
                length, max_length
            ),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Timeout { after_ms } => {
                write!(f, "no completion within {} ms", after_ms)
            }
            BackendError::RateLimited { retry_after } => match retry_after {
                Some(seconds) => write!(f, "rate limit exceeded, retry after {} seconds", seconds),
                None => write!(f, "rate limit exceeded"),
            },
            BackendError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            BackendError::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            BackendError::Unreachable(msg) => write!(f, "backend unreachable: {}", msg),
            BackendError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            BackendError::Api { status, message } => match status {
                Some(code) => write!(f, "API error (status {}): {}", code, message),
                None => write!(f, "API error: {}", message),
            },
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unreachable(msg) => write!(f, "store unreachable: {}", msg),
            StoreError::Syntax(msg) => write!(f, "statement rejected: {}", msg),
            StoreError::Timeout { after_ms } => {
                write!(f, "statement did not complete within {} ms", after_ms)
            }
            StoreError::ResourceExceeded(msg) => write!(f, "resource limit exceeded: {}", msg),
            StoreError::Failed(msg) => write!(f, "store failure: {}", msg),
        }
    }
}

impl std::error::Error for QaError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for BackendError {}
impl std::error::Error for StoreError {}

impl From<ConfigError> for QaError {
    fn from(err: ConfigError) -> Self {
        QaError::Config(err)
    }
}

impl From<ValidationError> for QaError {
    fn from(err: ValidationError) -> Self {
        QaError::Validation(err)
    }
}

impl From<BackendError> for QaError {
    fn from(err: BackendError) -> Self {
        QaError::Backend(err)
    }
}

impl From<StoreError> for QaError {
    fn from(err: StoreError) -> Self {
        QaError::Store(err)
    }
}

/// Conversion from anyhow::Error to QaError
impl From<anyhow::Error> for QaError {
    fn from(err: anyhow::Error) -> Self {
        QaError::Internal(err.to_string())
    }
}

/// Conversion from reqwest::Error to QaError
impl From<reqwest::Error> for QaError {
    fn from(err: reqwest::Error) -> Self {
        QaError::Backend(BackendError::from(err))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout { after_ms: 0 }
        } else if err.is_connect() {
            BackendError::Unreachable(err.to_string())
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Api {
                status: Some(status.as_u16()),
                message: err.to_string(),
            }
        } else {
            BackendError::Api {
                status: None,
                message: err.to_string(),
            }
        }
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        StoreError::classify(&err.to_string())
    }
}

impl From<neo4rs::Error> for QaError {
    fn from(err: neo4rs::Error) -> Self {
        QaError::Store(StoreError::from(err))
    }
}

/// Conversion from std::io::Error to QaError
impl From<std::io::Error> for QaError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                QaError::Config(ConfigError::FileNotFound(err.to_string()))
            }
            _ => QaError::Internal(err.to_string()),
        }
    }
}

/// Conversion from serde_json::Error to QaError
impl From<serde_json::Error> for QaError {
    fn from(err: serde_json::Error) -> Self {
        QaError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}

impl From<serde_yaml::Error> for QaError {
    fn from(err: serde_yaml::Error) -> Self {
        QaError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}

impl From<url::ParseError> for QaError {
    fn from(err: url::ParseError) -> Self {
        QaError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_neo4j_status_codes() {
        assert!(matches!(
            StoreError::classify("Neo.ClientError.Statement.SyntaxError: Invalid input 'RETRUN'"),
            StoreError::Syntax(_)
        ));
        assert!(matches!(
            StoreError::classify("Neo.ClientError.Transaction.TransactionTimedOut"),
            StoreError::Timeout { .. }
        ));
        assert!(matches!(
            StoreError::classify("Neo.TransientError.General.MemoryPoolOutOfMemoryError"),
            StoreError::ResourceExceeded(_)
        ));
        assert!(matches!(
            StoreError::classify("Neo.ClientError.Security.Unauthorized"),
            StoreError::Unreachable(_)
        ));
        assert!(matches!(
            StoreError::classify("an IO error occurred: Connection refused (os error 111)"),
            StoreError::Unreachable(_)
        ));
        assert!(matches!(
            StoreError::classify("Neo.DatabaseError.General.UnknownError"),
            StoreError::Failed(_)
        ));
    }

    #[test]
    fn store_errors_map_onto_taxonomy() {
        assert_eq!(StoreError::Syntax("x".into()).kind(), ErrorKind::Syntax);
        assert_eq!(
            StoreError::Timeout { after_ms: 5 }.kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            QaError::Store(StoreError::Unreachable("down".into())).kind(),
            ErrorKind::Connectivity
        );
        assert_eq!(
            QaError::Store(StoreError::classify("Neo.DatabaseError.General.UnknownError")).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            QaError::Validation(ValidationError::EmptyQuestion).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            QaError::Backend(BackendError::RateLimited { retry_after: None }).kind(),
            ErrorKind::Backend
        );
    }

    #[test]
    fn display_includes_context() {
        let err = QaError::Backend(BackendError::RateLimited {
            retry_after: Some(30),
        });
        assert_eq!(
            err.to_string(),
            "Backend error: rate limit exceeded, retry after 30 seconds"
        );
    }
}
