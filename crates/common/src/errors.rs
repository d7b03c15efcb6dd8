use thiserror::Error;

/// Construction-time and fatal pipeline failures.
///
/// Distinct from [`CategorizedError`], which classifies the *outcome* of a
/// producer call during steady-state operation. `PipelineError` covers
/// things that happen before the pipeline can even try: bad config, a
/// producer client that refuses to build.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("circuit breaker is open")]
    CircuitBreakerOpen,

    #[error("queue overflow: {0}")]
    QueueOverflow(String),

    #[error("message send error: {0}")]
    MessageSending(String),

    #[error("unknown pipeline error: {0}")]
    Unknown(String),
}

/// Severity of a categorized error, used to pick the log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The nine error categories the classifier recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    Connection,
    Timeout,
    Serialization,
    CircuitBreaker,
    QueueOverflow,
    MessageSending,
    Unknown,
}

impl ErrorCategory {
    /// Upper-case name, used in fallback-log reasons (`"Send failed: AUTHENTICATION"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "CONFIGURATION",
            ErrorCategory::Authentication => "AUTHENTICATION",
            ErrorCategory::Connection => "CONNECTION",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Serialization => "SERIALIZATION",
            ErrorCategory::CircuitBreaker => "CIRCUITBREAKER",
            ErrorCategory::QueueOverflow => "QUEUEOVERFLOW",
            ErrorCategory::MessageSending => "MESSAGESENDING",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }
}

/// The outcome of classifying a raw error: what it is, how bad, and what
/// the pipeline should do about it.
#[derive(Debug, Clone, Copy)]
pub struct CategorizedError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub should_retry: bool,
    pub should_fallback: bool,
}

/// Classify a raw error message by substring match, first match wins.
///
/// Matching on message text is brittle but matches the intent of the
/// systems we interface with: opaque Kafka client errors and our own
/// synthetic error strings both flow through here uniformly.
pub fn classify(message: &str) -> CategorizedError {
    let lower = message.to_lowercase();

    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(&[
        "configuration",
        "invalid",
        "missing",
        "broker-format",
        "topic-empty",
        "clientid-empty",
    ]) {
        return CategorizedError {
            category: ErrorCategory::Configuration,
            severity: Severity::Critical,
            should_retry: false,
            should_fallback: true,
        };
    }

    if contains_any(&["authentication", "unauthorized", "sasl", "credentials", "auth"]) {
        return CategorizedError {
            category: ErrorCategory::Authentication,
            severity: Severity::High,
            should_retry: false,
            should_fallback: true,
        };
    }

    if contains_any(&[
        "connection",
        "network",
        "econnrefused",
        "enotfound",
        "ehostunreach",
        "broker-unavailable",
    ]) {
        return CategorizedError {
            category: ErrorCategory::Connection,
            severity: Severity::High,
            should_retry: true,
            should_fallback: true,
        };
    }

    if contains_any(&["timeout", "timed out", "etimedout"]) {
        return CategorizedError {
            category: ErrorCategory::Timeout,
            severity: Severity::Medium,
            should_retry: true,
            should_fallback: true,
        };
    }

    if contains_any(&["serialization", "json", "parse", "stringify", "invalid-message"]) {
        return CategorizedError {
            category: ErrorCategory::Serialization,
            severity: Severity::Medium,
            should_retry: false,
            should_fallback: false,
        };
    }

    if lower.contains("circuit breaker") || (lower.contains("circuit") && lower.contains("open")) {
        return CategorizedError {
            category: ErrorCategory::CircuitBreaker,
            severity: Severity::Medium,
            should_retry: false,
            should_fallback: true,
        };
    }

    if contains_any(&["queue-full", "queue-overflow", "message-dropped", "queue overflow"]) {
        return CategorizedError {
            category: ErrorCategory::QueueOverflow,
            severity: Severity::Medium,
            should_retry: false,
            should_fallback: true,
        };
    }

    if contains_any(&["send", "publish", "produce", "kafka-failed"]) {
        return CategorizedError {
            category: ErrorCategory::MessageSending,
            severity: Severity::Medium,
            should_retry: true,
            should_fallback: true,
        };
    }

    CategorizedError {
        category: ErrorCategory::Unknown,
        severity: Severity::Medium,
        should_retry: true,
        should_fallback: true,
    }
}

impl From<&PipelineError> for CategorizedError {
    fn from(err: &PipelineError) -> Self {
        classify(&err.to_string())
    }
}
