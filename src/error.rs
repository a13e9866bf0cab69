// Stack Sage: Error Taxonomy
// Every failure a tool or agent can surface maps onto one of these kinds.

/// Errors that can occur while answering a question or serving a tool call.
#[derive(Debug, thiserror::Error)]
pub enum SageError {
    /// The requested entity does not exist (card, meta snapshot).
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-side violation (empty filter set, malformed input).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Transient failure of an external service (network, 5xx).
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The rules index has not been built or could not be loaded.
    #[error("rules index unavailable: {0}")]
    IndexUnavailable(String),

    /// A per-node or per-request time budget was exceeded.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// The Judge rejected a draft it could not rewrite into grounded form.
    #[error("answer not grounded: {0}")]
    Ungrounded(String),

    /// An optional tool is disabled because its credential is missing.
    #[error("tool not configured: {0}")]
    ToolMisconfigured(String),

    /// A postcondition failed. Indicates a bug, not an environmental problem.
    #[error("internal invariant breach: {0}")]
    InternalInvariantBreach(String),
}

pub type SageResult<T> = Result<T, SageError>;

impl SageError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, SageError::UpstreamUnavailable(_) | SageError::Timeout(_))
    }
}

impl From<reqwest::Error> for SageError {
    fn from(err: reqwest::Error) -> Self {
        SageError::UpstreamUnavailable(err.to_string())
    }
}
