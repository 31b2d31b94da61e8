/// All errors that can occur within Stoat.
///
/// This enum captures every failure mode: invisible blob reads, malformed
/// conditions, operator failures, and access to torn-down scopes.
/// Using a single error type across the library simplifies error propagation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sequence or operator read a blob that is not visible in the current
    /// scope chain (neither a local binding nor inherited from an ancestor).
    #[error("undefined input '{name}': not visible in the current scope chain")]
    UndefinedInput { name: String },

    /// A condition blob was missing, non-scalar, or not boolean-convertible.
    #[error("bad condition '{name}': {reason}")]
    BadCondition { name: String, reason: String },

    /// Wrapped failure from an operator invocation, opaque to the engine.
    #[error("operator '{kind}' failed: {reason}")]
    OperatorFailure { kind: String, reason: String },

    /// Access to a binding after its owning scope was disposed.
    #[error("scope {scope} was disposed; its bindings are gone")]
    ScopeDisposed { scope: usize },

    /// A name was never bound in the outermost scope (top-level fetch).
    #[error("'{name}' was never bound in the outermost scope")]
    NotFound { name: String },

    /// A name is classified external in one construct and local in a sibling
    /// construct at the same nesting depth.
    #[error("partition conflict: '{name}' is external in one construct and local in a sibling")]
    PartitionConflict { name: String },

    /// Element count mismatch in a binary value operation.
    #[error("length mismatch: expected {expected} elements, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
