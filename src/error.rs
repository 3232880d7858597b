/// Crate-level error type for the encore scoring engine.
///
/// The taxonomy separates recoverable analysis conditions from fatal ones:
/// [`Error::Insufficient`] and [`Error::Alignment`] are graded down to
/// zero-score results by the challenge dispatcher, while [`Error::Decode`]
/// and [`Error::Internal`] propagate to the orchestrator, which records the
/// performance as failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source audio could not be decoded (unknown format, truncated or
    /// malformed container, empty stream).
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// Not enough material for a meaningful score (e.g. fewer than two
    /// onsets for pattern extraction).
    #[error("insufficient data: {0}")]
    Insufficient(String),

    /// One of the paired inputs produced zero frames, so no comparison is
    /// possible.
    #[error("alignment failed: {0}")]
    Alignment(String),

    /// The caller requested cancellation via [`crate::cancel::CancelToken`].
    #[error("processing cancelled")]
    Cancelled,

    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// A required dimension is zero or invalid.
    #[error("invalid size for `{name}`: {value} ({reason})")]
    InvalidSize {
        name: &'static str,
        value: usize,
        reason: &'static str,
    },

    /// Arithmetic produced a non-finite value or an impossible state was
    /// reached; always a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// File I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable kind, independent of the message text.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) => ErrorKind::Decode,
            Error::Insufficient(_) => ErrorKind::Insufficient,
            Error::Alignment(_) => ErrorKind::Alignment,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidParameter { .. } | Error::InvalidSize { .. } => ErrorKind::Parameter,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the dispatcher grades this error into a zero-score result
    /// instead of propagating it.
    pub fn is_graded(&self) -> bool {
        matches!(self, Error::Insufficient(_) | Error::Alignment(_))
    }
}

/// Stable error kinds surfaced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Insufficient,
    Alignment,
    Cancelled,
    Parameter,
    Internal,
    Io,
}

/// Convenience Result type for encore operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graded_errors() {
        assert!(Error::Insufficient("too few onsets".into()).is_graded());
        assert!(Error::Alignment("zero frames".into()).is_graded());
        assert!(!Error::Decode("bad header".into()).is_graded());
        assert!(!Error::Cancelled.is_graded());
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::Internal("nan leak".into()).kind(),
            ErrorKind::Internal
        );
    }
}
