use std::fmt;


/// An error that may occur while deriving NTLM responses and keys.
///
/// None of these are transient; a handshake that hits one of them should be abandoned.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Error {
    /// Text cannot be encoded in the form a one-way function requires.
    Encoding { what: &'static str, reason: &'static str },

    /// A challenge, response or key does not have the exact required length, or a byte range lies
    /// outside of its buffer.
    MalformedInput { what: &'static str, expected: usize, obtained: usize },

    /// An operation was invoked out of order or a write-once value was written twice.
    Sequence { operation: &'static str, reason: &'static str },
}
impl Error {
    pub(crate) fn malformed(what: &'static str, expected: usize, obtained: usize) -> Self {
        Self::MalformedInput { what, expected, obtained }
    }

    pub(crate) fn sequence(operation: &'static str, reason: &'static str) -> Self {
        tracing::debug!(operation, reason, "handshake sequence violation");
        Self::Sequence { operation, reason }
    }

    /// Returns whether this is an [`Error::Encoding`].
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }

    /// Returns whether this is an [`Error::MalformedInput`].
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }

    /// Returns whether this is an [`Error::Sequence`].
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence { .. })
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding { what, reason }
                => write!(f, "failed to encode {}: {}", what, reason),
            Self::MalformedInput { what, expected, obtained }
                => write!(f, "malformed {} (expected {} bytes, obtained {})", what, expected, obtained),
            Self::Sequence { operation, reason }
                => write!(f, "{} invoked out of sequence: {}", operation, reason),
        }
    }
}
impl std::error::Error for Error {
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
