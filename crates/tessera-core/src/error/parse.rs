use super::Error;

/// Error raised while building the configuration from mapper documents or
/// scripts.
///
/// This covers:
/// - Malformed XML and out-of-order configuration children
/// - Grammar errors in `#{...}` parameter expressions
/// - Unknown elements or attributes inside dynamic SQL
/// - Duplicate registration ids
#[derive(Debug)]
pub(super) struct ParseFailed {
    pub(super) message: Box<str>,
}

impl std::error::Error for ParseFailed {}

impl core::fmt::Display for ParseFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "parse failed: {}", self.message)
    }
}

impl Error {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Parse(ParseFailed {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Parse(_))
    }
}
