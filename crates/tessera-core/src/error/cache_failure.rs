use super::Error;

/// A cache decorator operation failed.
#[derive(Debug)]
pub(super) struct CacheFailure {
    pub(super) message: Box<str>,
}

impl std::error::Error for CacheFailure {}

impl core::fmt::Display for CacheFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "cache failure: {}", self.message)
    }
}

impl Error {
    /// Creates a cache error.
    pub fn cache(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::CacheFailure(CacheFailure {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a cache error.
    pub fn is_cache(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::CacheFailure(_))
    }
}
