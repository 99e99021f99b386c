use super::Error;

/// A property path could not be resolved against a target value.
///
/// Surfaced as a build-time error when raised while compiling mappings, and
/// as a row-mapping error when raised while projecting results.
#[derive(Debug)]
pub(super) struct ReflectionFailed {
    pub(super) message: Box<str>,
}

impl std::error::Error for ReflectionFailed {}

impl core::fmt::Display for ReflectionFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "property resolution failed: {}", self.message)
    }
}

impl Error {
    /// Creates a property-resolution error.
    pub fn reflection(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Reflection(ReflectionFailed {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a property-resolution error.
    pub fn is_reflection(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Reflection(_))
    }
}
