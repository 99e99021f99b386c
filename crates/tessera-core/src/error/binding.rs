use super::Error;

/// Error when routing a mapper-method invocation.
///
/// This occurs when:
/// - No mapped statement exists for the requested id
/// - A statement id is ambiguous across namespaces
/// - A primitive-returning method would yield null
#[derive(Debug)]
pub(super) struct BindingFailed {
    pub(super) message: Box<str>,
}

impl std::error::Error for BindingFailed {}

impl core::fmt::Display for BindingFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "binding failed: {}", self.message)
    }
}

impl Error {
    /// Creates a binding error.
    pub fn binding(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Binding(BindingFailed {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a binding error.
    pub fn is_binding(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Binding(_))
    }
}
