use super::Error;

/// An interceptor declared a signature that does not point at an
/// interceptable method.
#[derive(Debug)]
pub(super) struct PluginViolation {
    pub(super) message: Box<str>,
}

impl std::error::Error for PluginViolation {}

impl core::fmt::Display for PluginViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "plugin violation: {}", self.message)
    }
}

impl Error {
    /// Creates a plugin error.
    pub fn plugin(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::PluginViolation(PluginViolation {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a plugin error.
    pub fn is_plugin(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::PluginViolation(_))
    }
}
