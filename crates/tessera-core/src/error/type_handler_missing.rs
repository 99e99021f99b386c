use super::Error;

/// No type handler is registered for the required (value kind, SQL type)
/// pair.
#[derive(Debug)]
pub(super) struct TypeHandlerMissing {
    pub(super) message: Box<str>,
}

impl std::error::Error for TypeHandlerMissing {}

impl core::fmt::Display for TypeHandlerMissing {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "type handler missing: {}", self.message)
    }
}

impl Error {
    /// Creates a missing-type-handler error.
    pub fn type_handler(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::TypeHandlerMissing(TypeHandlerMissing {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a missing-type-handler error.
    pub fn is_type_handler(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::TypeHandlerMissing(_))
    }
}
