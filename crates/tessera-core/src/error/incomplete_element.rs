use super::Error;

/// A forward reference that may yet be resolved.
///
/// Raised when an element refers to something that has not been registered
/// (a cache-ref target, a parent result map, an included fragment). The
/// builder queues the element and retries; if the reference is still
/// unresolved once the retry fixpoint is reached, the error is upgraded to a
/// parse error.
#[derive(Debug)]
pub(super) struct IncompleteElement {
    pub(super) message: Box<str>,
}

impl std::error::Error for IncompleteElement {}

impl core::fmt::Display for IncompleteElement {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "incomplete element: {}", self.message)
    }
}

impl Error {
    /// Creates an incomplete-element error.
    pub fn incomplete_element(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::IncompleteElement(IncompleteElement {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an incomplete-element error.
    pub fn is_incomplete_element(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::IncompleteElement(_))
    }

    /// Upgrades an incomplete-element error into a parse error. Called once
    /// the pending-element retry loop stops making progress.
    pub fn upgrade_incomplete(self) -> Error {
        match &self.inner.kind {
            super::ErrorKind::IncompleteElement(inner) => Error::parse(inner.message.to_string()),
            _ => self,
        }
    }
}
