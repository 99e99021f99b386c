use super::Error;

/// The executor was driven outside its contract.
///
/// This occurs when:
/// - An operation is invoked on a closed executor
/// - A cursor is opened while another is still pending
/// - Row bounds are combined with a statement that forbids them
#[derive(Debug)]
pub(super) struct ExecutorMisuse {
    pub(super) message: Box<str>,
}

impl std::error::Error for ExecutorMisuse {}

impl core::fmt::Display for ExecutorMisuse {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "executor misuse: {}", self.message)
    }
}

impl Error {
    /// Creates an executor-misuse error.
    pub fn executor(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ExecutorMisuse(ExecutorMisuse {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an executor-misuse error.
    pub fn is_executor(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ExecutorMisuse(_))
    }
}
