mod adhoc;
mod binding;
mod cache_failure;
mod executor_misuse;
mod incomplete_element;
mod parse;
mod plugin_violation;
mod reflection;
mod sql_execution;
mod type_handler_missing;

use adhoc::AdhocError;
use binding::BindingFailed;
use cache_failure::CacheFailure;
use executor_misuse::ExecutorMisuse;
use incomplete_element::IncompleteElement;
use parse::ParseFailed;
use plugin_violation::PluginViolation;
use reflection::ReflectionFailed;
use sql_execution::SqlExecutionFailed;
use std::sync::Arc;
use type_handler_missing::TypeHandlerMissing;

/// An error that can occur in tessera.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
}

#[derive(Debug)]
enum ErrorKind {
    Adhoc(AdhocError),
    Binding(BindingFailed),
    CacheFailure(CacheFailure),
    ExecutorMisuse(ExecutorMisuse),
    IncompleteElement(IncompleteElement),
    Parse(ParseFailed),
    PluginViolation(PluginViolation),
    Reflection(ReflectionFailed),
    SqlExecution(SqlExecutionFailed),
    TypeHandlerMissing(TypeHandlerMissing),
}

impl Error {
    /// Adds context to this error.
    ///
    /// Context is displayed in reverse order: the most recently added context
    /// is shown first, followed by earlier context, ending with the root cause.
    pub fn context(self, consequent: Error) -> Error {
        let mut err = consequent;
        let inner = Arc::get_mut(&mut err.inner).unwrap();
        assert!(
            inner.cause.is_none(),
            "consequent error must not already have a cause"
        );
        inner.cause = Some(self);
        err
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.cause.as_ref()?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::SqlExecution(err) => err.source(),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            f.debug_struct("Error")
                .field("kind", &self.inner.kind)
                .field("cause", &self.inner.cause)
                .finish()
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use self::ErrorKind::*;

        match self {
            Adhoc(err) => core::fmt::Display::fmt(err, f),
            Binding(err) => core::fmt::Display::fmt(err, f),
            CacheFailure(err) => core::fmt::Display::fmt(err, f),
            ExecutorMisuse(err) => core::fmt::Display::fmt(err, f),
            IncompleteElement(err) => core::fmt::Display::fmt(err, f),
            Parse(err) => core::fmt::Display::fmt(err, f),
            PluginViolation(err) => core::fmt::Display::fmt(err, f),
            Reflection(err) => core::fmt::Display::fmt(err, f),
            SqlExecution(err) => core::fmt::Display::fmt(err, f),
            TypeHandlerMissing(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Arc::new(ErrorInner { kind, cause: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_size() {
        // Ensure Error stays at one word (size of pointer/Arc)
        let expected_size = core::mem::size_of::<usize>();
        assert_eq!(expected_size, core::mem::size_of::<Error>());
    }

    #[test]
    fn error_chain_display() {
        let root = Error::parse("unexpected element <frob>");
        let top = Error::from_args(format_args!("while building mapper `app.UserMapper`"));

        let chained = root.context(top);
        assert_eq!(
            chained.to_string(),
            "while building mapper `app.UserMapper`: parse failed: unexpected element <frob>"
        );
    }

    #[test]
    fn incomplete_element_upgrade() {
        let err = Error::incomplete_element("result map `authorResult` not found");
        assert!(err.is_incomplete_element());

        let upgraded = err.upgrade_incomplete();
        assert!(!upgraded.is_incomplete_element());
        assert!(upgraded
            .to_string()
            .contains("result map `authorResult` not found"));
    }

    #[test]
    fn sql_execution_context_string() {
        let err = Error::sql_execution(
            "mapper/UserMapper.xml",
            "executing a query",
            "app.UserMapper.findById",
            "SELECT * FROM users WHERE id = ?",
            "table users does not exist",
        );
        let rendered = err.to_string();
        assert!(rendered.contains("mapper/UserMapper.xml"));
        assert!(rendered.contains("executing a query"));
        assert!(rendered.contains("app.UserMapper.findById"));
        assert!(rendered.contains("SELECT * FROM users WHERE id = ?"));
        assert!(rendered.contains("table users does not exist"));
    }

    #[test]
    fn binding_error() {
        let err = Error::binding("mapped statement not found: app.UserMapper.missing");
        assert_eq!(
            err.to_string(),
            "binding failed: mapped statement not found: app.UserMapper.missing"
        );
    }
}
