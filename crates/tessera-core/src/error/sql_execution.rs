use super::Error;

/// A driver-reported failure, wrapped with the context of the statement that
/// was executing: the mapper resource, the activity in progress, the mapped
/// object id, and the SQL text when it is known.
#[derive(Debug)]
pub(super) struct SqlExecutionFailed {
    pub(super) resource: Box<str>,
    pub(super) activity: Box<str>,
    pub(super) object: Box<str>,
    pub(super) sql: Option<Box<str>>,
    pub(super) inner: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub(super) message: Box<str>,
}

impl SqlExecutionFailed {
    pub(super) fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.as_deref().map(|err| err as _)
    }
}

impl std::error::Error for SqlExecutionFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        SqlExecutionFailed::source(self)
    }
}

impl core::fmt::Display for SqlExecutionFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "error {} (resource: {}, statement: {}",
            self.activity, self.resource, self.object
        )?;
        if let Some(sql) = &self.sql {
            write!(f, ", sql: {sql}")?;
        }
        write!(f, "): {}", self.message)
    }
}

impl Error {
    /// Creates a SQL execution error from its context parts.
    pub fn sql_execution(
        resource: impl Into<String>,
        activity: impl Into<String>,
        object: impl Into<String>,
        sql: impl Into<String>,
        message: impl Into<String>,
    ) -> Error {
        Error::from(super::ErrorKind::SqlExecution(SqlExecutionFailed {
            resource: resource.into().into(),
            activity: activity.into().into(),
            object: object.into().into(),
            sql: {
                let sql = sql.into();
                (!sql.is_empty()).then(|| sql.into())
            },
            inner: None,
            message: message.into().into(),
        }))
    }

    /// Wraps a driver error with execution context.
    pub fn sql_execution_caused_by(
        resource: impl Into<String>,
        activity: impl Into<String>,
        object: impl Into<String>,
        sql: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Error {
        let message = cause.to_string();
        Error::from(super::ErrorKind::SqlExecution(SqlExecutionFailed {
            resource: resource.into().into(),
            activity: activity.into().into(),
            object: object.into().into(),
            sql: {
                let sql = sql.into();
                (!sql.is_empty()).then(|| sql.into())
            },
            inner: Some(Box::new(cause)),
            message: message.into(),
        }))
    }

    /// Returns `true` if this error is a SQL execution error.
    pub fn is_sql_execution(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::SqlExecution(_))
    }
}
