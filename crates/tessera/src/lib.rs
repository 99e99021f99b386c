mod cursor;
pub use cursor::DefaultCursor;

pub mod executor;
pub use executor::new_executor;

pub mod resultset;

pub mod session;
pub use session::{Session, SessionFactory};

pub mod statement;

pub mod testing;

pub use tessera_core::{Configuration, Error, Result, Value};

/// The template compiler, re-exported so embedding applications can build
/// configurations without naming the crate separately.
pub use tessera_sql as sql;

pub use tessera_core::exec::{ExecutorType, ResultContext, ResultHandler, RowBounds};
pub use tessera_core::value::ValueObject;
