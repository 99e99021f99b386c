mod handler;
pub use handler::RowProjector;

mod wrapper;
pub use wrapper::ResultSetWrapper;
