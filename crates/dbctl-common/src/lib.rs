pub mod change_log;
pub mod error;

pub use change_log::ChangeLogEntry;
pub use error::{Error, Result};
