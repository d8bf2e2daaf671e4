//! SQLite backend for the DbCtl change log.
//!
//! [`SqliteConnector`] records applied migration units in the
//! `DbCtlChangeLog` table and hands the history back to the orchestrator.
//! Each call opens the database, does its work on a blocking thread and
//! closes it again.

pub mod connection;
pub mod connector;
mod error;
pub mod repository;
pub mod schema;

pub use connection::{CacheMode, ConnectionHandle, ConnectionString, OpenMode};
pub use connector::{METADATA, SqliteConnector, register};
pub use schema::CHANGE_LOG_TABLE;
