use async_trait::async_trait;
use dbctl_common::{ChangeLogEntry, Result};
use dbctl_connectors::{Connector, ConnectorMetadata, ConnectorRegistry};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::ConnectionHandle;
use crate::repository::{self, INSERT_ENTRY_SQL, SELECT_ENTRIES_SQL};
use crate::schema::{self, CHANGE_LOG_TABLE, CREATE_CHANGE_LOG_TABLE_SQL};

pub const METADATA: ConnectorMetadata = ConnectorMetadata {
    name: "SQLite",
    description: "Database connector for SQLite",
    version: "1.0.0",
};

/// Add the SQLite connector to `registry`.
pub fn register(registry: &mut ConnectorRegistry) -> Result<()> {
    registry.register(METADATA, SqliteConnector::boxed)
}

/// Change-log connector backed by a SQLite database file.
#[derive(Default)]
pub struct SqliteConnector {
    handle: ConnectionHandle,
}

impl SqliteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn boxed() -> Box<dyn Connector> {
        Box::new(Self::new())
    }

    pub fn is_connection_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Configure, open, run `work`, then close no matter how `work` ended.
    async fn unit_of_work<T, F>(
        &mut self,
        connection_string: &str,
        command_text: &str,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
    {
        self.handle.configure(connection_string)?;
        self.handle.set_command_text(command_text)?;

        let outcome = match self.handle.open().await {
            Ok(()) => self.handle.execute(cancel, work).await,
            Err(e) => Err(e),
        };
        let closed = self.handle.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("failed to close sqlite connection after error: {close_err}");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn metadata(&self) -> ConnectorMetadata {
        METADATA
    }

    async fn create_change_log_table(
        &mut self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let rows = self
            .unit_of_work(
                connection_string,
                CREATE_CHANGE_LOG_TABLE_SQL,
                cancel,
                schema::ensure_change_log_table,
            )
            .await?;
        info!("created change log table {CHANGE_LOG_TABLE}");
        Ok(rows)
    }

    async fn add_change_log_entry(
        &mut self,
        connection_string: &str,
        entry: &ChangeLogEntry,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let owned = entry.clone();
        let rows = self
            .unit_of_work(connection_string, INSERT_ENTRY_SQL, cancel, move |conn, sql| {
                repository::insert_entry(conn, sql, &owned)
            })
            .await?;
        info!(
            "recorded change log entry {} (version {})",
            entry.filename(),
            entry.version()
        );
        Ok(rows)
    }

    async fn fetch_change_log_entries(
        &mut self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChangeLogEntry>> {
        self.unit_of_work(
            connection_string,
            SELECT_ENTRIES_SQL,
            cancel,
            repository::select_entries,
        )
        .await
    }

    async fn execute_script(
        &mut self,
        connection_string: &str,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        self.unit_of_work(connection_string, script, cancel, repository::run_script)
            .await
    }
}
