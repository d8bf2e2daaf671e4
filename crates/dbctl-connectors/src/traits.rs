use async_trait::async_trait;
use dbctl_common::{ChangeLogEntry, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Row count reported for scripts whose statements were all read-only.
pub const ROWS_NOT_MEANINGFUL: i64 = -1;

/// Discovery information a connector publishes to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectorMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
}

/// Capability boundary between the migration orchestrator and one database
/// backend.
///
/// Every operation is its own unit of work: the connection is opened, used
/// and closed again before the call returns, whether or not it succeeded.
/// Methods take `&mut self` because an instance owns a single connection
/// slot; use one instance per concurrent caller.
///
/// The cancellation token is forwarded to the store driver, which may abort
/// the statement in flight.
#[async_trait]
pub trait Connector: Send {
    fn metadata(&self) -> ConnectorMetadata;

    /// Create the change-log table. Not idempotent: a second call against the
    /// same store fails with `Error::Schema`.
    async fn create_change_log_table(
        &mut self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> Result<i64>;

    /// Insert one entry with bound parameters. Returns the affected row
    /// count; a duplicate `(change_date_time, version)` fails with
    /// `Error::Integrity`.
    async fn add_change_log_entry(
        &mut self,
        connection_string: &str,
        entry: &ChangeLogEntry,
        cancel: &CancellationToken,
    ) -> Result<i64>;

    /// All recorded entries, most recent first (`change_date_time` then
    /// `version`, both descending). An empty log yields an empty `Vec`.
    async fn fetch_change_log_entries(
        &mut self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChangeLogEntry>>;

    /// Run raw script text. DDL typically reports 0 rows; a script made only
    /// of queries reports [`ROWS_NOT_MEANINGFUL`].
    async fn execute_script(
        &mut self,
        connection_string: &str,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<i64>;
}
