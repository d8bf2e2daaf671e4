use dbctl_common::{Error, Result};
use rusqlite::Connection;

use crate::repository::run_script;

pub const CHANGE_LOG_TABLE: &str = "DbCtlChangeLog";

/// Creation statement for the tracking table. There is no `IF NOT EXISTS`:
/// bootstrap happens once per store and a repeat is reported to the caller.
pub const CREATE_CHANGE_LOG_TABLE_SQL: &str = "CREATE TABLE DbCtlChangeLog (
    MigrationType VARCHAR(15) NOT NULL,
    Version VARCHAR(10),
    Description VARCHAR(255),
    Filename VARCHAR(255) NOT NULL,
    Hash VARCHAR(64) NOT NULL,
    AppliedBy VARCHAR(50) NOT NULL,
    ChangeDateTime DATETIME NOT NULL,
    CONSTRAINT PK_DbCtlChangeLog PRIMARY KEY (ChangeDateTime DESC, Version DESC)
)";

/// Run the tracking-table creation statement. Statement failures surface as
/// `Error::Schema`.
pub fn ensure_change_log_table(conn: &Connection, create_sql: &str) -> Result<i64> {
    run_script(conn, create_sql).map_err(|e| match e {
        Error::Query(msg) => Error::Schema(msg),
        other => other,
    })
}
