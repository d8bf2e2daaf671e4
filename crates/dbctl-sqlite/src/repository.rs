use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use dbctl_common::{ChangeLogEntry, Error, Result};
use dbctl_connectors::ROWS_NOT_MEANINGFUL;
use rusqlite::{Batch, Connection, params};

use crate::error::classify;

pub const INSERT_ENTRY_SQL: &str = "INSERT INTO DbCtlChangeLog \
     (MigrationType, Version, Description, Filename, Hash, AppliedBy, ChangeDateTime) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

pub const SELECT_ENTRIES_SQL: &str = "SELECT MigrationType, Version, Description, Filename, \
     Hash, AppliedBy, ChangeDateTime \
     FROM DbCtlChangeLog \
     ORDER BY ChangeDateTime DESC, Version DESC";

/// Fixed-width UTC text. Within years 0000..=9999 lexical order equals
/// chronological order; `format_change_date_time` rejects anything outside.
const CHANGE_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_change_date_time(at: DateTime<Utc>) -> Result<String> {
    if !(0..=9999).contains(&at.year()) {
        return Err(Error::Configuration(format!(
            "ChangeDateTime {at} is outside years 0000-9999"
        )));
    }
    Ok(at.format(CHANGE_DATE_TIME_FORMAT).to_string())
}

/// Parse a stored timestamp. Besides our own format this accepts RFC 3339
/// and the zone-less forms other tools write into SQLite.
pub fn parse_change_date_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::Query(format!("malformed ChangeDateTime '{s}'")))
}

/// Insert `entry` through `insert_sql` with every field bound as a parameter.
pub fn insert_entry(conn: &Connection, insert_sql: &str, entry: &ChangeLogEntry) -> Result<i64> {
    let change_date_time = format_change_date_time(entry.change_date_time())?;
    let rows = conn
        .execute(
            insert_sql,
            params![
                entry.migration_type(),
                entry.version(),
                entry.description(),
                entry.filename(),
                entry.hash(),
                entry.applied_by(),
                change_date_time,
            ],
        )
        .map_err(|e| classify(e, "failed to add change log entry"))?;
    Ok(rows as i64)
}

pub fn select_entries(conn: &Connection, select_sql: &str) -> Result<Vec<ChangeLogEntry>> {
    let mut stmt = conn
        .prepare(select_sql)
        .map_err(|e| classify(e, "failed to prepare change log query"))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(|e| classify(e, "failed to query change log"))?;

    let mut entries = Vec::new();
    for row in rows {
        let (migration_type, version, description, filename, hash, applied_by, changed_at) =
            row.map_err(|e| classify(e, "failed to read change log row"))?;
        entries.push(ChangeLogEntry::new(
            migration_type,
            version.unwrap_or_default(),
            description.unwrap_or_default(),
            filename,
            hash,
            applied_by,
            parse_change_date_time(&changed_at)?,
        ));
    }
    Ok(entries)
}

/// Execute every statement in `script`, in order.
///
/// Returns the number of rows changed by data-modifying statements (0 for
/// pure DDL), or [`ROWS_NOT_MEANINGFUL`] when every statement was read-only.
/// Rows produced by queries are stepped through and discarded.
pub fn run_script(conn: &Connection, script: &str) -> Result<i64> {
    let mut batch = Batch::new(conn, script);
    let mut affected: Option<i64> = None;

    while let Some(mut stmt) = batch
        .next()
        .map_err(|e| classify(e, "failed to prepare script statement"))?
    {
        let read_only = stmt.readonly();
        let before = total_changes(conn)?;

        let mut rows = stmt.raw_query();
        while rows
            .next()
            .map_err(|e| classify(e, "failed to execute script statement"))?
            .is_some()
        {}

        if !read_only {
            let changed = total_changes(conn)? - before;
            affected = Some(affected.unwrap_or(0) + changed);
        }
    }

    Ok(affected.unwrap_or(ROWS_NOT_MEANINGFUL))
}

fn total_changes(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
        .map_err(|e| classify(e, "failed to read change counter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CREATE_CHANGE_LOG_TABLE_SQL, ensure_change_log_table};
    use chrono::TimeZone;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_change_log_table(&conn, CREATE_CHANGE_LOG_TABLE_SQL).unwrap();
        conn
    }

    fn entry(version: &str, at: DateTime<Utc>) -> ChangeLogEntry {
        ChangeLogEntry::new(
            "DDL",
            version,
            "Create things",
            format!("f-{version}-Create_things.ddl"),
            ChangeLogEntry::hash_contents(version.as_bytes()),
            "JoeSoap",
            at,
        )
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 12, 16, h, m, s).unwrap()
    }

    #[test]
    fn timestamps_are_fixed_width() {
        assert_eq!(
            format_change_date_time(at(9, 43, 22)).unwrap(),
            "2020-12-16T09:43:22.000000Z"
        );
        let parsed = parse_change_date_time("2020-12-16T09:43:22.000000Z").unwrap();
        assert_eq!(parsed, at(9, 43, 22));
    }

    #[test]
    fn out_of_range_years_are_not_stored() {
        let conn = store();
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let before_zero = Utc.with_ymd_and_hms(-1, 1, 1, 0, 0, 0).unwrap();

        for instant in [far, before_zero] {
            let err = insert_entry(&conn, INSERT_ENTRY_SQL, &entry("9.9", instant)).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{err}");
        }
        assert!(select_entries(&conn, SELECT_ENTRIES_SQL).unwrap().is_empty());

        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            format_change_date_time(last).unwrap(),
            "9999-12-31T23:59:59.000000Z"
        );
    }

    #[test]
    fn parses_foreign_timestamp_layouts() {
        for s in [
            "2020-12-16T09:43:22",
            "2020-12-16 09:43:22",
            "2020-12-16T11:43:22+02:00",
        ] {
            assert_eq!(parse_change_date_time(s).unwrap(), at(9, 43, 22), "{s}");
        }
        assert!(matches!(
            parse_change_date_time("yesterday"),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn insert_then_select_round_trips() {
        let conn = store();
        let expected = entry("1.0.2", at(9, 43, 22));

        assert_eq!(insert_entry(&conn, INSERT_ENTRY_SQL, &expected).unwrap(), 1);

        let entries = select_entries(&conn, SELECT_ENTRIES_SQL).unwrap();
        assert_eq!(entries, vec![expected]);
    }

    #[test]
    fn bound_parameters_survive_quotes_and_delimiters() {
        let conn = store();
        let tricky = ChangeLogEntry::new(
            "DML",
            "1.1",
            "it's; DROP TABLE DbCtlChangeLog; --",
            "f-1.1-O'Brien.dml",
            "abc",
            "O'Brien",
            at(10, 0, 0),
        );

        insert_entry(&conn, INSERT_ENTRY_SQL, &tricky).unwrap();
        assert_eq!(select_entries(&conn, SELECT_ENTRIES_SQL).unwrap(), vec![tricky]);
    }

    #[test]
    fn select_orders_most_recent_first() {
        let conn = store();
        let older = entry("1.0", at(9, 0, 0));
        let newer = entry("1.1", at(10, 0, 0));
        let same_time_low = entry("2.0", at(11, 0, 0));
        let same_time_high = entry("2.1", at(11, 0, 0));

        for e in [&same_time_low, &older, &same_time_high, &newer] {
            insert_entry(&conn, INSERT_ENTRY_SQL, e).unwrap();
        }

        let entries = select_entries(&conn, SELECT_ENTRIES_SQL).unwrap();
        assert_eq!(entries, vec![same_time_high, same_time_low, newer, older]);
    }

    #[test]
    fn duplicate_primary_key_is_an_integrity_error() {
        let conn = store();
        let first = entry("1.0", at(9, 0, 0));
        let clash = ChangeLogEntry::new("DML", "1.0", "other", "f-1.0-b.dml", "x", "y", at(9, 0, 0));

        insert_entry(&conn, INSERT_ENTRY_SQL, &first).unwrap();
        let err = insert_entry(&conn, INSERT_ENTRY_SQL, &clash).unwrap_err();

        assert!(matches!(err, Error::Integrity(_)), "{err}");
        assert_eq!(select_entries(&conn, SELECT_ENTRIES_SQL).unwrap(), vec![first]);
    }

    #[test]
    fn empty_table_selects_nothing() {
        let conn = store();
        assert!(select_entries(&conn, SELECT_ENTRIES_SQL).unwrap().is_empty());
    }

    #[test]
    fn script_reports_rows_changed() {
        let conn = Connection::open_in_memory().unwrap();
        let ddl = run_script(&conn, "CREATE TABLE Fake (ID INTEGER)").unwrap();
        assert_eq!(ddl, 0);

        let dml = run_script(
            &conn,
            "INSERT INTO Fake VALUES (1); INSERT INTO Fake VALUES (2), (3);",
        )
        .unwrap();
        assert_eq!(dml, 3);

        let update = run_script(&conn, "UPDATE Fake SET ID = ID + 10 WHERE ID > 1").unwrap();
        assert_eq!(update, 2);
    }

    #[test]
    fn read_only_script_reports_sentinel() {
        let conn = Connection::open_in_memory().unwrap();
        let rows = run_script(&conn, "SELECT 1; SELECT 2 UNION ALL SELECT 3;").unwrap();
        assert_eq!(rows, ROWS_NOT_MEANINGFUL);
    }

    #[test]
    fn malformed_script_is_a_query_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_script(&conn, "CREATE TABLE (").unwrap_err();
        assert!(matches!(err, Error::Query(_)), "{err}");
    }

    #[test]
    fn statements_before_a_failure_stay_applied() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_script(&conn, "CREATE TABLE Kept (ID INTEGER); SELEC 1;").unwrap_err();
        assert!(matches!(err, Error::Query(_)));

        let kept: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name = 'Kept'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kept, 1);
    }
}
