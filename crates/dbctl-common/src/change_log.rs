use std::io::Read;

use chrono::{DateTime, SubsecRound, Utc};
use ring::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One applied migration unit, as recorded in the change log.
///
/// `(change_date_time, version)` is the primary key. Entries are immutable
/// once built; equality compares every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", from = "RawChangeLogEntry")]
pub struct ChangeLogEntry {
    migration_type: String,
    version: String,
    description: String,
    filename: String,
    hash: String,
    applied_by: String,
    change_date_time: DateTime<Utc>,
}

/// Wire shape of `ChangeLogEntry`; deserialized values go through `new`.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawChangeLogEntry {
    migration_type: String,
    version: String,
    description: String,
    filename: String,
    hash: String,
    applied_by: String,
    change_date_time: DateTime<Utc>,
}

impl From<RawChangeLogEntry> for ChangeLogEntry {
    fn from(raw: RawChangeLogEntry) -> Self {
        Self::new(
            raw.migration_type,
            raw.version,
            raw.description,
            raw.filename,
            raw.hash,
            raw.applied_by,
            raw.change_date_time,
        )
    }
}

impl ChangeLogEntry {
    pub fn new(
        migration_type: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        filename: impl Into<String>,
        hash: impl Into<String>,
        applied_by: impl Into<String>,
        change_date_time: DateTime<Utc>,
    ) -> Self {
        Self {
            migration_type: migration_type.into(),
            version: version.into(),
            description: description.into(),
            filename: filename.into(),
            hash: hash.into(),
            applied_by: applied_by.into(),
            // Stored timestamps keep microseconds; anything finer would not
            // survive a round trip through the store.
            change_date_time: change_date_time.trunc_subsecs(6),
        }
    }

    /// Build an entry for a migration script named
    /// `<direction>-<version>-<description>.<type>`, hashing its contents.
    ///
    /// `f-1.0.2-Initialise_database_change_log.ddl` yields version `1.0.2`,
    /// description `Initialise database change log` and type `DDL`.
    pub fn from_script(
        filename: &str,
        applied_by: &str,
        change_date_time: DateTime<Utc>,
        mut contents: impl Read,
    ) -> Result<Self> {
        let (version, description, migration_type) = parse_script_name(filename)?;

        let mut body = Vec::new();
        contents.read_to_end(&mut body)?;

        Ok(Self::new(
            migration_type,
            version,
            description,
            filename,
            Self::hash_contents(&body),
            applied_by,
            change_date_time,
        ))
    }

    /// Lowercase hex SHA-256 of a script body.
    pub fn hash_contents(contents: &[u8]) -> String {
        hex::encode(digest(&SHA256, contents).as_ref())
    }

    /// True when `other` records the same script file with the same content.
    pub fn is_same_script(&self, other: &ChangeLogEntry) -> bool {
        self.filename == other.filename && self.hash == other.hash
    }

    pub fn primary_key(&self) -> (DateTime<Utc>, &str) {
        (self.change_date_time, &self.version)
    }

    pub fn migration_type(&self) -> &str {
        &self.migration_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn applied_by(&self) -> &str {
        &self.applied_by
    }

    pub fn change_date_time(&self) -> DateTime<Utc> {
        self.change_date_time
    }
}

fn parse_script_name(filename: &str) -> Result<(String, String, String)> {
    let invalid = || {
        Error::Configuration(format!(
            "script name '{filename}' does not match <direction>-<version>-<description>.<type>"
        ))
    };

    let (stem, extension) = filename.rsplit_once('.').ok_or_else(invalid)?;
    let mut parts = stem.splitn(3, '-');
    let (Some(direction), Some(version), Some(description)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    if direction.is_empty() || version.is_empty() || description.is_empty() || extension.is_empty()
    {
        return Err(invalid());
    }

    Ok((
        version.to_string(),
        description.replace('_', " "),
        extension.to_uppercase(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    const SCRIPT: &str = "CREATE TABLE Fake (ID INTEGER)";

    fn applied_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 12, 16, 9, 43, 22).unwrap()
    }

    #[test]
    fn from_script_derives_fields_from_name_and_contents() {
        let entry = ChangeLogEntry::from_script(
            "f-1.0.2-Initialise_database_change_log.ddl",
            "JoeSoap",
            applied_at(),
            SCRIPT.as_bytes(),
        )
        .unwrap();

        assert_eq!(entry.migration_type(), "DDL");
        assert_eq!(entry.version(), "1.0.2");
        assert_eq!(entry.description(), "Initialise database change log");
        assert_eq!(entry.filename(), "f-1.0.2-Initialise_database_change_log.ddl");
        assert_eq!(entry.applied_by(), "JoeSoap");
        assert_eq!(entry.change_date_time(), applied_at());
        assert_eq!(entry.hash().len(), 64);
        assert_eq!(entry.hash(), ChangeLogEntry::hash_contents(SCRIPT.as_bytes()));
    }

    #[test]
    fn hash_matches_known_sha256() {
        assert_eq!(
            ChangeLogEntry::hash_contents(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn description_may_contain_dashes() {
        let entry = ChangeLogEntry::from_script(
            "f-2.1-add-user-table.dml",
            "ci",
            applied_at(),
            std::io::empty(),
        )
        .unwrap();
        assert_eq!(entry.version(), "2.1");
        assert_eq!(entry.description(), "add-user-table");
        assert_eq!(entry.migration_type(), "DML");
    }

    #[test]
    fn rejects_names_outside_the_convention() {
        for name in ["noextension", "f-1.0.ddl", "-1.0-x.ddl", "f-1.0-x.", "f--x.ddl"] {
            let err = ChangeLogEntry::from_script(name, "ci", applied_at(), std::io::empty())
                .unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{name}: {err}");
        }
    }

    #[test]
    fn construction_truncates_to_microseconds() {
        let precise = Utc
            .with_ymd_and_hms(2021, 1, 1, 0, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let entry = ChangeLogEntry::new("DDL", "1", "d", "f", "h", "me", precise);
        assert_eq!(entry.change_date_time().timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn same_script_compares_filename_and_hash_only() {
        let a = ChangeLogEntry::new("DDL", "1", "a", "f-1-a.ddl", "abc", "x", applied_at());
        let b = ChangeLogEntry::new("DML", "2", "b", "f-1-a.ddl", "abc", "y", Utc::now());
        let c = ChangeLogEntry::new("DDL", "1", "a", "f-1-a.ddl", "def", "x", applied_at());
        assert!(a.is_same_script(&b));
        assert!(!a.is_same_script(&c));
        assert_ne!(a, b);
    }

    #[test]
    fn serializes_with_column_names() {
        let entry = ChangeLogEntry::new("DDL", "1.0", "d", "f", "h", "me", applied_at());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["MigrationType"], "DDL");
        assert_eq!(json["ChangeDateTime"], "2020-12-16T09:43:22Z");
    }

    #[test]
    fn deserializing_truncates_to_microseconds() {
        let json = r#"{
            "MigrationType": "DDL",
            "Version": "1.0.2",
            "Description": "Initialise database change log",
            "Filename": "f-1.0.2-Initialise_database_change_log.ddl",
            "Hash": "abc",
            "AppliedBy": "JoeSoap",
            "ChangeDateTime": "2020-12-16T09:43:22.123456789Z"
        }"#;

        let entry: ChangeLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.change_date_time().timestamp_subsec_nanos(), 123_456_000);

        let direct = ChangeLogEntry::new(
            "DDL",
            "1.0.2",
            "Initialise database change log",
            "f-1.0.2-Initialise_database_change_log.ddl",
            "abc",
            "JoeSoap",
            applied_at().with_nanosecond(123_456_789).unwrap(),
        );
        assert_eq!(entry, direct);
    }
}
