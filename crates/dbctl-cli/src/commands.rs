use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use dbctl_common::ChangeLogEntry;
use dbctl_connectors::{CancellationToken, Connector, ConnectorMetadata};
use tracing::info;

/// Outcome of `dbctl apply`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

pub async fn init(
    connector: &mut dyn Connector,
    connection_string: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    connector
        .create_change_log_table(connection_string, cancel)
        .await
        .context("failed to create the change log table")?;
    Ok(())
}

/// Run each script not yet recorded with the same file name and content,
/// recording it right after it succeeds. Stops at the first failure.
pub async fn apply(
    connector: &mut dyn Connector,
    connection_string: &str,
    applied_by: &str,
    scripts: &[PathBuf],
    cancel: &CancellationToken,
) -> Result<ApplySummary> {
    let mut history = connector
        .fetch_change_log_entries(connection_string, cancel)
        .await
        .context("failed to read the change log")?;
    let mut summary = ApplySummary::default();

    for path in scripts {
        let filename = script_name(path)?;
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let entry = ChangeLogEntry::from_script(&filename, applied_by, Utc::now(), body.as_bytes())?;

        if history.iter().any(|h| h.is_same_script(&entry)) {
            info!("skipping {filename}: already applied");
            summary.skipped.push(filename);
            continue;
        }

        connector
            .execute_script(connection_string, &body, cancel)
            .await
            .with_context(|| format!("failed to execute {filename}"))?;
        connector
            .add_change_log_entry(connection_string, &entry, cancel)
            .await
            .with_context(|| format!("{filename} ran but could not be recorded"))?;

        info!("applied {filename} (version {})", entry.version());
        history.push(entry);
        summary.applied.push(filename);
    }

    Ok(summary)
}

pub async fn exec(
    connector: &mut dyn Connector,
    connection_string: &str,
    script: &Path,
    cancel: &CancellationToken,
) -> Result<i64> {
    let body = std::fs::read_to_string(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let rows = connector
        .execute_script(connection_string, &body, cancel)
        .await
        .with_context(|| format!("failed to execute {}", script.display()))?;
    Ok(rows)
}

pub fn format_history(entries: &[ChangeLogEntry]) -> String {
    if entries.is_empty() {
        return "change log is empty\n".to_string();
    }

    let mut out = format!(
        "{:<27} {:<10} {:<5} {:<16} {}\n",
        "APPLIED AT", "VERSION", "TYPE", "APPLIED BY", "FILENAME"
    );
    for entry in entries {
        out.push_str(&format!(
            "{:<27} {:<10} {:<5} {:<16} {}\n",
            entry
                .change_date_time()
                .format("%Y-%m-%d %H:%M:%S%.3f UTC")
                .to_string(),
            entry.version(),
            entry.migration_type(),
            entry.applied_by(),
            entry.filename()
        ));
    }
    out
}

pub fn format_connectors(connectors: &[ConnectorMetadata]) -> String {
    connectors
        .iter()
        .map(|c| format!("{:<12} {:<8} {}\n", c.name, c.version, c.description))
        .collect()
}

fn script_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}
