use std::fmt;
use std::time::Duration;

use dbctl_common::{Error, Result};
use rusqlite::{Connection, OpenFlags};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::classify;

const INTERRUPT_RETRY: Duration = Duration::from_millis(25);

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    Private,
    Shared,
}

/// A parsed SQLite connection string.
///
/// Accepts `Data Source=<path>;Mode=<mode>;Cache=<cache>` (keys are
/// case-insensitive, `DataSource` and `Filename` are aliases) or a bare path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    data_source: String,
    mode: OpenMode,
    cache: CacheMode,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Configuration("connection string cannot be empty".into()));
        }

        // Key/value form only when the first segment names a known keyword,
        // so bare paths may contain '='.
        let first_key = raw
            .split(';')
            .next()
            .and_then(|segment| segment.split_once('='))
            .map(|(key, _)| key.trim().to_lowercase());
        if !first_key.is_some_and(|key| is_keyword(&key)) {
            return Ok(Self {
                data_source: raw.to_string(),
                mode: OpenMode::default(),
                cache: CacheMode::default(),
            });
        }

        let mut data_source = None;
        let mut mode = OpenMode::default();
        let mut cache = CacheMode::default();

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::Configuration(format!("malformed connection string segment '{pair}'"))
            })?;
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                DATA_SOURCE_KEY | DATA_SOURCE_ALIAS | FILENAME_KEY => {
                    data_source = Some(value.to_string());
                }
                MODE_KEY => mode = parse_mode(value)?,
                CACHE_KEY => cache = parse_cache(value)?,
                _ => {
                    return Err(Error::Configuration(format!(
                        "unsupported connection string keyword '{key}'"
                    )));
                }
            }
        }

        let data_source = data_source
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Configuration("connection string has no data source".into()))?;

        Ok(Self {
            data_source,
            mode,
            cache,
        })
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn cache(&self) -> CacheMode {
        self.cache
    }

    /// Path or URI handed to `sqlite3_open_v2`.
    pub fn open_target(&self) -> String {
        if self.mode == OpenMode::Memory && self.data_source != ":memory:" {
            format!("file:{}?mode=memory", self.data_source)
        } else {
            self.data_source.clone()
        }
    }

    pub fn open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        flags |= match self.mode {
            OpenMode::ReadWriteCreate | OpenMode::Memory => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };

        match self.cache {
            CacheMode::Default => flags,
            CacheMode::Private => flags | OpenFlags::SQLITE_OPEN_PRIVATE_CACHE,
            CacheMode::Shared => flags | OpenFlags::SQLITE_OPEN_SHARED_CACHE,
        }
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data Source={};Mode={:?};Cache={:?}",
            self.data_source, self.mode, self.cache
        )
    }
}

const DATA_SOURCE_KEY: &str = "data source";
const DATA_SOURCE_ALIAS: &str = "datasource";
const FILENAME_KEY: &str = "filename";
const MODE_KEY: &str = "mode";
const CACHE_KEY: &str = "cache";

fn is_keyword(key: &str) -> bool {
    matches!(
        key,
        DATA_SOURCE_KEY | DATA_SOURCE_ALIAS | FILENAME_KEY | MODE_KEY | CACHE_KEY
    )
}

fn parse_mode(value: &str) -> Result<OpenMode> {
    match value.to_lowercase().as_str() {
        "readwritecreate" => Ok(OpenMode::ReadWriteCreate),
        "readwrite" => Ok(OpenMode::ReadWrite),
        "readonly" => Ok(OpenMode::ReadOnly),
        "memory" => Ok(OpenMode::Memory),
        other => Err(Error::Configuration(format!("unsupported open mode '{other}'"))),
    }
}

fn parse_cache(value: &str) -> Result<CacheMode> {
    match value.to_lowercase().as_str() {
        "default" => Ok(CacheMode::Default),
        "private" => Ok(CacheMode::Private),
        "shared" => Ok(CacheMode::Shared),
        other => Err(Error::Configuration(format!("unsupported cache mode '{other}'"))),
    }
}

/// The single connection slot owned by one connector instance.
///
/// `configure` only records where to connect; the connection itself is
/// created by `open`. Reconfiguring an open handle takes effect on the next
/// `open`. One command text is bound at a time and reused across calls.
#[derive(Default)]
pub struct ConnectionHandle {
    target: Option<ConnectionString>,
    command_text: String,
    connection: Option<Connection>,
}

impl ConnectionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, connection_string: &str) -> Result<()> {
        self.target = Some(ConnectionString::parse(connection_string)?);
        Ok(())
    }

    pub fn set_command_text(&mut self, command_text: &str) -> Result<()> {
        if command_text.trim().is_empty() {
            return Err(Error::Configuration("command text cannot be empty".into()));
        }
        command_text.clone_into(&mut self.command_text);
        Ok(())
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the configured database. A no-op when already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let target = self
            .target
            .clone()
            .ok_or_else(|| Error::Configuration("connection handle is not configured".into()))?;

        debug!("opening sqlite connection: {target}");
        let connection = tokio::task::spawn_blocking(move || {
            Connection::open_with_flags(target.open_target(), target.open_flags())
        })
        .await
        .map_err(|e| Error::Connection(format!("open task failed: {e}")))?
        .map_err(|e| match classify(e, "failed to open database") {
            Error::Query(msg) => Error::Connection(msg),
            other => other,
        })?;

        self.connection = Some(connection);
        Ok(())
    }

    /// Close the connection. A no-op when already closed; the slot is empty
    /// afterwards even if closing reports an error.
    pub async fn close(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        debug!("closing sqlite connection");
        tokio::task::spawn_blocking(move || connection.close())
            .await
            .map_err(|e| Error::Connection(format!("close task failed: {e}")))?
            .map_err(|(_, e)| Error::Connection(format!("failed to close database: {e}")))
    }

    /// Run `work` against the open connection and the bound command text on
    /// a blocking thread.
    ///
    /// If `cancel` fires first, running statements are interrupted and the
    /// driver's outcome is returned once the work finishes.
    pub async fn execute<T, F>(&mut self, cancel: &CancellationToken, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
    {
        let connection = self
            .connection
            .take()
            .ok_or_else(|| Error::Connection("connection is not open".into()))?;
        let interrupt = connection.get_interrupt_handle();
        let command_text = self.command_text.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            let result = work(&connection, &command_text);
            (connection, result)
        });

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = cancel.cancelled() => {
                debug!("cancellation requested, interrupting statement");
                // An interrupt issued between statements is ignored by SQLite,
                // so keep interrupting until the work gives up.
                loop {
                    interrupt.interrupt();
                    tokio::select! {
                        joined = &mut task => break joined,
                        _ = tokio::time::sleep(INTERRUPT_RETRY) => {}
                    }
                }
            }
        };

        // A panicked task takes the connection with it, leaving the slot closed.
        let (connection, result) =
            joined.map_err(|e| Error::Connection(format!("statement task failed: {e}")))?;
        self.connection = Some(connection);
        result
    }
}
