use dbctl_common::Error;
use rusqlite::ErrorCode;

/// Map a driver error onto the connector taxonomy, keeping `context` in the
/// message.
pub(crate) fn classify(err: rusqlite::Error, context: &str) -> Error {
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    };

    match code {
        Some(ErrorCode::ConstraintViolation) => Error::Integrity(format!("{context}: {err}")),
        Some(ErrorCode::OperationInterrupted) => Error::Cancelled(format!("{context}: {err}")),
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::SystemIoFailure,
        ) => Error::Connection(format!("{context}: {err}")),
        _ => Error::Query(format!("{context}: {err}")),
    }
}
