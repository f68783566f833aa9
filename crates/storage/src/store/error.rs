#![forbid(unsafe_code)]

use rusqlite::ErrorCode;
use toc_core::StorageError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    /// A stored row cannot be turned back into an outline.
    Corrupt(String),
}

impl StoreError {
    /// Lock contention on the database file. Another writer holds it and a
    /// later attempt may succeed.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sql(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Corrupt(message) => write!(f, "corrupt row: {message}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sql(err) => Some(err),
            Self::InvalidInput(_) | Self::Corrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Corrupt(format!("json: {value}"))
    }
}

impl From<StoreError> for StorageError {
    fn from(value: StoreError) -> Self {
        if value.is_busy() {
            return StorageError::Transient(value.to_string());
        }
        match value {
            StoreError::Sql(rusqlite::Error::SqliteFailure(code, _))
                if matches!(code.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) =>
            {
                StorageError::Corrupt(format!("database file: {}", code))
            }
            StoreError::Corrupt(message) => StorageError::Corrupt(message),
            other => StorageError::Backend(other.to_string()),
        }
    }
}
