// Places Store Error Types
//
// `Error` is what every module below the session layer returns. The session
// layer converts it exactly once into `PlacesApiError`, the taxonomy callers
// see. No rusqlite type crosses that boundary.

use rusqlite::ffi::ErrorCode;
use thiserror::Error;

use crate::types::Guid;

/// The operation was cancelled through an interrupt handle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The operation was interrupted")]
pub struct Interrupted;

/// Caller-supplied data that can't be applied to the tree or history.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidPlaceInfo {
    #[error("No such item: {0}")]
    NoSuchGuid(Guid),

    #[error("Invalid guid: {0}")]
    InvalidGuid(String),

    #[error("Guid already in use: {0}")]
    DuplicateGuid(Guid),

    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    #[error("Can't update a root: {0}")]
    CannotUpdateRoot(Guid),

    #[error("URL too long")]
    UrlTooLong,

    #[error("Illegal change: {0}")]
    IllegalChange(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("{0}")]
    Interrupted(#[from] Interrupted),

    #[error("Invalid place info: {0}")]
    InvalidPlaceInfo(#[from] InvalidPlaceInfo),

    #[error("Database schema version {found} is newer than this build supports (max {supported})")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("Corrupt data: {0}")]
    Corruption(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by `PlacesApi` and its connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacesApiError {
    /// The `PlacesApi` that produced this connection has been closed.
    #[error("Connection used after its PlacesApi was closed")]
    SessionClosed,

    #[error("Failed to open database: {reason}")]
    DatabaseOpenFailed { reason: String },

    #[error("Can't update a bookmark root: {guid}")]
    CannotUpdateRoot { guid: Guid },

    #[error("No such item: {guid}")]
    NoSuchItem { guid: Guid },

    #[error("Invalid parent: {reason}")]
    InvalidParent { reason: String },

    #[error("Illegal change: {reason}")]
    IllegalChange { reason: String },

    #[error("URL parse error: {reason}")]
    UrlParseError { reason: String },

    #[error("URL too long")]
    UrlTooLong,

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Lock contention or busy timeout. Safe to retry with backoff.
    #[error("Database busy: {reason}")]
    ResourceBusy { reason: String },

    #[error("Operation interrupted")]
    Interrupted,

    #[error("Database corrupt: {reason}")]
    DataCorrupt { reason: String },

    #[error("Unexpected error: {reason}")]
    Unexpected { reason: String },
}

pub type ApiResult<T> = std::result::Result<T, PlacesApiError>;

fn classify_sql(err: &rusqlite::Error) -> PlacesApiError {
    let reason = err.to_string();
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            PlacesApiError::ResourceBusy { reason }
        }
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
            PlacesApiError::DataCorrupt { reason }
        }
        Some(ErrorCode::OperationInterrupted) => PlacesApiError::Interrupted,
        _ => PlacesApiError::Unexpected { reason },
    }
}

impl From<Error> for PlacesApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Database(e) => {
                let api = classify_sql(&e);
                match api {
                    PlacesApiError::Unexpected { .. } | PlacesApiError::DataCorrupt { .. } => {
                        log::error!("places: database error: {}", e)
                    }
                    PlacesApiError::ResourceBusy { .. } => log::warn!("places: database busy: {}", e),
                    _ => log::debug!("places: {}", e),
                }
                api
            }
            Error::Interrupted(_) => PlacesApiError::Interrupted,
            Error::UrlParse(e) => {
                log::warn!("places: rejected URL: {}", e);
                PlacesApiError::UrlParseError { reason: e.to_string() }
            }
            Error::InvalidPlaceInfo(info) => {
                log::warn!("places: rejected change: {}", info);
                match info {
                    InvalidPlaceInfo::NoSuchGuid(guid) => PlacesApiError::NoSuchItem { guid },
                    InvalidPlaceInfo::CannotUpdateRoot(guid) => PlacesApiError::CannotUpdateRoot { guid },
                    InvalidPlaceInfo::InvalidParent(reason) => PlacesApiError::InvalidParent { reason },
                    InvalidPlaceInfo::IllegalChange(reason) => PlacesApiError::IllegalChange { reason },
                    InvalidPlaceInfo::UrlTooLong => PlacesApiError::UrlTooLong,
                    InvalidPlaceInfo::InvalidGuid(g) => PlacesApiError::InvalidInput {
                        reason: format!("invalid guid: {}", g),
                    },
                    InvalidPlaceInfo::DuplicateGuid(g) => PlacesApiError::InvalidInput {
                        reason: format!("guid already in use: {}", g),
                    },
                    InvalidPlaceInfo::InvalidInput(reason) => PlacesApiError::InvalidInput { reason },
                }
            }
            Error::Corruption(reason) => {
                log::error!("places: corrupt data: {}", reason);
                PlacesApiError::DataCorrupt { reason }
            }
            other => {
                log::error!("places: unexpected error: {}", other);
                PlacesApiError::Unexpected { reason: other.to_string() }
            }
        }
    }
}
