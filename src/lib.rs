// Places Store - Library Entry Point
//
// Bookmarks, browsing history and page metadata in one SQLite database,
// reached through a single writer connection and any number of readers.

pub mod constants;
pub mod error;
pub mod types;
pub mod options;
pub mod interrupt;
pub mod serial;
pub mod url_util;
pub mod db;
pub mod bookmarks;
pub mod history;
pub mod matcher;
pub mod api;

pub use api::{PlacesApi, PlacesReadConnection, PlacesWriteConnection};
pub use error::{ApiResult, PlacesApiError};
pub use interrupt::SqlInterruptHandle;
pub use options::StoreOptions;
pub use types::{
    DocumentType, FrecencyThresholdOption, Guid, Timestamp, VisitTransitionSet, VisitType,
};
