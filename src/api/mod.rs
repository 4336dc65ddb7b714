// Store manager: owns the single writer and hands out readers
//
// Every session holds a clone of the manager's liveness flag. Closing (or
// dropping) the manager clears it, after which every session refuses work
// with `SessionClosed` without touching the database.

pub mod read;
pub mod write;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use read::PlacesReadConnection;
pub use write::PlacesWriteConnection;

use crate::db::{self, ConnectionType};
use crate::error::{ApiResult, Error, PlacesApiError};
use crate::options::StoreOptions;
use crate::serial::SerialQueue;

fn open_failed(path: &Path, err: Error) -> PlacesApiError {
    log::error!("places: failed to open {}: {}", path.display(), err);
    PlacesApiError::DatabaseOpenFailed {
        reason: err.to_string(),
    }
}

pub struct PlacesApi {
    db_path: PathBuf,
    options: StoreOptions,
    alive: Arc<AtomicBool>,
    write_conn: Arc<PlacesWriteConnection>,
    /// Serializes manager-level operations.
    queue: SerialQueue<()>,
}

impl PlacesApi {
    pub fn open(db_path: impl AsRef<Path>) -> ApiResult<Self> {
        Self::open_with_options(db_path, StoreOptions::default())
    }

    /// Open (creating and migrating if needed) the store at `db_path`.
    pub fn open_with_options(db_path: impl AsRef<Path>, options: StoreOptions) -> ApiResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_failed(&db_path, e.into()))?;
        }
        let conn = db::open_database(&db_path, ConnectionType::ReadWrite, &options)
            .map_err(|e| open_failed(&db_path, e))?;

        let alive = Arc::new(AtomicBool::new(true));
        let reader = PlacesReadConnection::new(conn, Arc::clone(&alive));
        let write_conn = Arc::new(PlacesWriteConnection::new(reader, options.clone()));
        log::debug!("Opened places store at {}", db_path.display());

        Ok(Self {
            db_path,
            options,
            alive,
            write_conn,
            queue: SerialQueue::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// The store's single writer. Every call returns the same connection.
    pub fn get_writer(&self) -> Arc<PlacesWriteConnection> {
        Arc::clone(&self.write_conn)
    }

    /// A new read-only connection.
    pub fn open_reader(&self) -> ApiResult<PlacesReadConnection> {
        if !self.is_open() {
            return Err(PlacesApiError::SessionClosed);
        }
        let conn = db::open_database(&self.db_path, ConnectionType::ReadOnly, &self.options)
            .map_err(|e| open_failed(&self.db_path, e))?;
        Ok(PlacesReadConnection::new(conn, Arc::clone(&self.alive)))
    }

    pub fn is_open(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Invalidate this manager and every connection it produced. Calling it
    /// again does nothing. Operations already running finish normally.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            log::debug!("Closed places store at {}", self.db_path.display());
        }
    }

    pub fn reset_history_sync_metadata(&self) -> ApiResult<()> {
        self.queue.run(|_| self.write_conn.reset_history_sync_metadata())
    }

    pub fn reset_bookmark_sync_metadata(&self) -> ApiResult<()> {
        self.queue.run(|_| self.write_conn.reset_bookmark_sync_metadata())
    }
}

impl Drop for PlacesApi {
    fn drop(&mut self) {
        self.close();
    }
}
