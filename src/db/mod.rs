// Database module: opening Engine connections and the moz_meta key/value table

pub mod maintenance;
pub mod migrations;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::FromSql;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, ToSql};

use crate::constants::{DB_FILENAME, PLACES_FOLDER};
use crate::error::{Error, Result};
use crate::options::StoreOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    ReadOnly,
    ReadWrite,
}

/// Open a connection to the store at `db_path`.
///
/// A read-write connection creates the file if needed and brings the schema
/// up to date. A read-only connection requires the file to exist already.
pub fn open_database(db_path: &Path, conn_type: ConnectionType, options: &StoreOptions) -> Result<Connection> {
    let flags = match conn_type {
        ConnectionType::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
        ConnectionType::ReadWrite => {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI
        }
    };
    let conn = Connection::open_with_flags(db_path, flags)?;

    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;

    // Enable foreign keys (must be done per connection)
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&format!("PRAGMA cache_size = -{};", options.cache_size_kib))?;
    conn.execute_batch("PRAGMA temp_store = MEMORY;")?;

    match conn_type {
        ConnectionType::ReadWrite => {
            // WAL lets readers run alongside the single writer
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn.execute_batch("PRAGMA auto_vacuum = INCREMENTAL;")?;
            migrations::run_migrations(&conn)?;
        }
        ConnectionType::ReadOnly => {
            let version = migrations::get_schema_version(&conn)?;
            if version > migrations::latest_version() {
                return Err(Error::SchemaTooNew {
                    found: version,
                    supported: migrations::latest_version(),
                });
            }
        }
    }

    log::debug!("Opened {:?} connection to {}", conn_type, db_path.display());
    Ok(conn)
}

/// Get the database path inside a profile directory
pub fn get_db_path(profile_root: &Path) -> PathBuf {
    profile_root.join(PLACES_FOLDER).join(DB_FILENAME)
}

/// Default database location: ~/.places/places.sqlite
pub fn default_db_path() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| Error::Other("Could not determine home directory".to_string()))?;
    Ok(get_db_path(home.home_dir()))
}

pub fn put_meta(conn: &Connection, key: &str, value: &dyn ToSql) -> Result<()> {
    conn.execute(
        "REPLACE INTO moz_meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_meta<T: FromSql>(conn: &Connection, key: &str) -> Result<Option<T>> {
    let value = conn
        .query_row("SELECT value FROM moz_meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn delete_meta(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM moz_meta WHERE key = ?1", params![key])?;
    Ok(())
}

/// In-memory store with the same pragmas and schema as a writer connection.
#[cfg(test)]
pub(crate) fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    migrations::run_migrations(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reader_requires_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.sqlite");
        let opts = StoreOptions::default();
        assert!(open_database(&path, ConnectionType::ReadOnly, &opts).is_err());

        let _writer = open_database(&path, ConnectionType::ReadWrite, &opts).unwrap();
        let reader = open_database(&path, ConnectionType::ReadOnly, &opts).unwrap();
        let roots: i64 = reader
            .query_row("SELECT COUNT(*) FROM moz_bookmarks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(roots, 5);
        assert!(reader.execute("DELETE FROM moz_bookmarks", []).is_err(), "reader must be read-only");
    }

    #[test]
    fn meta_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run_migrations(&conn).unwrap();
        assert_eq!(get_meta::<i64>(&conn, "k").unwrap(), None);
        put_meta(&conn, "k", &42i64).unwrap();
        assert_eq!(get_meta::<i64>(&conn, "k").unwrap(), Some(42));
        delete_meta(&conn, "k").unwrap();
        assert_eq!(get_meta::<i64>(&conn, "k").unwrap(), None);
    }

    #[test]
    fn db_path_layout() {
        let p = get_db_path(Path::new("/home/me"));
        assert_eq!(p, Path::new("/home/me/.places/places.sqlite"));
    }
}
