// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: history, bookmarks, keywords, metadata
    r#"
    CREATE TABLE moz_places (
        id INTEGER PRIMARY KEY,
        url LONGVARCHAR NOT NULL UNIQUE,
        title LONGVARCHAR,
        guid TEXT NOT NULL UNIQUE,
        hidden INTEGER NOT NULL DEFAULT 0,
        typed INTEGER NOT NULL DEFAULT 0,
        frecency INTEGER NOT NULL DEFAULT -1,
        visit_count_local INTEGER NOT NULL DEFAULT 0,
        visit_count_remote INTEGER NOT NULL DEFAULT 0,
        last_visit_date_local INTEGER NOT NULL DEFAULT 0,
        last_visit_date_remote INTEGER NOT NULL DEFAULT 0,
        foreign_count INTEGER NOT NULL DEFAULT 0,
        preview_image_url TEXT,
        sync_status INTEGER NOT NULL DEFAULT 1,
        sync_change_counter INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE moz_places_tombstones (
        guid TEXT PRIMARY KEY
    ) WITHOUT ROWID;

    CREATE TABLE moz_historyvisits (
        id INTEGER PRIMARY KEY,
        is_local INTEGER NOT NULL,
        from_visit INTEGER,
        place_id INTEGER NOT NULL REFERENCES moz_places(id) ON DELETE CASCADE,
        visit_date INTEGER NOT NULL,
        visit_type INTEGER NOT NULL
    );

    CREATE TABLE moz_historyvisit_tombstones (
        place_id INTEGER NOT NULL,
        visit_date INTEGER NOT NULL,
        PRIMARY KEY (place_id, visit_date)
    );

    CREATE TABLE moz_inputhistory (
        place_id INTEGER NOT NULL REFERENCES moz_places(id) ON DELETE CASCADE,
        input LONGVARCHAR NOT NULL,
        use_count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (place_id, input)
    );

    CREATE TABLE moz_bookmarks (
        id INTEGER PRIMARY KEY,
        fk INTEGER REFERENCES moz_places(id) ON DELETE RESTRICT,
        type INTEGER NOT NULL,
        parent INTEGER REFERENCES moz_bookmarks(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        title TEXT,
        date_added INTEGER NOT NULL DEFAULT 0,
        last_modified INTEGER NOT NULL DEFAULT 0,
        guid TEXT NOT NULL UNIQUE,
        sync_status INTEGER NOT NULL DEFAULT 0,
        sync_change_counter INTEGER NOT NULL DEFAULT 1,
        CHECK (type IN (1, 2, 3)),
        CHECK ((type = 1) = (fk IS NOT NULL))
    );

    CREATE TABLE moz_bookmarks_deleted (
        guid TEXT PRIMARY KEY,
        date_removed INTEGER NOT NULL
    ) WITHOUT ROWID;

    CREATE TABLE moz_keywords (
        keyword TEXT PRIMARY KEY,
        place_id INTEGER NOT NULL REFERENCES moz_places(id) ON DELETE CASCADE
    );

    CREATE TABLE moz_places_metadata_search_queries (
        id INTEGER PRIMARY KEY,
        term TEXT NOT NULL UNIQUE
    );

    CREATE TABLE moz_places_metadata (
        id INTEGER PRIMARY KEY,
        place_id INTEGER NOT NULL REFERENCES moz_places(id) ON DELETE CASCADE,
        referrer_place_id INTEGER REFERENCES moz_places(id) ON DELETE CASCADE,
        search_query_id INTEGER REFERENCES moz_places_metadata_search_queries(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT 0,
        total_view_time INTEGER NOT NULL DEFAULT 0,
        document_type INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE moz_meta (
        key TEXT PRIMARY KEY,
        value NOT NULL
    ) WITHOUT ROWID;

    -- Bookmarked URLs keep their moz_places row alive through history deletion.
    CREATE TRIGGER moz_bookmarks_afterinsert_trigger
    AFTER INSERT ON moz_bookmarks
    FOR EACH ROW WHEN NEW.fk NOT NULL
    BEGIN
        UPDATE moz_places SET foreign_count = foreign_count + 1 WHERE id = NEW.fk;
    END;

    CREATE TRIGGER moz_bookmarks_afterdelete_trigger
    AFTER DELETE ON moz_bookmarks
    FOR EACH ROW WHEN OLD.fk NOT NULL
    BEGIN
        UPDATE moz_places SET foreign_count = foreign_count - 1 WHERE id = OLD.fk;
    END;

    CREATE TRIGGER moz_bookmarks_afterupdate_fk_trigger
    AFTER UPDATE OF fk ON moz_bookmarks
    FOR EACH ROW WHEN OLD.fk IS NOT NEW.fk
    BEGIN
        UPDATE moz_places SET foreign_count = foreign_count + 1 WHERE id = NEW.fk;
        UPDATE moz_places SET foreign_count = foreign_count - 1 WHERE id = OLD.fk;
    END;

    CREATE TRIGGER moz_keywords_afterinsert_trigger
    AFTER INSERT ON moz_keywords
    FOR EACH ROW
    BEGIN
        UPDATE moz_places SET foreign_count = foreign_count + 1 WHERE id = NEW.place_id;
    END;

    CREATE TRIGGER moz_keywords_afterdelete_trigger
    AFTER DELETE ON moz_keywords
    FOR EACH ROW
    BEGIN
        UPDATE moz_places SET foreign_count = foreign_count - 1 WHERE id = OLD.place_id;
    END;

    -- Roots. Positions of the user roots are their display order.
    INSERT INTO moz_bookmarks (id, type, parent, position, title, guid, sync_status)
    VALUES (1, 2, NULL, 0, 'root', 'root________', 2);
    INSERT INTO moz_bookmarks (type, parent, position, title, guid, sync_status)
    VALUES (2, 1, 0, 'menu', 'menu________', 2),
           (2, 1, 1, 'toolbar', 'toolbar_____', 2),
           (2, 1, 2, 'unfiled', 'unfiled_____', 2),
           (2, 1, 3, 'mobile', 'mobile______', 2);

    -- Indexes for common queries
    CREATE INDEX idx_places_frecency ON moz_places(frecency);
    CREATE INDEX idx_places_last_visit_local ON moz_places(last_visit_date_local);
    CREATE INDEX idx_visits_place_date ON moz_historyvisits(place_id, visit_date);
    CREATE INDEX idx_visits_date ON moz_historyvisits(visit_date);
    CREATE INDEX idx_bookmarks_parent_position ON moz_bookmarks(parent, position);
    CREATE INDEX idx_bookmarks_fk ON moz_bookmarks(fk);
    CREATE INDEX idx_bookmarks_date_added ON moz_bookmarks(date_added);
    CREATE INDEX idx_keywords_place ON moz_keywords(place_id);
    CREATE INDEX idx_metadata_place ON moz_places_metadata(place_id);
    CREATE INDEX idx_metadata_updated ON moz_places_metadata(updated_at);
    "#,
];

/// Get current schema version from database
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Run all pending migrations (crash-safe: each migration commits together
/// with its version bump)
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = latest_version();

    // Refuse to open a DB created by a newer build
    if current_version > target_version {
        return Err(Error::SchemaTooNew {
            found: current_version,
            supported: target_version,
        });
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration)?;
        tx.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;
        tx.commit()?;

        log::info!("Applied places migration {}", migration_version);
    }

    Ok(())
}
