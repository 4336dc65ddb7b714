// Places Store Constants
// Persisted values (root GUIDs, type codes, sync statuses) are part of the
// on-disk contract. Do not change them without a migration.

// Paths
pub const PLACES_FOLDER: &str = ".places";
pub const DB_FILENAME: &str = "places.sqlite";

// Engine defaults (overridable through StoreOptions)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CACHE_SIZE_KIB: i64 = 4_096;

// GUIDs
pub const GUID_LENGTH: usize = 12;

// Bookmark roots
pub const ROOT_GUID: &str = "root________";
pub const MENU_GUID: &str = "menu________";
pub const TOOLBAR_GUID: &str = "toolbar_____";
pub const UNFILED_GUID: &str = "unfiled_____";
pub const MOBILE_GUID: &str = "mobile______";

/// Every protected root, top root first. User roots are listed in display order.
pub const ROOT_GUIDS: [&str; 5] = [ROOT_GUID, MENU_GUID, TOOLBAR_GUID, UNFILED_GUID, MOBILE_GUID];

// Bookmark type codes (moz_bookmarks.type)
pub const BOOKMARK_TYPE_BOOKMARK: u8 = 1;
pub const BOOKMARK_TYPE_FOLDER: u8 = 2;
pub const BOOKMARK_TYPE_SEPARATOR: u8 = 3;

// Sync status codes
pub const SYNC_STATUS_UNKNOWN: u8 = 0;
pub const SYNC_STATUS_NEW: u8 = 1;
pub const SYNC_STATUS_NORMAL: u8 = 2;

// Meta keys
pub const META_HISTORY_LAST_SYNC: &str = "history_last_sync_time";
pub const META_HISTORY_SYNC_ID: &str = "history_sync_id";
pub const META_BOOKMARKS_LAST_SYNC: &str = "bookmarks_last_sync_time";
pub const META_BOOKMARKS_SYNC_ID: &str = "bookmarks_sync_id";
pub const META_DELETION_HIGH_WATER_MARK: &str = "history_deleted_everything_at";
pub const META_LAST_MAINTENANCE: &str = "last_maintenance_time";

// Input limits
pub const URL_LENGTH_MAX: usize = 65_536;
pub const TITLE_LENGTH_MAX: usize = 4_096;
pub const SEARCH_TERM_LENGTH_MAX: usize = 1_000;

// Frecency
pub const FRECENCY_SAMPLED_VISITS: i64 = 10;
pub const FRECENCY_BOOKMARKED_UNVISITED: i64 = 140;
pub const FRECENCY_UNVISITED: i64 = 0;

/// (max age in days, weight) buckets, newest first. Older visits use the last weight.
pub const FRECENCY_AGE_BUCKETS: [(i64, i64); 4] = [(4, 100), (14, 70), (31, 50), (90, 30)];
pub const FRECENCY_OLDEST_WEIGHT: i64 = 10;

// Prune
pub const DEFAULT_PRUNE_VISIT_AGE_DAYS: i64 = 90;
pub const DEFAULT_PRUNE_MAX_VISITS: i64 = 50_000;

// Maintenance
pub const MAINTENANCE_ANALYZE_INTERVAL_DAYS: i64 = 7;

// Autocomplete
pub const AUTOCOMPLETE_INPUT_HISTORY_BONUS: i64 = 1_000;
