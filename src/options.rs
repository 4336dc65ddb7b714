// Store configuration
// Every field has a default, so an empty JSON object is a valid config file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_CACHE_SIZE_KIB, DEFAULT_PRUNE_MAX_VISITS,
    DEFAULT_PRUNE_VISIT_AGE_DAYS,
};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreOptions {
    /// How long a connection waits on a lock before reporting busy.
    pub busy_timeout_ms: u64,
    /// Page cache size per connection.
    pub cache_size_kib: i64,
    /// Visits older than this are candidates for `prune_destructively`.
    pub prune_visit_age_days: i64,
    /// `prune_destructively` keeps at most this many of the newest visits.
    pub prune_max_visits: i64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            cache_size_kib: DEFAULT_CACHE_SIZE_KIB,
            prune_visit_age_days: DEFAULT_PRUNE_VISIT_AGE_DAYS,
            prune_max_visits: DEFAULT_PRUNE_MAX_VISITS,
        }
    }
}

impl StoreOptions {
    /// Load options from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            crate::error::Error::Other(format!("Invalid config {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: StoreOptions = serde_json::from_str(r#"{"busyTimeoutMs": 250}"#).unwrap();
        assert_eq!(opts.busy_timeout_ms, 250);
        assert_eq!(opts.prune_visit_age_days, DEFAULT_PRUNE_VISIT_AGE_DAYS);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("places.json");
        std::fs::write(&path, r#"{"pruneMaxVisits": 10}"#).unwrap();
        let opts = StoreOptions::load(&path).unwrap();
        assert_eq!(opts.prune_max_visits, 10);
        assert_eq!(opts.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);

        std::fs::write(&path, "not json").unwrap();
        assert!(StoreOptions::load(&path).is_err());
    }
}
