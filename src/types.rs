// Shared value types: GUIDs, timestamps, visit transitions

use std::fmt;

use rand::Rng;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::constants::GUID_LENGTH;

const GUID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Stable identifier for a bookmark node or a history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(s: impl Into<String>) -> Self {
        Guid(s.into())
    }

    /// Generate a fresh random GUID (12 URL-safe characters).
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let s: String = (0..GUID_LENGTH)
            .map(|_| GUID_ALPHABET[rng.gen_range(0..GUID_ALPHABET.len())] as char)
            .collect();
        Guid(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this looks like a GUID we would have generated ourselves.
    pub fn is_valid(&self) -> bool {
        self.0.len() == GUID_LENGTH && self.0.bytes().all(|b| GUID_ALPHABET.contains(&b))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(s: &str) -> Self {
        Guid(s.to_string())
    }
}

impl From<String> for Guid {
    fn from(s: String) -> Self {
        Guid(s)
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Guid {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Guid {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl ToSql for Guid {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for Guid {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(|s| Guid(s.to_string()))
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Timestamp `days` days before this one.
    pub fn days_before(self, days: i64) -> Self {
        Timestamp(self.0 - days * 24 * 60 * 60 * 1000)
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp(ms)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(Timestamp)
    }
}

/// How a visit came about. Values are persisted; never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VisitType {
    Link = 1,
    Typed = 2,
    Bookmark = 3,
    Embed = 4,
    RedirectPermanent = 5,
    RedirectTemporary = 6,
    Download = 7,
    FramedLink = 8,
    Reload = 9,
}

impl VisitType {
    pub const ALL: [VisitType; 9] = [
        VisitType::Link,
        VisitType::Typed,
        VisitType::Bookmark,
        VisitType::Embed,
        VisitType::RedirectPermanent,
        VisitType::RedirectTemporary,
        VisitType::Download,
        VisitType::FramedLink,
        VisitType::Reload,
    ];

    pub fn from_primitive(v: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| *t as u8 == v)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(VisitType::Link),
            "typed" => Some(VisitType::Typed),
            "bookmark" => Some(VisitType::Bookmark),
            "embed" => Some(VisitType::Embed),
            "redirect_permanent" => Some(VisitType::RedirectPermanent),
            "redirect_temporary" => Some(VisitType::RedirectTemporary),
            "download" => Some(VisitType::Download),
            "framed_link" => Some(VisitType::FramedLink),
            "reload" => Some(VisitType::Reload),
            _ => None,
        }
    }
}

impl ToSql for VisitType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as u8))
    }
}

impl FromSql for VisitType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let v = value.as_i64()?;
        u8::try_from(v)
            .ok()
            .and_then(VisitType::from_primitive)
            .ok_or(FromSqlError::OutOfRange(v))
    }
}

/// Bitset of visit transitions, used to exclude visit kinds from queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitTransitionSet {
    bits: u16,
}

impl VisitTransitionSet {
    const ALL_BITS: u16 = {
        let mut bits = 0u16;
        let mut i = 1;
        while i <= 9 {
            bits |= 1 << i;
            i += 1;
        }
        bits
    };

    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn all() -> Self {
        Self { bits: Self::ALL_BITS }
    }

    pub fn from_bits(bits: u16) -> Self {
        Self { bits: bits & Self::ALL_BITS }
    }

    pub fn bits(self) -> u16 {
        self.bits
    }

    pub fn of(types: &[VisitType]) -> Self {
        let mut set = Self::empty();
        for t in types {
            set.insert(*t);
        }
        set
    }

    pub fn insert(&mut self, t: VisitType) {
        self.bits |= 1 << (t as u8);
    }

    pub fn remove(&mut self, t: VisitType) {
        self.bits &= !(1 << (t as u8));
    }

    pub fn contains(self, t: VisitType) -> bool {
        self.bits & (1 << (t as u8)) != 0
    }

    /// Every transition not in this set. Queries match on the complement of
    /// the exclusion set: `((1 << visit_type) & allowed) != 0`.
    pub fn complement(self) -> Self {
        Self { bits: !self.bits & Self::ALL_BITS }
    }
}

/// Classification of a page for history metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DocumentType {
    #[default]
    Regular = 0,
    Media = 1,
}

impl ToSql for DocumentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as u8))
    }
}

impl FromSql for DocumentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(DocumentType::Regular),
            1 => Ok(DocumentType::Media),
            v => Err(FromSqlError::OutOfRange(v)),
        }
    }
}

/// Minimum frecency a site needs to show up in top sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrecencyThresholdOption {
    #[default]
    None,
    /// Skip pages that were only visited once (frecency at or below a single
    /// link visit).
    SkipOneTimePages,
}

impl FrecencyThresholdOption {
    pub fn value(self) -> i64 {
        match self {
            FrecencyThresholdOption::None => 0,
            FrecencyThresholdOption::SkipOneTimePages => 101,
        }
    }
}
