// URL parsing and normalization
//
// Every URL that reaches the database goes through `parse_url`, so lookups
// and inserts agree on the canonical (punycoded, percent-encoded) form.

use url::Url;

use crate::constants::{TITLE_LENGTH_MAX, URL_LENGTH_MAX};
use crate::error::{InvalidPlaceInfo, Result};

/// Parse and normalize a URL, rejecting anything over the length ceiling.
pub fn parse_url(s: &str) -> Result<Url> {
    let url = Url::parse(s.trim())?;
    if url.as_str().len() > URL_LENGTH_MAX {
        return Err(InvalidPlaceInfo::UrlTooLong.into());
    }
    Ok(url)
}

/// Like `parse_url`, but malformed input just means "no such URL".
pub fn normalize_for_lookup(s: &str) -> Option<Url> {
    match parse_url(s) {
        Ok(url) => Some(url),
        Err(e) => {
            log::debug!("Ignoring unusable URL in lookup: {}", e);
            None
        }
    }
}

/// Clamp a title to the stored maximum, on a char boundary.
pub fn truncate_title(title: &str) -> String {
    if title.len() <= TITLE_LENGTH_MAX {
        return title.to_string();
    }
    let mut end = TITLE_LENGTH_MAX;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    title[..end].to_string()
}
