//! Identifier normalization
//!
//! Listing entries carry the detail page URL, which doubles as the record's
//! identity. Normalization only strips what cannot change the addressed
//! document, so the normalized form can still be fetched as-is.

use crate::{UrlError, UrlResult};
use url::Url;

/// Normalizes a raw identifier taken from a listing entry
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Parse the URL; reject if malformed
/// 3. Require an `http` or `https` scheme and a host
/// 4. Lowercase the host (done by the parser)
/// 5. Remove the fragment
///
/// Path and query are left untouched.
///
/// # Examples
///
/// ```
/// use reel_harvest::url::normalize_identifier;
///
/// let id = normalize_identifier(" https://Movie.Example.com/subject/42/#comments ").unwrap();
/// assert_eq!(id, "https://movie.example.com/subject/42/");
/// ```
pub fn normalize_identifier(raw: &str) -> UrlResult<String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    Ok(url.to_string())
}
