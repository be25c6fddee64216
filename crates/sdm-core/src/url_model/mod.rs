//! Output filename derivation.
//!
//! Picks a local name for a download from the server's Content-Disposition
//! header or the URL's last path segment, cleaned up for Linux filesystems.

mod content_disposition;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub(crate) use content_disposition::percent_decode;
pub use sanitize::sanitize_filename;

use url::Url;

/// Fallback name when neither the server nor the URL yields anything usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Last path segment of `url`, percent-decoded. With `keep_query` the raw
/// query string is appended (`file.php?id=3`).
pub fn filename_from_url(url: &Url, keep_query: bool) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?;
    let mut name = percent_decode(segment);
    if keep_query {
        if let Some(q) = url.query().filter(|q| !q.is_empty()) {
            name.push('?');
            name.push_str(q);
        }
    }
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

/// Derives a safe filename for saving a download.
///
/// `server_name` (already extracted from Content-Disposition) wins over the
/// URL path. Falls back to `default_name` when the result is empty or a
/// reserved name.
pub fn derive_filename(
    url: &Url,
    server_name: Option<&str>,
    strip_cgi: bool,
    default_name: &str,
) -> String {
    let candidate = server_name
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url(url, !strip_cgi));

    let Some(raw) = candidate else {
        return default_name.to_string();
    };
    let cleaned = sanitize_filename(&raw);
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        default_name.to_string()
    } else {
        cleaned
    }
}
