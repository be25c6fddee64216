//! Linux-safe filename cleanup.

/// Linux NAME_MAX in bytes.
const NAME_MAX: usize = 255;

/// Replaces `/`, NUL and control characters with `_`, strips leading dots
/// and surrounding whitespace, and truncates to 255 bytes on a char boundary.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    let trimmed = replaced.trim().trim_start_matches('.').trim_end();
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
