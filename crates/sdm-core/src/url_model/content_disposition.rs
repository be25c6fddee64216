//! Content-Disposition header parsing (filename and filename*).

/// Extracts the filename from a raw Content-Disposition header value.
///
/// `filename*=UTF-8''...` (RFC 5987) takes precedence over `filename=`,
/// which may be quoted or a bare token.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.split(';').skip(1) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("filename*") {
            let lower = value.to_ascii_lowercase();
            if let Some(idx) = lower.find("''") {
                if lower.starts_with("utf-8") {
                    let decoded = percent_decode(&value[idx + 2..]);
                    if !decoded.is_empty() {
                        return Some(decoded);
                    }
                }
            }
        } else if name.eq_ignore_ascii_case("filename") {
            let v = unquote(value);
            if !v.is_empty() {
                plain = Some(v);
            }
        }
    }

    plain
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped || c != '\\' {
            out.push(c);
            escaped = false;
        } else {
            escaped = true;
        }
    }
    out
}

/// Lossy percent-decoding; malformed escapes are kept verbatim.
pub(crate) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
