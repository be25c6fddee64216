//! Request serialization.

use crate::protocol::{ClientOptions, Target};
use crate::segmenter::Segment;

fn has_header(opts: &ClientOptions, name: &str) -> bool {
    opts.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Builds a `GET` for `segment` of `target`. The connection is closed by the
/// server after the body, so a clean EOF marks the end of the stream.
pub(super) fn build_get(target: &Target, segment: Segment, opts: &ClientOptions) -> String {
    let mut req = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\n",
        target.request_path(),
        target.host_header()
    );
    if !has_header(opts, "user-agent") {
        req.push_str(&format!("User-Agent: {}\r\n", opts.user_agent));
    }
    if !has_header(opts, "accept") {
        req.push_str("Accept: */*\r\n");
    }
    req.push_str(&format!("Range: {}\r\n", segment.range_header_value()));
    for (name, value) in &opts.headers {
        if name.eq_ignore_ascii_case("range")
            || name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("connection")
        {
            continue;
        }
        req.push_str(&format!("{}: {}\r\n", name, value));
    }
    req.push_str("Connection: close\r\n\r\n");
    req
}
