//! HTTP/1.1 ranged GET.

mod chunked;
mod request;
mod response;

use std::net::IpAddr;

use super::{OpenedStream, ProbeResult, ProtocolClient, Target};
use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::segmenter::Segment;
use crate::transport::{PrefixedTransport, Transport};
use crate::url_model::parse_content_disposition_filename;

use chunked::ChunkedTransport;
use response::ResponseHead;

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Sends `GET` with a `Range` for `segment`, follows redirects, and stops
/// after the response header.
pub(super) fn open(
    client: &ProtocolClient,
    target: &Target,
    segment: Segment,
    local: Option<IpAddr>,
    cancel: &CancelToken,
) -> Result<OpenedStream, TransferError> {
    let max_redirect = client.options().max_redirect;
    let mut current = target.clone();

    for _ in 0..=max_redirect {
        let mut transport = client.connect(&current.endpoint(), local, cancel)?;
        let req = request::build_get(&current, segment, client.options());
        transport.write_all(req.as_bytes())?;
        let (head, body_prefix) = response::read_head(transport.as_mut())?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        if is_redirect(head.status) {
            let location = head
                .location
                .as_deref()
                .ok_or_else(|| TransferError::protocol("redirect without Location header"))?;
            let next = current.redirect(location)?;
            tracing::debug!(status = head.status, "redirected to {}", next.url);
            current = next;
            continue;
        }

        let (start, size, resumable) = interpret(&head, segment)?;
        let filename = head
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition_filename);
        let mut transport: Box<dyn Transport> = if body_prefix.is_empty() {
            transport
        } else {
            Box::new(PrefixedTransport::new(body_prefix, transport))
        };
        if head.chunked {
            tracing::debug!("decoding chunked response body");
            transport = Box::new(ChunkedTransport::new(transport));
        }
        return Ok(OpenedStream {
            transport,
            start,
            info: ProbeResult {
                size,
                resumable,
                filename,
                target: current,
            },
        });
    }
    Err(TransferError::TooManyRedirects(max_redirect))
}

/// Start offset, full size and resumability from a final (non-redirect)
/// response to a request for `segment`.
fn interpret(head: &ResponseHead, segment: Segment) -> Result<(u64, Option<u64>, bool), TransferError> {
    match head.status {
        206 => {
            let start = head
                .content_range
                .map(|cr| cr.start)
                .unwrap_or(segment.current_byte);
            let size = head
                .content_range
                .and_then(|cr| cr.total)
                .or_else(|| {
                    // Without a total only an open-ended request tells us the size.
                    segment
                        .is_unbounded()
                        .then_some(head.content_length)
                        .flatten()
                        .map(|len| len + start)
                });
            Ok((start, size, true))
        }
        200 => Ok((0, head.content_length, false)),
        // Servers answer `bytes=0-` on an empty resource with 416 `*/0`.
        416 if head.unsatisfied_total == Some(0) && segment.current_byte == 0 => {
            Ok((0, Some(0), false))
        }
        code => Err(TransferError::Http(code)),
    }
}
