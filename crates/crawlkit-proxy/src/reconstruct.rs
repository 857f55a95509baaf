//! Rebuilds [`Response`] graphs from proxy-manager replies.

use crawlkit_http::response::status_line;
use crawlkit_http::{
    HeaderMap, HeaderName, HeaderValue, HttpError, Method, Request, RequestMeta, Response,
    ResponseBody, StatusCode, Url, Version,
};
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH};

use crate::wire::{ProxyReply, WireHeaders, WireRequest};

/// Deepest redirect chain accepted from the remote side. Replies nesting
/// more hops are rejected as malformed rather than walked.
pub const MAX_REDIRECT_DEPTH: usize = 32;

/// Converts a reply into the caller-facing response.
///
/// `original` is attached as the response's request when the reply does
/// not name the upstream request itself. Reconstructed requests inherit a
/// copy of `meta`.
///
/// # Errors
///
/// Returns [`HttpError::InvalidReply`] for an out-of-range status code, an
/// unparsable upstream method or URL, or a chain deeper than
/// [`MAX_REDIRECT_DEPTH`].
pub fn into_response(
    reply: ProxyReply,
    original: Option<Request>,
    meta: &RequestMeta,
) -> Result<Response, HttpError> {
    build_response(reply, original, meta, 0)
}

fn build_response(
    reply: ProxyReply,
    fallback_request: Option<Request>,
    meta: &RequestMeta,
    depth: usize,
) -> Result<Response, HttpError> {
    if depth > MAX_REDIRECT_DEPTH {
        return Err(HttpError::InvalidReply(format!(
            "redirect chain deeper than {MAX_REDIRECT_DEPTH} hops"
        )));
    }

    let status = u16::try_from(reply.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| {
            HttpError::InvalidReply(format!("status code {} out of range", reply.status_code))
        })?;

    let mut headers = headers_from_wire(&reply.headers);
    let outermost = depth == 0;
    let uncompressed = outermost && !reply.body.is_empty();
    if uncompressed {
        strip_decoded_body_headers(&mut headers);
    }

    let request = match reply.request {
        Some(upstream) => Some(Box::new(build_request(*upstream, meta, depth)?)),
        None => fallback_request.map(Box::new),
    };

    Ok(Response {
        status,
        status_text: if reply.status.is_empty() {
            status_line(status)
        } else {
            reply.status
        },
        proto: if reply.proto.is_empty() {
            format!("HTTP/{}.{}", reply.proto_major.max(1), reply.proto_minor.max(0))
        } else {
            reply.proto
        },
        version: version_from(reply.proto_major, reply.proto_minor),
        headers,
        content_length: Some(reply.body.len() as u64),
        body: ResponseBody::new(reply.body),
        uncompressed,
        request,
    })
}

fn build_request(
    wire: WireRequest,
    meta: &RequestMeta,
    depth: usize,
) -> Result<Request, HttpError> {
    let method = Method::from_bytes(wire.method.as_bytes()).map_err(|e| {
        HttpError::InvalidReply(format!("upstream method \"{}\": {e}", wire.method))
    })?;
    let url = Url::parse(&wire.url)
        .map_err(|e| HttpError::InvalidReply(format!("upstream URL \"{}\": {e}", wire.url)))?;

    let mut request = Request::from_parts(method, url).with_meta(meta.clone());
    request.headers = headers_from_wire(&wire.headers);
    request.response = match wire.response {
        Some(previous) => Some(Box::new(build_response(*previous, None, meta, depth + 1)?)),
        None => None,
    };
    Ok(request)
}

/// The remote side hands back decoded bytes, so the encoding and length
/// headers describe a body the caller never sees.
pub(crate) fn strip_decoded_body_headers(headers: &mut HeaderMap) {
    headers.remove(CONTENT_ENCODING);
    headers.remove(CONTENT_LENGTH);
}

/// Wire multimap to `HeaderMap`. Names or values that are not valid HTTP
/// are skipped.
pub(crate) fn headers_from_wire(wire: &WireHeaders) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in wire {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::debug!(header = %name, "skipping invalid header name in reply");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.append(header_name.clone(), v);
                }
                Err(_) => {
                    tracing::debug!(header = %name, "skipping invalid header value in reply");
                }
            }
        }
    }
    headers
}

/// `HeaderMap` to the wire multimap, keeping every value of repeated headers.
pub(crate) fn headers_to_wire(headers: &HeaderMap) -> WireHeaders {
    let mut wire = WireHeaders::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        wire.insert(name.as_str().to_owned(), values);
    }
    wire
}

fn version_from(major: i32, minor: i32) -> Version {
    match (major, minor) {
        (0, 9) => Version::HTTP_09,
        (1, 0) => Version::HTTP_10,
        (2, _) => Version::HTTP_2,
        (3, _) => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}
