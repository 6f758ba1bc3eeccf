//! Route handlers
//!
//! Each handler validates its route input, builds what it echoes and
//! returns a [`Response`]; writing it out is the connection's job.

use super::exchange::Exchange;
use super::origin::Origin;
use super::snapshot::{RequestSnapshot, header_values};
use crate::http::response::{DocumentStream, Response, encode_json_line};

use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use tracing::warn;

/// Largest body `/bytes/{n}` will produce
pub const MAX_BYTES: usize = 102_400;
/// Most documents `/stream/{n}` will write
pub const MAX_LINES: usize = 100;

const ERR_STATUS_NOT_INTEGER: &str = "status code must be an integer";
const ERR_STATUS_RANGE: &str = "status code must be in range: 100 - 999";
const ERR_STATUS_SWITCHING: &str = "status code 101 is not supported";
const ERR_WANT_INTEGER: &str = "n must be an integer";
const ERR_STREAMING_NOT_SUPPORTED: &str = "your client does not support streaming";

/// Handler signature shared by every route
pub type Handler = fn(&Exchange<'_>) -> Response;

#[derive(Serialize)]
struct IpBody {
    origin: Origin,
}

#[derive(Serialize)]
struct UserAgentBody<'a> {
    #[serde(rename = "user-agent")]
    user_agent: Cow<'a, str>,
}

/// `GET /headers`
pub fn headers(exchange: &Exchange<'_>) -> Response {
    Response::json(StatusCode::OK, &header_values(exchange.request().headers()))
}

/// `/status/{n}`: answers with status `n` and no body
///
/// Informational codes go out as an interim head followed by an empty 200.
/// 101 would hand the connection to another protocol and is refused.
pub fn status(exchange: &Exchange<'_>) -> Response {
    let Some(code) = path_count(exchange) else {
        return Response::error(StatusCode::BAD_REQUEST, ERR_STATUS_NOT_INTEGER);
    };
    match u16::try_from(code).ok().and_then(|c| StatusCode::from_u16(c).ok()) {
        Some(StatusCode::SWITCHING_PROTOCOLS) => {
            Response::error(StatusCode::BAD_REQUEST, ERR_STATUS_SWITCHING)
        }
        Some(status) => Response::new(status),
        None => Response::error(StatusCode::BAD_REQUEST, ERR_STATUS_RANGE),
    }
}

/// `GET /ip`
pub fn ip(exchange: &Exchange<'_>) -> Response {
    Response::json(
        StatusCode::OK,
        &IpBody {
            origin: exchange.origin(),
        },
    )
}

/// `GET /get`
pub fn get(exchange: &Exchange<'_>) -> Response {
    if exchange.request().method() != Method::GET {
        return Response::reason(StatusCode::METHOD_NOT_ALLOWED);
    }
    Response::json(StatusCode::OK, &exchange.snapshot())
}

/// `GET /gzip`, flagged when the response really goes out compressed
pub fn gzip(exchange: &Exchange<'_>) -> Response {
    let snapshot = exchange
        .snapshot()
        .mark_gzipped(exchange.capabilities().compressed);
    Response::json(StatusCode::OK, &snapshot)
}

/// `GET /user-agent`
pub fn user_agent(exchange: &Exchange<'_>) -> Response {
    let user_agent = exchange
        .request()
        .headers()
        .get(header::USER_AGENT)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .unwrap_or_default();
    Response::json(StatusCode::OK, &UserAgentBody { user_agent })
}

/// `GET /bytes/{n}`: `n` bytes from the operating system's CSPRNG
pub fn bytes(exchange: &Exchange<'_>) -> Response {
    random_bytes(exchange, &mut OsRng)
}

fn random_bytes<R: RngCore>(exchange: &Exchange<'_>, rng: &mut R) -> Response {
    let Some(n) = path_count(exchange).filter(|n| *n <= MAX_BYTES) else {
        return Response::error(
            StatusCode::BAD_REQUEST,
            &format!("number of bytes must be in range: 0 - {MAX_BYTES}"),
        );
    };

    let mut buf = vec![0u8; n];
    if let Err(e) = rng.try_fill_bytes(&mut buf) {
        warn!(error = %e, size = n, "Random source failed");
        return Response::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }

    Response::new(StatusCode::OK)
        .with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        )
        .with_body(buf)
}

/// `GET /stream/{n}`: `min(n, MAX_LINES)` snapshots, one flushed chunk each
pub fn stream(exchange: &Exchange<'_>) -> Response {
    let Some(n) = path_count(exchange) else {
        return Response::error(StatusCode::BAD_REQUEST, ERR_WANT_INTEGER);
    };
    if !exchange.capabilities().flush {
        return Response::error(StatusCode::BAD_REQUEST, ERR_STREAMING_NOT_SUPPORTED);
    }

    Response::documents(snapshot_documents(exchange.snapshot(), n.min(MAX_LINES)))
}

/// `count` JSON lines of `snapshot`, encoded as they are pulled
pub fn snapshot_documents(snapshot: RequestSnapshot, count: usize) -> DocumentStream {
    Box::new(std::iter::repeat_with(move || encode_json_line(&snapshot)).take(count))
}

/// Final path segment, ignoring trailing slashes
pub fn last_segment(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Integer in the percent-decoded final segment of the request path
fn path_count(exchange: &Exchange<'_>) -> Option<usize> {
    let segment = last_segment(exchange.request().path());
    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    parse_count(&decoded)
}

/// Strict base-10 parse: ASCII digits only, no sign, no padding
pub fn parse_count(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
