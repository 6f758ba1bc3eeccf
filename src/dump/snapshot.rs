use super::origin::{Origin, OriginPolicy};
use crate::http::Request;

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query parameters: key to values in the order they appeared
pub type Args = BTreeMap<String, Vec<String>>;

/// Headers keyed by canonical name (`User-Agent`), values in arrival order
pub type HeaderValues = BTreeMap<String, Vec<String>>;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Canonical echoed representation of one inbound request
///
/// Built fresh for every request and never shared; the only change after
/// construction is marking it as sent compressed, which consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    args: Args,
    #[serde(default, skip_serializing_if = "is_false")]
    gzipped: bool,
    headers: HeaderValues,
    origin: Origin,
    url: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl RequestSnapshot {
    /// Captures `request` with its origin resolved under `policy`
    pub fn capture(request: &Request, policy: OriginPolicy) -> Self {
        Self {
            args: query_args(request.query().unwrap_or("")),
            gzipped: false,
            headers: header_values(request.headers()),
            origin: request_origin(request, policy),
            url: request_url(request),
        }
    }

    /// Records whether the response carrying this snapshot is compressed
    pub fn mark_gzipped(mut self, compressed: bool) -> Self {
        self.gzipped = compressed;
        self
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn headers(&self) -> &HeaderValues {
        &self.headers
    }

    /// Values of a header, looked up case-insensitively
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(&canonical_header_key(name))
            .map(Vec::as_slice)
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn gzipped(&self) -> bool {
        self.gzipped
    }
}

/// Origin of `request` from its peer address and `X-Forwarded-For` header
pub fn request_origin(request: &Request, policy: OriginPolicy) -> Origin {
    let forwarded_for = request
        .headers()
        .get(X_FORWARDED_FOR)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .unwrap_or_default();
    policy.resolve(request.remote_addr(), &forwarded_for)
}

/// Decodes a query string, keeping repeated keys and their order
pub fn query_args(query: &str) -> Args {
    let mut args = Args::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        args.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    args
}

/// Copies every header field, grouping values under the canonical name
pub fn header_values(headers: &HeaderMap) -> HeaderValues {
    let mut values = HeaderValues::new();
    for name in headers.keys() {
        let entry = values.entry(canonical_header_key(name.as_str())).or_default();
        entry.extend(
            headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
        );
    }
    values
}

/// MIME canonical form: first letter and each letter after `-` upper-cased
///
/// ```
/// use httpdump::dump::snapshot::canonical_header_key;
///
/// assert_eq!(canonical_header_key("x-forwarded-for"), "X-Forwarded-For");
/// assert_eq!(canonical_header_key("USER-AGENT"), "User-Agent");
/// ```
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// `{scheme}://{host}{path}{?query}` exactly as received
fn request_url(request: &Request) -> String {
    let scheme = if request.is_secure() { "https" } else { "http" };
    format!("{scheme}://{}{}", request.host(), request.path_and_query())
}
