use super::exchange::{Capabilities, Exchange};
use super::handlers::{self, Handler};
use super::origin::OriginPolicy;
use crate::http::{Request, Response};

use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use tracing::error;

const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE";
const ALLOW_HEADERS: &str =
    "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization";

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
}

struct Route {
    pattern: Pattern,
    handler: Handler,
    gzip: bool,
}

impl Route {
    fn call(&self, request: &Request, policy: OriginPolicy) -> Response {
        let exchange = Exchange::new(request, policy);
        if !self.gzip {
            return (self.handler)(&exchange);
        }

        let compressed = accepts_gzip(request.headers());
        let capabilities = Capabilities {
            compressed,
            ..exchange.capabilities()
        };
        let exchange = exchange.with_capabilities(capabilities);
        let response = (self.handler)(&exchange).with_header(
            header::VARY,
            HeaderValue::from_static("Accept-Encoding"),
        );
        if !compressed {
            return response;
        }

        response.gzip().unwrap_or_else(|e| {
            error!(error = %e, path = request.path(), "Failed to compress response");
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        })
    }
}

/// Path-to-handler table built once at startup and shared by all connections
///
/// Exact routes win over prefix routes; among prefixes the longest wins.
///
/// ```
/// use httpdump::{OriginPolicy, Request, Router};
/// use http::{HeaderMap, Method, StatusCode};
///
/// let router = Router::standard(OriginPolicy::Structured);
/// let request = Request::new(Method::GET, "/status/204", HeaderMap::new(), "10.0.0.5:1").unwrap();
/// assert_eq!(router.dispatch(&request).status(), StatusCode::NO_CONTENT);
/// ```
pub struct Router {
    routes: Vec<Route>,
    policy: OriginPolicy,
    cors: bool,
}

impl Router {
    /// Empty router, CORS disabled
    pub fn new(policy: OriginPolicy) -> Self {
        Self {
            routes: Vec::new(),
            policy,
            cors: false,
        }
    }

    /// The full inspection route table with CORS enabled
    pub fn standard(policy: OriginPolicy) -> Self {
        Self::new(policy)
            .route("/headers", handlers::headers)
            .prefix("/status/", handlers::status)
            .route("/ip", handlers::ip)
            .route("/get", handlers::get)
            .gzip_route("/gzip", handlers::gzip)
            .route("/user-agent", handlers::user_agent)
            .prefix("/bytes/", handlers::bytes)
            .prefix("/stream/", handlers::stream)
            .with_cors(true)
    }

    pub fn route(self, path: &'static str, handler: Handler) -> Self {
        self.push(Pattern::Exact(path), handler, false)
    }

    pub fn prefix(self, path: &'static str, handler: Handler) -> Self {
        self.push(Pattern::Prefix(path), handler, false)
    }

    /// Exact route whose responses are gzip-encoded when the client accepts it
    pub fn gzip_route(self, path: &'static str, handler: Handler) -> Self {
        self.push(Pattern::Exact(path), handler, true)
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    pub fn policy(&self) -> OriginPolicy {
        self.policy
    }

    fn push(mut self, pattern: Pattern, handler: Handler, gzip: bool) -> Self {
        self.routes.push(Route {
            pattern,
            handler,
            gzip,
        });
        self
    }

    fn find(&self, path: &str) -> Option<&Route> {
        let exact = self
            .routes
            .iter()
            .find(|r| matches!(r.pattern, Pattern::Exact(p) if p == path));
        exact.or_else(|| {
            self.routes
                .iter()
                .filter_map(|r| match r.pattern {
                    Pattern::Prefix(p) if path.starts_with(p) => Some((p.len(), r)),
                    _ => None,
                })
                .max_by_key(|(len, _)| *len)
                .map(|(_, r)| r)
        })
    }

    /// Runs the matching handler, wrapped in the CORS layer when enabled
    pub fn dispatch(&self, request: &Request) -> Response {
        let cors = if self.cors { cors_headers(request) } else { None };

        if let Some(cors) = &cors {
            if request.method() == Method::OPTIONS {
                let mut response = Response::new(StatusCode::OK);
                response.headers_mut().extend(cors.clone());
                return response;
            }
        }

        let mut response = match self.find(request.path()) {
            Some(route) => route.call(request, self.policy),
            None => Response::error(StatusCode::NOT_FOUND, "404 page not found"),
        };

        if let Some(cors) = cors {
            response.headers_mut().extend(cors);
        }
        response
    }
}

fn cors_headers(request: &Request) -> Option<HeaderMap> {
    let origin = request.headers().get(header::ORIGIN)?;
    if origin.is_empty() {
        return None;
    }

    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    Some(headers)
}

/// Whether `Accept-Encoding` admits gzip with a non-zero quality
///
/// An explicit `gzip` entry overrides `*`.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut gzip = None;
    let mut any = None;

    let items = headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','));
    for item in items {
        let mut parts = item.split(';').map(str::trim);
        let coding = parts.next().unwrap_or("");
        let quality = parts
            .filter_map(|p| p.strip_prefix("q=").or_else(|| p.strip_prefix("Q=")))
            .next()
            .map(|q| q.trim().parse::<f32>().unwrap_or(0.0))
            .unwrap_or(1.0);

        if coding.eq_ignore_ascii_case("gzip") {
            gzip = Some(quality);
        } else if coding == "*" {
            any = Some(quality);
        }
    }

    gzip.or(any).is_some_and(|q| q > 0.0)
}
