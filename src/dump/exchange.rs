use super::origin::{Origin, OriginPolicy};
use super::snapshot::{RequestSnapshot, request_origin};
use crate::http::Request;

use http::Version;

/// What the response writer for a request can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Body can be flushed to the peer piece by piece (chunked transfer)
    pub flush: bool,
    /// Body will be transport-compressed before it is written
    pub compressed: bool,
}

impl Capabilities {
    /// Capabilities of a plain HTTP/1.x writer answering `request`
    pub fn for_request(request: &Request) -> Self {
        Self {
            flush: request.version() >= Version::HTTP_11,
            compressed: false,
        }
    }
}

/// Everything a route handler gets to see
pub struct Exchange<'a> {
    request: &'a Request,
    capabilities: Capabilities,
    policy: OriginPolicy,
}

impl<'a> Exchange<'a> {
    pub fn new(request: &'a Request, policy: OriginPolicy) -> Self {
        Self {
            request,
            capabilities: Capabilities::for_request(request),
            policy,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn policy(&self) -> OriginPolicy {
        self.policy
    }

    /// Caller origin under the exchange's policy
    pub fn origin(&self) -> Origin {
        request_origin(self.request, self.policy)
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot::capture(self.request, self.policy)
    }
}
