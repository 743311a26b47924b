use http::{HeaderMap, Method};
use reqwest::Url;

/// How the transport should treat the outgoing request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
    /// Forward as received.
    #[default]
    SameOrigin,
    /// Explicit cross-origin request.
    Cors,
}

/// Description of a request the relay forwards.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub body: Vec<u8>,
}

impl OutgoingRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            body: Vec::new(),
        }
    }

    /// `scheme://host[:port]`, the form trusted origins are configured in.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }
}

/// What the pipeline decided for one request.
#[derive(Debug, Clone)]
pub enum InterceptOutcome {
    /// Untrusted origin or unmatched path: not ours to touch.
    PassThrough(OutgoingRequest),
    /// Protected resource, but no credential could be obtained.
    Unauthenticated(OutgoingRequest),
    /// Clone of the original carrying the bearer credential.
    Authorized(OutgoingRequest),
}

impl InterceptOutcome {
    pub fn request(&self) -> &OutgoingRequest {
        match self {
            InterceptOutcome::PassThrough(r) => r,
            InterceptOutcome::Unauthenticated(r) => r,
            InterceptOutcome::Authorized(r) => r,
        }
    }

    pub fn into_request(self) -> OutgoingRequest {
        match self {
            InterceptOutcome::PassThrough(r) => r,
            InterceptOutcome::Unauthenticated(r) => r,
            InterceptOutcome::Authorized(r) => r,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InterceptOutcome::PassThrough(_) => "passthrough",
            InterceptOutcome::Unauthenticated(_) => "unauthenticated",
            InterceptOutcome::Authorized(_) => "authorized",
        }
    }
}
