//! Result of one forward invocation.

use crate::model::{HttpRequest, HttpResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The upstream answered. `request` is what was actually sent, after any
    /// request transform; `response` is after any response transform.
    Forwarded {
        request: HttpRequest,
        response: HttpResponse,
    },
    /// The forward could not be completed meaningfully.
    NotFound,
}

impl ForwardOutcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ForwardOutcome::NotFound)
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            ForwardOutcome::Forwarded { response, .. } => Some(response),
            ForwardOutcome::NotFound => None,
        }
    }

    pub fn outbound_request(&self) -> Option<&HttpRequest> {
        match self {
            ForwardOutcome::Forwarded { request, .. } => Some(request),
            ForwardOutcome::NotFound => None,
        }
    }

    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            ForwardOutcome::Forwarded { response, .. } => Some(response),
            ForwardOutcome::NotFound => None,
        }
    }

    /// Response to hand back to the client; the terminal marker becomes a 404.
    pub fn into_http_response(self) -> HttpResponse {
        self.into_response().unwrap_or_else(HttpResponse::not_found)
    }
}
