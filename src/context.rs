//! Per-request carrier for the resolved session, inserted into request
//! extensions by the gate middleware.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use crate::session::Session;

/// Read-only view a handler gets of its request's session.
#[derive(Debug, Clone)]
pub struct RequestContext {
    session: Arc<Session>,
}

impl RequestContext {
    pub fn new(session: Arc<Session>) -> Self {
        RequestContext { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Extractor for native axum handlers mounted behind the gate middleware.
/// Rejects with 500 when no gate ran for the route, which is a wiring mistake.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "request context missing"))
    }
}
