//! Prefix-scoped registration helper. A `Service` owns a mount prefix and a
//! handle to the environment's gate, and delegates registration to the
//! `Environment` it was created for.

use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::IntoResponse;

use crate::context::RequestContext;
use crate::environment::{Environment, Gate};

pub struct Service {
    prefix: String,
    gate: Arc<Gate>,
}

impl Service {
    pub fn new(prefix: impl Into<String>, env: &Environment) -> Self {
        Service {
            prefix: prefix.into(),
            gate: env.gate(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    /// Join the mount prefix and a route pattern into one absolute path,
    /// squeezing duplicate slashes at the seam.
    pub fn resolve(&self, pattern: &str) -> String {
        let joined = format!(
            "{}/{}",
            self.prefix.trim_end_matches('/'),
            pattern.trim_start_matches('/')
        );
        if joined.starts_with('/') {
            joined
        } else {
            format!("/{joined}")
        }
    }

    pub fn handle_get<H, Fut>(&self, env: &mut Environment, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        env.handle_get(&self.resolve(pattern), handler);
    }

    pub fn handle_post<H, Fut>(&self, env: &mut Environment, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        env.handle_post(&self.resolve(pattern), handler);
    }

    pub fn handle_get_authorized<H, Fut>(&self, env: &mut Environment, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        env.handle_get_authorized(&self.resolve(pattern), handler);
    }

    pub fn handle_post_authorized<H, Fut>(&self, env: &mut Environment, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        env.handle_post_authorized(&self.resolve(pattern), handler);
    }
}
