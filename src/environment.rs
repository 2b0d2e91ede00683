//!
//! turnstile environment
//! ---------------------
//! The axum-facing surface: route registration with per-route authorization
//! gating, pluggable refusal responders and shared gate state.
//!
//! Responsibilities:
//! - `Gate`: session resolution for a request, the authorize decision, the
//!   not-authorized/forbidden responders and the global no-auth override.
//! - Per-route middleware that resolves the session, parks a `RequestContext`
//!   in request extensions and either dispatches or refuses.
//! - `Environment`: handler registration (`handle_get`, `handle_post` and the
//!   `_authorized` variants), static file serving, the not-found handler and
//!   CORS, finalized by `into_router` or `run`.

use std::future::Future;
use std::mem;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::{Extension, Router};
use futures_util::future::BoxFuture;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use crate::context::RequestContext;
use crate::session::{Session, SessionStore};

/// Boxed response future produced by stored handlers.
pub type HandlerFuture = BoxFuture<'static, Response>;

/// Type-erased handler: request context plus the raw request in, response out.
pub type DynHandler = Arc<dyn Fn(RequestContext, Request) -> HandlerFuture + Send + Sync>;

fn into_dyn<H, Fut>(handler: H) -> DynHandler
where
    H: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    Arc::new(move |ctx: RequestContext, req: Request| {
        let fut = handler(ctx, req);
        Box::pin(async move { fut.await.into_response() })
    })
}

/// Shared authorization state for every gated route: where sessions come from,
/// how refusals answer and the global no-auth override.
pub struct Gate {
    store: Arc<dyn SessionStore>,
    not_authorized: DynHandler,
    forbidden: DynHandler,
    no_auth: bool,
}

impl Gate {
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// True when the global override waves every request through gated routes.
    pub fn no_auth(&self) -> bool {
        self.no_auth
    }

    /// Resolve the request's session, creating one when the headers carry no
    /// usable cookie. The second value is the Set-Cookie the response must
    /// carry when a session was created.
    pub fn ensure_session(&self, headers: &HeaderMap) -> (Arc<Session>, Option<HeaderValue>) {
        if let Some(session) = self.store.find(headers) {
            return (session, None);
        }
        let (session, cookie) = self.store.create();
        info!("no session for request, created {}", session);
        (session, Some(cookie))
    }

    /// The gate decision: the override or the session's authorized flag.
    pub fn authorizes(&self, ctx: &RequestContext) -> bool {
        self.no_auth || ctx.session().is_authorized()
    }

    /// Run the configured not-authorized responder (default: 401 plain text).
    pub fn handle_not_authorized(&self, ctx: RequestContext, req: Request) -> HandlerFuture {
        (self.not_authorized)(ctx, req)
    }

    /// Run the configured forbidden responder (default: 403 plain text). The
    /// gate itself never answers with this; it is for route-level checks that
    /// recognize an authorized but unentitled caller.
    pub fn handle_forbidden(&self, ctx: RequestContext, req: Request) -> HandlerFuture {
        (self.forbidden)(ctx, req)
    }
}

#[derive(Clone)]
struct RouteGate {
    gate: Arc<Gate>,
    requires_auth: bool,
}

/// Per-route gate: resolves the session, inserts the context and either
/// dispatches or answers with the not-authorized responder. A cookie minted
/// for a fresh session is attached to whichever response results, refusals
/// included.
async fn gate_middleware(State(route): State<RouteGate>, mut req: Request, next: Next) -> Response {
    let (session, set_cookie) = route.gate.ensure_session(req.headers());
    let ctx = RequestContext::new(session);
    req.extensions_mut().insert(ctx.clone());
    let mut response = if route.requires_auth && !route.gate.authorizes(&ctx) {
        route.gate.handle_not_authorized(ctx, req).await
    } else {
        next.run(req).await
    };
    if let Some(cookie) = set_cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// Route registration facade around an axum `Router` plus the shared gate.
pub struct Environment {
    router: Router,
    gate: Arc<Gate>,
    not_found: Option<DynHandler>,
    cors: bool,
}

impl Environment {
    pub fn builder(store: Arc<dyn SessionStore>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(store)
    }

    /// The shared gate, for services that want the refusal responders or the
    /// session store.
    pub fn gate(&self) -> Arc<Gate> {
        self.gate.clone()
    }

    /// Register a GET handler reachable by any session.
    pub fn handle_get<H, Fut>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.register(MethodFilter::GET, pattern, false, handler);
    }

    /// Register a POST handler reachable by any session.
    pub fn handle_post<H, Fut>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.register(MethodFilter::POST, pattern, false, handler);
    }

    /// Register a GET handler the gate refuses unless the session is
    /// authorized or the no-auth override is set.
    pub fn handle_get_authorized<H, Fut>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.register(MethodFilter::GET, pattern, true, handler);
    }

    /// Register a POST handler the gate refuses unless the session is
    /// authorized or the no-auth override is set.
    pub fn handle_post_authorized<H, Fut>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.register(MethodFilter::POST, pattern, true, handler);
    }

    /// Serve a directory of static files under `prefix`. The prefix must not
    /// be "/"; root fallbacks belong to the not-found handler.
    pub fn serve_files(&mut self, prefix: &str, dir: impl AsRef<Path>) {
        self.router = mem::take(&mut self.router).nest_service(prefix, ServeDir::new(dir));
    }

    fn register<H, Fut>(&mut self, filter: MethodFilter, pattern: &str, requires_auth: bool, handler: H)
    where
        H: Fn(RequestContext, Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        let route = RouteGate {
            gate: self.gate.clone(),
            requires_auth,
        };
        let wrapped = move |Extension(ctx): Extension<RequestContext>, req: Request| {
            let handler = handler.clone();
            async move { handler(ctx, req).await.into_response() }
        };
        let method_router =
            on(filter, wrapped).layer(middleware::from_fn_with_state(route, gate_middleware));
        self.router = mem::take(&mut self.router).route(pattern, method_router);
    }

    /// Finalize the router: attach the not-found fallback and the CORS layer.
    pub fn into_router(self) -> Router {
        let Environment {
            router,
            gate,
            not_found,
            cors,
        } = self;
        let mut router = router;
        if let Some(handler) = not_found {
            // The fallback resolves the session like any gated route, so
            // first contact on an unknown path still receives a cookie.
            router = router.fallback(move |req: Request| {
                let gate = gate.clone();
                let handler = handler.clone();
                async move {
                    let (session, set_cookie) = gate.ensure_session(req.headers());
                    let ctx = RequestContext::new(session);
                    let mut response = handler(ctx, req).await;
                    if let Some(cookie) = set_cookie {
                        response.headers_mut().append(header::SET_COOKIE, cookie);
                    }
                    response
                }
            });
        }
        if cors {
            router = router.layer(CorsLayer::permissive());
        }
        router
    }

    /// Bind and serve until the process ends. Bind failures are fatal.
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let router = self.into_router();
        info!("HTTP listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// Builder for [`Environment`]. Responders left unset fall back to plain-text
/// defaults; CORS is on unless switched off.
pub struct EnvironmentBuilder {
    store: Arc<dyn SessionStore>,
    not_authorized: Option<DynHandler>,
    forbidden: Option<DynHandler>,
    not_found: Option<DynHandler>,
    no_auth: bool,
    cors: bool,
}

impl EnvironmentBuilder {
    fn new(store: Arc<dyn SessionStore>) -> Self {
        EnvironmentBuilder {
            store,
            not_authorized: None,
            forbidden: None,
            not_found: None,
            no_auth: false,
            cors: true,
        }
    }

    /// Wave every request through gated routes. Meant for development setups;
    /// wire it to an env flag in the binary, never inside the library.
    pub fn no_auth(mut self, enabled: bool) -> Self {
        self.no_auth = enabled;
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    /// Responder for gated routes hit by an unauthorized session.
    pub fn not_authorized_handler<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.not_authorized = Some(into_dyn(handler));
        self
    }

    /// Responder for authorized callers a route-level check turns away.
    pub fn forbidden_handler<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.forbidden = Some(into_dyn(handler));
        self
    }

    /// Handler for requests no route matched.
    pub fn not_found_handler<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.not_found = Some(into_dyn(handler));
        self
    }

    pub fn build(self) -> Environment {
        let gate = Gate {
            store: self.store,
            not_authorized: self.not_authorized.unwrap_or_else(|| {
                into_dyn(|_ctx: RequestContext, _req: Request| async {
                    (StatusCode::UNAUTHORIZED, "not authorized").into_response()
                })
            }),
            forbidden: self.forbidden.unwrap_or_else(|| {
                into_dyn(|_ctx: RequestContext, _req: Request| async {
                    (StatusCode::FORBIDDEN, "forbidden").into_response()
                })
            }),
            no_auth: self.no_auth,
        };
        Environment {
            router: Router::new(),
            gate: Arc::new(gate),
            not_found: self.not_found,
            cors: self.cors,
        }
    }
}
