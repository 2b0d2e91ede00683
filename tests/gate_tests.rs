//! End-to-end gate behavior through the router: cookie issuance, route
//! gating, the no-auth override, pluggable responders and login/logout flows.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt;

use turnstile::auth::{AuthService, StaticCredentials};
use turnstile::context::RequestContext;
use turnstile::environment::{Environment, EnvironmentBuilder};
use turnstile::service::Service;
use turnstile::session::{InMemorySessionStore, SessionConfig};

fn demo_store() -> Arc<InMemorySessionStore> {
    Arc::new(InMemorySessionStore::new(SessionConfig::default()).expect("valid session config"))
}

fn base_builder() -> EnvironmentBuilder {
    Environment::builder(demo_store())
}

/// One open route, one gated route and the /auth service with user "alice".
fn demo_env(builder: EnvironmentBuilder) -> Environment {
    let mut env = builder.build();
    env.handle_get("/hello", |_ctx: RequestContext, _req: Request| async move { "hello" });
    env.handle_get_authorized("/private", |ctx: RequestContext, _req: Request| async move {
        format!("private for {}", ctx.session().user())
    });
    let verifier = Arc::new(
        StaticCredentials::new()
            .with_user("alice", "correct-horse")
            .expect("hash password"),
    );
    let auth = AuthService::new(Service::new("/auth", &env), verifier);
    auth.activate(&mut env);
    env
}

fn demo_router(no_auth: bool) -> Router {
    demo_env(base_builder().no_auth(no_auth)).into_router()
}

async fn send(router: &Router, request: Request) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("infallible router")
}

fn get(uri: &str) -> Request {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn post(uri: &str) -> Request {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn with_cookie(mut request: Request, cookie: &str) -> Request {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().expect("cookie header"));
    request
}

/// The name=token pair from the response's Set-Cookie, attributes stripped.
fn session_cookie(response: &Response) -> Option<String> {
    let set_cookie = response.headers().get(header::SET_COOKIE)?;
    let raw = set_cookie.to_str().ok()?;
    raw.split(';').next().map(|pair| pair.trim().to_string())
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn first_contact_sets_a_session_cookie() {
    let router = demo_router(false);
    let response = send(&router, get("/hello")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("cookie on first contact");
    assert!(cookie.starts_with("turnstile_session="));
    assert_eq!(body_text(response).await, "hello");
}

#[tokio::test]
async fn returning_cookie_reuses_the_session() {
    let router = demo_router(false);
    let first = send(&router, get("/hello")).await;
    let cookie = session_cookie(&first).expect("cookie on first contact");

    let second = send(&router, with_cookie(get("/hello"), &cookie)).await;
    assert_eq!(second.status(), StatusCode::OK);
    // A known session does not get a fresh cookie.
    assert!(session_cookie(&second).is_none());
}

#[tokio::test]
async fn gate_refuses_anonymous_requests_and_still_sets_the_cookie() {
    let router = demo_router(false);
    let response = send(&router, get("/private")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        session_cookie(&response).is_some(),
        "refusals carry the fresh session cookie"
    );
    assert_eq!(body_text(response).await, "not authorized");
}

#[tokio::test]
async fn gate_refuses_known_but_unauthorized_sessions() {
    let router = demo_router(false);
    let first = send(&router, get("/hello")).await;
    let cookie = session_cookie(&first).expect("cookie on first contact");

    let refused = send(&router, with_cookie(get("/private"), &cookie)).await;
    assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);
    // No new session is minted for a known cookie.
    assert!(session_cookie(&refused).is_none());
}

#[tokio::test]
async fn no_auth_override_waves_everything_through() {
    let router = demo_router(true);
    let response = send(&router, get("/private")).await;
    assert_eq!(response.status(), StatusCode::OK);
    // The override skips the gate, it does not invent a user.
    assert_eq!(body_text(response).await, "private for ");
}

#[tokio::test]
async fn login_authorizes_the_session_and_redirects_home() {
    let router = demo_router(false);
    let login = send(&router, post("/auth/login?user=alice&password=correct-horse")).await;
    assert_eq!(login.status(), StatusCode::FOUND);
    assert_eq!(
        login
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
    let cookie = session_cookie(&login).expect("login minted a session");

    let private = send(&router, with_cookie(get("/private"), &cookie)).await;
    assert_eq!(private.status(), StatusCode::OK);
    assert_eq!(body_text(private).await, "private for alice");
}

#[tokio::test]
async fn failed_login_leaves_the_session_unauthorized() {
    let router = demo_router(false);
    let login = send(&router, post("/auth/login?user=alice&password=wrong")).await;
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
    let cookie = session_cookie(&login).expect("refused logins still run on a session");

    let private = send(&router, with_cookie(get("/private"), &cookie)).await;
    assert_eq!(private.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_missing_credentials_is_refused() {
    let router = demo_router(false);
    let login = send(&router, post("/auth/login")).await;
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_is_post_only() {
    let router = demo_router(false);
    let response = send(&router, get("/auth/login")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn logout_requires_an_authorized_session() {
    let router = demo_router(false);
    let response = send(&router, post("/auth/logout")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        response.headers().get(header::LOCATION).is_none(),
        "a refusal is not a redirect"
    );
}

#[tokio::test]
async fn logout_drops_authorization_and_redirects_to_login() {
    let router = demo_router(false);
    let login = send(&router, post("/auth/login?user=alice&password=correct-horse")).await;
    let cookie = session_cookie(&login).expect("login cookie");

    let logout = send(&router, with_cookie(post("/auth/logout"), &cookie)).await;
    assert_eq!(logout.status(), StatusCode::FOUND);
    assert_eq!(
        logout
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/auth/login")
    );

    let private = send(&router, with_cookie(get("/private"), &cookie)).await;
    assert_eq!(private.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn custom_not_authorized_responder_is_used() {
    let builder =
        base_builder().not_authorized_handler(|_ctx: RequestContext, _req: Request| async move {
            (StatusCode::UNAUTHORIZED, "members only").into_response()
        });
    let router = demo_env(builder).into_router();
    let response = send(&router, get("/private")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "members only");
}

#[tokio::test]
async fn not_found_handler_runs_with_a_session() {
    let builder =
        base_builder().not_found_handler(|ctx: RequestContext, _req: Request| async move {
            (
                StatusCode::NOT_FOUND,
                format!("nothing here for {}", ctx.session().id()),
            )
                .into_response()
        });
    let router = demo_env(builder).into_router();
    let response = send(&router, get("/no-such-route")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let cookie = session_cookie(&response).expect("fallback minted a session");
    assert!(cookie.starts_with("turnstile_session="));
    let body = body_text(response).await;
    assert!(body.starts_with("nothing here for "));
}

#[tokio::test]
async fn default_fallback_is_a_plain_404() {
    let router = demo_router(false);
    let response = send(&router, get("/no-such-route")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn forbidden_responder_is_available_to_routes() {
    // A route-level check that turns away an authorized caller by name.
    let mut env = base_builder().build();
    let gate = env.gate();
    env.handle_get_authorized("/admin", move |ctx: RequestContext, req: Request| {
        let gate = gate.clone();
        async move {
            if ctx.session().user() != "root" {
                return gate.handle_forbidden(ctx, req).await;
            }
            "admin area".into_response()
        }
    });
    let verifier = Arc::new(
        StaticCredentials::new()
            .with_user("alice", "correct-horse")
            .expect("hash password"),
    );
    let auth = AuthService::new(Service::new("/auth", &env), verifier);
    auth.activate(&mut env);
    let router = env.into_router();

    let login = send(&router, post("/auth/login?user=alice&password=correct-horse")).await;
    let cookie = session_cookie(&login).expect("login cookie");
    let response = send(&router, with_cookie(get("/admin"), &cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "forbidden");
}

#[tokio::test]
async fn cors_layer_is_on_by_default_and_switchable() {
    let router = demo_router(false);
    let mut request = get("/hello");
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://example.com".parse().expect("origin"));
    let response = send(&router, request).await;
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    let router = demo_env(base_builder().cors(false)).into_router();
    let mut request = get("/hello");
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://example.com".parse().expect("origin"));
    let response = send(&router, request).await;
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn serve_files_delivers_static_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("hello.txt"), b"static hello").expect("write file");

    let mut env = base_builder().build();
    env.serve_files("/static", dir.path());
    let router = env.into_router();

    let response = send(&router, get("/static/hello.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "static hello");
}
