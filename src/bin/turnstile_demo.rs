//!
//! turnstile demo server
//! ---------------------
//! Runnable wiring example: an in-memory session store, a static credential
//! registry with one demo user, an open route, a gated route and the
//! login/logout endpoints under /auth.
//!
//! Environment variables:
//! - TURNSTILE_HTTP_PORT      listen port (default 7878)
//! - TURNSTILE_NO_AUTH        1/true/yes/on disables authorization gating
//! - TURNSTILE_DEMO_PASSWORD  password for the demo user (default "turnstile")

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use turnstile::auth::{AuthService, StaticCredentials};
use turnstile::context::RequestContext;
use turnstile::environment::Environment;
use turnstile::meta::Meta;
use turnstile::service::Service;
use turnstile::session::{InMemorySessionStore, SessionConfig};

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn parse_bool_env(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(v) => {
            let s = v.to_lowercase();
            match s.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        }
        Err(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let http_port = parse_port_env("TURNSTILE_HTTP_PORT").unwrap_or(7878);
    let no_auth = parse_bool_env("TURNSTILE_NO_AUTH").unwrap_or(false);
    let demo_password =
        env::var("TURNSTILE_DEMO_PASSWORD").unwrap_or_else(|_| "turnstile".to_string());
    if no_auth {
        warn!("TURNSTILE_NO_AUTH is set, authorization gating is disabled");
    }

    let store = Arc::new(InMemorySessionStore::new(SessionConfig::default())?);
    let verifier = Arc::new(StaticCredentials::new().with_user("turnstile", &demo_password)?);

    let mut env = Environment::builder(store).no_auth(no_auth).build();

    env.handle_get("/", |ctx: RequestContext, _req: Request| async move {
        Json(json!({
            "status": "ok",
            "session": ctx.session().to_string(),
        }))
    });

    env.handle_get_authorized("/private", |ctx: RequestContext, _req: Request| async move {
        Json(json!({
            "status": "ok",
            "user": ctx.session().user(),
        }))
    });

    // Listing endpoint demonstrating limit/skip handling.
    env.handle_get("/items", |_ctx: RequestContext, req: Request| async move {
        let meta = match Meta::from_request(&req) {
            Ok(meta) => meta,
            Err(err) => return err.into_response(),
        };
        let skipped = (0..100usize).skip(meta.skip);
        let items: Vec<usize> = if meta.limit > 0 {
            skipped.take(meta.limit).collect()
        } else {
            skipped.collect()
        };
        Json(json!({ "items": items })).into_response()
    });

    let auth = AuthService::new(Service::new("/auth", &env), verifier);
    auth.activate(&mut env);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("turnstile demo starting on {} (no_auth={})", addr, no_auth);
    env.run(addr).await
}
