//! Login/logout endpoints on top of the gate, the credential verification
//! seam, and an argon2-backed in-memory verifier for small deployments.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::extract::{Query, Request};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use password_hash::{PasswordHash, SaltString};
use serde::Deserialize;
use tracing::info;

use crate::context::RequestContext;
use crate::environment::Environment;
use crate::service::Service;

/// The external decision whether a user/password pair is acceptable.
/// Implementations must not log or store the password.
pub trait CredentialVerifier: Send + Sync {
    fn is_valid(&self, user: &str, password: &str) -> bool;
}

/// In-memory user registry keeping argon2 PHC strings, never plaintext.
#[derive(Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        StaticCredentials::default()
    }

    pub fn with_user(mut self, user: &str, password: &str) -> anyhow::Result<Self> {
        self.insert(user, password)?;
        Ok(self)
    }

    /// Hash the password and register (or replace) the user.
    pub fn insert(&mut self, user: &str, password: &str) -> anyhow::Result<()> {
        let phc = hash_password(password)?;
        self.users.insert(user.to_string(), phc);
        Ok(())
    }
}

impl CredentialVerifier for StaticCredentials {
    fn is_valid(&self, user: &str, password: &str) -> bool {
        match self.users.get(user) {
            Some(phc) => verify_password(phc, password),
            None => false,
        }
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(phc: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(phc) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoginParams {
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
}

impl LoginParams {
    /// Absent or malformed query strings behave as empty credentials, which
    /// the verifier then turns away.
    fn from_uri(uri: &Uri) -> Self {
        Query::<LoginParams>::try_from_uri(uri)
            .map(|query| query.0)
            .unwrap_or_default()
    }
}

/// 302 redirect. Deliberately not axum's `Redirect::to`, which answers 303.
pub fn redirect_found(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// Login/logout endpoints mounted under a service prefix.
///
/// `POST {prefix}/login` is open: it reads `user` and `password` from the
/// query string, asks the verifier and flips the request's session to
/// authorized on success. `POST {prefix}/logout` is gated and flips the
/// session back.
pub struct AuthService {
    service: Service,
    verifier: Arc<dyn CredentialVerifier>,
}

impl AuthService {
    pub fn new(service: Service, verifier: Arc<dyn CredentialVerifier>) -> Self {
        AuthService { service, verifier }
    }

    pub fn login_path(&self) -> String {
        self.service.resolve("/login")
    }

    /// Register both endpoints on the environment.
    pub fn activate(&self, env: &mut Environment) {
        let gate = self.service.gate().clone();
        let verifier = self.verifier.clone();
        self.service
            .handle_post(env, "/login", move |ctx: RequestContext, req: Request| {
                let gate = gate.clone();
                let verifier = verifier.clone();
                async move {
                    let params = LoginParams::from_uri(req.uri());
                    if !verifier.is_valid(&params.user, &params.password) {
                        // Log the attempted user only, never the password.
                        info!("login failed for user ({})", params.user);
                        return gate.handle_not_authorized(ctx, req).await;
                    }
                    ctx.session().authorize(&params.user);
                    info!("login ok, session {}", ctx.session());
                    redirect_found("/")
                }
            });

        let login_path = self.login_path();
        self.service.handle_post_authorized(
            env,
            "/logout",
            move |ctx: RequestContext, _req: Request| {
                let login_path = login_path.clone();
                async move {
                    ctx.session().unauthorize();
                    info!("logout, session {}", ctx.session());
                    redirect_found(&login_path)
                }
            },
        );
    }
}
