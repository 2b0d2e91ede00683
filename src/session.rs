//!
//! turnstile sessions
//! ------------------
//! Cookie-token sessions and the in-memory store that mints them.
//!
//! Responsibilities:
//! - Session records: immutable token and expiry, lock-guarded authorization state.
//! - The `SessionStore` seam the authorization gate resolves sessions through.
//! - `InMemorySessionStore`: token-keyed map, uniqueness by check-and-insert.
//! - Cookie parsing from request headers and Set-Cookie construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Cookie and lifetime settings for a session store.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie name, restricted to RFC 6265 token characters.
    pub cookie_name: String,
    /// Cookie path attribute.
    pub cookie_path: String,
    /// Lifetime stamped on new sessions as an absolute expiry.
    pub expire_in: Duration,
    /// When set, `find` treats expired sessions as absent and drops them.
    /// Off by default: expiry is recorded on the session but not enforced.
    pub enforce_expiry: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            cookie_name: "turnstile_session".to_string(),
            cookie_path: "/".to_string(),
            expire_in: Duration::hours(24),
            enforce_expiry: false,
        }
    }
}

impl SessionConfig {
    /// Check that the cookie name and path can be written into a Set-Cookie
    /// header without escaping.
    pub fn validate(&self) -> Result<()> {
        if self.cookie_name.is_empty() {
            return Err(Error::config("cookie name must not be empty"));
        }
        if !self.cookie_name.chars().all(is_cookie_token_char) {
            return Err(Error::config(format!(
                "cookie name {:?} contains characters outside the RFC 6265 token set",
                self.cookie_name
            )));
        }
        if self.cookie_path.is_empty() {
            return Err(Error::config("cookie path must not be empty"));
        }
        if !self
            .cookie_path
            .chars()
            .all(|c| c.is_ascii_graphic() && c != ';')
        {
            return Err(Error::config(format!(
                "cookie path {:?} must be visible ASCII without ';'",
                self.cookie_path
            )));
        }
        Ok(())
    }
}

fn is_cookie_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

#[derive(Debug, Default)]
struct AuthState {
    authorized: bool,
    user: String,
}

/// A cookie-backed session: an immutable token and expiry stamped at creation
/// plus authorization state guarded by its own lock.
///
/// Sessions are normally minted by a [`SessionStore`]; the constructor is
/// public so custom store implementations can produce them too.
#[derive(Debug)]
pub struct Session {
    id: String,
    expires_on: DateTime<Utc>,
    state: RwLock<AuthState>,
}

impl Session {
    pub fn new(id: String, expires_on: DateTime<Utc>) -> Self {
        Session {
            id,
            expires_on,
            state: RwLock::new(AuthState::default()),
        }
    }

    /// The cookie token. Unique within the issuing store.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_on
    }

    pub fn is_authorized(&self) -> bool {
        self.state.read().authorized
    }

    /// Mark the session authorized for `user`. Idempotent; authorizing an
    /// already-authorized session overwrites the user.
    pub fn authorize(&self, user: &str) {
        let mut state = self.state.write();
        state.authorized = true;
        state.user = user.to_string();
    }

    /// Drop authorization and clear the user. Idempotent.
    pub fn unauthorize(&self) {
        let mut state = self.state.write();
        state.authorized = false;
        state.user.clear();
    }

    /// The user the session is authorized for; empty while unauthorized.
    pub fn user(&self) -> String {
        self.state.read().user.clone()
    }
}

impl fmt::Display for Session {
    /// One coherent snapshot: flag and user are read under a single lock.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        write!(
            f,
            "id:({}) authorized:({}) user:({}) expires-on:({})",
            self.id,
            state.authorized,
            state.user,
            self.expires_on.to_rfc3339()
        )
    }
}

/// Where the gate resolves sessions. `find` must leave the session set
/// untouched; `create` returns the new session together with the Set-Cookie
/// header value the caller is responsible for attaching to the response.
pub trait SessionStore: Send + Sync {
    fn find(&self, headers: &HeaderMap) -> Option<Arc<Session>>;
    fn create(&self) -> (Arc<Session>, HeaderValue);
}

/// Process-local session store backed by a token-keyed map.
pub struct InMemorySessionStore {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl InMemorySessionStore {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(InMemorySessionStore {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove sessions whose expiry has passed, returning how many were
    /// dropped. The store never runs this on its own; callers that want
    /// eviction schedule it themselves.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now))
            .map(|(token, _)| token.clone())
            .collect();
        let mut removed = 0;
        for token in expired {
            if sessions.remove(&token).is_some() {
                removed += 1;
            }
        }
        removed
    }

    fn cookie_for(&self, session: &Session) -> HeaderValue {
        let expires = session.expires_on().format("%a, %d %b %Y %H:%M:%S GMT");
        let cookie = format!(
            "{}={}; Expires={}; Path={}; HttpOnly; SameSite=Lax",
            self.config.cookie_name,
            session.id(),
            expires,
            self.config.cookie_path
        );
        // ASCII by construction: name and path are validated at store
        // creation, tokens are hyphenated UUIDs.
        HeaderValue::from_str(&cookie).unwrap()
    }
}

impl SessionStore for InMemorySessionStore {
    fn find(&self, headers: &HeaderMap) -> Option<Arc<Session>> {
        let token = cookie_value(headers, &self.config.cookie_name)?;
        let session = self.sessions.read().get(&token).cloned()?;
        if self.config.enforce_expiry && session.is_expired(Utc::now()) {
            self.sessions.write().remove(&token);
            return None;
        }
        Some(session)
    }

    fn create(&self) -> (Arc<Session>, HeaderValue) {
        let expires_on = Utc::now() + self.config.expire_in;
        let mut sessions = self.sessions.write();
        let mut token = Uuid::new_v4().to_string();
        // Uniqueness comes from the check-and-insert under the write lock,
        // not from the randomness alone.
        while sessions.contains_key(&token) {
            token = Uuid::new_v4().to_string();
        }
        let session = Arc::new(Session::new(token.clone(), expires_on));
        sessions.insert(token, session.clone());
        drop(sessions);
        debug!("created session {}", session);
        let cookie = self.cookie_for(&session);
        (session, cookie)
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for part in raw.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}
