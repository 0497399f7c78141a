//! Process-wide authentication state.
//!
//! One [`Session`] exists per running server, shared behind the app state.
//! It owns the OAuth state nonce, the access token, and the cached GitHub
//! identity. The authenticated flag is a sticky positive cache: once an
//! identity probe succeeds the session stays authenticated until restart.

use std::env;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::AuthError;
use crate::github::GitHubApi;

/// GitHub identity derived from the access token.
#[derive(Debug, Clone)]
pub struct Identity {
    pub login: String,
    pub email: String,
}

/// Per-process OAuth and identity state.
#[derive(Debug, Default)]
pub struct Session {
    state_nonce: Option<String>,
    access_token: Option<String>,
    authenticated: bool,
    identity: Option<Identity>,
}

impl Session {
    /// Create a session seeded with an initial token (empty means none).
    pub fn new(initial_token: &str) -> Self {
        Self {
            access_token: if initial_token.is_empty() {
                None
            } else {
                Some(initial_token.to_string())
            },
            ..Self::default()
        }
    }

    /// The current state nonce, generated lazily on first access and reused
    /// until [`Session::reset_state`]. A nonce handed to the authorize flow
    /// is single-use: resetting invalidates any in-flight poll.
    pub fn state(&mut self) -> String {
        self.state_nonce
            .get_or_insert_with(random_state)
            .clone()
    }

    /// Clear the nonce; called on entering any terminal OAuth state.
    pub fn reset_state(&mut self) {
        self.state_nonce = None;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.clone()
    }

    /// Install a freshly exchanged token. The cached identity belongs to the
    /// previous token, so it is dropped; the sticky authenticated flag is
    /// left alone.
    pub fn set_access_token(&mut self, token: String) {
        self.access_token = Some(token);
        self.identity = None;
    }

    pub fn is_authenticated_cached(&self) -> bool {
        self.authenticated
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.clone()
    }

    fn cache_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.authenticated = true;
    }
}

/// 128-bit URL-safe random nonce.
fn random_state() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Resolve the GitHub identity for the current token, caching on success.
///
/// `ASSEMBLE_GITHUB_USERNAME` / `ASSEMBLE_GITHUB_EMAIL` override the probe
/// for offline use. Any probe failure is reported as `NotAuthenticated`
/// rather than a hard error.
pub async fn resolve_identity(
    session: &Mutex<Session>,
    github: &dyn GitHubApi,
) -> Result<Identity, AuthError> {
    let token = {
        let guard = session.lock().await;
        if let Some(identity) = guard.identity() {
            return Ok(identity);
        }
        guard.access_token().ok_or(AuthError::NotAuthenticated)?
    };

    let login = match env::var("ASSEMBLE_GITHUB_USERNAME") {
        Ok(v) if !v.is_empty() => v,
        _ => github
            .authenticated_user(&token)
            .await
            .map_err(|_| AuthError::NotAuthenticated)?,
    };

    // In lieu of requesting the `user:email` scope.
    let email = env::var("ASSEMBLE_GITHUB_EMAIL")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| format!("{login}@users.noreply.github.com"));

    let identity = Identity { login, email };
    session.lock().await.cache_identity(identity.clone());
    Ok(identity)
}

/// Sticky identity probe backing `GET /auth/authenticated`.
pub async fn is_authenticated(session: &Mutex<Session>, github: &dyn GitHubApi) -> bool {
    if session.lock().await.is_authenticated_cached() {
        return true;
    }
    resolve_identity(session, github).await.is_ok()
}
