//! OAuth token acquisition against the external gateway.
//!
//! The gateway holds the OAuth client secret so the notebook frontend never
//! sees it. The browser is redirected to GitHub's authorize endpoint with a
//! state nonce; meanwhile this client polls the gateway, which exchanges the
//! authorization code for an access token on our behalf.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use url::Url;

use crate::errors::AuthError;

/// GitHub's browser-facing authorize endpoint.
pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

/// OAuth scopes requested for submissions.
pub const SCOPES: &[&str] = &["read:user", "public_repo"];

/// Default delay between poll attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

// Explicit coupling to the gateway's wording: this phrase in a non-ok
// response means "authorization code not exchanged yet, keep polling".
const PENDING_PHRASE: &str = "no authorization code found";

/// Client for the OAuth gateway service.
pub struct GatewayClient {
    base_url: Url,
    http: reqwest::Client,
    poll_interval: Duration,
    timeout: Duration,
    client_id: OnceCell<String>,
}

impl GatewayClient {
    /// Build a client for the gateway at `base_url`. `timeout` bounds the
    /// total elapsed time of one polling sequence.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        // Url::join treats a path without a trailing slash as a file; force
        // the directory form so relative joins land under the base.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AuthError::Gateway(format!("Invalid gateway url {base_url}: {e}")))?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout,
            client_id: OnceCell::new(),
        })
    }

    /// Override the inter-poll delay; test hook.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn endpoint(&self, path: &str) -> Url {
        self.base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone())
    }

    /// The OAuth app's client id, fetched from the gateway once and cached.
    pub async fn client_id(&self) -> Result<String, AuthError> {
        self.client_id
            .get_or_try_init(|| async {
                let resp = self
                    .http
                    .get(self.endpoint("api/v1/app_id"))
                    .send()
                    .await?
                    .error_for_status()?;
                let body: Value = resp.json().await?;
                body.get("client_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AuthError::Gateway("gateway app_id response missing client_id".to_string())
                    })
            })
            .await
            .cloned()
    }

    /// Fire-and-forget ping of the gateway's status endpoint, used to wake a
    /// sleeping dyno before the user lands on GitHub. Failures are ignored.
    pub fn warm(&self) {
        let url = self.endpoint("status");
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = http.get(url).send().await {
                tracing::debug!("gateway warm-up ping failed: {e}");
            }
        });
    }

    /// The GitHub authorize URL the browser is redirected to.
    pub async fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        let client_id = self.client_id().await?;
        let mut url = Url::parse(GITHUB_AUTHORIZE_URL)
            .map_err(|e| AuthError::Gateway(format!("Invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("state", state)
            .append_pair("scope", &SCOPES.join(","))
            .finish();
        Ok(url.into())
    }

    /// Poll the gateway's token-exchange endpoint until it yields a token.
    ///
    /// Classification per attempt: 2xx with `access_token` succeeds; a non-ok
    /// response whose message contains the pending phrase (case-insensitive)
    /// sleeps a fixed interval and retries; any other non-ok response fails
    /// with the gateway's message verbatim. The whole loop is bounded by the
    /// configured timeout and terminates with [`AuthError::TimedOut`].
    pub async fn poll_access_token(&self, state: &str) -> Result<String, AuthError> {
        let url = self.endpoint("api/v1/access_token");
        let deadline = Instant::now() + self.timeout;

        loop {
            let resp = self
                .http
                .post(url.clone())
                .json(&json!({ "state": state }))
                .send()
                .await?;
            let status = resp.status();
            let body: Value = resp.json().await.unwrap_or(Value::Null);

            if status.is_success() {
                return body
                    .get("access_token")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AuthError::Gateway(
                            "gateway token response missing access_token".to_string(),
                        )
                    });
            }

            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if !message.to_lowercase().contains(PENDING_PHRASE) {
                return Err(AuthError::Gateway(message));
            }

            if Instant::now() + self.poll_interval >= deadline {
                return Err(AuthError::TimedOut);
            }
            tracing::debug!("authorization code not ready, polling again");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::get, routing::post};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_gateway(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn quick_client(base: &str) -> GatewayClient {
        GatewayClient::new(base, Duration::from_millis(200))
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_client_id_fetched_and_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/v1/app_id",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Json(serde_json::json!({"client_id": "abc123"})) }
            }),
        );
        let base = spawn_gateway(app).await;
        let client = quick_client(&base);

        assert_eq!(client.client_id().await.unwrap(), "abc123");
        assert_eq!(client.client_id().await.unwrap(), "abc123");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authorize_url_carries_client_id_state_and_scopes() {
        let app = Router::new().route(
            "/api/v1/app_id",
            get(|| async { Json(serde_json::json!({"client_id": "abc123"})) }),
        );
        let base = spawn_gateway(app).await;
        let client = quick_client(&base);

        let url = client.authorize_url("nonce42").await.unwrap();
        assert!(url.starts_with(GITHUB_AUTHORIZE_URL));
        assert!(url.contains("client_id=abc123"));
        assert!(url.contains("state=nonce42"));
        assert!(url.contains("scope=read%3Auser%2Cpublic_repo"));
    }

    #[tokio::test]
    async fn test_poll_success() {
        let app = Router::new().route(
            "/api/v1/access_token",
            post(|| async { Json(serde_json::json!({"access_token": "gho_xyz"})) }),
        );
        let base = spawn_gateway(app).await;
        let token = quick_client(&base)
            .poll_access_token("nonce")
            .await
            .unwrap();
        assert_eq!(token, "gho_xyz");
    }

    #[tokio::test]
    async fn test_poll_hard_failure_surfaces_gateway_message() {
        let app = Router::new().route(
            "/api/v1/access_token",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"message": "bad verification code"})),
                )
            }),
        );
        let base = spawn_gateway(app).await;
        let err = quick_client(&base)
            .poll_access_token("nonce")
            .await
            .unwrap_err();
        match err {
            AuthError::Gateway(msg) => assert_eq!(msg, "bad verification code"),
            other => panic!("expected Gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_terminates_on_timeout_while_pending() {
        // Gateway that never produces a code; phrase match is case-insensitive.
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let app = Router::new().route(
            "/api/v1/access_token",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(serde_json::json!({
                            "message": "No authorization code found for this state"
                        })),
                    )
                }
            }),
        );
        let base = spawn_gateway(app).await;
        let err = quick_client(&base)
            .poll_access_token("nonce")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TimedOut));
        assert_eq!(err.to_string(), "timeout");
        // It kept retrying while pending rather than failing on first poll.
        assert!(polls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_poll_missing_token_in_ok_response_is_an_error() {
        let app = Router::new().route(
            "/api/v1/access_token",
            post(|| async { Json(serde_json::json!({"token_type": "bearer"})) }),
        );
        let base = spawn_gateway(app).await;
        let err = quick_client(&base)
            .poll_access_token("nonce")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Gateway(_)));
    }
}
