//! Google OAuth for per-tenant YouTube credentials.
//!
//! Flow:
//!   1. The tenant registers a client id/secret and is sent to [`consent_url`].
//!   2. The callback code is swapped for tokens by
//!      [`GoogleAuthorizer::complete_authorization`]; the refresh token is
//!      stored in the tenant's settings document.
//!   3. Before each upload [`GoogleAuthorizer::access_token`] checks expiry
//!      and refreshes, persisting the new access token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reelqueue_core::config::YoutubeConfig;
use reelqueue_core::TenantId;
use reelqueue_scheduler::{AuthError, Authorizer};
use reelqueue_store::{QueueStore, Settings};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, YoutubeError};

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Tokens are refreshed when they expire within this many milliseconds.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Offline-access consent URL for the tenant's registered client.
pub fn consent_url(cfg: &YoutubeConfig, settings: &Settings, state: Option<&str>) -> Result<String> {
    let client_id = settings.client_id.as_deref().ok_or(YoutubeError::MissingClient)?;
    let mut url = format!(
        "{}?client_id={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        cfg.auth_url,
        urlencoding::encode(client_id),
        urlencoding::encode(UPLOAD_SCOPE),
    );
    if let Some(redirect) = settings.redirect_uri.as_deref() {
        url.push_str("&redirect_uri=");
        url.push_str(&urlencoding::encode(redirect));
    }
    if let Some(state) = state {
        url.push_str("&state=");
        url.push_str(&urlencoding::encode(state));
    }
    Ok(url)
}

/// Result of a code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds.
    pub expiry_ms: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Token still usable at `now_ms`.
fn fresh_token(settings: &Settings, now_ms: i64) -> Option<String> {
    let token = settings.access_token.as_ref()?;
    let expiry = settings.token_expiry?;
    (now_ms + EXPIRY_MARGIN_MS < expiry).then(|| token.clone())
}

/// [`Authorizer`] backed by the tenant's settings document.
pub struct GoogleAuthorizer {
    client: reqwest::Client,
    cfg: YoutubeConfig,
    store: Arc<dyn QueueStore>,
    // one in-flight refresh per tenant
    refresh_locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl GoogleAuthorizer {
    pub fn new(cfg: YoutubeConfig, store: Arc<dyn QueueStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            cfg,
            store,
            refresh_locks: DashMap::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Swap the consent callback `code` for tokens and mark setup complete.
    pub async fn complete_authorization(&self, tenant: &TenantId, code: &str) -> Result<Settings> {
        let settings = self.store.settings(tenant)?;
        let grant = self.exchange_code(&settings, code).await?;
        let refresh_token = grant.refresh_token.clone().ok_or(YoutubeError::NoRefreshToken)?;

        let saved = self.store.update_settings(tenant, &mut |s| {
            s.access_token = Some(grant.access_token.clone());
            s.refresh_token = Some(refresh_token.clone());
            s.token_expiry = Some(grant.expiry_ms);
            s.is_setup_complete = true;
        })?;
        info!(tenant = %tenant, "YouTube authorization complete");
        Ok(saved)
    }

    pub async fn exchange_code(&self, settings: &Settings, code: &str) -> Result<TokenGrant> {
        let (client_id, client_secret) = client_pair(settings)?;
        let mut body = format!(
            "grant_type=authorization_code&code={}&client_id={}&client_secret={}",
            urlencoding::encode(code),
            urlencoding::encode(client_id),
            urlencoding::encode(client_secret),
        );
        if let Some(redirect) = settings.redirect_uri.as_deref() {
            body.push_str("&redirect_uri=");
            body.push_str(&urlencoding::encode(redirect));
        }
        self.token_request(body).await
    }

    async fn refresh(&self, settings: &Settings) -> Result<TokenGrant> {
        let (client_id, client_secret) = client_pair(settings)?;
        let refresh_token = settings
            .refresh_token
            .as_deref()
            .ok_or(YoutubeError::NoRefreshToken)?;
        let body = format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}&client_secret={}",
            urlencoding::encode(refresh_token),
            urlencoding::encode(client_id),
            urlencoding::encode(client_secret),
        );
        self.token_request(body).await
    }

    async fn token_request(&self, body: String) -> Result<TokenGrant> {
        let resp = self
            .client
            .post(&self.cfg.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(YoutubeError::Api {
                status: status.as_u16(),
                message: oauth_error_message(&text),
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| YoutubeError::Parse(e.to_string()))?;
        debug!(expires_in = token.expires_in, "token granted");

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expiry_ms: chrono::Utc::now().timestamp_millis() + token.expires_in as i64 * 1000,
        })
    }
}

#[async_trait]
impl Authorizer for GoogleAuthorizer {
    async fn access_token(&self, tenant: &TenantId) -> std::result::Result<String, AuthError> {
        // Fast path: stored token still valid.
        let settings = self.store.settings(tenant)?;
        if !settings.has_client() || settings.refresh_token.is_none() {
            return Err(AuthError::NotConfigured);
        }
        if let Some(token) = fresh_token(&settings, chrono::Utc::now().timestamp_millis()) {
            return Ok(token);
        }

        // Slow path: serialize refreshes per tenant, then re-check.
        let lock = self.refresh_locks.entry(tenant.clone()).or_default().clone();
        let _guard = lock.lock().await;
        let settings = self.store.settings(tenant)?;
        if let Some(token) = fresh_token(&settings, chrono::Utc::now().timestamp_millis()) {
            return Ok(token);
        }

        info!(tenant = %tenant, "refreshing YouTube access token");
        let grant = self.refresh(&settings).await.map_err(|e| {
            warn!(tenant = %tenant, error = %e, "token refresh failed");
            match e {
                YoutubeError::Api { status: 400 | 401, message } => AuthError::Rejected(message),
                YoutubeError::MissingClient | YoutubeError::NoRefreshToken => {
                    AuthError::NotConfigured
                }
                other => AuthError::RefreshFailed(other.to_string()),
            }
        })?;

        self.store.update_settings(tenant, &mut |s| {
            s.access_token = Some(grant.access_token.clone());
            s.token_expiry = Some(grant.expiry_ms);
            if let Some(rotated) = &grant.refresh_token {
                s.refresh_token = Some(rotated.clone());
            }
        })?;
        Ok(grant.access_token)
    }
}

fn client_pair(settings: &Settings) -> Result<(&str, &str)> {
    match (settings.client_id.as_deref(), settings.client_secret.as_deref()) {
        (Some(id), Some(secret)) => Ok((id, secret)),
        _ => Err(YoutubeError::MissingClient),
    }
}

/// `error_description` (or `error`) from an OAuth error body, else the raw text.
fn oauth_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct OauthError {
        error: Option<String>,
        error_description: Option<String>,
    }
    match serde_json::from_str::<OauthError>(body) {
        Ok(OauthError {
            error_description: Some(d),
            ..
        }) => d,
        Ok(OauthError { error: Some(e), .. }) => e,
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use reelqueue_store::SqliteQueueStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn registered() -> Settings {
        Settings {
            client_id: Some("cid.apps.googleusercontent.com".into()),
            client_secret: Some("s3cret".into()),
            redirect_uri: Some("http://localhost:3000/auth/callback".into()),
            ..Default::default()
        }
    }

    /// Serve exactly one HTTP response on a random local port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    fn authorizer(token_url: String) -> (GoogleAuthorizer, Arc<SqliteQueueStore>) {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let cfg = YoutubeConfig {
            token_url,
            ..Default::default()
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        (
            GoogleAuthorizer::new(cfg, store.clone()).with_client(client),
            store,
        )
    }

    #[test]
    fn consent_url_requests_offline_upload_scope() {
        let url = consent_url(&YoutubeConfig::default(), &registered(), Some("t1")).unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=cid.apps.googleusercontent.com"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains(&format!("scope={}", urlencoding::encode(UPLOAD_SCOPE))));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback"));
        assert!(url.ends_with("&state=t1"));

        assert!(matches!(
            consent_url(&YoutubeConfig::default(), &Settings::default(), None),
            Err(YoutubeError::MissingClient)
        ));
    }

    #[test]
    fn oauth_errors_prefer_description() {
        assert_eq!(
            oauth_error_message(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#),
            "Token has been expired or revoked."
        );
        assert_eq!(oauth_error_message(r#"{"error":"invalid_client"}"#), "invalid_client");
        assert_eq!(oauth_error_message("bad gateway\n"), "bad gateway");
    }

    #[tokio::test]
    async fn unconfigured_tenant_is_rejected() {
        let (auth, store) = authorizer("http://127.0.0.1:9/token".into());
        let t = TenantId::from("t1");
        assert_eq!(auth.access_token(&t).await, Err(AuthError::NotConfigured));

        store
            .update_settings(&t, &mut |s| *s = registered())
            .unwrap();
        assert_eq!(auth.access_token(&t).await, Err(AuthError::NotConfigured));
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_network() {
        let (auth, store) = authorizer("http://127.0.0.1:9/token".into());
        let t = TenantId::from("t1");
        let expiry = chrono::Utc::now().timestamp_millis() + 3_600_000;
        store
            .update_settings(&t, &mut |s| {
                *s = registered();
                s.refresh_token = Some("r1".into());
                s.access_token = Some("a1".into());
                s.token_expiry = Some(expiry);
            })
            .unwrap();
        assert_eq!(auth.access_token(&t).await.unwrap(), "a1");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_persisted() {
        let url = serve_once("200 OK", r#"{"access_token":"a2","expires_in":3599,"token_type":"Bearer"}"#).await;
        let (auth, store) = authorizer(url);
        let t = TenantId::from("t1");
        store
            .update_settings(&t, &mut |s| {
                *s = registered();
                s.refresh_token = Some("r1".into());
                s.access_token = Some("a1".into());
                // inside the 60 s margin
                s.token_expiry = Some(chrono::Utc::now().timestamp_millis() + 30_000);
            })
            .unwrap();

        assert_eq!(auth.access_token(&t).await.unwrap(), "a2");
        let saved = store.settings(&t).unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("a2"));
        assert_eq!(saved.refresh_token.as_deref(), Some("r1"));
        assert!(saved.token_expiry.unwrap() > chrono::Utc::now().timestamp_millis() + 3_000_000);
    }

    #[tokio::test]
    async fn revoked_refresh_token_is_an_auth_error() {
        let url = serve_once(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .await;
        let (auth, store) = authorizer(url);
        let t = TenantId::from("t1");
        store
            .update_settings(&t, &mut |s| {
                *s = registered();
                s.refresh_token = Some("r1".into());
            })
            .unwrap();

        assert_eq!(
            auth.access_token(&t).await,
            Err(AuthError::Rejected("Token has been expired or revoked.".into()))
        );
    }

    #[tokio::test]
    async fn code_exchange_without_refresh_token_fails() {
        let url = serve_once("200 OK", r#"{"access_token":"a1","expires_in":3599}"#).await;
        let (auth, store) = authorizer(url);
        let t = TenantId::from("t1");
        store
            .update_settings(&t, &mut |s| *s = registered())
            .unwrap();

        assert!(matches!(
            auth.complete_authorization(&t, "code-123").await,
            Err(YoutubeError::NoRefreshToken)
        ));
        assert!(!store.settings(&t).unwrap().setup_complete());
    }

    #[tokio::test]
    async fn code_exchange_completes_setup() {
        let url = serve_once(
            "200 OK",
            r#"{"access_token":"a1","refresh_token":"r1","expires_in":3599}"#,
        )
        .await;
        let (auth, store) = authorizer(url);
        let t = TenantId::from("t1");
        store
            .update_settings(&t, &mut |s| *s = registered())
            .unwrap();

        let saved = auth.complete_authorization(&t, "code-123").await.unwrap();
        assert!(saved.setup_complete());
        assert_eq!(saved.access_token.as_deref(), Some("a1"));
        assert_eq!(store.settings(&t).unwrap(), saved);
    }
}
