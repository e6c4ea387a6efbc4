//! Supabase (GoTrue) identity provider.
//!
//! Holds the current session in memory, talks to the `/auth/v1` REST API, and
//! broadcasts auth events to subscribers. The session may be seeded from the
//! local session mirror at startup; such a session is only a claim until the
//! reconciler has validated it through [`IdentityProvider::get_current_user`].

use crate::provider::{
    AuthResponse, AuthUser, Credentials, IdentityProvider, Session, SessionEvent, SessionEventBus,
    SessionSubscription,
};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// How often the auto-refresh task checks the session expiry.
const AUTO_REFRESH_TICK: Duration = Duration::from_secs(30);

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Whether `session` should be refreshed at `now` given a safety `margin`.
pub fn needs_refresh(session: &Session, now: i64, margin: Duration) -> bool {
    let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
    session
        .expires_at
        .is_some_and(|expires_at| expires_at.saturating_sub(margin) <= now)
}

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token grant response (password and refresh_token grants, autoconfirmed signup).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at: Some(self.expires_at.unwrap_or(now + self.expires_in)),
            user: self.user,
        }
    }
}

/// Error body. GoTrue has used both field layouts over time.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn code(&self) -> Option<&str> {
        self.error_code.as_deref().or(self.error.as_deref())
    }

    fn message(&self, fallback: &str) -> String {
        self.msg
            .as_deref()
            .or(self.error_description.as_deref())
            .or(self.message.as_deref())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Which call failed, for mapping HTTP errors onto [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    SignIn,
    SignUp,
    GetUser,
    Refresh,
    SignOut,
}

fn classify_error(operation: Operation, status: StatusCode, body: &str) -> AuthError {
    let parsed = ErrorBody::parse(body);
    let message = parsed.message(status.canonical_reason().unwrap_or("request failed"));

    if status.is_server_error() {
        return AuthError::Server {
            status: status.as_u16(),
            message,
        };
    }

    match (operation, parsed.code()) {
        (Operation::SignIn, Some("email_not_confirmed")) => AuthError::EmailNotConfirmed,
        (Operation::SignIn, _) => AuthError::InvalidCredentials(message),
        (Operation::SignUp, Some("user_already_exists" | "email_exists")) => {
            AuthError::UserAlreadyExists(message)
        }
        (Operation::SignUp, _) if message.contains("already registered") => {
            AuthError::UserAlreadyExists(message)
        }
        (Operation::SignUp, _) => AuthError::InvalidInput(message),
        (Operation::Refresh, _) => {
            AuthError::TokenRefresh(format!("HTTP {}: {}", status.as_u16(), message))
        }
        (Operation::GetUser | Operation::SignOut, _) => {
            AuthError::SessionInvalid(format!("HTTP {}: {}", status.as_u16(), message))
        }
    }
}

async fn error_from_response(operation: Operation, response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(operation = ?operation, status = %status, "Auth request failed");
    classify_error(operation, status, &body)
}

/// Parse a signup body: a full token grant when autoconfirm is on, otherwise
/// the bare user awaiting email confirmation.
fn parse_signup_body(body: &str, now: i64) -> AuthResult<AuthResponse> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    if value.get("access_token").is_some() {
        let grant: TokenResponse = serde_json::from_value(value)?;
        let session = grant.into_session(now);
        return Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        });
    }

    if value.get("id").is_some() {
        let user: AuthUser = serde_json::from_value(value)?;
        return Ok(AuthResponse {
            user: Some(user),
            session: None,
        });
    }

    Err(AuthError::UnexpectedResponse(
        "signup response carried neither a session nor a user".to_string(),
    ))
}

/// GoTrue-backed [`IdentityProvider`].
pub struct SupabaseIdentityProvider {
    supabase_url: String,
    publishable_key: String,
    http_client: Client,
    session: RwLock<Option<Session>>,
    events: SessionEventBus,
    refresh_config: RefreshConfig,
}

impl SupabaseIdentityProvider {
    /// Create a provider for the project at `supabase_url`.
    pub fn new(supabase_url: &str, publishable_key: &str) -> AuthResult<Self> {
        Self::with_refresh_config(supabase_url, publishable_key, RefreshConfig::default())
    }

    /// Create a provider with custom refresh retry behavior.
    pub fn with_refresh_config(
        supabase_url: &str,
        publishable_key: &str,
        refresh_config: RefreshConfig,
    ) -> AuthResult<Self> {
        let parsed = Url::parse(supabase_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::UnexpectedResponse(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
            http_client: Client::new(),
            session: RwLock::new(None),
            events: SessionEventBus::new(),
            refresh_config,
        })
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, custom roots).
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    fn current_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write() = session;
    }

    /// Seed the in-memory session from the local mirror.
    ///
    /// An expired session is refreshed first; if that fails the seed is
    /// dropped. No event is emitted: subscribers see the outcome as their
    /// `InitialSession`.
    pub async fn restore_session(&self, session: Session) {
        let now = Utc::now().timestamp();
        let expired = session.is_expired_at(now);
        let has_refresh_token = !session.refresh_token.is_empty();
        self.store_session(Some(session));

        if !expired {
            debug!("Recovered session from local storage");
            return;
        }

        if !has_refresh_token {
            info!("Recovered session is expired and cannot be refreshed, dropping it");
            self.store_session(None);
            return;
        }

        info!("Recovered session is expired, refreshing");
        if let Err(e) = self.refresh_session().await {
            warn!(error = %e, "Could not refresh recovered session");
        }
    }

    /// Refresh the current session with exponential backoff.
    ///
    /// Emits `TokenRefreshed` on success. A non-transient failure or exhausted
    /// retries drop the session and emit `SignedOut`.
    pub async fn refresh_session(&self) -> AuthResult<Session> {
        let refresh_token = match self.current_session() {
            Some(session) if !session.refresh_token.is_empty() => session.refresh_token,
            Some(_) => return Err(AuthError::TokenRefresh("No refresh token available".to_string())),
            None => return Err(AuthError::NotLoggedIn),
        };

        let mut last_error = None;
        for attempt in 0..self.refresh_config.max_retries {
            match self.try_refresh(&refresh_token).await {
                Ok(session) => {
                    info!(user_id = %session.user.id, "Token refreshed successfully");
                    self.store_session(Some(session.clone()));
                    self.events.emit(SessionEvent::token_refreshed(session.clone()));
                    return Ok(session);
                }
                Err(e) if e.is_transient() => {
                    if attempt + 1 < self.refresh_config.max_retries {
                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.refresh_config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "Refresh failed with non-transient error");
                    self.drop_session();
                    return Err(e);
                }
            }
        }

        warn!(
            attempts = self.refresh_config.max_retries,
            "Refresh failed after all attempts"
        );
        self.drop_session();
        Err(last_error.unwrap_or(AuthError::RefreshExhausted(self.refresh_config.max_retries)))
    }

    async fn try_refresh(&self, refresh_token: &str) -> AuthResult<Session> {
        let response = self
            .http_client
            .post(self.auth_url("token?grant_type=refresh_token"))
            .header("apikey", &self.publishable_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(Operation::Refresh, response).await);
        }

        let grant: TokenResponse = response.json().await?;
        Ok(grant.into_session(Utc::now().timestamp()))
    }

    fn drop_session(&self) {
        self.store_session(None);
        self.events.emit(SessionEvent::signed_out());
    }

    /// Keep the session fresh in the background, refreshing once it is
    /// within `margin` of expiring. Abort the handle to stop.
    pub fn spawn_auto_refresh(self: &Arc<Self>, margin: Duration) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUTO_REFRESH_TICK);
            loop {
                ticker.tick().await;

                let due = provider
                    .current_session()
                    .is_some_and(|session| needs_refresh(&session, Utc::now().timestamp(), margin));
                if !due {
                    continue;
                }

                if let Err(e) = provider.refresh_session().await {
                    warn!(error = %e, "Automatic session refresh failed");
                }
            }
        })
    }

    async fn password_grant(&self, credentials: &Credentials) -> AuthResult<Session> {
        let response = self
            .http_client
            .post(self.auth_url("token?grant_type=password"))
            .header("apikey", &self.publishable_key)
            .json(&PasswordRequest {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(Operation::SignIn, response).await);
        }

        let grant: TokenResponse = response.json().await?;
        Ok(grant.into_session(Utc::now().timestamp()))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn get_current_user(&self) -> AuthResult<Option<AuthUser>> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };

        debug!("Verifying session with Supabase");
        let response = self
            .http_client
            .get(self.auth_url("user"))
            .header("apikey", &self.publishable_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(Operation::GetUser, response).await);
        }

        let user: AuthUser = response.json().await?;
        Ok(Some(user))
    }

    async fn get_session_snapshot(&self) -> AuthResult<Option<Session>> {
        Ok(self.current_session())
    }

    fn subscribe(&self) -> SessionSubscription {
        self.events.subscribe(|| self.current_session())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let session = self.session.write().take();

        let result = match session {
            Some(session) => {
                let response = self
                    .http_client
                    .post(self.auth_url("logout"))
                    .header("apikey", &self.publishable_key)
                    .bearer_auth(&session.access_token)
                    .send()
                    .await;

                match response {
                    Ok(response) if response.status().is_success() => Ok(()),
                    // Already gone server-side.
                    Ok(response)
                        if matches!(
                            response.status(),
                            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
                        ) =>
                    {
                        Ok(())
                    }
                    Ok(response) => Err(error_from_response(Operation::SignOut, response).await),
                    Err(e) => Err(AuthError::Http(e)),
                }
            }
            None => Ok(()),
        };

        self.events.emit(SessionEvent::signed_out());
        info!(remote_ok = result.is_ok(), "Signed out");
        result
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> AuthResult<AuthResponse> {
        debug!(email = %credentials.email, "Attempting email/password login");
        let session = self.password_grant(credentials).await?;

        info!(claimed_user_id = %session.user.id, "Password sign-in accepted");
        self.store_session(Some(session.clone()));
        self.events.emit(SessionEvent::signed_in(session.clone()));

        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_up(&self, credentials: &Credentials) -> AuthResult<AuthResponse> {
        debug!(email = %credentials.email, "Attempting signup");
        let response = self
            .http_client
            .post(self.auth_url("signup"))
            .header("apikey", &self.publishable_key)
            .json(&PasswordRequest {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(Operation::SignUp, response).await);
        }

        let body = response.text().await?;
        let result = parse_signup_body(&body, Utc::now().timestamp())?;

        if let Some(session) = &result.session {
            self.store_session(Some(session.clone()));
            self.events.emit(SessionEvent::signed_in(session.clone()));
        } else {
            info!("Signup accepted, awaiting email confirmation");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SessionEventKind;
    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn session(token: &str, expires_at: Option<i64>) -> Session {
        Session {
            access_token: token.to_string(),
            refresh_token: format!("refresh-{}", token),
            token_type: "bearer".to_string(),
            expires_at,
            user: AuthUser {
                id: "u1".to_string(),
                email: Some("lifter@example.com".to_string()),
            },
        }
    }

    const TOKEN_BODY: &str = r#"{"access_token":"t2","refresh_token":"r2","token_type":"bearer","expires_in":3600,"user":{"id":"u1","email":"lifter@example.com"}}"#;

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve canned `(status, body)` responses, one connection each.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_server = seen.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                seen_by_server.lock().push(request);

                let response = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}", addr), seen)
    }

    fn local(url: &str, refresh_config: RefreshConfig) -> SupabaseIdentityProvider {
        let client = Client::builder().no_proxy().build().unwrap();
        SupabaseIdentityProvider::with_refresh_config(url, "pk-test", refresh_config)
            .unwrap()
            .with_http_client(client)
    }

    fn fast_refresh() -> RefreshConfig {
        RefreshConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    #[test]
    fn test_refresh_config_delay_exponential_backoff() {
        let config = RefreshConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(63), Duration::from_millis(5000));
    }

    #[test]
    fn test_needs_refresh_respects_margin() {
        let margin = Duration::from_secs(60);
        assert!(!needs_refresh(&session("t", Some(1_000)), 900, margin));
        assert!(needs_refresh(&session("t", Some(1_000)), 940, margin));
        assert!(needs_refresh(&session("t", Some(1_000)), 2_000, margin));
        assert!(!needs_refresh(&session("t", None), i64::MAX, margin));
    }

    #[test]
    fn test_rejects_unparseable_url() {
        assert!(matches!(
            SupabaseIdentityProvider::new("not a url", "key"),
            Err(AuthError::InvalidUrl(_))
        ));
        assert!(SupabaseIdentityProvider::new("ftp://example.com", "key").is_err());
    }

    #[test]
    fn test_classify_sign_in_errors() {
        let invalid = classify_error(
            Operation::SignIn,
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert!(matches!(invalid, AuthError::InvalidCredentials(m) if m == "Invalid login credentials"));

        let legacy = classify_error(
            Operation::SignIn,
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(legacy, AuthError::InvalidCredentials(_)));

        let unconfirmed = classify_error(
            Operation::SignIn,
            StatusCode::BAD_REQUEST,
            r#"{"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#,
        );
        assert!(matches!(unconfirmed, AuthError::EmailNotConfirmed));
    }

    #[test]
    fn test_classify_sign_up_and_server_errors() {
        let exists = classify_error(
            Operation::SignUp,
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert!(matches!(exists, AuthError::UserAlreadyExists(_)));

        let weak = classify_error(
            Operation::SignUp,
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error_code":"weak_password","msg":"Password should be at least 6 characters"}"#,
        );
        assert!(matches!(weak, AuthError::InvalidInput(m) if m.contains("at least 6")));

        let outage = classify_error(Operation::GetUser, StatusCode::BAD_GATEWAY, "<html>");
        assert!(outage.is_transient());
    }

    #[test]
    fn test_parse_signup_body_variants() {
        let confirmed = parse_signup_body(TOKEN_BODY, 100).unwrap();
        let session = confirmed.session.unwrap();
        assert_eq!(session.access_token, "t2");
        assert_eq!(session.expires_at, Some(3_700));

        let pending = parse_signup_body(r#"{"id":"u9","email":"new@example.com"}"#, 100).unwrap();
        assert!(pending.session.is_none());
        assert_eq!(pending.user.unwrap().id, "u9");

        assert!(matches!(
            parse_signup_body("{}", 100),
            Err(AuthError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_get_current_user_without_session_skips_network() {
        let provider = SupabaseIdentityProvider::new("http://127.0.0.1:9", "key").unwrap();
        assert_eq!(provider.get_current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_current_user_sends_bearer_token() {
        let (url, seen) = serve(vec![(200, r#"{"id":"u1","email":"lifter@example.com"}"#)]).await;
        let provider = local(&url, RefreshConfig::default());
        provider.restore_session(session("t1", None)).await;

        let user = provider.get_current_user().await.unwrap().unwrap();
        assert_eq!(user.id, "u1");

        let request = seen.lock()[0].to_ascii_lowercase();
        assert!(request.starts_with("get /auth/v1/user "));
        assert!(request.contains("authorization: bearer t1"));
        assert!(request.contains("apikey: pk-test"));
    }

    #[tokio::test]
    async fn test_get_current_user_rejected_session() {
        let (url, _) = serve(vec![(401, r#"{"msg":"invalid JWT"}"#)]).await;
        let provider = local(&url, RefreshConfig::default());
        provider.restore_session(session("stale", None)).await;

        let result = provider.get_current_user().await;
        assert!(matches!(result, Err(AuthError::SessionInvalid(_))));
    }

    #[tokio::test]
    async fn test_sign_in_stores_session_and_emits_signed_in() {
        let (url, seen) = serve(vec![(200, TOKEN_BODY)]).await;
        let provider = local(&url, RefreshConfig::default());
        let mut subscription = provider.subscribe();
        assert_eq!(subscription.next().await, Some(SessionEvent::initial(None)));

        let response = provider
            .sign_in_with_password(&Credentials::new("lifter@example.com", "pw"))
            .await
            .unwrap();
        assert_eq!(response.session.as_ref().unwrap().access_token, "t2");

        let event = subscription.next().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::SignedIn);
        assert_eq!(
            provider.get_session_snapshot().await.unwrap().unwrap().access_token,
            "t2"
        );
        assert!(seen.lock()[0].contains("grant_type=password"));
    }

    #[tokio::test]
    async fn test_sign_out_clears_locally_even_when_server_fails() {
        let (url, _) = serve(vec![(500, r#"{"msg":"boom"}"#)]).await;
        let provider = local(&url, RefreshConfig::default());
        provider.restore_session(session("t1", None)).await;
        let mut subscription = provider.subscribe();
        subscription.next().await;

        let result = provider.sign_out().await;

        assert!(matches!(result, Err(AuthError::Server { status: 500, .. })));
        assert!(provider.get_session_snapshot().await.unwrap().is_none());
        assert_eq!(subscription.next().await, Some(SessionEvent::signed_out()));
    }

    #[tokio::test]
    async fn test_sign_out_treats_unauthorized_as_done() {
        let (url, _) = serve(vec![(401, "")]).await;
        let provider = local(&url, RefreshConfig::default());
        provider.restore_session(session("revoked", None)).await;

        assert!(provider.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_emits_token_refreshed() {
        let (url, seen) = serve(vec![(200, TOKEN_BODY)]).await;
        let provider = local(&url, fast_refresh());
        provider.restore_session(session("t1", None)).await;
        let mut subscription = provider.subscribe();
        subscription.next().await;

        let refreshed = provider.refresh_session().await.unwrap();

        assert_eq!(refreshed.access_token, "t2");
        assert_eq!(
            subscription.next().await,
            Some(SessionEvent::token_refreshed(refreshed))
        );
        assert!(seen.lock()[0].contains("\"refresh_token\":\"refresh-t1\""));
    }

    #[tokio::test]
    async fn test_refresh_rejected_drops_session() {
        let (url, _) = serve(vec![(400, r#"{"error_code":"refresh_token_not_found"}"#)]).await;
        let provider = local(&url, fast_refresh());
        provider.restore_session(session("t1", None)).await;
        let mut subscription = provider.subscribe();
        subscription.next().await;

        assert!(matches!(
            provider.refresh_session().await,
            Err(AuthError::TokenRefresh(_))
        ));
        assert!(provider.get_session_snapshot().await.unwrap().is_none());
        assert_eq!(subscription.next().await, Some(SessionEvent::signed_out()));
    }

    #[tokio::test]
    async fn test_restore_expired_session_refreshes_first() {
        let (url, _) = serve(vec![(200, TOKEN_BODY)]).await;
        let provider = local(&url, fast_refresh());

        provider.restore_session(session("old", Some(1))).await;

        let mut subscription = provider.subscribe();
        let initial = subscription.next().await.unwrap();
        assert_eq!(initial.kind, SessionEventKind::InitialSession);
        assert_eq!(initial.session.unwrap().access_token, "t2");
    }

    #[tokio::test]
    async fn test_restore_expired_session_without_refresh_token_is_dropped() {
        let provider = SupabaseIdentityProvider::new("http://127.0.0.1:9", "key").unwrap();
        let mut expired = session("old", Some(1));
        expired.refresh_token.clear();

        provider.restore_session(expired).await;

        assert!(provider.get_session_snapshot().await.unwrap().is_none());
    }
}
