//! 认证处理、会话管理与登录限流。

use axum::extract::{Extension, Json, connect_info::ConnectInfo};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{body::Body as AxumBody, middleware};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AUTH_COOKIE_NAME;
use crate::error::ApiError;
use crate::http::{is_https_request, resolve_client_ip};

#[derive(Debug)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub sessions: Mutex<HashMap<String, SessionEntry>>,
    pub session_ttl: Duration,
    pub login_attempts: Mutex<HashMap<IpAddr, LoginAttempt>>,
    pub login_window: Duration,
    pub login_max_attempts: u32,
    pub login_lockout: Duration,
}

impl AuthConfig {
    pub fn new(username: String, password: String, session_ttl: Duration) -> Self {
        Self {
            username,
            password,
            sessions: Mutex::new(HashMap::new()),
            session_ttl,
            login_attempts: Mutex::new(HashMap::new()),
            login_window: Duration::from_secs(crate::config::DEFAULT_LOGIN_WINDOW_SECS),
            login_max_attempts: crate::config::DEFAULT_LOGIN_MAX_ATTEMPTS,
            login_lockout: Duration::from_secs(crate::config::DEFAULT_LOGIN_LOCKOUT_SECS),
        }
    }

    /// 配置登录失败限流；`max_attempts` 为 0 时关闭。
    pub fn with_login_limits(
        mut self,
        max_attempts: u32,
        window: Duration,
        lockout: Duration,
    ) -> Self {
        self.login_max_attempts = max_attempts;
        self.login_window = window;
        self.login_lockout = lockout;
        self
    }

    fn credentials_match(&self, username: &str, password: &str) -> bool {
        // 两项都比较，避免用户名错误时提前返回
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        user_ok & pass_ok
    }
}

#[derive(Debug)]
pub struct SessionEntry {
    pub expires_at: Instant,
}

#[derive(Debug)]
pub struct LoginAttempt {
    pub window_start: Instant,
    pub failures: u32,
    pub locked_until: Option<Instant>,
}

/// 认证中间件：除豁免路径外要求有效的会话 Cookie。
pub async fn auth_middleware(
    Extension(auth): Extension<Arc<AuthConfig>>,
    jar: CookieJar,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    if is_auth_exempt(req.method(), req.uri().path()) {
        return Ok(next.run(req).await);
    }

    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME)
        && is_session_valid(&auth, cookie.value()).await
    {
        return Ok(next.run(req).await);
    }

    Err(ApiError::Unauthorized("Unauthorized, please log in".into()))
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

/// 登录接口：校验凭据，创建会话并写入 Cookie。
pub async fn login(
    Extension(auth): Extension<Arc<AuthConfig>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Response), ApiError> {
    let client_ip = resolve_client_ip(&headers, Some(addr.ip())).unwrap_or_else(|| addr.ip());

    if let Some(retry_after) = check_login_rate_limit(&auth, client_ip).await {
        return Err(ApiError::TooManyRequests(retry_after));
    }

    if !auth.credentials_match(&payload.username, &payload.password) {
        register_login_failure(&auth, client_ip).await;
        warn!(client_ip = %client_ip, "login rejected");
        let body = Json(json!({ "message": "Invalid credentials" }));
        return Ok((jar, (StatusCode::UNAUTHORIZED, body).into_response()));
    }

    clear_login_failures(&auth, client_ip).await;

    let token = Uuid::new_v4().to_string();
    let expires_at = Instant::now() + auth.session_ttl;
    auth.sessions
        .lock()
        .await
        .insert(token.clone(), SessionEntry { expires_at });

    let cookie = Cookie::build((AUTH_COOKIE_NAME, token.clone()))
        .path("/")
        .http_only(true)
        .secure(is_https_request(&headers))
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(auth.session_ttl.as_secs() as i64))
        .build();
    info!(client_ip = %client_ip, "login succeeded");

    let body = Json(json!({ "message": "Login successful", "token": token }));
    Ok((jar.add(cookie), body.into_response()))
}

/// 登出接口：清理会话并删除 Cookie。
pub async fn logout(
    Extension(auth): Extension<Arc<AuthConfig>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME) {
        remove_session(&auth, cookie.value()).await;
    }

    (
        jar.remove(Cookie::build(AUTH_COOKIE_NAME).path("/").build()),
        Json(json!({ "message": "Logged out" })),
    )
}

/// 查询当前登录状态。
pub async fn auth_status(
    Extension(auth): Extension<Arc<AuthConfig>>,
    jar: CookieJar,
) -> StatusCode {
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME)
        && is_session_valid(&auth, cookie.value()).await
    {
        return StatusCode::NO_CONTENT;
    }
    StatusCode::UNAUTHORIZED
}

/// 文档列表对匿名 GET 开放，前端在登录前即可拉取。
fn is_auth_exempt(method: &Method, path: &str) -> bool {
    if path == "/api/auth/status" || path == "/api/version" {
        return true;
    }
    if path == "/api/pdfs" && (method == Method::GET || method == Method::HEAD) {
        return true;
    }
    !path.starts_with("/api/")
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

async fn is_session_valid(auth: &AuthConfig, token: &str) -> bool {
    let mut sessions = auth.sessions.lock().await;
    let now = Instant::now();
    match sessions.get(token) {
        Some(entry) if entry.expires_at > now => true,
        _ => {
            sessions.remove(token);
            false
        }
    }
}

async fn remove_session(auth: &AuthConfig, token: &str) {
    let mut sessions = auth.sessions.lock().await;
    sessions.remove(token);
}

async fn check_login_rate_limit(auth: &AuthConfig, ip: IpAddr) -> Option<u64> {
    if auth.login_max_attempts == 0 {
        return None;
    }

    let mut attempts = auth.login_attempts.lock().await;
    let now = Instant::now();
    let entry = attempts.get_mut(&ip)?;

    if let Some(locked_until) = entry.locked_until {
        if now < locked_until {
            return Some(locked_until.saturating_duration_since(now).as_secs().max(1));
        }
        entry.locked_until = None;
        entry.failures = 0;
        entry.window_start = now;
    }

    if now.duration_since(entry.window_start) > auth.login_window {
        entry.window_start = now;
        entry.failures = 0;
    }

    None
}

async fn register_login_failure(auth: &AuthConfig, ip: IpAddr) {
    if auth.login_max_attempts == 0 {
        return;
    }

    let mut attempts = auth.login_attempts.lock().await;
    let now = Instant::now();
    let entry = attempts.entry(ip).or_insert(LoginAttempt {
        window_start: now,
        failures: 0,
        locked_until: None,
    });

    if now.duration_since(entry.window_start) > auth.login_window {
        entry.window_start = now;
        entry.failures = 0;
        entry.locked_until = None;
    }

    entry.failures = entry.failures.saturating_add(1);
    if entry.failures >= auth.login_max_attempts {
        entry.locked_until = Some(now + auth.login_lockout);
        warn!(client_ip = %ip, "login locked out");
    }
}

async fn clear_login_failures(auth: &AuthConfig, ip: IpAddr) {
    let mut attempts = auth.login_attempts.lock().await;
    attempts.remove(&ip);
}

/// 清理过期会话。
pub async fn prune_expired_sessions(auth: &AuthConfig) {
    let mut sessions = auth.sessions.lock().await;
    let now = Instant::now();
    sessions.retain(|_, entry| entry.expires_at > now);
}

/// 清理过期的登录失败记录。
pub async fn prune_login_attempts(auth: &AuthConfig) {
    let mut attempts = auth.login_attempts.lock().await;
    let now = Instant::now();
    attempts.retain(|_, entry| {
        if let Some(locked_until) = entry.locked_until {
            return locked_until > now;
        }
        now.duration_since(entry.window_start) <= auth.login_window
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new("admin".into(), "secret".into(), Duration::from_secs(60))
            .with_login_limits(2, Duration::from_secs(60), Duration::from_secs(120))
    }

    #[test]
    fn exempt_paths() {
        assert!(is_auth_exempt(&Method::POST, "/login"));
        assert!(is_auth_exempt(&Method::POST, "/logout"));
        assert!(is_auth_exempt(&Method::GET, "/api/auth/status"));
        assert!(is_auth_exempt(&Method::GET, "/api/version"));
        assert!(is_auth_exempt(&Method::GET, "/api/pdfs"));
        assert!(!is_auth_exempt(&Method::POST, "/api/pdfs"));
        assert!(!is_auth_exempt(&Method::GET, "/api/pdfs/a.pdf"));
        assert!(!is_auth_exempt(&Method::GET, "/api/pdfs/thumbnails/a.pdf"));
    }

    #[test]
    fn credentials_must_both_match() {
        let auth = config();
        assert!(auth.credentials_match("admin", "secret"));
        assert!(!auth.credentials_match("admin", "secret2"));
        assert!(!auth.credentials_match("root", "secret"));
    }

    #[tokio::test]
    async fn lockout_after_max_failures() {
        let auth = config();
        let ip: IpAddr = "192.0.2.1".parse().expect("ip");

        assert!(check_login_rate_limit(&auth, ip).await.is_none());
        register_login_failure(&auth, ip).await;
        assert!(check_login_rate_limit(&auth, ip).await.is_none());
        register_login_failure(&auth, ip).await;

        let retry_after = check_login_rate_limit(&auth, ip).await;
        assert!(matches!(retry_after, Some(secs) if secs > 0 && secs <= 120));

        clear_login_failures(&auth, ip).await;
        assert!(check_login_rate_limit(&auth, ip).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_pruned() {
        let auth = config();
        {
            let mut sessions = auth.sessions.lock().await;
            sessions.insert(
                "live".into(),
                SessionEntry {
                    expires_at: Instant::now() + Duration::from_secs(60),
                },
            );
            sessions.insert(
                "dead".into(),
                SessionEntry {
                    expires_at: Instant::now(),
                },
            );
        }

        assert!(is_session_valid(&auth, "live").await);
        assert!(!is_session_valid(&auth, "dead").await);
        assert!(!is_session_valid(&auth, "unknown").await);

        prune_expired_sessions(&auth).await;
        assert_eq!(auth.sessions.lock().await.len(), 1);
    }
}
