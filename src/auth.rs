//! Basic 认证中间件：单一固定账号，常量时间比较。

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::{middleware, response::Response};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::ApiError;

const CHALLENGE: &str = r#"Basic realm="Restricted""#;

/// The one username/password pair accepted by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Compares both fields in constant time; both are always compared.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let username_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let password_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(username_ok & password_ok)
    }
}

impl FromStr for Credentials {
    type Err = String;

    /// Parses `username:password`. The password may contain `:`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (username, password) = value
            .split_once(':')
            .ok_or_else(|| "auth must be in the format username:password".to_string())?;
        Ok(Self::new(username, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// 认证中间件：凭据缺失或不匹配时返回 401 与质询头。
///
/// 格式错误的 `Authorization` 头与缺失同样处理。
pub async fn basic_auth(
    State(credentials): State<Arc<Credentials>>,
    req: Request,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    if let Some(auth_header) = req.headers().typed_get::<Authorization<Basic>>()
        && credentials.matches(auth_header.username(), auth_header.password())
    {
        return Ok(next.run(req).await);
    }

    debug!(path = req.uri().path(), "rejected request without valid credentials");
    let mut headers = HeaderMap::new();
    headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
    Err(ApiError::Unauthorized(headers))
}
