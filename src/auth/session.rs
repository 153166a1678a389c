use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::SET_COOKIE, request::Parts, HeaderValue},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::repo_types::User,
    config::SessionConfig,
    error::AppError,
    state::AppState,
    web::{
        cookie_value,
        flash::{Category, Flashes},
    },
};

pub const SESSION_COOKIE: &str = "verimail_session";

/// Upper bound on `SESSION_TTL_MINUTES` (one year).
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Payload of the session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,   // user ID
    pub iat: usize, // issued at (unix timestamp)
    pub exp: usize, // expires at (unix timestamp)
}

/// Signs and verifies session cookies for logged-in users.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    cookie_secure: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, config: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs(config.ttl_minutes.clamp(1, MAX_TTL_MINUTES) as u64 * 60),
            cookie_secure: config.cookie_secure,
        }
    }

    pub fn sign(&self, user_id: i64) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = SessionClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id, "session signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// `HttpOnly` cookie carrying a freshly signed session token.
    pub fn cookie(&self, token: &str) -> anyhow::Result<HeaderValue> {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl.as_secs()
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        Ok(HeaderValue::from_str(&cookie)?)
    }

    pub fn clear_cookie(&self) -> HeaderValue {
        if self.cookie_secure {
            HeaderValue::from_static(
                "verimail_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure",
            )
        } else {
            HeaderValue::from_static("verimail_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
        }
    }
}

async fn session_user(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
    let Some(token) = cookie_value(&parts.headers, SESSION_COOKIE) else {
        return Ok(None);
    };
    let claims = match state.sessions.verify(&token) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "invalid or expired session cookie");
            return Ok(None);
        }
    };
    let user = state.store.find_by_id(claims.sub).await?;
    if user.is_none() {
        warn!(user_id = claims.sub, "session refers to a missing user");
    }
    Ok(user)
}

/// The logged-in user, if any.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_user(parts, state).await?))
    }
}

/// The logged-in user. Anonymous requests are redirected to the login page.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match session_user(parts, state).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => {
                let stale = cookie_value(&parts.headers, SESSION_COOKIE).is_some();
                let mut flashes = match Flashes::from_request_parts(parts, state).await {
                    Ok(f) => f,
                    Err(never) => match never {},
                };
                flashes.push(Category::Info, "Please log in to access this page.");
                let mut res = flashes.redirect("/login");
                if stale {
                    res.headers_mut()
                        .append(SET_COOKIE, state.sessions.clear_cookie());
                }
                Err(res)
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new(
            "dev-secret",
            &SessionConfig {
                ttl_minutes: 5,
                cookie_secure: false,
            },
        )
    }

    #[test]
    fn sign_and_verify_session() {
        let keys = keys();
        let token = keys.sign(42).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_other_secret() {
        let token = keys().sign(42).expect("sign");
        let other = SessionKeys::new(
            "other-secret",
            &SessionConfig {
                ttl_minutes: 5,
                cookie_secure: false,
            },
        );
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn cookie_attributes() {
        let keys = keys();
        let cookie = keys.cookie("abc").expect("cookie");
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("verimail_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=300"));
        assert!(!cookie.contains("Secure"));

        let secure = SessionKeys::new(
            "s",
            &SessionConfig {
                ttl_minutes: 5,
                cookie_secure: true,
            },
        );
        assert!(secure.cookie("abc").unwrap().to_str().unwrap().ends_with("; Secure"));
        assert!(secure.clear_cookie().to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn oversized_ttl_is_clamped() {
        let keys = SessionKeys::new(
            "s",
            &SessionConfig {
                ttl_minutes: i64::MAX,
                cookie_secure: false,
            },
        );
        let claims = keys.verify(&keys.sign(7).unwrap()).unwrap();
        assert_eq!((claims.exp - claims.iat) as i64, MAX_TTL_MINUTES * 60);
        let cookie = keys.cookie("abc").unwrap();
        assert!(cookie
            .to_str()
            .unwrap()
            .contains(&format!("Max-Age={}", MAX_TTL_MINUTES * 60)));
    }
}
