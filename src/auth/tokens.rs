use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

/// What an emailed token may be used for. Each purpose signs with its own key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Verification,
    PasswordReset,
}

impl TokenPurpose {
    fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::Verification => "verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailClaims {
    sub: String, // email address
    iat: i64,    // issued at (unix timestamp)
    purpose: TokenPurpose,
}

/// Issues and redeems signed, timestamped email tokens.
///
/// Nothing is stored server-side: a token is valid when its signature checks
/// out under the purpose key and its issue time is inside the window.
#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    salt: String,
}

impl TokenCodec {
    pub fn new(secret: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            salt: salt.into(),
        }
    }

    fn key_material(&self, purpose: TokenPurpose) -> Vec<u8> {
        format!("{}:{}:{}", self.secret, self.salt, purpose.as_str()).into_bytes()
    }

    pub fn issue(&self, email: &str, purpose: TokenPurpose) -> anyhow::Result<String> {
        self.issue_at(email, purpose, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        email: &str,
        purpose: TokenPurpose,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let claims = EmailClaims {
            sub: email.to_string(),
            iat: now.unix_timestamp(),
            purpose,
        };
        let key = EncodingKey::from_secret(&self.key_material(purpose));
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key)?;
        debug!(purpose = ?purpose, "email token issued");
        Ok(token)
    }

    /// Returns the embedded email, or `None` for any malformed, tampered,
    /// wrong-purpose or expired token.
    pub fn redeem(&self, token: &str, purpose: TokenPurpose, max_age_secs: i64) -> Option<String> {
        self.redeem_at(token, purpose, max_age_secs, OffsetDateTime::now_utc())
    }

    pub fn redeem_at(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age_secs: i64,
        now: OffsetDateTime,
    ) -> Option<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        // age is checked against `iat` below, there is no `exp` claim
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let key = DecodingKey::from_secret(&self.key_material(purpose));
        let claims = match decode::<EmailClaims>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, purpose = ?purpose, "email token rejected");
                return None;
            }
        };

        if claims.purpose != purpose {
            debug!(purpose = ?purpose, "email token purpose mismatch");
            return None;
        }

        let age = now.unix_timestamp() - claims.iat;
        if age < 0 || age > max_age_secs {
            debug!(age, max_age_secs, "email token outside its window");
            return None;
        }

        Some(claims.sub)
    }
}
