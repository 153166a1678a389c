use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub secret_key: String,
    pub password_salt: String,
    pub base_url: String,
    pub token_max_age_secs: i64,
    pub mail_from: String,
    /// `None` when Mailgun credentials are not configured; mail is logged instead.
    pub mailgun: Option<MailgunConfig>,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let secret_key = std::env::var("SECRET_KEY").context("SECRET_KEY is not set")?;
        let password_salt = std::env::var("SECURITY_PASSWORD_SALT")
            .context("SECURITY_PASSWORD_SALT is not set")?;

        let mailgun = match (
            std::env::var("MAILGUN_API_KEY"),
            std::env::var("MAILGUN_DOMAIN"),
        ) {
            (Ok(api_key), Ok(domain)) => Some(MailgunConfig {
                api_key,
                domain,
                api_base: std::env::var("MAILGUN_API_BASE")
                    .unwrap_or_else(|_| "https://api.mailgun.net/v3".into()),
            }),
            _ => None,
        };

        let mail_from = std::env::var("MAIL_FROM").unwrap_or_else(|_| match &mailgun {
            Some(mg) => format!("no-reply@{}", mg.domain),
            None => "no-reply@localhost".into(),
        });

        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        let session = SessionConfig {
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
            cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        Ok(Self {
            database_url,
            secret_key,
            password_salt,
            base_url,
            token_max_age_secs: std::env::var("TOKEN_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(3600),
            mail_from,
            mailgun,
            session,
        })
    }
}
