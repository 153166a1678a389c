use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{info, instrument, warn};

use crate::{config::MailgunConfig, web::views::escape_html};

/// The two transactional emails the application sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Verification,
    PasswordReset,
}

impl EmailKind {
    pub fn subject(self) -> &'static str {
        match self {
            EmailKind::Verification => "Email Verification",
            EmailKind::PasswordReset => "Password Reset Request",
        }
    }

    pub fn render_html(self, link: &str) -> String {
        let link = escape_html(link);
        match self {
            EmailKind::Verification => format!(
                r#"<html>
<body style="font-family: Arial, sans-serif; margin: 0; padding: 0; color: #333;">
  <div style="background-color: #007bff; color: #fff; text-align: center; padding: 20px;">
    <h1 style="margin: 0;">Email Verification</h1>
  </div>
  <div style="padding: 20px; text-align: center;">
    <p>Please verify your email address by clicking the button below:</p>
    <p><a href="{link}" style="display: inline-block; padding: 15px 30px; font-size: 16px; color: #fff; background-color: #007bff; text-decoration: none; border-radius: 5px;">Verify Your Email</a></p>
    <p>If you did not create an account, no further action is required.</p>
    <p>Thank you!</p>
  </div>
</body>
</html>"#
            ),
            EmailKind::PasswordReset => format!(
                r#"<html>
<body style="font-family: Arial, sans-serif; margin: 0; padding: 0; color: #333;">
  <div style="background-color: #007bff; color: #fff; text-align: center; padding: 20px;">
    <h1 style="margin: 0;">Password Reset</h1>
  </div>
  <div style="padding: 20px; text-align: center;">
    <p>To reset your password, click the following link:</p>
    <p><a href="{link}" style="background-color: #007bff; color: #fff; padding: 10px 20px; text-decoration: none; border-radius: 5px;">Reset Password</a></p>
    <p>If you did not request a password reset, you can ignore this email.</p>
  </div>
</body>
</html>"#
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// A single delivery attempt. Implementations do not retry.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Delivers through the Mailgun messages API.
#[derive(Clone)]
pub struct MailgunSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl MailgunSender {
    pub fn new(config: &MailgunConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build mailgun http client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.domain
            ),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for MailgunSender {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", message.from.as_str()),
                ("to", message.to.as_str()),
                ("subject", message.subject.as_str()),
                ("html", message.html.as_str()),
            ])
            .send()
            .await
            .context("mailgun request")?;

        let status = response.status();
        if status != StatusCode::OK {
            anyhow::bail!("mailgun responded with {status}");
        }
        Ok(())
    }
}

/// Local development sender: logs the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "mailgun not configured; email logged instead of sent"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
}

/// Renders the email for a kind and hands it to the configured sender.
#[derive(Clone)]
pub struct Dispatcher {
    sender: Arc<dyn EmailSender>,
    from: String,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn EmailSender>, from: impl Into<String>) -> Self {
        Self {
            sender,
            from: from.into(),
        }
    }

    #[instrument(skip(self, link))]
    pub async fn send(&self, kind: EmailKind, recipient: &str, link: &str) -> Delivery {
        let message = EmailMessage {
            from: self.from.clone(),
            to: recipient.to_string(),
            subject: kind.subject().to_string(),
            html: kind.render_html(link),
        };
        match self.sender.send(&message).await {
            Ok(()) => {
                info!(kind = ?kind, to = %recipient, "email sent");
                Delivery::Sent
            }
            Err(e) => {
                warn!(error = %e, kind = ?kind, to = %recipient, "email delivery failed");
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{EmailMessage, EmailSender};

    /// Records every message; fails delivery when `fail` is set.
    #[derive(Default)]
    pub struct RecordingSender {
        pub sent: Mutex<Vec<EmailMessage>>,
        pub fail: bool,
    }

    impl RecordingSender {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn messages(&self) -> Vec<EmailMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                anyhow::bail!("provider unavailable");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mailgun_for(server: &MockServer) -> MailgunSender {
        MailgunSender::new(&MailgunConfig {
            api_key: "key-123".into(),
            domain: "mg.example.com".into(),
            api_base: server.uri(),
        })
        .expect("client builds")
    }

    #[test]
    fn templates_embed_link_and_subject() {
        let html = EmailKind::Verification.render_html("https://app.test/verify/abc.def");
        assert!(html.contains(r#"href="https://app.test/verify/abc.def""#));
        assert!(html.contains("Verify Your Email"));
        assert_eq!(EmailKind::Verification.subject(), "Email Verification");

        let html = EmailKind::PasswordReset.render_html("https://app.test/reset_password/x");
        assert!(html.contains(r#"href="https://app.test/reset_password/x""#));
        assert_eq!(EmailKind::PasswordReset.subject(), "Password Reset Request");
    }

    #[tokio::test]
    async fn mailgun_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mg.example.com/messages"))
            .and(basic_auth("api", "key-123"))
            .and(body_string_contains("to=alice%40example.com"))
            .and(body_string_contains("subject=Email+Verification"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new(Arc::new(mailgun_for(&server)), "no-reply@mg.example.com");
        let outcome = dispatcher
            .send(EmailKind::Verification, "alice@example.com", "https://app.test/verify/t")
            .await;
        assert_eq!(outcome, Delivery::Sent);
    }

    #[tokio::test]
    async fn mailgun_non_200_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new(Arc::new(mailgun_for(&server)), "no-reply@mg.example.com");
        let outcome = dispatcher
            .send(EmailKind::PasswordReset, "alice@example.com", "https://app.test/reset_password/t")
            .await;
        assert_eq!(outcome, Delivery::Failed);
    }

    #[tokio::test]
    async fn mailgun_accepted_but_not_200_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let err = mailgun_for(&server)
            .send(&EmailMessage {
                from: "a@b.c".into(),
                to: "d@e.f".into(),
                subject: "s".into(),
                html: "<p>h</p>".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("202"));
    }

    #[tokio::test]
    async fn dispatcher_reports_sender_errors_as_failed() {
        let sender = Arc::new(testing::RecordingSender::failing());
        let dispatcher = Dispatcher::new(sender.clone(), "no-reply@localhost");
        let outcome = dispatcher
            .send(EmailKind::Verification, "bob@example.com", "http://x/verify/t")
            .await;
        assert_eq!(outcome, Delivery::Failed);
        assert_eq!(sender.messages().len(), 1);
        assert_eq!(sender.messages()[0].from, "no-reply@localhost");
    }
}
