use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::SET_COOKIE, request::Parts, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cookie_value;

pub const FLASH_COOKIE: &str = "verimail_flash";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Success,
    Danger,
    Info,
    Warning,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Success => "success",
            Category::Danger => "danger",
            Category::Info => "info",
            Category::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashMessage {
    pub category: Category,
    pub message: String,
}

/// One-shot notices. Extracted from the request cookie; either shown on the
/// page rendered by this request or carried forward across a redirect.
#[derive(Debug, Default)]
pub struct Flashes {
    messages: Vec<FlashMessage>,
    from_cookie: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for Flashes
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = cookie_value(&parts.headers, FLASH_COOKIE) else {
            return Ok(Flashes::default());
        };
        Ok(Flashes {
            messages: decode(&raw).unwrap_or_default(),
            from_cookie: true,
        })
    }
}

impl Flashes {
    pub fn push(&mut self, category: Category, message: impl Into<String>) {
        self.messages.push(FlashMessage {
            category,
            message: message.into(),
        });
    }

    pub fn messages(&self) -> &[FlashMessage] {
        &self.messages
    }

    /// Redirect, keeping every pending message for the next page.
    pub fn redirect(self, to: &str) -> Response {
        let mut res = Redirect::to(to).into_response();
        if self.messages.is_empty() {
            if self.from_cookie {
                res.headers_mut().append(SET_COOKIE, clear_cookie());
            }
            return res;
        }
        match encode(&self.messages) {
            Some(value) => {
                res.headers_mut().append(SET_COOKIE, value);
            }
            None => debug!("flash messages dropped; cookie could not be built"),
        }
        res
    }

    /// Responds with a rendered page; the page has already shown the messages.
    pub fn render(self, html: String) -> Response {
        self.render_with_status(StatusCode::OK, html)
    }

    pub fn render_with_status(self, status: StatusCode, html: String) -> Response {
        let mut res = (status, Html(html)).into_response();
        if self.from_cookie {
            res.headers_mut().append(SET_COOKIE, clear_cookie());
        }
        res
    }
}

fn encode(messages: &[FlashMessage]) -> Option<HeaderValue> {
    let json = serde_json::to_vec(messages).ok()?;
    let value = Base64UrlUnpadded::encode_string(&json);
    HeaderValue::from_str(&format!(
        "{FLASH_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

fn decode(raw: &str) -> Option<Vec<FlashMessage>> {
    let bytes = Base64UrlUnpadded::decode_vec(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("verimail_flash=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::LOCATION, Request};

    async fn extract(cookie: Option<&str>) -> Flashes {
        let mut builder = Request::builder().uri("/");
        if let Some(c) = cookie {
            builder = builder.header("cookie", c);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Flashes::from_request_parts(&mut parts, &()).await.unwrap()
    }

    fn set_cookie(res: &Response) -> String {
        res.headers()
            .get(SET_COOKIE)
            .expect("set-cookie present")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn redirect_carries_messages_to_next_request() {
        let mut flashes = extract(None).await;
        flashes.push(Category::Success, "Login successful!");
        let res = flashes.redirect("/dashboard");
        assert_eq!(res.headers().get(LOCATION).unwrap(), "/dashboard");

        let cookie = set_cookie(&res);
        let pair = cookie.split(';').next().unwrap();
        let next = extract(Some(pair)).await;
        assert_eq!(
            next.messages(),
            &[FlashMessage {
                category: Category::Success,
                message: "Login successful!".into(),
            }]
        );
    }

    #[tokio::test]
    async fn render_clears_consumed_cookie() {
        let mut flashes = extract(None).await;
        flashes.push(Category::Info, "hello");
        let cookie = set_cookie(&flashes.redirect("/"));
        let next = extract(Some(cookie.split(';').next().unwrap())).await;

        let res = next.render("<p>page</p>".into());
        assert!(set_cookie(&res).contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn garbage_cookie_is_ignored() {
        let flashes = extract(Some("verimail_flash=%%%not-base64")).await;
        assert!(flashes.messages().is_empty());
    }
}
