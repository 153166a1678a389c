//! Server-rendered pages. Every interpolated value goes through `escape_html`.

use std::fmt::Write;

use crate::auth::{
    forms::{EmailForm, FieldErrors, LoginForm, RegistrationForm},
    repo_types::User,
};

use super::flash::FlashMessage;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// What every page needs besides its own body.
pub struct Layout<'a> {
    pub user: Option<&'a User>,
    pub flashes: &'a [FlashMessage],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Verified,
    AlreadyVerified,
    Expired,
    UserNotFound,
}

impl VerifyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyStatus::Verified => "verified",
            VerifyStatus::AlreadyVerified => "already_verified",
            VerifyStatus::Expired => "expired",
            VerifyStatus::UserNotFound => "user_not_found",
        }
    }
}

fn page(layout: &Layout<'_>, title: &str, body: &str) -> String {
    let nav = match layout.user {
        Some(user) => format!(
            r#"<span>Signed in as {}</span> <a href="/dashboard">Dashboard</a> <a href="/profile">Profile</a> <a href="/logout">Logout</a>"#,
            escape_html(&user.username)
        ),
        None => r#"<a href="/login">Login</a> <a href="/register">Register</a>"#.to_string(),
    };

    let mut flashes = String::new();
    for f in layout.flashes {
        let _ = write!(
            flashes,
            r#"<div class="flash flash-{}">{}</div>"#,
            f.category.as_str(),
            escape_html(&f.message)
        );
    }

    format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<nav><a href="/">Home</a> {nav}</nav>
{flashes}
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#,
        title = escape_html(title),
    )
}

fn field_errors(errors: &FieldErrors, field: &str) -> String {
    errors
        .for_field(field)
        .map(|m| format!(r#"<span class="error">{}</span>"#, escape_html(m)))
        .collect()
}

fn input(label: &str, name: &str, kind: &str, value: &str, errors: &FieldErrors) -> String {
    format!(
        r#"<p><label for="{name}">{label}</label> <input id="{name}" name="{name}" type="{kind}" value="{value}"> {errs}</p>"#,
        label = escape_html(label),
        value = escape_html(value),
        errs = field_errors(errors, name),
    )
}

fn readonly(label: &str, name: &str, value: &str) -> String {
    format!(
        r#"<p><label for="{name}">{label}</label> <input id="{name}" name="{name}" type="text" value="{value}" readonly></p>"#,
        label = escape_html(label),
        value = escape_html(value),
    )
}

pub fn index(layout: &Layout<'_>) -> String {
    let body = if layout.user.is_some() {
        r#"<p>Welcome back. Head to your <a href="/dashboard">dashboard</a>.</p>"#.to_string()
    } else {
        r#"<p>Create an account or log in to continue.</p>
<h2>Didn't get the verification email?</h2>
<form method="post" action="/resend_verification">
<p><label for="email">Email</label> <input id="email" name="email" type="email"></p>
<button type="submit">Resend Verification Email</button>
</form>"#
            .to_string()
    };
    page(layout, "Home", &body)
}

pub fn register(layout: &Layout<'_>, form: &RegistrationForm, errors: &FieldErrors) -> String {
    let body = format!(
        r#"<form method="post" action="/register">
{username}
{email}
{password}
{confirm}
<button type="submit">Register</button>
</form>"#,
        username = input("Username", "username", "text", &form.username, errors),
        email = input("Email", "email", "email", &form.email, errors),
        password = input("Password", "password", "password", "", errors),
        confirm = input("Confirm Password", "confirm_password", "password", "", errors),
    );
    page(layout, "Register", &body)
}

pub fn login(layout: &Layout<'_>, form: &LoginForm, errors: &FieldErrors) -> String {
    let body = format!(
        r#"<form method="post" action="/login">
{email}
{password}
<button type="submit">Login</button>
</form>
<p><a href="/forgot_password">Forgot your password?</a></p>"#,
        email = input("Email", "email", "email", &form.email, errors),
        password = input("Password", "password", "password", "", errors),
    );
    page(layout, "Login", &body)
}

pub fn dashboard(layout: &Layout<'_>, user: &User) -> String {
    let body = format!(
        r#"<p>Hello, {}! Your account is verified.</p>
<p><a href="/profile">Change your password</a></p>"#,
        escape_html(&user.username)
    );
    page(layout, "Dashboard", &body)
}

pub fn profile(layout: &Layout<'_>, user: &User, errors: &FieldErrors) -> String {
    let body = format!(
        r#"<form method="post" action="/profile">
{username}
{email}
{current}
{new}
{confirm}
<button type="submit">Update Profile</button>
</form>"#,
        username = readonly("Username", "username", &user.username),
        email = readonly("Email", "email", &user.email),
        current = input("Current Password", "current_password", "password", "", errors),
        new = input("New Password", "new_password", "password", "", errors),
        confirm = input("Confirm New Password", "confirm_new_password", "password", "", errors),
    );
    page(layout, "Profile", &body)
}

pub fn forgot_password(layout: &Layout<'_>, form: &EmailForm, errors: &FieldErrors) -> String {
    let body = format!(
        r#"<form method="post" action="/forgot_password">
{email}
<button type="submit">Send Reset Link</button>
</form>"#,
        email = input("Email", "email", "email", &form.email, errors),
    );
    page(layout, "Forgot Password", &body)
}

pub fn reset_password(layout: &Layout<'_>, token: &str, errors: &FieldErrors) -> String {
    let body = format!(
        r#"<form method="post" action="/reset_password/{token}">
{password}
{confirm}
<button type="submit">Reset Password</button>
</form>"#,
        token = escape_html(token),
        password = input("New Password", "password", "password", "", errors),
        confirm = input("Confirm Password", "confirm_password", "password", "", errors),
    );
    page(layout, "Reset Password", &body)
}

pub fn verify_result(layout: &Layout<'_>, status: VerifyStatus) -> String {
    let message = match status {
        VerifyStatus::Verified => {
            r#"Your email has been verified. You can now <a href="/login">log in</a>."#
        }
        VerifyStatus::AlreadyVerified => {
            r#"Your email is already verified. Please <a href="/login">log in</a>."#
        }
        VerifyStatus::Expired => {
            "The verification link is invalid or has expired. Request a new one from the home page."
        }
        VerifyStatus::UserNotFound => "User not found.",
    };
    let body = format!(
        r#"<p class="verify-{}">{}</p>"#,
        status.as_str(),
        message
    );
    page(layout, "Email Verification", &body)
}

pub fn server_error(layout: &Layout<'_>) -> String {
    page(
        layout,
        "Something went wrong",
        "<p>An unexpected error occurred. Please try again later.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::flash::Category;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x")&'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;)&amp;&#x27;&lt;/script&gt;"
        );
    }

    #[test]
    fn page_shows_escaped_flashes_and_inline_errors() {
        let flashes = [FlashMessage {
            category: Category::Danger,
            message: "<b>bad</b>".into(),
        }];
        let layout = Layout {
            user: None,
            flashes: &flashes,
        };
        let mut errors = FieldErrors::default();
        errors.add("email", "Invalid email address.");
        let html = login(
            &layout,
            &LoginForm {
                email: "x\"y".into(),
                password: "secret".into(),
            },
            &errors,
        );
        assert!(html.contains(r#"class="flash flash-danger">&lt;b&gt;bad&lt;/b&gt;"#));
        assert!(html.contains("Invalid email address."));
        assert!(html.contains(r#"value="x&quot;y""#));
        assert!(!html.contains("secret"));
    }
}
