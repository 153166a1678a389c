use axum::{
    extract::{Path, State},
    http::header::SET_COOKIE,
    response::Response,
    routing::{get, post},
    Form, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        forms::{
            normalize_email, EmailForm, FieldErrors, LoginForm, RegistrationForm,
            ResetPasswordForm,
        },
        password,
        repo_types::{NewUser, StoreError},
        session::MaybeUser,
        tokens::TokenPurpose,
    },
    email::{Delivery, EmailKind},
    error::AppError,
    state::AppState,
    web::{
        flash::{Category, Flashes},
        views::{self, Layout, VerifyStatus},
    },
};

const RESET_LINK_INVALID: &str = "The password reset link is invalid or has expired.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/verify/:token", get(verify_email))
        .route("/resend_verification", post(resend_verification))
        .route("/forgot_password", get(forgot_password_form).post(forgot_password))
        .route("/reset_password/:token", get(reset_password_form).post(reset_password))
}

async fn send_link(
    state: &AppState,
    kind: EmailKind,
    email: &str,
) -> Result<Delivery, AppError> {
    let (purpose, route) = match kind {
        EmailKind::Verification => (TokenPurpose::Verification, "verify"),
        EmailKind::PasswordReset => (TokenPurpose::PasswordReset, "reset_password"),
    };
    let token = state.tokens.issue(email, purpose)?;
    let link = format!("{}/{}/{}", state.config.base_url, route, token);
    Ok(state.mailer.send(kind, email, &link).await)
}

#[instrument(skip_all)]
pub async fn index(MaybeUser(user): MaybeUser, flashes: Flashes) -> Response {
    let html = views::index(&Layout {
        user: user.as_ref(),
        flashes: flashes.messages(),
    });
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn register_form(MaybeUser(user): MaybeUser, flashes: Flashes) -> Response {
    let html = views::register(
        &Layout {
            user: user.as_ref(),
            flashes: flashes.messages(),
        },
        &RegistrationForm::default(),
        &FieldErrors::default(),
    );
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    mut flashes: Flashes,
    Form(mut form): Form<RegistrationForm>,
) -> Result<Response, AppError> {
    let mut errors = form.clean();

    if errors.is_empty() {
        if state.store.find_by_email(&form.email).await?.is_some() {
            errors.add("email", "Email already registered.");
        }
        if state.store.find_by_username(&form.username).await?.is_some() {
            errors.add("username", "Username already taken.");
        }
    }

    if errors.is_empty() {
        let hash = password::hash(&form.password).await?;
        let created = state
            .store
            .create(NewUser {
                username: &form.username,
                email: &form.email,
                password_hash: &hash,
            })
            .await;

        match created {
            Ok(new_user) => {
                info!(user_id = new_user.id, email = %new_user.email, "user registered");
                // the account stays even when the email cannot be delivered
                match send_link(&state, EmailKind::Verification, &new_user.email).await? {
                    Delivery::Sent => flashes.push(
                        Category::Success,
                        "Your account has been created! Please check your email to verify your account.",
                    ),
                    Delivery::Failed => flashes.push(
                        Category::Danger,
                        "There was an issue sending the verification email.",
                    ),
                }
                return Ok(flashes.redirect("/"));
            }
            // lost a race with a concurrent registration
            Err(StoreError::Duplicate("username")) => {
                errors.add("username", "Username already taken.")
            }
            Err(StoreError::Duplicate(_)) => errors.add("email", "Email already registered."),
            Err(e) => return Err(e.into()),
        }
    }

    warn!(email = %form.email, "registration rejected");
    let html = views::register(
        &Layout {
            user: user.as_ref(),
            flashes: flashes.messages(),
        },
        &form,
        &errors,
    );
    Ok(flashes.render(html))
}

#[instrument(skip_all)]
pub async fn login_form(MaybeUser(user): MaybeUser, flashes: Flashes) -> Response {
    if user.is_some() {
        return flashes.redirect("/");
    }
    let html = views::login(
        &Layout {
            user: None,
            flashes: flashes.messages(),
        },
        &LoginForm::default(),
        &FieldErrors::default(),
    );
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    mut flashes: Flashes,
    Form(mut form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if current.is_some() {
        return Ok(flashes.redirect("/"));
    }

    let errors = form.clean();
    if errors.is_empty() {
        let user = state.store.find_by_email(&form.email).await?;
        // unknown emails are checked against a dummy hash so both paths cost the same
        let stored = user.as_ref().map(|u| u.password_hash.as_str());
        let matched = password::verify(&form.password, stored).await?;

        match user {
            Some(user) if matched && user.is_verified => {
                let token = state.sessions.sign(user.id)?;
                let cookie = state.sessions.cookie(&token)?;
                info!(user_id = user.id, email = %user.email, "user logged in");
                flashes.push(Category::Success, "Login successful!");
                let mut res = flashes.redirect("/dashboard");
                res.headers_mut().append(SET_COOKIE, cookie);
                return Ok(res);
            }
            Some(user) if matched => {
                info!(user_id = user.id, "login blocked until email is verified; resending");
                send_link(&state, EmailKind::Verification, &user.email).await?;
                flashes.push(Category::Success, "Check your Email for Verification");
            }
            _ => {
                warn!(email = %form.email, "login failed");
                flashes.push(
                    Category::Danger,
                    "Login failed. Check your email and/or password.",
                );
            }
        }
    }

    let html = views::login(
        &Layout {
            user: None,
            flashes: flashes.messages(),
        },
        &form,
        &errors,
    );
    Ok(flashes.render(html))
}

#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, flashes: Flashes) -> Response {
    let mut res = flashes.redirect("/");
    res.headers_mut()
        .append(SET_COOKIE, state.sessions.clear_cookie());
    res
}

#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    flashes: Flashes,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let max_age = state.config.token_max_age_secs;
    let status = match state.tokens.redeem(&token, TokenPurpose::Verification, max_age) {
        None => VerifyStatus::Expired,
        Some(email) => match state.store.find_by_email(&email).await? {
            None => VerifyStatus::UserNotFound,
            Some(user) if user.is_verified => VerifyStatus::AlreadyVerified,
            Some(user) => {
                if state.store.mark_verified(user.id).await? {
                    info!(user_id = user.id, email = %user.email, "email verified");
                    VerifyStatus::Verified
                } else {
                    VerifyStatus::AlreadyVerified
                }
            }
        },
    };

    let html = views::verify_result(
        &Layout {
            user: current.as_ref(),
            flashes: flashes.messages(),
        },
        status,
    );
    Ok(flashes.render(html))
}

#[instrument(skip_all)]
pub async fn resend_verification(
    State(state): State<AppState>,
    mut flashes: Flashes,
    Form(mut form): Form<EmailForm>,
) -> Result<Response, AppError> {
    form.email = normalize_email(&form.email);

    match state.store.find_by_email(&form.email).await? {
        Some(user) if !user.is_verified => {
            send_link(&state, EmailKind::Verification, &user.email).await?;
            flashes.push(
                Category::Success,
                "A new verification email has been sent. Please check your inbox.",
            );
        }
        _ => flashes.push(Category::Info, "User not found or already verified."),
    }

    Ok(flashes.redirect("/"))
}

#[instrument(skip_all)]
pub async fn forgot_password_form(MaybeUser(user): MaybeUser, flashes: Flashes) -> Response {
    let html = views::forgot_password(
        &Layout {
            user: user.as_ref(),
            flashes: flashes.messages(),
        },
        &EmailForm::default(),
        &FieldErrors::default(),
    );
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    mut flashes: Flashes,
    Form(mut form): Form<EmailForm>,
) -> Result<Response, AppError> {
    let errors = form.clean();
    if !errors.is_empty() {
        let html = views::forgot_password(
            &Layout {
                user: user.as_ref(),
                flashes: flashes.messages(),
            },
            &form,
            &errors,
        );
        return Ok(flashes.render(html));
    }

    // same response whether or not the address is registered
    match state.store.find_by_email(&form.email).await? {
        Some(account) => {
            info!(user_id = account.id, "password reset requested");
            send_link(&state, EmailKind::PasswordReset, &account.email).await?;
        }
        None => info!("password reset requested for unknown email"),
    }
    flashes.push(
        Category::Info,
        "If an account with that email exists, a password reset link has been sent.",
    );
    Ok(flashes.redirect("/"))
}

#[instrument(skip_all)]
pub async fn reset_password_form(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    mut flashes: Flashes,
    Path(token): Path<String>,
) -> Response {
    let max_age = state.config.token_max_age_secs;
    if state
        .tokens
        .redeem(&token, TokenPurpose::PasswordReset, max_age)
        .is_none()
    {
        flashes.push(Category::Warning, RESET_LINK_INVALID);
        return flashes.redirect("/forgot_password");
    }

    let html = views::reset_password(
        &Layout {
            user: user.as_ref(),
            flashes: flashes.messages(),
        },
        &token,
        &FieldErrors::default(),
    );
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    mut flashes: Flashes,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response, AppError> {
    let max_age = state.config.token_max_age_secs;
    let Some(email) = state
        .tokens
        .redeem(&token, TokenPurpose::PasswordReset, max_age)
    else {
        flashes.push(Category::Warning, RESET_LINK_INVALID);
        return Ok(flashes.redirect("/forgot_password"));
    };

    let errors = form.validate();
    if !errors.is_empty() {
        let html = views::reset_password(
            &Layout {
                user: current.as_ref(),
                flashes: flashes.messages(),
            },
            &token,
            &errors,
        );
        return Ok(flashes.render(html));
    }

    let Some(user) = state.store.find_by_email(&email).await? else {
        warn!("reset token for an email with no account");
        flashes.push(Category::Warning, RESET_LINK_INVALID);
        return Ok(flashes.redirect("/forgot_password"));
    };

    let hash = password::hash(&form.password).await?;
    state.store.update_password(user.id, &hash).await?;
    info!(user_id = user.id, "password reset");

    flashes.push(
        Category::Success,
        "Your password has been updated. You can now log in.",
    );
    Ok(flashes.redirect("/login"))
}
