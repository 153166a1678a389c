use axum::{
    extract::State,
    response::Response,
    routing::get,
    Form, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        forms::{FieldErrors, ProfileForm},
        password,
        session::CurrentUser,
    },
    error::AppError,
    state::AppState,
    web::{
        flash::{Category, Flashes},
        views::{self, Layout},
    },
};

// --- routers ---

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/profile", get(profile_form).post(update_profile))
}

// --- handlers ---

#[instrument(skip_all)]
pub async fn dashboard(CurrentUser(user): CurrentUser, flashes: Flashes) -> Response {
    let html = views::dashboard(
        &Layout {
            user: Some(&user),
            flashes: flashes.messages(),
        },
        &user,
    );
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn profile_form(CurrentUser(user): CurrentUser, flashes: Flashes) -> Response {
    let html = views::profile(
        &Layout {
            user: Some(&user),
            flashes: flashes.messages(),
        },
        &user,
        &FieldErrors::default(),
    );
    flashes.render(html)
}

#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut flashes: Flashes,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let errors = form.validate();

    if errors.is_empty() {
        if !password::verify(&form.current_password, Some(&user.password_hash)).await? {
            warn!(user_id = user.id, "profile update with wrong current password");
            flashes.push(Category::Danger, "Current password is incorrect.");
        } else if form.new_password != form.confirm_new_password {
            flashes.push(Category::Danger, "New passwords do not match.");
        } else {
            let hash = password::hash(&form.new_password).await?;
            state.store.update_password(user.id, &hash).await?;
            info!(user_id = user.id, "password changed");
            flashes.push(Category::Success, "Your password has been updated successfully!");
        }
    }

    let html = views::profile(
        &Layout {
            user: Some(&user),
            flashes: flashes.messages(),
        },
        &user,
        &errors,
    );
    Ok(flashes.render(html))
}
