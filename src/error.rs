use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{
    auth::repo_types::StoreError,
    web::views::{self, Layout},
};

/// Failures a handler cannot recover from. Expected outcomes (bad input,
/// wrong password, expired links, email delivery) are flashed instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        let html = views::server_error(&Layout {
            user: None,
            flashes: &[],
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
    }
}
