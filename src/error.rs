use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::pages;

pub const NOT_SIGNED_IN: &str = "You're not signed in.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("You're not signed in.")]
    Unauthenticated,

    #[error("Discord returned an error: {0}")]
    ProviderError(String),

    #[error("Invalid OAuth state")]
    InvalidState,

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeError(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Session error: {0}")]
    SessionError(#[from] tower_sessions::session::Error),

    #[error("Session unavailable")]
    SessionUnavailable,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, title, detail) = match &self {
            AppError::Unauthenticated => {
                return (StatusCode::FORBIDDEN, NOT_SIGNED_IN).into_response();
            }
            AppError::ProviderError(reason) => {
                warn!("Discord rejected the login: {}", reason);
                (
                    StatusCode::BAD_REQUEST,
                    "Sign-in was cancelled",
                    format!("Discord reported: {}", reason),
                )
            }
            AppError::InvalidState | AppError::MissingCode => {
                warn!("Rejected OAuth callback: {}", self);
                (
                    StatusCode::BAD_REQUEST,
                    "Sign-in failed",
                    "The sign-in link was invalid or has already been used. Please try again."
                        .to_string(),
                )
            }
            AppError::TokenExchangeError(_) | AppError::TokenRefreshError(_) => {
                error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Authentication failed",
                    "Could not complete sign-in with Discord.".to_string(),
                )
            }
            AppError::UpstreamError(_) => {
                error!("{}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    "Service unavailable",
                    "A service we depend on did not respond correctly.".to_string(),
                )
            }
            AppError::SessionError(_)
            | AppError::SessionUnavailable
            | AppError::InternalError(_) => {
                error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "Something went wrong on our side.".to_string(),
                )
            }
        };

        (status, pages::error_page(title, &detail)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
