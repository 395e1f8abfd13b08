use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, Result},
    session::SessionContext,
    types::OAuthCallback,
    AppState,
};

/// A plain 302, which is what browsers and the OAuth provider expect here.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

// Initiate OAuth login flow
pub async fn login(State(state): State<AppState>, session: SessionContext) -> Result<Response> {
    let request = state.oauth.authorization_url()?;
    session.issue_state(&request.state).await?;

    info!("Redirecting to Discord for authorization");
    debug!("Authorization URL: {}", request.url);
    Ok(found(&request.url))
}

// Handle OAuth callback
pub async fn callback(
    State(state): State<AppState>,
    session: SessionContext,
    Query(params): Query<OAuthCallback>,
) -> Result<Response> {
    // The stored state is single use, whatever the outcome.
    let stored_state = session.take_state().await?;

    if let Some(error) = params.error {
        warn!(
            "OAuth error: {} - {}",
            error,
            params.error_description.as_deref().unwrap_or_default()
        );
        return Err(AppError::ProviderError(error));
    }

    match (stored_state.as_deref(), params.state.as_deref()) {
        (Some(expected), Some(received)) if expected == received => {}
        (None, _) => {
            warn!("OAuth callback without a pending login");
            return Err(AppError::InvalidState);
        }
        _ => {
            warn!("OAuth state mismatch");
            return Err(AppError::InvalidState);
        }
    }

    let code = params.code.ok_or(AppError::MissingCode)?;
    let token = state.oauth.exchange_code(code).await?;
    session.set_token(&token).await?;

    info!("User signed in");
    Ok(found("/"))
}

pub async fn logout(session: SessionContext) -> Result<Response> {
    session.flush().await?;
    info!("User signed out");
    Ok(found("/"))
}
