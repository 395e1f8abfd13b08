use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    config::Config,
    error::{AppError, Result},
    http::{FetchRequest, HttpClient},
    types::DiscordUser,
};

/// Discord's REST API, as seen by a signed-in user.
#[derive(Clone)]
pub struct DiscordApi {
    base_url: String,
    http: Arc<dyn HttpClient>,
}

impl DiscordApi {
    pub fn new(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: config.discord_api_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn current_user_url(&self) -> String {
        format!("{}/users/@me", self.base_url)
    }

    pub async fn current_user(&self, access_token: &str) -> Result<DiscordUser> {
        let request = FetchRequest::get(self.current_user_url()).bearer(access_token);
        let response = self
            .http
            .fetch(request)
            .await
            .map_err(|e| AppError::UpstreamError(e.to_string()))?;

        if response.status == StatusCode::UNAUTHORIZED {
            warn!("Discord rejected the access token");
            return Err(AppError::Unauthenticated);
        }
        if !response.is_success() {
            return Err(AppError::UpstreamError(format!(
                "Discord /users/@me returned {}: {}",
                response.status,
                response.text()
            )));
        }

        let user: DiscordUser = response
            .json()
            .map_err(|e| AppError::UpstreamError(format!("Invalid Discord user: {}", e)))?;
        debug!("Resolved Discord user {}", user.id);
        Ok(user)
    }
}
