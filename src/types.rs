use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const CDN_URL: &str = "https://cdn.discordapp.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Builds a token from a token endpoint response. A refresh response that
    /// omits the refresh token keeps the previous one.
    ///
    /// Returns `None` when `expires_in` does not fit a timestamp.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
    ) -> Option<Self> {
        let lifetime = i64::try_from(response.expires_in)
            .ok()
            .and_then(Duration::try_seconds)?;
        let expires_at = Utc::now().checked_add_signed(lifetime)?;

        Some(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            token_type: response.token_type,
            expires_at,
            scope: response.scope,
        })
    }

    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - Utc::now() < margin
    }
}

#[derive(Debug, Serialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A user object as returned by Discord's `/users/@me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    pub avatar: Option<String>,
    pub global_name: Option<String>,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub premium_type: u8,
    #[serde(default)]
    pub public_flags: u64,
}

impl DiscordUser {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("{}/avatars/{}/{}.png", CDN_URL, self.id, hash),
            None => format!(
                "{}/embed/avatars/{}.png",
                CDN_URL,
                self.default_avatar_index()
            ),
        }
    }

    // Legacy accounts pick by discriminator, migrated accounts by snowflake.
    fn default_avatar_index(&self) -> u64 {
        match self.discriminator.parse::<u64>() {
            Ok(discriminator) if discriminator != 0 => discriminator % 5,
            _ => self.id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0),
        }
    }
}

/// Notes and reminders are opaque to this application.
pub type Note = serde_json::Value;
pub type Reminder = serde_json::Value;
