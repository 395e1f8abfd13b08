use async_trait::async_trait;
use base64::Engine;
use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    config::Config,
    error::{AppError, Result},
    http::{FetchRequest, HttpClient},
    types::{OAuthToken, TokenRequest, TokenResponse},
};

pub const SCOPES: &[&str] = &["identify"];

/// Tokens expiring within this margin are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Receives tokens the client refreshed on its own, so they can be persisted.
#[async_trait]
pub trait TokenUpdater: Send + Sync {
    async fn update_token(&self, token: &OAuthToken) -> Result<()>;
}

pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

// 32 random bytes, URL-safe
pub fn generate_state() -> String {
    let random_bytes: Vec<u8> = (0..32).map(|_| rand::thread_rng().gen()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Discord OAuth2 client bound to this application's credentials.
#[derive(Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_url: String,
    token_url: String,
    http: Arc<dyn HttpClient>,
}

impl OAuthClient {
    pub fn new(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        let base = config.discord_api_url.trim_end_matches('/');
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorize_url: format!("{}/oauth2/authorize", base),
            token_url: format!("{}/oauth2/token", base),
            http,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Builds the provider redirect. Makes no network call.
    pub fn authorization_url(&self) -> Result<AuthorizationRequest> {
        let state = generate_state();
        let scope = SCOPES.join(" ");
        let auth_params = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state.as_str()),
        ];
        let query = serde_urlencoded::to_string(auth_params)
            .map_err(|e| AppError::InternalError(e.into()))?;

        Ok(AuthorizationRequest {
            url: format!("{}?{}", self.authorize_url, query),
            state,
        })
    }

    pub async fn exchange_code(&self, code: String) -> Result<OAuthToken> {
        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            code: Some(code),
            redirect_uri: Some(self.redirect_uri.clone()),
            refresh_token: None,
        };

        let response = self
            .request_token(request)
            .await
            .map_err(AppError::TokenExchangeError)?;
        let token = OAuthToken::from_response(response, None).ok_or_else(|| {
            AppError::TokenExchangeError("Token lifetime out of range".into())
        })?;
        info!("Exchanged authorization code for a token");
        Ok(token)
    }

    pub async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::TokenRefreshError("No refresh token available".into()))?;

        let request = TokenRequest {
            grant_type: "refresh_token".to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            code: None,
            redirect_uri: None,
            refresh_token: Some(refresh_token.clone()),
        };

        let response = self
            .request_token(request)
            .await
            .map_err(AppError::TokenRefreshError)?;
        let token = OAuthToken::from_response(response, Some(refresh_token)).ok_or_else(|| {
            AppError::TokenRefreshError("Token lifetime out of range".into())
        })?;
        info!("Refreshed access token");
        Ok(token)
    }

    /// Returns a usable token, refreshing it first when it is about to expire
    /// and handing the refreshed token to `updater`.
    pub async fn ensure_fresh(
        &self,
        token: OAuthToken,
        updater: &dyn TokenUpdater,
    ) -> Result<OAuthToken> {
        if !token.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(token);
        }

        debug!("Token expires at {}, refreshing", token.expires_at);
        let refreshed = self.refresh(&token).await?;
        updater.update_token(&refreshed).await?;
        Ok(refreshed)
    }

    async fn request_token(
        &self,
        request: TokenRequest,
    ) -> std::result::Result<TokenResponse, String> {
        debug!(
            "Requesting {} token at: {}",
            request.grant_type, self.token_url
        );

        let fetch = FetchRequest::post(&self.token_url)
            .form(&request)
            .map_err(|e| e.to_string())?;
        let response = self.http.fetch(fetch).await.map_err(|e| e.to_string())?;

        if !response.is_success() {
            let error_text = response.text();
            error!("Token request failed ({}): {}", response.status, error_text);
            return Err(format!("{}: {}", response.status, error_text));
        }

        response
            .json::<TokenResponse>()
            .map_err(|e| format!("Failed to parse token response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::http::testing::FakeHttp;
    use axum::http::Method;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OAuthToken>>);

    #[async_trait]
    impl TokenUpdater for Recorder {
        async fn update_token(&self, token: &OAuthToken) -> Result<()> {
            self.0.lock().unwrap().push(token.clone());
            Ok(())
        }
    }

    fn token(expires_in: i64) -> OAuthToken {
        OAuthToken {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_type: "Bearer".into(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scope: Some("identify".into()),
        }
    }

    fn client(http: Arc<FakeHttp>) -> OAuthClient {
        OAuthClient::new(&test_config(), http)
    }

    #[test]
    fn authorization_url_carries_fresh_state() {
        let client = client(Arc::new(FakeHttp::default()));
        let first = client.authorization_url().unwrap();
        let second = client.authorization_url().unwrap();

        assert_ne!(first.state, second.state);
        assert!(first
            .url
            .starts_with("https://discord.test/api/oauth2/authorize?"));
        assert!(first.url.contains("response_type=code"));
        assert!(first.url.contains("client_id=1234"));
        assert!(first.url.contains("scope=identify"));
        assert!(first.url.contains(&format!("state={}", first.state)));
    }

    #[tokio::test]
    async fn exchange_posts_credentials_as_form() {
        let http = Arc::new(FakeHttp::default());
        let client = client(http.clone());
        http.respond(
            Method::POST,
            client.token_url(),
            200,
            json!({
                "access_token": "a1",
                "token_type": "Bearer",
                "expires_in": 604800,
                "refresh_token": "r1",
                "scope": "identify"
            }),
        );

        let token = client.exchange_code("abc".into()).await.unwrap();
        assert_eq!(token.access_token, "a1");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));

        let sent = http.requests();
        let body = String::from_utf8(sent[0].body.clone().unwrap().to_vec()).unwrap();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=abc"));
        assert!(body.contains("client_secret=shh"));
    }

    #[tokio::test]
    async fn exchange_failure_is_reported() {
        let http = Arc::new(FakeHttp::default());
        let client = client(http.clone());
        http.respond(
            Method::POST,
            client.token_url(),
            400,
            json!({ "error": "invalid_grant" }),
        );

        let err = client.exchange_code("stale".into()).await.unwrap_err();
        assert!(matches!(err, AppError::TokenExchangeError(_)));
    }

    #[tokio::test]
    async fn unrepresentable_lifetime_fails_exchange_and_refresh() {
        let http = Arc::new(FakeHttp::default());
        let client = client(http.clone());
        let huge = json!({
            "access_token": "a1",
            "token_type": "Bearer",
            "expires_in": u64::MAX,
            "refresh_token": "r1"
        });
        http.respond(Method::POST, client.token_url(), 200, huge.clone());
        http.respond(Method::POST, client.token_url(), 200, huge);

        let err = client.exchange_code("abc".into()).await.unwrap_err();
        assert!(matches!(err, AppError::TokenExchangeError(_)));

        let recorder = Recorder::default();
        let err = client.ensure_fresh(token(10), &recorder).await.unwrap_err();
        assert!(matches!(err, AppError::TokenRefreshError(_)));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_token_is_not_refreshed() {
        let http = Arc::new(FakeHttp::default());
        let recorder = Recorder::default();

        let result = client(http.clone())
            .ensure_fresh(token(3600), &recorder)
            .await
            .unwrap();

        assert_eq!(result.access_token, "access");
        assert!(http.requests().is_empty());
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_handed_to_updater() {
        let http = Arc::new(FakeHttp::default());
        let client = client(http.clone());
        http.respond(
            Method::POST,
            client.token_url(),
            200,
            json!({ "access_token": "a2", "token_type": "Bearer", "expires_in": 604800 }),
        );
        let recorder = Recorder::default();

        let result = client.ensure_fresh(token(10), &recorder).await.unwrap();

        assert_eq!(result.access_token, "a2");
        assert_eq!(result.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[result]);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let mut expired = token(-10);
        expired.refresh_token = None;
        let err = client(Arc::new(FakeHttp::default()))
            .ensure_fresh(expired, &Recorder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenRefreshError(_)));
    }
}
