use anyhow::Result;
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use time::Duration;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::Key, cookie::SameSite, Expiry, SessionManagerLayer, SessionStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod crajy;
mod discord;
mod error;
mod http;
mod notes;
mod oauth;
mod pages;
mod session;
mod types;

use crate::{
    config::Config,
    crajy::CrajyApi,
    discord::DiscordApi,
    http::{HttpClient, ReqwestClient},
    oauth::OAuthClient,
    session::{JsonFileStore, SessionContext, SESSION_COOKIE_NAME},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub oauth: OAuthClient,
    pub discord: DiscordApi,
    pub crajy: CrajyApi,
}

impl AppState {
    pub fn new(config: Config, http: Arc<dyn HttpClient>) -> Self {
        Self {
            oauth: OAuthClient::new(&config, http.clone()),
            discord: DiscordApi::new(&config, http.clone()),
            crajy: CrajyApi::new(&config, http),
            config: Arc::new(config),
        }
    }
}

pub fn app<Store>(state: AppState, store: Store, key: Key) -> Router
where
    Store: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_secure(state.config.redirect_uri.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)))
        .with_signed(key);

    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(index))
        .route("/discord", get(auth::login))
        .route("/discord/callback", get(auth::callback))
        .route("/logout", get(auth::logout))
        .route("/notes", get(notes::notes).post(notes::notes))
        .nest_service("/static", static_files)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let default_filter = if config.debug {
        "crajyminder_web=debug,tower_http=debug,tower_sessions=debug"
    } else {
        "crajyminder_web=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CrajyMinder web");

    let session_store = match &config.session_file {
        Some(path) => {
            info!("Sessions will be persisted to: {}", path.display());
            JsonFileStore::open(path.clone()).await?
        }
        None => JsonFileStore::in_memory(),
    };
    info!("{} active sessions", session_store.len().await);
    let key = config.session_key()?;
    let addr = config.server_address();

    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
    let app_state = AppState::new(config, http_client);
    let router = app(app_state, session_store, key);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn index(session: SessionContext) -> error::Result<Response> {
    let signed_in = session.token().await?.is_some();
    Ok(pages::index_page(signed_in).into_response())
}
