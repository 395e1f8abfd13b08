use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tower_sessions::{
    session::{Id, Record},
    session_store, Session, SessionStore,
};
use tracing::{debug, error, info};

use crate::{
    error::{AppError, Result},
    oauth::TokenUpdater,
    types::OAuthToken,
};

pub const SESSION_COOKIE_NAME: &str = "crajyminder_session";
pub const STATE_KEY: &str = "oauth2_state";
pub const TOKEN_KEY: &str = "oauth2_token";

/// Session records held in memory and, when a path is given, mirrored to a
/// JSON file so sign-ins survive restarts.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    records: Arc<RwLock<HashMap<Id, Record>>>,
    persist_path: Option<PathBuf>,
}

impl JsonFileStore {
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            persist_path: None,
        }
    }

    pub async fn open(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<Vec<Record>>(&data) {
                Ok(records) => {
                    let now = OffsetDateTime::now_utc();
                    records
                        .into_iter()
                        .filter(|record| record.expiry_date > now)
                        .map(|record| (record.id, record))
                        .collect()
                }
                Err(e) => {
                    error!("Failed to parse sessions file, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing sessions file found");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} sessions from {}", records.len(), path.display());

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            persist_path: Some(path),
        })
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.values().cloned().collect()
    }

    /// Drops expired records; abandoned sessions are never deleted explicitly.
    fn prune(records: &mut HashMap<Id, Record>) {
        let now = OffsetDateTime::now_utc();
        let before = records.len();
        records.retain(|_, record| record.expiry_date > now);
        if records.len() < before {
            debug!("Pruned {} expired sessions", before - records.len());
        }
    }

    // Writes a sibling file and renames it over the original; readers only
    // ever see a complete snapshot.
    async fn persist(&self, records: &HashMap<Id, Record>) -> session_store::Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        let snapshot: Vec<&Record> = records.values().collect();
        let data = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| session_store::Error::Encode(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        let write = async {
            tokio::fs::write(&tmp_path, data).await?;
            tokio::fs::rename(&tmp_path, path).await
        };
        write.await.map_err(|e| {
            error!("Failed to save sessions: {}", e);
            session_store::Error::Backend(e.to_string())
        })?;
        debug!("Saved {} sessions to disk", records.len());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.records.write().await;
        while records.contains_key(&record.id) {
            record.id = Id::default();
        }
        records.insert(record.id, record.clone());
        Self::prune(&mut records);
        self.persist(&records).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.id, record.clone());
        Self::prune(&mut records);
        self.persist(&records).await
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let records = self.records.read().await;
        Ok(records
            .get(session_id)
            .filter(|record| record.expiry_date > OffsetDateTime::now_utc())
            .cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        let mut records = self.records.write().await;
        if records.remove(session_id).is_some() {
            self.persist(&records).await?;
        }
        Ok(())
    }
}

/// Typed view over the browser session, handed to each handler.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn issue_state(&self, state: &str) -> Result<()> {
        self.session.insert(STATE_KEY, state).await?;
        Ok(())
    }

    /// Removes the stored state; a state can be checked only once.
    ///
    /// A session holding nothing but the state is flushed right away, so the
    /// consumed state leaves the store even when the request later fails.
    pub async fn take_state(&self) -> Result<Option<String>> {
        let state = self.session.remove::<String>(STATE_KEY).await?;
        if state.is_some() && self.token().await?.is_none() {
            self.session.flush().await?;
        }
        Ok(state)
    }

    pub async fn token(&self) -> Result<Option<OAuthToken>> {
        Ok(self.session.get::<OAuthToken>(TOKEN_KEY).await?)
    }

    pub async fn set_token(&self, token: &OAuthToken) -> Result<()> {
        self.session.insert(TOKEN_KEY, token).await?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.session.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TokenUpdater for SessionContext {
    async fn update_token(&self, token: &OAuthToken) -> Result<()> {
        debug!("Persisting refreshed token into session");
        self.set_token(token).await
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::SessionUnavailable)?;
        Ok(Self::new(session))
    }
}
