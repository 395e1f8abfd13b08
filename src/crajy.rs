use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::{
    config::Config,
    error::{AppError, Result},
    http::{FetchRequest, HttpClient},
    types::{Note, Reminder},
};

/// The Crajy bot's API. Authenticated by a shared token; the user is named in
/// a `user` header.
#[derive(Clone)]
pub struct CrajyApi {
    base_url: String,
    api_token: String,
    http: Arc<dyn HttpClient>,
}

impl CrajyApi {
    pub fn new(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: config.crajy_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            http,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub async fn fetch_notes(&self, user_id: &str) -> Result<Vec<Note>> {
        self.fetch_records("notes", user_id).await
    }

    pub async fn fetch_reminders(&self, user_id: &str) -> Result<Vec<Reminder>> {
        self.fetch_records("reminders", user_id).await
    }

    async fn fetch_records(&self, path: &str, user_id: &str) -> Result<Vec<Value>> {
        let request = FetchRequest::get(self.endpoint(path))
            .header("user", user_id)
            .json(&json!({ "token": self.api_token }))?;
        let response = self
            .http
            .fetch(request)
            .await
            .map_err(|e| AppError::UpstreamError(e.to_string()))?;

        if !response.is_success() {
            return Err(AppError::UpstreamError(format!(
                "Crajy /{} returned {}: {}",
                path,
                response.status,
                response.text()
            )));
        }

        let body: Value = response
            .json()
            .map_err(|e| AppError::UpstreamError(format!("Invalid /{} response: {}", path, e)))?;
        let records = into_records(body)
            .ok_or_else(|| AppError::UpstreamError(format!("Unexpected /{} payload", path)))?;
        debug!("Fetched {} {} for user {}", records.len(), path, user_id);
        Ok(records)
    }
}

// The API answers with an object keyed by record id; arrays and null are
// accepted too.
fn into_records(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Object(map) => Some(map.into_iter().map(|(_, value)| value).collect()),
        Value::Array(items) => Some(items),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::http::testing::FakeHttp;
    use axum::http::Method;

    #[tokio::test]
    async fn notes_are_object_values() {
        let http = Arc::new(FakeHttp::default());
        let api = CrajyApi::new(&test_config(), http.clone());
        http.respond(
            Method::GET,
            &api.endpoint("notes"),
            200,
            json!({ "1": { "content": "buy milk" }, "2": { "content": "walk dog" } }),
        );

        let notes = api.fetch_notes("42").await.unwrap();
        assert_eq!(notes.len(), 2);

        let sent = &http.requests()[0];
        assert_eq!(sent.url, "https://crajy.test/notes");
        assert_eq!(sent.header_value("user"), Some("42"));
        let body: Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({ "token": "crajy-token" }));
    }

    #[tokio::test]
    async fn empty_reminders_are_not_an_error() {
        let http = Arc::new(FakeHttp::default());
        let api = CrajyApi::new(&test_config(), http.clone());
        http.respond(Method::GET, &api.endpoint("reminders"), 200, json!({}));

        assert!(api.fetch_reminders("42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_upstream_error() {
        let http = Arc::new(FakeHttp::default());
        let api = CrajyApi::new(&test_config(), http.clone());
        http.respond(Method::GET, &api.endpoint("notes"), 500, json!("oops"));

        let err = api.fetch_notes("42").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
    }

    #[test]
    fn scalar_payload_is_rejected() {
        assert!(into_records(json!(3)).is_none());
        assert_eq!(into_records(json!([1, 2])), Some(vec![json!(1), json!(2)]));
    }
}
