//! Outbound HTTP. Everything that talks to Discord or the Crajy API goes
//! through [`HttpClient`], so handlers never block and tests can script the
//! remote side.

use async_trait::async_trait;
use axum::http::{header, Method, StatusCode};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::{AppError, Result};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct FetchError(pub String);

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), format!("Bearer {}", token))
    }

    pub fn form<T: Serialize>(mut self, form: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(form)
            .map_err(|e| AppError::InternalError(e.into()))?;
        self.body = Some(Bytes::from(encoded));
        Ok(self.header(
            header::CONTENT_TYPE.as_str(),
            "application/x-www-form-urlencoded",
        ))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body).map_err(|e| AppError::InternalError(e.into()))?;
        self.body = Some(Bytes::from(encoded));
        Ok(self.header(header::CONTENT_TYPE.as_str(), "application/json"))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    async fn fetch(
        &self,
        request: FetchRequest,
    ) -> std::result::Result<FetchResponse, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("CrajyMinder/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch(
        &self,
        request: FetchRequest,
    ) -> std::result::Result<FetchResponse, FetchError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError(format!("Request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError(format!("Failed to read response: {}", e)))?;

        debug!("Response status: {}", status);
        Ok(FetchResponse { status, body })
    }
}
