use crate::http::{HttpSettings, build_client};
use crate::is24::config::{ConfigError, Credentials};
use crate::is24::oauth::Signer;
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{ACCEPT, AUTHORIZATION},
};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    #[error("response from {url} is not valid json: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::Config(_) => None,
            FetchError::Network { url, .. }
            | FetchError::Http { url, .. }
            | FetchError::Parse { url, .. } => Some(url),
        }
    }
}

/// Authenticated JSON GET against the vendor API.
#[async_trait]
pub trait JsonFetch: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

#[derive(Debug, Clone)]
pub struct Is24Client {
    http: Client,
    signer: Signer,
}

impl Is24Client {
    pub fn new(credentials: Credentials, settings: &HttpSettings) -> Result<Self, ConfigError> {
        credentials.validate()?;
        Ok(Self::with_signer(Signer::new(credentials), build_client(settings)))
    }

    pub fn with_signer(signer: Signer, http: Client) -> Self {
        Self { http, signer }
    }
}

#[async_trait]
impl JsonFetch for Is24Client {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let signed = self.signer.sign("GET", url)?;
        debug!(target: "is24.http", url = %url, "GET");

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, signed.header)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|err| FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|err| FetchError::Parse {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::get};
    use serde_json::json;
    use std::net::SocketAddr;

    async fn echo_headers(headers: HeaderMap) -> Json<Value> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Json(json!({
            "authorization": read("authorization"),
            "accept": read("accept"),
        }))
    }

    async fn not_json() -> &'static str {
        "<html>maintenance</html>"
    }

    async fn spawn_vendor() -> SocketAddr {
        let app = Router::new()
            .route("/realestate", get(echo_headers))
            .route("/broken", get(not_json));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client() -> Is24Client {
        Is24Client::new(
            Credentials::new("ck", "cs", "tk", "ts"),
            &HttpSettings::default(),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn sends_signed_json_request() {
        let addr = spawn_vendor().await;
        let body = client()
            .fetch_json(&format!("http://{addr}/realestate"))
            .await
            .expect("fetch");
        let auth = body["authorization"].as_str().unwrap();
        assert!(auth.starts_with("OAuth oauth_consumer_key=\"ck\", oauth_token=\"tk\""));
        assert!(auth.contains("oauth_signature=\""));
        assert_eq!(body["accept"], json!("application/json"));
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let addr = spawn_vendor().await;
        let url = format!("http://{addr}/missing");
        let err = client().fetch_json(&url).await.expect_err("404");
        match err {
            FetchError::Http { status, url: failed } => {
                assert_eq!(status, 404);
                assert_eq!(failed, url);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_parse_error() {
        let addr = spawn_vendor().await;
        let err = client()
            .fetch_json(&format!("http://{addr}/broken"))
            .await
            .expect_err("parse");
        assert!(matches!(err, FetchError::Parse { .. }));
        assert!(err.url().unwrap().ends_with("/broken"));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client()
            .fetch_json(&format!("http://{addr}/realestate"))
            .await
            .expect_err("network");
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[test]
    fn blank_credentials_are_rejected_up_front() {
        let err = Is24Client::new(
            Credentials::new("ck", "", "tk", "ts"),
            &HttpSettings::default(),
        )
        .expect_err("config");
        assert_eq!(err, ConfigError::MissingCredential("consumer_secret"));
    }
}
