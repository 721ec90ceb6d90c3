//! Launching sandboxes through the launcher service.

use crate::probe::endpoint;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Launch request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Launcher rejected session {session_id}: HTTP {status}")]
    Rejected { session_id: String, status: u16 },
    #[error("Launcher returned an empty sandbox URL")]
    MissingUrl,
}

/// Starts a sandbox for a session and returns its base URL.
pub trait SandboxLauncher: Send + Sync {
    fn launch<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<String, LaunchError>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LaunchRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct LaunchResponse {
    #[serde(default)]
    url: String,
}

/// `POST <launcher>/api/sandboxes` with `{ "sessionId" }`, answered by `{ "url" }`.
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLauncher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl SandboxLauncher for HttpLauncher {
    fn launch<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<String, LaunchError>> {
        async move {
            let response = self
                .client
                .post(endpoint(&self.base_url, "/api/sandboxes"))
                .json(&LaunchRequest { session_id })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(LaunchError::Rejected {
                    session_id: session_id.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.json::<LaunchResponse>().await?;
            if body.url.is_empty() {
                return Err(LaunchError::MissingUrl);
            }
            info!("Launched sandbox for session {} at {}", session_id, body.url);
            Ok(body.url)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_launch_posts_session_id() {
        let app = Router::new().route(
            "/api/sandboxes",
            post(|Json(body): Json<Value>| async move {
                let id = body["sessionId"].as_str().unwrap_or_default().to_string();
                Json(json!({ "url": format!("https://{id}.sbx.test") }))
            }),
        );
        let launcher = HttpLauncher::new(serve(app).await);

        let url = launcher.launch("abc").await.unwrap();
        assert_eq!(url, "https://abc.sbx.test");
    }

    #[tokio::test]
    async fn test_launch_rejected() {
        let app = Router::new().route("/api/sandboxes", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let launcher = HttpLauncher::new(serve(app).await);

        let err = launcher.launch("abc").await.unwrap_err();
        assert!(matches!(err, LaunchError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_launch_without_url() {
        let app = Router::new().route("/api/sandboxes", post(|| async { Json(json!({})) }));
        let launcher = HttpLauncher::new(serve(app).await);

        assert!(matches!(launcher.launch("abc").await, Err(LaunchError::MissingUrl)));
    }
}
