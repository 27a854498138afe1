//! Interface to the external traffic router.
//!
//! The orchestrator sends only the target's percentage; the router owns
//! the complementary split. All calls are bounded by a timeout.

use dvr_common::types::TrafficSplit;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Failure applying a split at the router.
#[derive(Debug, Error)]
#[error("router rejected split {percentage}% -> {target}: {reason}")]
pub struct RouterError {
    pub target: String,
    pub percentage: u8,
    pub reason: String,
}

/// Port to the load balancer / traffic router.
pub trait TrafficRouter: Send + Sync {
    /// Apply a split: route `split.percentage`% to `split.target`.
    fn route(&self, split: &TrafficSplit) -> impl Future<Output = Result<(), RouterError>> + Send;
}

/// HTTP traffic-router client.
#[derive(Debug, Clone)]
pub struct HttpTrafficRouter {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTrafficRouter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl TrafficRouter for HttpTrafficRouter {
    async fn route(&self, split: &TrafficSplit) -> Result<(), RouterError> {
        let payload = json!({
            "target": split.target.as_str(),
            "percentage": split.percentage,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RouterError {
                target: split.target.to_string(),
                percentage: split.percentage,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouterError {
                target: split.target.to_string(),
                percentage: split.percentage,
                reason: format!("router returned {}", status),
            });
        }

        info!(
            "routed {}% -> {} ({}% remains on live deployment)",
            split.percentage,
            split.target,
            split.complement()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvr_common::types::DeploymentId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn one_shot_server(status_line: &'static str) -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let _ = tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
                let response = format!(
                    "{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn route_posts_target_and_percentage_only() {
        let (url, request) = one_shot_server("HTTP/1.1 200 OK").await;
        let router = HttpTrafficRouter::new(url, Duration::from_secs(5));
        let split = TrafficSplit::new(DeploymentId::new("deploy-42"), 25).unwrap();
        router.route(&split).await.unwrap();

        let raw = request.await.unwrap();
        let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
        let payload: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(payload["target"], "deploy-42");
        assert_eq!(payload["percentage"], 25);
        // The complementary share is the router's job, never sent.
        assert_eq!(payload.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn route_surfaces_router_rejection() {
        let (url, _request) = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        let router = HttpTrafficRouter::new(url, Duration::from_secs(5));
        let split = TrafficSplit::new(DeploymentId::new("deploy-42"), 50).unwrap();
        let err = router.route(&split).await.unwrap_err();
        assert_eq!(err.percentage, 50);
        assert!(err.reason.contains("503"));
    }
}
