//! Operator notification fan-out.
//!
//! Best-effort: each configured channel gets at most one attempt per
//! event, and channel failures are logged but never surfaced to the
//! caller. A notification failure must never block or fail a rollback.

use chrono::Utc;
use dvr_common::config::NotifyConfig;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Severity attached to an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifySeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for NotifySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One notification event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NotifyEvent {
    pub severity: NotifySeverity,
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl NotifyEvent {
    pub fn new(severity: NotifySeverity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// Port for notification delivery; the orchestrator only ever calls
/// [`Notifier::notify`], which cannot fail.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotifyEvent) -> impl Future<Output = ()> + Send;
}

/// Fans events out to the configured chat webhook and email channels.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl NotificationDispatcher {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn send_webhook(&self, url: &str, event: &NotifyEvent) {
        let payload = json!({
            "severity": event.severity,
            "title": event.title,
            "fields": event.fields.iter().map(|(k, v)| json!({"name": k, "value": v})).collect::<Vec<_>>(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        match self
            .client
            .post(url)
            .json(&payload)
            .timeout(CHANNEL_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("webhook notified: {}", event.title);
            }
            Ok(response) => warn!(
                "webhook returned {} for '{}'",
                response.status(),
                event.title
            ),
            Err(e) => warn!("webhook delivery failed for '{}': {}", event.title, e),
        }
    }

    async fn send_email(&self, to: &str, event: &NotifyEvent) {
        let subject = format!("[dvr {}] {}", event.severity, event.title);
        let mut body = String::new();
        for (name, value) in &event.fields {
            body.push_str(&format!("{}: {}\n", name, value));
        }

        let spawned = tokio::process::Command::new(&self.config.mailer_command)
            .arg("-s")
            .arg(&subject)
            .arg(to)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("mailer '{}' failed to start: {}", self.config.mailer_command, e);
                return;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(body.as_bytes()).await;
        }

        match tokio::time::timeout(CHANNEL_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if status.success() => debug!("email notified: {}", event.title),
            Ok(Ok(status)) => warn!("mailer exited with {} for '{}'", status, event.title),
            Ok(Err(e)) => warn!("mailer wait failed for '{}': {}", event.title, e),
            Err(_) => {
                warn!("mailer timed out for '{}'", event.title);
                let _ = child.kill().await;
            }
        }
    }
}

impl Notifier for NotificationDispatcher {
    async fn notify(&self, event: &NotifyEvent) {
        if let Some(url) = self.config.webhook_url.clone() {
            self.send_webhook(&url, event).await;
        }
        if let Some(to) = self.config.email_to.clone() {
            self.send_email(&to, event).await;
        }
        if self.config.webhook_url.is_none() && self.config.email_to.is_none() {
            debug!("no notification channels configured; dropping '{}'", event.title);
        }
    }
}
