//! Push-notification collaborator boundary.

use std::time::Duration;

use tracing::{debug, info};

use crate::errors::AutomationError;

pub trait Notifier: Send + Sync {
    /// Delivers `(title, content)`. Callers log failures and move on;
    /// delivery is never load-bearing for a run.
    fn send(&self, title: &str, content: &str) -> Result<(), AutomationError>;
}

/// Used when push delivery is disabled.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(&self, title: &str, _content: &str) -> Result<(), AutomationError> {
        debug!(title, "push delivery disabled, dropping notification");
        Ok(())
    }
}

/// Delivers through a token-authenticated GET endpoint, the shape the
/// wx-push relay expects: `?token=...&title=...&content=...`.
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: String,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }
}

impl Notifier for HttpNotifier {
    fn send(&self, title: &str, content: &str) -> Result<(), AutomationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("token", self.token.as_str()),
                ("title", title),
                ("content", content),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .map_err(|e| AutomationError::NotificationFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(title, "notification delivered");
            Ok(())
        } else {
            Err(AutomationError::NotificationFailed(format!(
                "push endpoint answered {status}"
            )))
        }
    }
}
