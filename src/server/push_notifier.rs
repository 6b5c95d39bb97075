//! Push Notifier — best-effort webhook delivery of task events.
//!
//! Mirrors the `reqwest` usage in `client/transport.rs` and the
//! `tracing` logging conventions used throughout `server/task_store.rs`,
//! applied to the outbound direction: every status and artifact update for
//! a task with a registered [`PushNotificationConfig`] is also POSTed to
//! that config's `url`, independently of the SSE fan-out.
//!
//! Delivery never blocks the caller — [`PushNotifier::notify`] spawns the
//! HTTP attempt(s) on a background task and returns immediately. Retries
//! use exponential backoff capped at 30s, up to a configurable attempt
//! count (default 5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::A2AResult;
use crate::types::{PushNotificationConfig, TaskPushNotificationConfig};

/// Persists [`TaskPushNotificationConfig`]s keyed by task id.
///
/// A task may have more than one registered config (matching the
/// `tasks/pushNotification/list` surface); each is notified independently
/// on every update.
#[async_trait]
pub trait PushNotificationConfigStore: Send + Sync {
    /// Register (or replace, by `config_id`) a config for `task_id`.
    async fn set(&self, task_id: &str, config: TaskPushNotificationConfig) -> A2AResult<()>;

    /// All configs registered for `task_id`, in registration order.
    async fn list(&self, task_id: &str) -> A2AResult<Vec<TaskPushNotificationConfig>>;

    /// A single config by id, if registered for `task_id`.
    async fn get(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<TaskPushNotificationConfig>>;

    /// Remove one config. No-op if absent.
    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()>;
}

/// In-memory [`PushNotificationConfigStore`], keyed by task id.
///
/// Grounded on the same `RwLock<HashMap<..>>` shape as
/// [`crate::server::task_store::InMemoryTaskStore`].
#[derive(Debug, Default)]
pub struct InMemoryPushNotificationConfigStore {
    configs: RwLock<HashMap<String, Vec<TaskPushNotificationConfig>>>,
}

impl InMemoryPushNotificationConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushNotificationConfigStore for InMemoryPushNotificationConfigStore {
    async fn set(&self, task_id: &str, config: TaskPushNotificationConfig) -> A2AResult<()> {
        let mut configs = self.configs.write().await;
        let entries = configs.entry(task_id.to_string()).or_default();

        let config_id = config.push_notification_config.id.clone();
        if let Some(ref id) = config_id {
            if let Some(existing) = entries
                .iter_mut()
                .find(|c| c.push_notification_config.id.as_deref() == Some(id.as_str()))
            {
                *existing = config;
                return Ok(());
            }
        }
        entries.push(config);
        Ok(())
    }

    async fn list(&self, task_id: &str) -> A2AResult<Vec<TaskPushNotificationConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(task_id).cloned().unwrap_or_default())
    }

    async fn get(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<TaskPushNotificationConfig>> {
        let configs = self.configs.read().await;
        let Some(entries) = configs.get(task_id) else {
            return Ok(None);
        };
        match config_id {
            Some(id) => Ok(entries
                .iter()
                .find(|c| c.push_notification_config.id.as_deref() == Some(id))
                .cloned()),
            None => Ok(entries.first().cloned()),
        }
    }

    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()> {
        let mut configs = self.configs.write().await;
        if let Some(entries) = configs.get_mut(task_id) {
            entries.retain(|c| c.push_notification_config.id.as_deref() != Some(config_id));
        }
        Ok(())
    }
}

/// Delivery policy for webhook POSTs.
#[derive(Debug, Clone)]
pub struct PushNotifierConfig {
    /// Maximum delivery attempts per event. Default 5.
    pub max_attempts: u32,
    /// Base backoff duration; doubled on each retry. Default 250ms.
    pub base_backoff: Duration,
    /// Backoff ceiling. Default 30s.
    pub max_backoff: Duration,
}

impl Default for PushNotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Delivers task event payloads to registered webhook URLs.
///
/// Uses the same `reqwest::Client` type as `client/transport.rs` — here for
/// outbound delivery instead of inbound JSON-RPC calls.
pub struct PushNotifier {
    client: reqwest::Client,
    config: PushNotifierConfig,
}

impl PushNotifier {
    /// Create a notifier with the default delivery policy.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            config: PushNotifierConfig::default(),
        }
    }

    /// Create a notifier with a custom delivery policy.
    pub fn with_config(config: PushNotifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Best-effort delivery of `payload` to `config.url`.
    ///
    /// Spawns the attempt loop on a background task and returns immediately
    /// — never blocks the SSE fan-out or the Handler.
    pub fn notify(self: &Arc<Self>, config: PushNotificationConfig, payload: serde_json::Value) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            notifier.deliver(&config, &payload).await;
        });
    }

    /// Attempt delivery up to `max_attempts` times with exponential backoff.
    ///
    /// At-least-once: a retried attempt may duplicate a prior one that the
    /// server actually received but whose response was lost. Downstream
    /// consumers are expected to dedupe, e.g. by `changeId` or
    /// `(taskId, status.timestamp)`).
    async fn deliver(&self, config: &PushNotificationConfig, payload: &serde_json::Value) {
        let mut backoff = self.config.base_backoff;

        for attempt in 1..=self.config.max_attempts {
            let mut request = self.client.post(&config.url).json(payload);
            request = match self.authorization_header(config) {
                Some(header) => request.header("Authorization", header),
                None => request,
            };

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %config.url, attempt, "Push notification delivered");
                    return;
                }
                Ok(resp) => {
                    warn!(
                        url = %config.url,
                        attempt,
                        status = %resp.status(),
                        "Push notification endpoint returned non-success status"
                    );
                }
                Err(e) => {
                    warn!(url = %config.url, attempt, error = %e, "Push notification delivery failed");
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
            }
        }

        warn!(
            url = %config.url,
            attempts = self.config.max_attempts,
            "Push notification delivery exhausted all attempts; giving up"
        );
    }

    /// Build the `Authorization` header from `token` (bearer) or
    /// `authentication` scheme.
    fn authorization_header(&self, config: &PushNotificationConfig) -> Option<String> {
        if let Some(ref token) = config.token {
            return Some(format!("Bearer {token}"));
        }
        let auth = config.authentication.as_ref()?;
        let scheme = auth.schemes.first()?;
        let credentials = auth.credentials.as_deref().unwrap_or_default();
        Some(format!("{scheme} {credentials}"))
    }
}

impl Default for PushNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PushNotificationConfig;

    fn config(url: &str) -> TaskPushNotificationConfig {
        TaskPushNotificationConfig {
            id: Some("cfg1".to_string()),
            task_id: "t1".to_string(),
            push_notification_config: PushNotificationConfig {
                id: Some("cfg1".to_string()),
                url: url.to_string(),
                token: None,
                authentication: None,
            },
            tenant: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryPushNotificationConfigStore::new();
        store.set("t1", config("https://example.com/hook")).await.unwrap();

        let got = store.get("t1", Some("cfg1")).await.unwrap();
        assert!(got.is_some());
        assert_eq!(got.unwrap().push_notification_config.url, "https://example.com/hook");
    }

    #[tokio::test]
    async fn set_replaces_same_config_id() {
        let store = InMemoryPushNotificationConfigStore::new();
        store.set("t1", config("https://example.com/a")).await.unwrap();
        store.set("t1", config("https://example.com/b")).await.unwrap();

        let all = store.list("t1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].push_notification_config.url, "https://example.com/b");
    }

    #[tokio::test]
    async fn delete_removes_config() {
        let store = InMemoryPushNotificationConfigStore::new();
        store.set("t1", config("https://example.com/a")).await.unwrap();
        store.delete("t1", "cfg1").await.unwrap();

        assert!(store.list("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_missing_task_returns_none() {
        let store = InMemoryPushNotificationConfigStore::new();
        assert!(store.get("missing", None).await.unwrap().is_none());
    }

    #[test]
    fn authorization_header_prefers_bearer_token() {
        let notifier = PushNotifier::new();
        let mut cfg = PushNotificationConfig {
            id: None,
            url: "https://example.com".to_string(),
            token: Some("secret".to_string()),
            authentication: None,
        };
        assert_eq!(
            notifier.authorization_header(&cfg).as_deref(),
            Some("Bearer secret")
        );

        cfg.token = None;
        cfg.authentication = Some(crate::types::PushNotificationAuthenticationInfo {
            schemes: vec!["Basic".to_string()],
            credentials: Some("dXNlcjpwYXNz".to_string()),
        });
        assert_eq!(
            notifier.authorization_header(&cfg).as_deref(),
            Some("Basic dXNlcjpwYXNz")
        );
    }
}
