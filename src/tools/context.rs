use crate::atproto::BlueskyClient;
use crate::config::Config;
use crate::session::SessionStore;
use crate::store::{EventStore, open_store};
use crate::transport::HttpTransport;
use anyhow::{Context, anyhow};
use serde_json::Value;
use std::sync::Arc;

/// Shared handles every tool works through.
pub struct ToolContext {
    pub sessions: Arc<SessionStore>,
    pub transport: Arc<HttpTransport>,
    pub store: Arc<dyn EventStore>,
    pub login_endpoint: String,
}

impl ToolContext {
    /// Build the transport, session store and post store from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let sessions_path = config.sessions.resolved_path();
        let db_path = config.store.resolved_path();
        tracing::debug!(
            sessions = %sessions_path.display(),
            db = %db_path.display(),
            "Opening local state"
        );

        Ok(Self {
            sessions: Arc::new(SessionStore::load(sessions_path)),
            transport: Arc::new(HttpTransport::from_config(&config.transport)),
            store: open_store(&db_path)
                .with_context(|| format!("Failed to open post store at {}", db_path.display()))?,
            login_endpoint: config.transport.login_endpoint.clone(),
        })
    }

    /// Client acting as `acting_handle`, or as the default identity.
    pub async fn client_for(&self, acting_handle: Option<&str>) -> BlueskyClient {
        let creds = self.sessions.resolve(acting_handle).await;
        BlueskyClient::new(creds, self.transport.clone())
            .with_login_endpoint(self.login_endpoint.clone())
    }
}

/// Typed access to a tool's JSON arguments.
pub(crate) struct Args<'a>(pub &'a Value);

impl<'a> Args<'a> {
    pub fn str(&self, key: &str) -> anyhow::Result<&'a str> {
        self.opt_str(key)
            .ok_or_else(|| anyhow!("Missing '{key}' parameter"))
    }

    /// Absent, null and empty strings are all `None`.
    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .map_or(default, |v| u32::try_from(v).unwrap_or(u32::MAX))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn acting_handle(&self) -> Option<&'a str> {
        self.opt_str("acting_handle")
    }
}
