use super::context::{Args, ToolContext};
use super::traits::{Tool, ToolResult};
use crate::atproto::{ApiError, BlueskyClient};
use crate::session::Credentials;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Log in and make the identity the default.
pub struct LoginTool {
    ctx: Arc<ToolContext>,
    env: EnvLookup,
}

impl LoginTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self::with_env(ctx, |key| std::env::var(key).ok())
    }

    pub fn with_env(
        ctx: Arc<ToolContext>,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            ctx,
            env: Box::new(env),
        }
    }
}

#[async_trait]
impl Tool for LoginTool {
    fn name(&self) -> &str {
        "bsky_login"
    }

    fn description(&self) -> &str {
        "Log in to Bluesky and make the identity the default. An existing session for the \
         same handle is discarded first. Missing arguments fall back to BSKY_HANDLE and \
         BSKY_APP_PASSWORD."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "handle": {
                    "type": "string",
                    "description": "Account handle, e.g. yourname.bsky.social"
                },
                "password": {
                    "type": "string",
                    "description": "App password"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let args = Args(&args);
        let lookup = |key: &str| (self.env)(key).filter(|v| !v.is_empty());

        let Some(handle) = args.opt_str("handle").map(str::to_string).or_else(|| lookup("BSKY_HANDLE"))
        else {
            return Ok(ToolResult::fail(
                "handle is required. Provide 'handle' argument or set env var BSKY_HANDLE.",
            ));
        };
        let Some(password) = args
            .opt_str("password")
            .map(str::to_string)
            .or_else(|| lookup("BSKY_APP_PASSWORD"))
        else {
            return Ok(ToolResult::fail(
                "password is required. Provide 'password' argument or set env var BSKY_APP_PASSWORD.",
            ));
        };

        if self.ctx.sessions.remove(&handle).await {
            tracing::info!(%handle, "Discarded existing session before re-login");
        }

        let client = BlueskyClient::new(Credentials::unauthenticated(), self.ctx.transport.clone())
            .with_login_endpoint(self.ctx.login_endpoint.clone());
        let creds = match client.login(&handle, &password).await {
            Ok(creds) => creds,
            Err(e) => return Ok(ToolResult::fail(format!("Login failed: {e}"))),
        };

        let did = creds.did.clone().unwrap_or_default();
        let resolved = creds.handle.clone().unwrap_or_else(|| handle.clone());
        self.ctx.sessions.put(&handle, creds).await?;
        Ok(ToolResult::ok(format!(
            "Login successful as {resolved} (DID: {did})"
        )))
    }
}

pub struct LogoutTool {
    ctx: Arc<ToolContext>,
}

impl LogoutTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for LogoutTool {
    fn name(&self) -> &str {
        "bsky_logout"
    }

    fn description(&self) -> &str {
        "Discard the stored session of a handle."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "handle": { "type": "string", "description": "Handle used at login" }
            },
            "required": ["handle"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let handle = Args(&args).str("handle")?;
        if self.ctx.sessions.remove(handle).await {
            Ok(ToolResult::ok(format!("Successfully logged out: {handle}")))
        } else {
            Ok(ToolResult::fail(format!("Handle not found in sessions: {handle}")))
        }
    }
}

pub struct RefreshSessionTool {
    ctx: Arc<ToolContext>,
}

impl RefreshSessionTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for RefreshSessionTool {
    fn name(&self) -> &str {
        "bsky_refresh_session"
    }

    fn description(&self) -> &str {
        "Refresh the tokens of a stored session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "acting_handle": {
                    "type": "string",
                    "description": "Identity to refresh (default: the most recently logged-in one)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let args = Args(&args);
        let identity = match args.acting_handle() {
            Some(handle) => Some(handle.to_string()),
            None => self.ctx.sessions.default_identity().await,
        };
        let Some(identity) = identity else {
            return Ok(ToolResult::fail(format!("Error: {}", ApiError::NoRefreshToken)));
        };

        let mut client = self.ctx.client_for(Some(&identity)).await;
        match client.refresh().await {
            Ok(creds) => match self.ctx.sessions.update(&identity, creds).await {
                Ok(()) => Ok(ToolResult::ok(format!(
                    "Session refreshed successfully for {identity}"
                ))),
                Err(e) => Ok(ToolResult::fail(format!("Refresh failed: {e}"))),
            },
            Err(e @ ApiError::NoRefreshToken) => Ok(ToolResult::fail(format!("Error: {e}"))),
            Err(e) => Ok(ToolResult::fail(format!("Refresh failed: {e}"))),
        }
    }
}

/// List stored identities without exposing tokens.
pub struct SessionsTool {
    ctx: Arc<ToolContext>,
}

impl SessionsTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SessionsTool {
    fn name(&self) -> &str {
        "bsky_sessions"
    }

    fn description(&self) -> &str {
        "List stored identities and which one is the default."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        let identities = self.ctx.sessions.identities().await;
        Ok(ToolResult::json(&serde_json::to_value(identities)?))
    }
}
