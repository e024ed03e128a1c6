use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub firehose: FirehoseConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

// ── Transport ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Minimum spacing between any two outbound requests (default: 200)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Attempts per request including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Connect + read timeout per request (default: 15)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS verification, for networks whose proxy re-signs traffic
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// AppView used for unauthenticated reads
    #[serde(default = "default_public_appview")]
    pub public_appview: String,
    /// Server used for createSession and as the PDS of fresh sessions
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
}

fn default_min_interval_ms() -> u64 {
    200
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_public_appview() -> String {
    crate::transport::PUBLIC_APPVIEW.into()
}

fn default_login_endpoint() -> String {
    crate::session::DEFAULT_PDS.into()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
            public_appview: default_public_appview(),
            login_endpoint: default_login_endpoint(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Session file; `~` and `$VARS` are expanded
    #[serde(default = "default_sessions_path")]
    pub path: String,
}

fn default_sessions_path() -> String {
    "~/.skygate/sessions.json".into()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            path: default_sessions_path(),
        }
    }
}

impl SessionsConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

// ── Local post store ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database; `~` and `$VARS` are expanded
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.skygate/posts.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.db_path)
    }
}

// ── Firehose ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseConfig {
    /// Start the Jetstream consumer with `serve` (default: false)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_firehose_url")]
    pub url: String,
    /// BCP-47 tag of the language to keep (default: "ja")
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    /// Fixed pause before reconnecting (default: 5)
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_firehose_url() -> String {
    crate::firehose::DEFAULT_JETSTREAM_URL.into()
}

fn default_target_lang() -> String {
    "ja".into()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_firehose_url(),
            target_lang: default_target_lang(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

// ── Tool server ──────────────────────────────────────────────────

/// How `serve` exposes the tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ServerTransport {
    /// Newline-delimited JSON-RPC on stdin/stdout
    #[default]
    Stdio,
    /// `GET {mount}/sse` event stream plus `POST {mount}/messages/`
    Sse,
    /// One JSON-RPC exchange per `POST {mount}/mcp`
    StreamableHttp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind host for HTTP transports (default: "127.0.0.1")
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Bind port for HTTP transports (default: 8000)
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Path prefix for HTTP endpoints (default: none)
    #[serde(default)]
    pub mount_path: String,
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::default(),
            host: default_server_host(),
            port: default_server_port(),
            mount_path: String::new(),
        }
    }
}

/// Expand `~` and environment variables, falling back to `~` only when a
/// variable is undefined.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw)
        .map_or_else(|_| shellexpand::tilde(raw).into_owned(), |s| s.into_owned());
    PathBuf::from(expanded)
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let skygate_dir = home.join(".skygate");
        if !skygate_dir.exists() {
            fs::create_dir_all(&skygate_dir).context("Failed to create .skygate directory")?;
        }

        let mut config = Self::load_or_create(&skygate_dir.join("config.toml"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `path`, or write defaults there when it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = path.to_path_buf();
            Ok(config)
        } else {
            let config = Config {
                config_path: path.to_path_buf(),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(ms) = get("SKYGATE_MIN_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.transport.min_interval_ms = ms;
        }
        if let Some(attempts) = get("SKYGATE_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
            if attempts > 0 {
                self.transport.max_attempts = attempts;
            }
        }
        if let Some(path) = get("SKYGATE_SESSIONS_PATH") {
            self.sessions.path = path;
        }
        if let Some(path) = get("SKYGATE_DB_PATH") {
            self.store.db_path = path;
        }
        if let Some(val) = get("SKYGATE_FIREHOSE") {
            self.firehose.enabled = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Some(url) = get("SKYGATE_FIREHOSE_URL") {
            self.firehose.url = url;
        }
        if let Some(lang) = get("SKYGATE_TARGET_LANG") {
            self.firehose.target_lang = lang;
        }
        if let Some(port) = get("SKYGATE_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.transport.min_interval_ms, 200);
        assert_eq!(c.transport.max_attempts, 3);
        assert_eq!(c.transport.timeout_secs, 15);
        assert!(!c.transport.accept_invalid_certs);
        assert_eq!(c.transport.public_appview, "https://public.api.bsky.app");
        assert_eq!(c.transport.login_endpoint, "https://bsky.social");
        assert!(!c.firehose.enabled);
        assert_eq!(c.firehose.target_lang, "ja");
        assert_eq!(c.firehose.reconnect_delay_secs, 5);
        assert!(c.firehose.url.starts_with("wss://"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str(
            r#"
            [transport]
            min_interval_ms = 500

            [firehose]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(c.transport.min_interval_ms, 500);
        assert_eq!(c.transport.max_attempts, 3);
        assert!(c.firehose.enabled);
        assert_eq!(c.firehose.target_lang, "ja");
        assert_eq!(c.store.db_path, "~/.skygate/posts.db");
    }

    #[test]
    fn load_or_create_writes_defaults_then_reads_them_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.config_path, path);

        let mut edited = created.clone();
        edited.transport.max_attempts = 7;
        edited.save().unwrap();

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.transport.max_attempts, 7);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[transport\nbroken").unwrap();
        assert!(Config::load_or_create(&path).is_err());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SKYGATE_MIN_INTERVAL_MS", "50"),
            ("SKYGATE_MAX_ATTEMPTS", "0"),
            ("SKYGATE_DB_PATH", "/tmp/posts.db"),
            ("SKYGATE_FIREHOSE", "true"),
            ("SKYGATE_TARGET_LANG", "ko"),
            ("SKYGATE_SESSIONS_PATH", "  "),
            ("SKYGATE_PORT", "9001"),
        ]);
        let mut c = Config::default();
        c.apply_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(c.transport.min_interval_ms, 50);
        assert_eq!(c.transport.max_attempts, 3);
        assert_eq!(c.store.db_path, "/tmp/posts.db");
        assert!(c.firehose.enabled);
        assert_eq!(c.firehose.target_lang, "ko");
        assert_eq!(c.sessions.path, "~/.skygate/sessions.json");
        assert_eq!(c.server.port, 9001);
    }

    #[test]
    fn server_section_parses_transport_names() {
        let c: Config = toml::from_str(
            r#"
            [server]
            transport = "streamable-http"
            port = 9100
            mount_path = "/bsky"
            "#,
        )
        .unwrap();
        assert_eq!(c.server.transport, ServerTransport::StreamableHttp);
        assert_eq!(c.server.port, 9100);
        assert_eq!(c.server.host, "127.0.0.1");
        assert_eq!(c.server.mount_path, "/bsky");
        assert_eq!(Config::default().server.transport, ServerTransport::Stdio);
    }

    #[test]
    fn expand_path_resolves_tilde() {
        let expanded = expand_path("~/x/posts.db");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("x/posts.db"));
    }

    #[test]
    fn expand_path_keeps_absolute_paths() {
        assert_eq!(expand_path("/var/lib/posts.db"), PathBuf::from("/var/lib/posts.db"));
    }
}
