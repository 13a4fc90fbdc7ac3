use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Most messages one `!delmsg` may recall; the platform's own ceiling
pub const MAX_RECALL_COUNT: u32 = 400;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub yhchat: YhChatConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_memory_config")]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default = "default_monitor_config")]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YhChatConfig {
    /// Bot token used for the open API (send, recall).
    #[serde(default)]
    pub token: String,
    /// Account token used for group management (mute, remove member).
    #[serde(default)]
    pub admin_token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_webhook_path")]
    pub path: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModerationConfig {
    /// Chat whose moderation actions are mirrored to the audit chat.
    #[serde(default)]
    pub main_chat_id: Option<String>,
    #[serde(default)]
    pub audit_chat_id: Option<String>,
    #[serde(default = "default_recall_delay_ms")]
    pub recall_delay_ms: u64,
    #[serde(default = "default_max_delete_count")]
    pub max_delete_count: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_stats_cron")]
    pub stats_cron: String,
}

impl Default for YhChatConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            admin_token: String::new(),
            base_url: default_base_url(),
        }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            main_chat_id: None,
            audit_chat_id: None,
            recall_delay_ms: default_recall_delay_ms(),
            max_delete_count: default_max_delete_count(),
        }
    }
}

impl ModerationConfig {
    pub fn is_main_chat(&self, chat_id: &str) -> bool {
        self.main_chat_id.as_deref() == Some(chat_id)
    }

    pub fn recall_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.recall_delay_ms)
    }
}

fn default_base_url() -> String {
    "https://yhchat.hqycloud.top".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:34436".to_string()
}

fn default_webhook_path() -> String {
    "/yhchat".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    256
}

fn default_db_path() -> PathBuf {
    PathBuf::from("yhguard.db")
}

fn default_recall_delay_ms() -> u64 {
    200
}

fn default_max_delete_count() -> u32 {
    MAX_RECALL_COUNT
}

fn default_stats_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        listen: default_listen(),
        path: default_webhook_path(),
        workers: default_workers(),
        queue_capacity: default_queue_capacity(),
    }
}

fn default_memory_config() -> MemoryConfig {
    MemoryConfig {
        database_path: default_db_path(),
    }
}

fn default_monitor_config() -> MonitorConfig {
    MonitorConfig {
        stats_cron: default_stats_cron(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Parse a config document, apply environment overrides and validate it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("YHCHAT_TOKEN").filter(|v| !v.is_empty()) {
            self.yhchat.token = token;
        }
        if let Some(token) = lookup("YHCHAT_ADMIN_TOKEN").filter(|v| !v.is_empty()) {
            self.yhchat.admin_token = token;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.yhchat.token.is_empty() {
            anyhow::bail!("[yhchat] token is empty (set it in the file or via YHCHAT_TOKEN)");
        }
        if !self.server.path.starts_with('/') {
            anyhow::bail!("[server] path must start with '/'");
        }
        if self.server.workers == 0 {
            anyhow::bail!("[server] workers must be at least 1");
        }
        if self.server.queue_capacity == 0 {
            anyhow::bail!("[server] queue_capacity must be at least 1");
        }
        if !(1..=MAX_RECALL_COUNT).contains(&self.moderation.max_delete_count) {
            anyhow::bail!(
                "[moderation] max_delete_count must be between 1 and {}",
                MAX_RECALL_COUNT
            );
        }
        Ok(())
    }
}
