//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::session::SubscriberConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Session endpoints as host:port pairs, tried in order
    pub servers: Vec<String>,

    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Authorization configuration
    pub auth: AuthConfig,

    /// Subscription configuration
    pub subscription: SubscriptionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Authorization mode: none, user, dir=<property>, app=<name>,
    /// userapp=<name> or manual=<name,ip,user>
    pub mode: String,

    /// PKCS#12 client credentials file
    pub tls_client_credentials: Option<String>,

    /// Password for the client credentials file
    pub tls_client_credentials_password: Option<String>,

    /// PKCS#7 trust material file
    pub tls_trust_material: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// Service the topics live under
    pub service: String,

    /// Topics to subscribe to
    pub topics: Vec<String>,

    /// Fields requested per topic
    pub fields: Vec<String>,

    /// Poll timeout in milliseconds before an empty poll yields a timeout event
    pub poll_timeout_ms: u64,

    /// Ticks to print before the session stops itself
    pub max_ticks: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Absolute or relative path to the log file
    pub file_path: String,
}

/// Parsed authorization mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    None,
    User,
    Directory(String),
    Application(String),
    UserApplication(String),
    Manual { app: String, ip: String, user: String },
}

impl AuthMode {
    /// Parses the `auth.mode` grammar.
    pub fn parse(input: &str) -> Result<Self> {
        if let Some(property) = input.strip_prefix("dir=") {
            if property.is_empty() {
                anyhow::bail!("dir= authorization needs a directory property");
            }
            return Ok(Self::Directory(property.to_string()));
        }
        if let Some(app) = input.strip_prefix("app=") {
            if app.is_empty() {
                anyhow::bail!("app= authorization needs an application name");
            }
            return Ok(Self::Application(app.to_string()));
        }
        if let Some(app) = input.strip_prefix("userapp=") {
            if app.is_empty() {
                anyhow::bail!("userapp= authorization needs an application name");
            }
            return Ok(Self::UserApplication(app.to_string()));
        }
        if let Some(triple) = input.strip_prefix("manual=") {
            let parts: Vec<&str> = triple.split(',').map(str::trim).collect();
            match parts.as_slice() {
                [app, ip, user] if !app.is_empty() && !ip.is_empty() && !user.is_empty() => {
                    return Ok(Self::Manual {
                        app: app.to_string(),
                        ip: ip.to_string(),
                        user: user.to_string(),
                    });
                }
                _ => anyhow::bail!("manual= authorization needs <app,ip,user>"),
            }
        }
        match input {
            "none" => Ok(Self::None),
            "user" => Ok(Self::User),
            other => anyhow::bail!("invalid authorization mode: {}", other),
        }
    }

    /// Principal string presented to the feed for authorization.
    pub fn principal(&self) -> String {
        let logon = || env::var("USER").unwrap_or_else(|_| "session-user".to_string());
        match self {
            Self::None => "anonymous".to_string(),
            Self::User => logon(),
            Self::Directory(property) => format!("dir:{}", property),
            Self::Application(app) => format!("app:{}", app),
            Self::UserApplication(app) => format!("{}+app:{}", logon(), app),
            Self::Manual { app, ip, user } => format!("{}@{}+app:{}", user, ip, app),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: vec!["localhost:8194".to_string()],
            log_level: "info".to_string(),
            log: LogConfig::default(),
            auth: AuthConfig::default(),
            subscription: SubscriptionConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: "none".to_string(),
            tls_client_credentials: None,
            tls_client_credentials_password: None,
            tls_trust_material: None,
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            service: "//sim/mktdata".to_string(),
            topics: vec!["AAPL".to_string(), "MSFT".to_string()],
            fields: vec![
                "LAST_PRICE".to_string(),
                "BID".to_string(),
                "ASK".to_string(),
            ],
            poll_timeout_ms: 500,
            max_ticks: 8,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/tickroute.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // TICKROUTE_SERVERS - comma-separated list of host:port pairs
        if let Ok(servers) = env::var("TICKROUTE_SERVERS") {
            self.servers = split_list(&servers);
        }

        // TICKROUTE_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("TICKROUTE_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // TICKROUTE_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("TICKROUTE_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // TICKROUTE_AUTH_MODE - authorization mode
        if let Ok(mode) = env::var("TICKROUTE_AUTH_MODE") {
            self.auth.mode = mode;
        }

        // TICKROUTE_SERVICE - service name
        if let Ok(service) = env::var("TICKROUTE_SERVICE") {
            self.subscription.service = service;
        }

        // TICKROUTE_TOPICS - comma-separated list of topics
        if let Ok(topics) = env::var("TICKROUTE_TOPICS") {
            self.subscription.topics = split_list(&topics);
        }

        // TICKROUTE_FIELDS - comma-separated list of fields
        if let Ok(fields) = env::var("TICKROUTE_FIELDS") {
            self.subscription.fields = split_list(&fields);
        }

        // TICKROUTE_POLL_TIMEOUT_MS - poll timeout
        if let Ok(timeout) = env::var("TICKROUTE_POLL_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.subscription.poll_timeout_ms = value;
            }
        }

        // TICKROUTE_MAX_TICKS - tick budget
        if let Ok(ticks) = env::var("TICKROUTE_MAX_TICKS") {
            if let Ok(value) = ticks.parse::<u64>() {
                self.subscription.max_ticks = value;
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            anyhow::bail!("At least one server must be specified");
        }
        for server in &self.servers {
            validate_server(server)?;
        }

        AuthMode::parse(&self.auth.mode)?;

        let tls_parts = [
            &self.auth.tls_client_credentials,
            &self.auth.tls_client_credentials_password,
            &self.auth.tls_trust_material,
        ];
        let tls_set = tls_parts.iter().filter(|part| part.is_some()).count();
        if tls_set != 0 && tls_set != tls_parts.len() {
            anyhow::bail!(
                "TLS requires credentials, password and trust material together"
            );
        }

        if !self.subscription.service.starts_with("//") {
            anyhow::bail!(
                "Service name must look like //namespace/service: {}",
                self.subscription.service
            );
        }

        if self.subscription.topics.is_empty() {
            anyhow::bail!("At least one topic must be specified");
        }

        if self.subscription.fields.is_empty() {
            anyhow::bail!("At least one field must be specified");
        }

        if self.subscription.poll_timeout_ms == 0 {
            anyhow::bail!("Poll timeout must be greater than 0");
        }

        if self.subscription.max_ticks == 0 {
            anyhow::bail!("Tick budget must be greater than 0");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        Ok(())
    }

    /// Session settings derived from this configuration.
    pub fn subscriber_config(&self) -> Result<SubscriberConfig> {
        let auth = AuthMode::parse(&self.auth.mode)?;
        Ok(SubscriberConfig {
            service: self.subscription.service.clone(),
            topics: self.subscription.topics.clone(),
            fields: self.subscription.fields.clone(),
            principal: auth.principal(),
            poll_timeout: Duration::from_millis(self.subscription.poll_timeout_ms),
            max_ticks: self.subscription.max_ticks,
        })
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        println!("Current configuration:");
        println!("{:#?}", self);
        Ok(())
    }

    /// Display configuration management help
    pub fn display_help() -> Result<()> {
        println!("Configuration management commands:");
        println!("  tickroute config show - Show current configuration");
        println!("  tickroute config init - Write the default configuration file");
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(action: &Option<crate::cli::ConfigAction>, path: &str) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) => {
                let config = Config::load_or_default(path);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Init { force }) => {
                if Path::new(path).exists() && !force {
                    anyhow::bail!("{} already exists, pass --force to overwrite", path);
                }
                let config = Config::default();
                config.save_to_file(path)?;
                println!("Wrote default configuration to {}", path);
            }
            None => {
                Config::display_help()?;
            }
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn validate_server(server: &str) -> Result<()> {
    let Some((host, port)) = server.rsplit_once(':') else {
        anyhow::bail!("Server must be host:port, got: {}", server);
    };
    if host.is_empty() {
        anyhow::bail!("Server host must not be empty: {}", server);
    }
    port.parse::<u16>()
        .with_context(|| format!("Invalid server port in: {}", server))?;
    Ok(())
}
