use dotenvy::dotenv;
use log::LevelFilter;
use reqwest::Url;
use std::net::IpAddr;
use std::str::FromStr;

/// Load environment variables from a .env file.
pub fn load_env() {
    // Load .env file, ignore errors if file not found.
    dotenv().ok();
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TELEGRAM_TOKEN (or BOT_TOKEN) is not set")]
    MissingToken,

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("USE_POLLING is off but WEBHOOK_URL is not set")]
    MissingWebhookUrl,

    #[error("WEBHOOK_URL path {0:?} collides with the status routes")]
    WebhookPath(String),
}

/// How updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    Polling,
    /// Telegram pushes updates to this public URL.
    Webhook(Url),
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Polling => "polling",
            UpdateMode::Webhook(_) => "webhook",
        }
    }
}

/// Runtime settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub token: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_file: String,
    pub log_level: LevelFilter,
    pub mode: UpdateMode,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = ["TELEGRAM_TOKEN", "BOT_TOKEN"]
            .into_iter()
            .filter_map(&lookup)
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        Ok(Config {
            token,
            host: parse_or(&lookup, "HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&lookup, "PORT", 5000)?,
            log_file: lookup("LOG_FILE_PATH").unwrap_or_else(|| "logs/bot.log".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", LevelFilter::Info)?,
            mode: update_mode(&lookup)?,
        })
    }
}

/// Webhook when `WEBHOOK_URL` is set, unless `USE_POLLING` says otherwise.
fn update_mode<F>(lookup: &F) -> Result<UpdateMode, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let webhook_url = lookup("WEBHOOK_URL").filter(|v| !v.trim().is_empty());
    let use_polling = match lookup("USE_POLLING") {
        Some(flag) => matches!(flag.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t"),
        None => webhook_url.is_none(),
    };
    if use_polling {
        return Ok(UpdateMode::Polling);
    }

    let value = webhook_url.ok_or(ConfigError::MissingWebhookUrl)?;
    let url: Url = value.trim().parse().map_err(|_| ConfigError::Invalid {
        name: "WEBHOOK_URL",
        value: value.clone(),
    })?;
    // The webhook route shares a router with `/` and `/status`.
    if matches!(url.path(), "/" | "/status") {
        return Err(ConfigError::WebhookPath(url.path().to_string()));
    }
    Ok(UpdateMode::Webhook(url))
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
