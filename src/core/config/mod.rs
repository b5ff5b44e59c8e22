use anyhow::{anyhow, bail, Context};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::tickets::notices::DEFAULT_WELCOME_IMAGE;
use crate::tickets::{TicketSettings, TicketThresholds};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tickets: TicketSettings,
}

#[derive(Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub welcome_channel_id: String,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("welcome_channel_id", &self.welcome_channel_id)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub ticket_file: PathBuf,
    pub services_file: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set"));

        let discord = DiscordConfig {
            token: required("DISCORD_TOKEN")?,
            welcome_channel_id: required("WELCOME_CHANNEL_ID")?,
        };

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 3000)?,
        };

        let storage = StorageConfig {
            ticket_file: get("TICKET_FILE")
                .unwrap_or_else(|| "./tickets.json".to_string())
                .into(),
            services_file: get("SERVICES_FILE")
                .unwrap_or_else(|| "./services.json".to_string())
                .into(),
        };

        let defaults = TicketThresholds::default();
        let thresholds = TicketThresholds {
            warning: secs_or(get("TICKET_WARNING_SECS"), "TICKET_WARNING_SECS", defaults.warning)?,
            expiry: secs_or(get("TICKET_EXPIRY_SECS"), "TICKET_EXPIRY_SECS", defaults.expiry)?,
            inactivity: secs_or(
                get("TICKET_INACTIVITY_SECS"),
                "TICKET_INACTIVITY_SECS",
                defaults.inactivity,
            )?,
            sweep_interval: secs_or(
                get("TICKET_SWEEP_SECS"),
                "TICKET_SWEEP_SECS",
                defaults.sweep_interval,
            )?,
        };
        if thresholds.warning >= thresholds.expiry {
            bail!(
                "TICKET_WARNING_SECS ({}) must be lower than TICKET_EXPIRY_SECS ({})",
                thresholds.warning.as_secs(),
                thresholds.expiry.as_secs()
            );
        }
        if thresholds.sweep_interval.is_zero() {
            bail!("TICKET_SWEEP_SECS must be greater than zero");
        }

        let tickets = TicketSettings {
            thresholds,
            category: get("TICKET_CATEGORY").unwrap_or_else(|| "Tickets".to_string()),
            entry_channel_id: Some(discord.welcome_channel_id.clone()),
            welcome_image_url: match get("WELCOME_IMAGE_URL") {
                Some(url) if url.eq_ignore_ascii_case("none") => None,
                Some(url) => Some(url),
                None => Some(DEFAULT_WELCOME_IMAGE.to_string()),
            },
        };

        Ok(AppConfig {
            discord,
            server,
            storage,
            tickets,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

fn secs_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration, anyhow::Error> {
    parse_or(value, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, anyhow::Error> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("DISCORD_TOKEN", "abc"), ("WELCOME_CHANNEL_ID", "42")];

    #[test]
    fn test_defaults() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.ticket_file, PathBuf::from("./tickets.json"));
        assert_eq!(config.tickets.category, "Tickets");
        assert_eq!(config.tickets.entry_channel_id.as_deref(), Some("42"));
        assert_eq!(config.tickets.thresholds.expiry, Duration::from_secs(86_400));
        assert_eq!(config.tickets.thresholds.warning, Duration::from_secs(82_800));
        assert_eq!(config.tickets.thresholds.inactivity, Duration::from_secs(43_200));
        assert_eq!(config.tickets.thresholds.sweep_interval, Duration::from_secs(900));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let err = config(&[("WELCOME_CHANNEL_ID", "42")]).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn test_overrides_and_validation() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("PORT", "8080"), ("TICKET_EXPIRY_SECS", "120"), ("TICKET_WARNING_SECS", "60")]);
        let cfg = config(&pairs).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.tickets.thresholds.warning_lead(), Duration::from_secs(60));

        let mut bad = REQUIRED.to_vec();
        bad.push(("TICKET_WARNING_SECS", "90000"));
        assert!(config(&bad).is_err());

        let mut garbage = REQUIRED.to_vec();
        garbage.push(("PORT", "eighty"));
        assert!(config(&garbage)
            .unwrap_err()
            .to_string()
            .contains("PORT"));
    }

    #[test]
    fn test_welcome_image_defaults_to_banner() {
        let cfg = config(&REQUIRED).unwrap();
        assert_eq!(cfg.tickets.welcome_image_url.as_deref(), Some(DEFAULT_WELCOME_IMAGE));

        let mut custom = REQUIRED.to_vec();
        custom.push(("WELCOME_IMAGE_URL", "https://example.com/banner.png"));
        let cfg = config(&custom).unwrap();
        assert_eq!(
            cfg.tickets.welcome_image_url.as_deref(),
            Some("https://example.com/banner.png")
        );

        let mut disabled = REQUIRED.to_vec();
        disabled.push(("WELCOME_IMAGE_URL", "none"));
        assert!(config(&disabled).unwrap().tickets.welcome_image_url.is_none());
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let config = config(&REQUIRED).unwrap();
        assert!(!format!("{:?}", config.discord).contains("abc"));
    }
}
