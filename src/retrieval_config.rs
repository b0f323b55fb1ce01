//! # Retrieval Configuration Module
//!
//! Configuration for the bot process and for portal retrieval: where the
//! portal lives, how long each stage may take, how page readiness is judged
//! and when a second click on submit is allowed. Values come from the
//! environment, with defaults matching the live portal.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORTAL_URL: &str =
    "https://erp.jnvuiums.in/(S(biolzjtwlrcfmzwwzgs5uj5n))/Exam/Pre_Exam/Exam_ForALL_AdmitCard.aspx#";
pub const DEFAULT_INPUT_SELECTOR: &str = "#txtchallanNo";
pub const DEFAULT_SUBMIT_SELECTOR: &str = "#btnGetResult";
pub const DEFAULT_HEALTH_PORT: u16 = 10000;
pub const DEFAULT_LANGUAGE: &str = "hi";

/// When a freshly navigated page counts as loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Load event fired and the network went quiet
    #[default]
    NetworkIdle,
    /// Load event fired
    Load,
    /// Navigation committed; the selector wait does the rest
    Commit,
}

impl FromStr for WaitStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "networkidle" | "network-idle" | "network_idle" => Ok(WaitStrategy::NetworkIdle),
            "load" => Ok(WaitStrategy::Load),
            "commit" => Ok(WaitStrategy::Commit),
            other => Err(anyhow!("unknown page wait strategy: {other}")),
        }
    }
}

/// Upper bounds for each retrieval stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTimeouts {
    /// Launching the browser (first use) and opening a context
    pub launch: Duration,
    /// Navigation until the form number input is ready
    pub navigation: Duration,
    /// Filling the input
    pub action: Duration,
    /// From the first click on submit until the download completes
    pub download: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            launch: Duration::from_secs(30),
            navigation: Duration::from_secs(60),
            action: Duration::from_secs(10),
            download: Duration::from_secs(30),
        }
    }
}

/// Bounded retry for a submit click the portal did not register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long to wait for a download to start before clicking again.
    /// `None` disables the second click.
    pub reclick_after: Option<Duration>,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self { reclick_after: None }
    }

    /// Window for the first click, if a second click fits in the download budget
    pub fn first_attempt_window(&self, download_budget: Duration) -> Option<Duration> {
        self.reclick_after
            .filter(|window| !window.is_zero() && *window < download_budget)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reclick_after: Some(Duration::from_secs(5)),
        }
    }
}

/// Everything the retriever needs to drive the portal
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub portal_url: String,
    pub input_selector: String,
    pub submit_selector: String,
    pub wait_strategy: WaitStrategy,
    pub timeouts: StageTimeouts,
    pub retry: RetryPolicy,
    /// Where downloaded admit cards are stored while a request is served
    pub download_dir: PathBuf,
    /// Chrome binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            input_selector: DEFAULT_INPUT_SELECTOR.to_string(),
            submit_selector: DEFAULT_SUBMIT_SELECTOR.to_string(),
            wait_strategy: WaitStrategy::default(),
            timeouts: StageTimeouts::default(),
            retry: RetryPolicy::default(),
            download_dir: std::env::temp_dir().join("admit-cards"),
            chrome_path: None,
        }
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub health_port: u16,
    pub default_language: String,
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("BOT_TOKEN"))
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;

        let defaults = RetrievalConfig::default();
        let default_timeouts = StageTimeouts::default();

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}")),
                None => Ok(default),
            }
        };

        let reclick_after = match get("RECLICK_AFTER_SECS") {
            Some(_) => Some(secs("RECLICK_AFTER_SECS", Duration::ZERO)?).filter(|d| !d.is_zero()),
            None => RetryPolicy::default().reclick_after,
        };

        let retrieval = RetrievalConfig {
            portal_url: get("PORTAL_URL").unwrap_or(defaults.portal_url),
            input_selector: get("PORTAL_INPUT_SELECTOR").unwrap_or(defaults.input_selector),
            submit_selector: get("PORTAL_SUBMIT_SELECTOR").unwrap_or(defaults.submit_selector),
            wait_strategy: match get("PAGE_WAIT_STRATEGY") {
                Some(raw) => raw.parse()?,
                None => defaults.wait_strategy,
            },
            timeouts: StageTimeouts {
                launch: secs("LAUNCH_TIMEOUT_SECS", default_timeouts.launch)?,
                navigation: secs("NAVIGATION_TIMEOUT_SECS", default_timeouts.navigation)?,
                action: secs("ACTION_TIMEOUT_SECS", default_timeouts.action)?,
                download: secs("DOWNLOAD_TIMEOUT_SECS", default_timeouts.download)?,
            },
            retry: RetryPolicy { reclick_after },
            download_dir: get("DOWNLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.download_dir),
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
        };

        let health_port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => DEFAULT_HEALTH_PORT,
        };

        Ok(Self {
            bot_token,
            health_port,
            default_language: get("DEFAULT_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            retrieval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert_eq!(config.bot_token, "t");
        assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
        assert_eq!(config.default_language, "hi");
        assert_eq!(config.retrieval.input_selector, "#txtchallanNo");
        assert_eq!(config.retrieval.submit_selector, "#btnGetResult");
        assert_eq!(config.retrieval.wait_strategy, WaitStrategy::NetworkIdle);
        assert_eq!(config.retrieval.timeouts, StageTimeouts::default());
        assert_eq!(config.retrieval.retry.reclick_after, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn test_legacy_token_variable() {
        let config = AppConfig::from_lookup(lookup(&[("BOT_TOKEN", "legacy")])).unwrap();
        assert_eq!(config.bot_token, "legacy");
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("PORT", "8080"),
            ("PAGE_WAIT_STRATEGY", "commit"),
            ("NAVIGATION_TIMEOUT_SECS", "90"),
            ("DOWNLOAD_TIMEOUT_SECS", "45"),
            ("RECLICK_AFTER_SECS", "0"),
            ("DOWNLOAD_DIR", "/var/tmp/cards"),
        ]))
        .unwrap();
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.retrieval.wait_strategy, WaitStrategy::Commit);
        assert_eq!(config.retrieval.timeouts.navigation, Duration::from_secs(90));
        assert_eq!(config.retrieval.timeouts.download, Duration::from_secs(45));
        assert_eq!(config.retrieval.retry.reclick_after, None);
        assert_eq!(config.retrieval.download_dir, PathBuf::from("/var/tmp/cards"));
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(AppConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("PORT", "http")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DOWNLOAD_TIMEOUT_SECS", "-1"),
        ]))
        .is_err());
        assert!(AppConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("PAGE_WAIT_STRATEGY", "domready"),
        ]))
        .is_err());
    }

    #[test]
    fn test_wait_strategy_parsing() {
        assert_eq!("networkidle".parse::<WaitStrategy>().unwrap(), WaitStrategy::NetworkIdle);
        assert_eq!("NetworkIdle".parse::<WaitStrategy>().unwrap(), WaitStrategy::NetworkIdle);
        assert_eq!("load".parse::<WaitStrategy>().unwrap(), WaitStrategy::Load);
        assert_eq!(" commit ".parse::<WaitStrategy>().unwrap(), WaitStrategy::Commit);
    }

    #[test]
    fn test_first_attempt_window() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.first_attempt_window(Duration::from_secs(30)),
            Some(Duration::from_secs(5))
        );
        assert_eq!(policy.first_attempt_window(Duration::from_secs(5)), None);
        assert_eq!(RetryPolicy::disabled().first_attempt_window(Duration::from_secs(30)), None);
    }
}
