//! Startup configuration from environment variables

use crate::translate::{TranslateConfig, DEFAULT_TRANSLATE_URL};
use crate::worker::DEFAULT_PACING;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 21003;
const DEFAULT_CONTROLLER_URL: &str = "http://localhost:21001";

/// Everything the service reads once at startup
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub controller_url: String,
    /// `None` runs without translation
    pub translate: Option<TranslateConfig>,
    pub log_dir: PathBuf,
    pub templates_file: Option<PathBuf>,
    pub pacing: Duration,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let host = var("CHAT_RELAY_HOST")
            .and_then(|h| h.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = var("CHAT_RELAY_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let translate = var("TRANSLATE_API_KEY")
            .filter(|key| !key.is_empty())
            .map(|api_key| TranslateConfig {
                api_key,
                base_url: var("TRANSLATE_URL").unwrap_or_else(|| DEFAULT_TRANSLATE_URL.to_string()),
                proxy: var("TRANSLATE_PROXY").filter(|p| !p.is_empty()),
            });

        let log_dir = var("CHAT_RELAY_LOG_DIR").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chat-relay").join("logs")
            },
            PathBuf::from,
        );

        let pacing = var("CHAT_RELAY_PACING_MS")
            .and_then(|ms| ms.parse().ok())
            .map_or(DEFAULT_PACING, Duration::from_millis);

        Self {
            bind: SocketAddr::new(host, port),
            controller_url: var("CONTROLLER_URL").unwrap_or_else(|| DEFAULT_CONTROLLER_URL.to_string()),
            translate,
            log_dir,
            templates_file: var("CHAT_RELAY_TEMPLATES").map(PathBuf::from),
            pacing,
        }
    }
}
