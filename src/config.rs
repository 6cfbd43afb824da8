use tracing::Level;

use crate::signaling::LabelPolicy;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address. Defaults to 0.0.0.0:8080.
    pub addr: String,
    /// Logging level. Defaults to info.
    pub log_level: Level,
    /// Non-empty ENVIRONMENT means production log formatting.
    pub production: bool,
    /// How target/from labels on routed messages are treated.
    pub label_policy: LabelPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("LOG_LEVEL")
            .map(|value| parse_log_level(&value))
            .unwrap_or(Level::INFO);

        let production = std::env::var("ENVIRONMENT")
            .map(|value| !value.is_empty())
            .unwrap_or(false);

        let addr = std::env::var("SERVER_ADDR")
            .ok()
            .filter(|value| !value.is_empty())
            .map(|value| normalize_addr(&value))
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let label_policy = std::env::var("ROUTE_LABEL_POLICY")
            .map(|value| LabelPolicy::parse(&value))
            .unwrap_or_default();

        Self {
            addr,
            log_level,
            production,
            label_policy,
        }
    }
}

fn parse_log_level(value: &str) -> Level {
    match value.to_ascii_lowercase().as_str() {
        "debug" | "dbg" | "d" => Level::DEBUG,
        "info" | "information" | "i" => Level::INFO,
        "warn" | "warning" | "w" => Level::WARN,
        "error" | "err" | "e" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Accept Go-style ":8080" listen addresses by pinning them to all
/// interfaces.
fn normalize_addr(value: &str) -> String {
    if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    }
}
