use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// The hosting surface is served over HTTPS; every request must be too.
    pub secure_context: bool,
    pub storage_path: PathBuf,
    pub request_timeout: Duration,
    pub device_name: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let api_url = env_or("QUICKLEDGER_API_URL", DEFAULT_API_URL);

        let secure_context = match std::env::var("QUICKLEDGER_SECURE_CONTEXT").ok() {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| format!("Invalid QUICKLEDGER_SECURE_CONTEXT: '{raw}'"))?,
            None => api_url.trim().to_ascii_lowercase().starts_with("https://"),
        };

        let storage_path = PathBuf::from(env_or(
            "QUICKLEDGER_STORAGE_PATH",
            ".quickledger/storage.json",
        ));

        let timeout_secs: u64 = env_or("QUICKLEDGER_REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .map_err(|e| format!("Invalid QUICKLEDGER_REQUEST_TIMEOUT_SECS: {e}"))?;

        let device_name = env_or("QUICKLEDGER_DEVICE_NAME", "quickledger-client");
        let log_level = env_or("QUICKLEDGER_LOG_LEVEL", "info");

        Ok(Config {
            api_url,
            secure_context,
            storage_path,
            request_timeout: Duration::from_secs(timeout_secs),
            device_name,
            log_level,
        })
    }

    /// Configuration pointing at `api_url` with every other setting at its default.
    pub fn for_api(api_url: impl Into<String>) -> Self {
        Config {
            api_url: api_url.into(),
            secure_context: false,
            storage_path: PathBuf::from(".quickledger/storage.json"),
            request_timeout: Duration::from_secs(30),
            device_name: "quickledger-client".to_string(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
