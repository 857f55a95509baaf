use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Gateway endpoint used when `CRAWLKIT_GATEWAY_BASE_URL` is unset.
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.proxycrawl.com/";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let env = parse_environment(&or_default("CRAWLKIT_ENV", "development"))?;
    let log_level = or_default("CRAWLKIT_LOG_LEVEL", "info");

    let proxy_manager_url = require("CRAWLKIT_PROXY_MANAGER_URL")?;
    validate_http_url("CRAWLKIT_PROXY_MANAGER_URL", &proxy_manager_url)?;

    let session_manager_url = or_default("CRAWLKIT_SESSION_MANAGER_URL", &proxy_manager_url);
    validate_http_url("CRAWLKIT_SESSION_MANAGER_URL", &session_manager_url)?;

    let gateway_base_url = or_default("CRAWLKIT_GATEWAY_BASE_URL", DEFAULT_GATEWAY_BASE_URL);
    validate_http_url("CRAWLKIT_GATEWAY_BASE_URL", &gateway_base_url)?;

    let gateway_api_token = lookup("CRAWLKIT_GATEWAY_API_TOKEN").ok();
    let gateway_js_token = lookup("CRAWLKIT_GATEWAY_JS_TOKEN").ok();

    let rpc_connect_timeout_secs = parse_u64("CRAWLKIT_RPC_CONNECT_TIMEOUT_SECS", "10")?;
    let rpc_max_dial_attempts = parse_u32("CRAWLKIT_RPC_MAX_DIAL_ATTEMPTS", "3")?;
    if rpc_max_dial_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CRAWLKIT_RPC_MAX_DIAL_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let rpc_max_backoff_ms = parse_u64("CRAWLKIT_RPC_MAX_BACKOFF_MS", "1000")?;
    let transport_timeout_secs = parse_u64("CRAWLKIT_TRANSPORT_TIMEOUT_SECS", "330")?;
    let user_agent = or_default("CRAWLKIT_USER_AGENT", "crawlkit/0.1 (dispatch)");

    Ok(AppConfig {
        env,
        log_level,
        proxy_manager_url,
        session_manager_url,
        gateway_base_url,
        gateway_api_token,
        gateway_js_token,
        rpc_connect_timeout_secs,
        rpc_max_dial_attempts,
        rpc_max_backoff_ms,
        transport_timeout_secs,
        user_agent,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for unrecognized values so a typo
/// such as `"producton"` does not silently run with development settings.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CRAWLKIT_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

/// Only `http://` and `https://` service addresses are accepted.
fn validate_http_url(var: &str, raw: &str) -> Result<(), ConfigError> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("\"{raw}\" is not an http(s) URL"),
        })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
