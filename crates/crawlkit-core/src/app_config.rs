#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide settings for the dispatch clients.
///
/// Service addresses and gateway tokens are supplied by the deployment; the
/// dispatch layer never reads the environment itself.
#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub proxy_manager_url: String,
    pub session_manager_url: String,
    pub gateway_base_url: String,
    pub gateway_api_token: Option<String>,
    pub gateway_js_token: Option<String>,
    pub rpc_connect_timeout_secs: u64,
    pub rpc_max_dial_attempts: u32,
    pub rpc_max_backoff_ms: u64,
    pub transport_timeout_secs: u64,
    pub user_agent: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("proxy_manager_url", &self.proxy_manager_url)
            .field("session_manager_url", &self.session_manager_url)
            .field("gateway_base_url", &self.gateway_base_url)
            .field(
                "gateway_api_token",
                &self.gateway_api_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "gateway_js_token",
                &self.gateway_js_token.as_ref().map(|_| "[redacted]"),
            )
            .field("rpc_connect_timeout_secs", &self.rpc_connect_timeout_secs)
            .field("rpc_max_dial_attempts", &self.rpc_max_dial_attempts)
            .field("rpc_max_backoff_ms", &self.rpc_max_backoff_ms)
            .field("transport_timeout_secs", &self.transport_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
