use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use crate::error::ConfigError;

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// Where and how the poll client talks to the server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub request_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl ClientConfig {
    pub fn for_base_url(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        let socket_url = socket_url_for(&api_base_url);

        ClientConfig {
            api_base_url,
            socket_url,
            request_timeout: Duration::from_secs(10),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(5),
        }
    }

    /// Reads `LIVE_POLL_API_URL`, `LIVE_POLL_SOCKET_URL` and
    /// `LIVE_POLL_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ClientConfig::for_base_url(
            env::var("LIVE_POLL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        );

        if let Ok(socket_url) = env::var("LIVE_POLL_SOCKET_URL") {
            config.socket_url = socket_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64>("LIVE_POLL_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn polls_url(&self) -> String {
        format!("{}/api/polls", self.api_base_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::for_base_url(DEFAULT_API_URL)
    }
}

/// Settings of the in-memory poll server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub frontend_base_url: String,
    pub cors_origins: Vec<String>,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub secret_key: String,
    pub ip_hash_salt: String,
    pub room_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            frontend_base_url: DEFAULT_FRONTEND_URL.to_string(),
            cors_origins: vec![DEFAULT_FRONTEND_URL.to_string()],
            cookie_name: "appylo_voter".to_string(),
            cookie_secure: false,
            secret_key: "dev-secret-key".to_string(),
            ip_hash_salt: "dev-ip-salt".to_string(),
            room_buffer: 100,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ServerConfig::default();

        if let Some(addr) = parse_var::<SocketAddr>("BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Ok(url) = env::var("FRONTEND_BASE_URL") {
            config.frontend_base_url = url.trim_end_matches('/').to_string();
        }
        config.cors_origins = match env::var("CORS_ORIGINS") {
            Ok(origins) => parse_origins(&origins),
            Err(_) => vec![config.frontend_base_url.clone()],
        };
        if let Ok(name) = env::var("COOKIE_NAME") {
            config.cookie_name = name;
        }
        if let Ok(value) = env::var("COOKIE_SECURE") {
            config.cookie_secure = as_bool(&value);
        }
        if let Ok(secret) = env::var("SECRET_KEY") {
            config.secret_key = secret;
        }
        if let Ok(salt) = env::var("IP_HASH_SALT") {
            config.ip_hash_salt = salt;
        }
        if let Some(buffer) = parse_var::<usize>("ROOM_BUFFER")? {
            config.room_buffer = buffer.max(1);
        }

        Ok(config)
    }

    pub fn share_url(&self, poll_id: &str) -> String {
        format!("{}/poll/{}", self.frontend_base_url, poll_id)
    }
}

fn socket_url_for(api_base_url: &str) -> String {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        format!("{api_base_url}/ws")
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}

fn as_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
