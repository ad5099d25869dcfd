//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::util::rate_limit::API_RATE_LIMIT;

/// Default browser origin of the AgroFruit web app
pub const DEFAULT_CLIENT_ORIGIN: &str = "https://agrofruit.pages.dev";
/// Default origin of the admin dashboard
pub const DEFAULT_ADMIN_ORIGIN: &str = "https://agro-fruit-enterprises.vercel.app";

/// Which store implementation backs the API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Firebase,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Firebase => "firebase",
            StoreBackend::Memory => "memory",
        }
    }
}

/// Transactional mail API settings
#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Static key expected in the x-api-key header
    pub api_auth_key: String,
    /// Origins allowed on user-facing endpoints
    pub client_origins: Vec<String>,
    /// Origins allowed on the admin listing
    pub admin_origins: Vec<String>,

    pub store_backend: StoreBackend,
    /// Firebase Realtime Database root URL
    pub firebase_database_url: String,
    /// Database secret or access token sent as `auth`
    pub firebase_auth_token: Option<String>,

    /// Paystack secret key (webhook HMAC key)
    pub paystack_secret_key: String,
    /// Paystack public key handed to the browser checkout
    pub paystack_public_key: String,
    /// Moniepoint client secret (webhook HMAC key)
    pub moniepoint_client_secret: String,
    /// Account credited with transfer network fees
    pub network_fee_email: String,

    pub mail: Option<MailConfig>,

    pub rate_limit_rps: u32,
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "firebase".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firebase" => StoreBackend::Firebase,
            "memory" => StoreBackend::Memory,
            _ => return Err(ConfigError::Invalid("STORE_BACKEND")),
        };

        let firebase_database_url = match store_backend {
            StoreBackend::Firebase => env::var("FIREBASE_DATABASE_URL")
                .map_err(|_| ConfigError::Missing("FIREBASE_DATABASE_URL"))?,
            StoreBackend::Memory => env::var("FIREBASE_DATABASE_URL").unwrap_or_default(),
        };

        let mail = match (env::var("MAIL_API_URL"), env::var("MAIL_API_KEY")) {
            (Ok(api_url), Ok(api_key)) => Some(MailConfig {
                api_url,
                api_key,
                from: env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "agrofruitenterprises@gmail.com".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            api_auth_key: env::var("API_AUTH_KEY")
                .map_err(|_| ConfigError::Missing("API_AUTH_KEY"))?,
            client_origins: parse_origins(
                &env::var("CLIENT_ORIGIN").unwrap_or_else(|_| DEFAULT_CLIENT_ORIGIN.to_string()),
            ),
            admin_origins: parse_origins(
                &env::var("ADMIN_ORIGIN").unwrap_or_else(|_| DEFAULT_ADMIN_ORIGIN.to_string()),
            ),

            store_backend,
            firebase_database_url: firebase_database_url.trim_end_matches('/').to_string(),
            firebase_auth_token: env::var("FIREBASE_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),

            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY")
                .map_err(|_| ConfigError::Missing("PAYSTACK_SECRET_KEY"))?,
            paystack_public_key: env::var("PAYSTACK_PUBLIC_KEY").unwrap_or_default(),
            moniepoint_client_secret: env::var("MONIEPOINT_CLIENT_SECRET")
                .map_err(|_| ConfigError::Missing("MONIEPOINT_CLIENT_SECRET"))?,
            network_fee_email: env::var("NETWORK_FEE_EMAIL")
                .map_err(|_| ConfigError::Missing("NETWORK_FEE_EMAIL"))?,

            mail,

            rate_limit_rps: match env::var("RATE_LIMIT_RPS") {
                Ok(v) => v.parse().map_err(|_| ConfigError::Invalid("RATE_LIMIT_RPS"))?,
                Err(_) => API_RATE_LIMIT,
            },
            request_timeout: Duration::from_secs(match env::var("REQUEST_TIMEOUT_SECS") {
                Ok(v) => v
                    .parse()
                    .map_err(|_| ConfigError::Invalid("REQUEST_TIMEOUT_SECS"))?,
                Err(_) => 15,
            }),
        })
    }

    /// Every origin the CORS layer should allow
    pub fn all_origins(&self) -> impl Iterator<Item = &str> {
        self.client_origins
            .iter()
            .chain(self.admin_origins.iter())
            .map(String::as_str)
    }
}

/// Split a comma-separated origin list
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
impl Config {
    /// Fixed configuration for router and handler tests
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            api_auth_key: "test-api-key".to_string(),
            client_origins: vec![DEFAULT_CLIENT_ORIGIN.to_string()],
            admin_origins: vec![DEFAULT_ADMIN_ORIGIN.to_string()],
            store_backend: StoreBackend::Memory,
            firebase_database_url: String::new(),
            firebase_auth_token: None,
            paystack_secret_key: "sk_test_paystack".to_string(),
            paystack_public_key: "pk_test_paystack".to_string(),
            moniepoint_client_secret: "moniepoint-secret".to_string(),
            network_fee_email: "fees@agrofruit.test".to_string(),
            mail: None,
            rate_limit_rps: 1000,
            request_timeout: Duration::from_secs(5),
        }
    }
}
