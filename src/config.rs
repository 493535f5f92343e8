use std::env;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Things registry
    pub things_url: String,
    pub oauth2_token_url: String,
    pub oauth2_client_id: String,
    pub oauth2_client_secret: String,
    pub things_cache_ttl_seconds: u64,
    pub things_cache_sweep_seconds: u64,
    pub things_request_timeout_seconds: u64,

    // Messaging
    pub nats_url: String,
    pub processing_timeout_seconds: u64,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Application metadata
    pub deployment: Deployment,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Things registry
            things_url: env::var("THINGS_URL")
                .unwrap_or_else(|_| "http://iot-things:8080".to_string()),
            oauth2_token_url: env::var("OAUTH2_TOKEN_URL").unwrap_or_default(),
            oauth2_client_id: env::var("OAUTH2_CLIENT_ID").unwrap_or_default(),
            oauth2_client_secret: env::var("OAUTH2_CLIENT_SECRET").unwrap_or_default(),
            things_cache_ttl_seconds: env::var("THINGS_CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            things_cache_sweep_seconds: env::var("THINGS_CACHE_SWEEP_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            things_request_timeout_seconds: env::var("THINGS_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Messaging
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
            processing_timeout_seconds: env::var("PROCESSING_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Client credentials are only used when a token endpoint is configured.
    #[must_use]
    pub fn has_oauth2(&self) -> bool {
        !self.oauth2_token_url.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
