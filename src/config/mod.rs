use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub deletion: DeletionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which `DocumentStore` implementation backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Some(StoreBackend::Postgres),
            "memory" | "mem" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
    pub enable_slow_query_warning: bool,
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub default_page_limit: u64,
    pub max_page_limit: u64,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    /// Maximum number of dependency levels a cascade may walk
    pub max_cascade_depth: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_BACKEND") {
            self.database.backend = StoreBackend::parse(&v).unwrap_or(self.database.backend);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_SLOW_QUERY_WARNING") {
            self.database.enable_slow_query_warning = v.parse().unwrap_or(self.database.enable_slow_query_warning);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // API overrides
        if let Some(port) = env::var("EVENTMASTER_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_LIMIT") {
            self.api.default_page_limit = v.parse().unwrap_or(self.api.default_page_limit);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_LIMIT") {
            self.api.max_page_limit = v.parse().unwrap_or(self.api.max_page_limit);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }

        // Deletion overrides
        if let Ok(v) = env::var("DELETION_MAX_CASCADE_DEPTH") {
            self.deletion.max_cascade_depth = v.parse().unwrap_or(self.deletion.max_cascade_depth);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 100,
            },
            api: ApiConfig {
                port: 3000,
                default_page_limit: 10,
                max_page_limit: 1000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "eventmaster-development-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                bcrypt_cost: 4,
            },
            deletion: DeletionConfig { max_cascade_depth: 32 },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 500,
            },
            api: ApiConfig {
                port: 3000,
                default_page_limit: 10,
                max_page_limit: 500,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                bcrypt_cost: 10,
            },
            deletion: DeletionConfig { max_cascade_depth: 32 },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 1000,
            },
            api: ApiConfig {
                port: 3000,
                default_page_limit: 10,
                max_page_limit: 100,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                bcrypt_cost: 12,
            },
            deletion: DeletionConfig { max_cascade_depth: 16 },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
