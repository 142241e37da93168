use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // HTTP server
    pub bind_addr: String,
    pub port: u16,

    // Optional static bearer key gating /api routes
    pub api_key: Option<String>,

    // Export-all result cache
    pub export_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:translations.db?mode=rwc".to_string()),

            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            api_key: std::env::var("API_KEY").ok().filter(|v| !v.is_empty()),

            export_cache_ttl_secs: std::env::var("EXPORT_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        })
    }
}
