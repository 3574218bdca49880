use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Entity store
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Game defaults
    pub default_confirmed_winners_only: bool,
    pub default_display_as_grid: bool,

    // CORS
    pub cors_allowed_origins: String,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| {
            let normalized = v.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "7071".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL").ok(),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            default_confirmed_winners_only: env_flag("DEFAULT_CONFIRMED_WINNERS_ONLY", true),
            default_display_as_grid: env_flag("DEFAULT_DISPLAY_AS_GRID", true),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.database_url {
            if url.trim().is_empty() {
                anyhow::bail!("DATABASE_URL is set but empty");
            }
        }
        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be > 0");
        }

        if self.database_url.is_none() && !self.is_development() {
            tracing::warn!(
                "No DATABASE_URL in {} environment; data will not survive a restart",
                self.environment
            );
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    /// `(confirmed_winners_only, display_as_grid)` applied to new games.
    pub fn game_defaults(&self) -> (bool, bool) {
        (self.default_confirmed_winners_only, self.default_display_as_grid)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 7071,
        environment: "test".to_string(),
        database_url: None,
        database_max_connections: 1,
        default_confirmed_winners_only: true,
        default_display_as_grid: true,
        cors_allowed_origins: "*".to_string(),
    }
}
