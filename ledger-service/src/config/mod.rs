use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use service_core::config::{env_or, env_parse_or, require_env};

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env_or("LEDGER_SERVICE_HOST", "0.0.0.0");
        let port = env_parse_or("LEDGER_SERVICE_PORT", 3006);

        let db_url = require_env("LEDGER_DATABASE_URL")?;
        let max_connections = env_parse_or("LEDGER_DATABASE_MAX_CONNECTIONS", 10);
        let min_connections = env_parse_or("LEDGER_DATABASE_MIN_CONNECTIONS", 1);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            service_name: "ledger-service".to_string(),
        })
    }
}
