use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    /// Fixed seed for reproducible question draws. Unset in production.
    pub selection_seed: Option<u64>,
    /// Default output directory for bulk exports.
    pub export_dir: Option<String>,
    /// `user:password` protecting `/metrics`.
    pub metrics_auth: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "exams".to_string());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let selection_seed = settings
            .get_string("selection.seed")
            .or_else(|_| env::var("SELECTION_SEED"))
            .ok()
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|e| {
                    config::ConfigError::Message(format!("Invalid SELECTION_SEED '{}': {}", raw, e))
                })
            })
            .transpose()?;

        let export_dir = settings
            .get_string("exports.dir")
            .or_else(|_| env::var("EXPORT_DIR"))
            .ok()
            .filter(|dir| !dir.trim().is_empty());

        let metrics_auth = settings
            .get_string("metrics.auth")
            .or_else(|_| env::var("METRICS_AUTH"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    eprintln!("WARNING: METRICS_AUTH not set, using default credentials");
                }
                "admin:changeme".to_string()
            });

        Ok(Config {
            mongo_uri,
            mongo_database,
            bind_addr,
            selection_seed,
            export_dir,
            metrics_auth,
        })
    }
}
