use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "UFYS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/ufys.toml";
const ENV_PREFIX: &str = "UFYS";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. `UFYS__*` environment variables (a `.env` file is loaded first)
/// 4. Flat deployment variables (`MINIO_*`, `AAAS_ENDPOINT`, `PROXY_URL`)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    apply_flat_env(&mut config, |key| env::var(key).ok());

    Ok(config)
}

/// Apply the flat deployment variables. Secrets only ever come from here.
pub fn apply_flat_env<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(access_key) = lookup("MINIO_ACCESS_KEY") {
        config.storage.access_key = Some(access_key);
    }
    if let Some(secret_key) = lookup("MINIO_SECRET_KEY") {
        config.storage.secret_key = Some(secret_key);
    }
    if let Some(endpoint) = lookup("MINIO_ENDPOINT") {
        config.storage.endpoint = Some(endpoint);
    }
    if let Some(bucket) = lookup("MINIO_BUCKET") {
        config.storage.bucket = Some(bucket);
    }
    if let Some(secure) = lookup("MINIO_SECURE") {
        config.storage.secure = parse_flag(&secure);
    }
    if let Some(endpoint) = lookup("AAAS_ENDPOINT") {
        config.handlers.aaas_endpoint = Some(endpoint);
    }
    if let Some(proxy) = lookup("PROXY_URL") {
        config.handlers.proxy_url = Some(proxy);
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // UFYS__STORAGE__BUCKET -> storage.bucket
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
