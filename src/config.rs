use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // These fields are populated from the .env file
    pub database_path: String,
    pub database_name: String,
    pub template_dir: String,
    pub static_dir: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub password_hash_cost: u32,
}

fn fatal(message: impl Into<String>) -> config::ConfigError {
    config::ConfigError::Message(format!("FATAL: {}", message.into()))
}

impl Config {
    /// Loads the given .env file into the process environment and builds the config from it.
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            fatal(format!(
                "Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup, layered over `config/default.toml`.
    pub fn from_vars<F>(var: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = var("DATABASE_PATH").ok_or_else(|| {
            fatal("Environment variable 'DATABASE_PATH' is not set in your .env file.")
        })?;

        if Path::new(&database_path).is_relative() {
            return Err(fatal(format!(
                "The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        let database_name = var("DATABASE_NAME").unwrap_or_else(|| "blog".to_string());
        if database_name.is_empty()
            || !database_name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(fatal(
                "'DATABASE_NAME' must not be empty and can only contain letters, numbers, underscores, and hyphens.",
            ));
        }

        let session_secret_key = var("SESSION_SECRET_KEY").ok_or_else(|| {
            fatal("Environment variable 'SESSION_SECRET_KEY' is not set in your .env file.")
        })?;

        // 128 hex characters decode to the 64 bytes the cookie key needs.
        if session_secret_key.len() != 128
            || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(fatal(
                "'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).",
            ));
        }

        let template_dir = var("TEMPLATE_DIR").unwrap_or_else(|| "templates".to_string());
        let static_dir = var("STATIC_DIR").unwrap_or_else(|| "static".to_string());
        let log_level = var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let use_secure_cookies = var("USE_SECURE_COOKIES")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let builder = config::Config::builder()
            .set_default("web.host", "127.0.0.1")?
            .set_default("web.port", 8000_i64)?
            .set_default("password_hash_cost", i64::from(bcrypt::DEFAULT_COST))?
            // Base settings (web host/port, hashing cost) come from the TOML file when present.
            .add_source(
                config::File::new("config/default.toml", config::FileFormat::Toml).required(false),
            )
            .set_override("database_path", database_path)?
            .set_override("database_name", database_name)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("template_dir", template_dir)?
            .set_override("static_dir", static_dir)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .build()?;

        builder.try_deserialize()
    }

    /// Returns the full path to the SQLite database file.
    pub fn database_file(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join(format!("{}.db", self.database_name))
    }

    pub fn template_glob(&self) -> String {
        format!("{}/**/*.html", self.template_dir.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_vars() -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        vars.insert("DATABASE_PATH", "/var/lib/blogapp".to_string());
        vars.insert("SESSION_SECRET_KEY", "ab".repeat(64));
        vars
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<Config, config::ConfigError> {
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = load(&valid_vars()).expect("valid config should load");
        assert_eq!(config.database_name, "blog");
        assert_eq!(config.template_dir, "templates");
        assert_eq!(config.log_level, "info");
        assert!(!config.use_secure_cookies);
        assert_eq!(config.database_file(), PathBuf::from("/var/lib/blogapp/blog.db"));
    }

    #[test]
    fn test_missing_database_path_is_rejected() {
        let mut vars = valid_vars();
        vars.remove("DATABASE_PATH");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_relative_database_path_is_rejected() {
        let mut vars = valid_vars();
        vars.insert("DATABASE_PATH", "data/db".to_string());
        let err = load(&vars).unwrap_err().to_string();
        assert!(err.contains("relative path"), "unexpected error: {}", err);
    }

    #[test]
    fn test_short_session_key_is_rejected() {
        let mut vars = valid_vars();
        vars.insert("SESSION_SECRET_KEY", "abcd".to_string());
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_non_hex_session_key_is_rejected() {
        let mut vars = valid_vars();
        vars.insert("SESSION_SECRET_KEY", "zz".repeat(64));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_database_name_must_be_a_plain_file_stem() {
        let mut vars = valid_vars();
        vars.insert("DATABASE_NAME", "../escape".to_string());
        assert!(load(&vars).is_err());

        vars.insert("DATABASE_NAME", "posts_prod".to_string());
        let config = load(&vars).expect("plain name should load");
        assert_eq!(config.database_file(), PathBuf::from("/var/lib/blogapp/posts_prod.db"));
    }

    #[test]
    fn test_secure_cookie_flag_is_parsed() {
        let mut vars = valid_vars();
        vars.insert("USE_SECURE_COOKIES", "true".to_string());
        assert!(load(&vars).unwrap().use_secure_cookies);

        vars.insert("USE_SECURE_COOKIES", "not-a-bool".to_string());
        assert!(!load(&vars).unwrap().use_secure_cookies);
    }
}
