use std::path::Path;

use config::{Config, ConfigError, Environment, File, Source};
use serde::Deserialize;

/// Prefix of environment overrides, e.g. `TRIPNEST_SERVER__ADDR`.
pub const ENV_PREFIX: &str = "TRIPNEST";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tripnest";

/// Full service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    /// Directory served for paths no API route matches.
    pub static_dir: Option<String>,
    /// Origins allowed to make credentialed cross-origin requests.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
            static_dir: None,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub uri: String,
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Mongodb,
            uri: "mongodb://localhost:27017".to_string(),
            name: "tripnest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Secret the session cookie key is derived from.
    pub session_secret: Option<String>,
    /// Addresses that get the admin role when they register.
    pub admin_emails: Vec<String>,
    pub session_ttl_hours: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_secret: None,
            admin_emails: Vec::new(),
            session_ttl_hours: 168,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Fill empty catalog collections with sample content at startup.
    pub seed: bool,
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.cors_origins")
        .with_list_parse_key("auth.admin_emails")
        .try_parsing(true)
}

impl AppConfig {
    /// Load `path` (or an optional `tripnest.toml`) and apply `TRIPNEST_*`
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_sources(File::from(path).required(true), environment()),
            None => Self::from_sources(
                File::with_name(DEFAULT_CONFIG_FILE).required(false),
                environment(),
            ),
        }
    }

    fn from_sources<S>(file: S, env: Environment) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load(toml: &str, vars: &[(&str, &str)]) -> AppConfig {
        let env = environment().source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        AppConfig::from_sources(File::from_str(toml, FileFormat::Toml), env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = load("", &[]);
        assert_eq!(cfg.server.addr, "127.0.0.1:3000");
        assert!(cfg.server.static_dir.is_none());
        assert_eq!(cfg.database.backend, DatabaseBackend::Mongodb);
        assert_eq!(cfg.database.uri, "mongodb://localhost:27017");
        assert_eq!(cfg.database.name, "tripnest");
        assert_eq!(cfg.auth.session_ttl_hours, 168);
        assert!(cfg.auth.session_secret.is_none());
        assert!(!cfg.demo.seed);
    }

    #[test]
    fn test_file_values() {
        let cfg = load(
            r#"
            [server]
            addr = "0.0.0.0:8080"
            static_dir = "public"
            cors_origins = ["https://tripnest.example"]

            [database]
            backend = "memory"

            [auth]
            admin_emails = ["ops@tripnest.example"]
            session_ttl_hours = 12

            [demo]
            seed = true
            "#,
            &[],
        );
        assert_eq!(cfg.server.addr, "0.0.0.0:8080");
        assert_eq!(cfg.server.static_dir.as_deref(), Some("public"));
        assert_eq!(cfg.server.cors_origins, vec!["https://tripnest.example"]);
        assert_eq!(cfg.database.backend, DatabaseBackend::Memory);
        assert_eq!(cfg.database.name, "tripnest");
        assert_eq!(cfg.auth.admin_emails, vec!["ops@tripnest.example"]);
        assert_eq!(cfg.auth.session_ttl_hours, 12);
        assert!(cfg.demo.seed);
    }

    #[test]
    fn test_environment_overrides_file() {
        let cfg = load(
            "[database]\nname = \"from-file\"\n",
            &[
                ("TRIPNEST_DATABASE__NAME", "from-env"),
                ("TRIPNEST_AUTH__SESSION_SECRET", "s3cret-value"),
                ("TRIPNEST_AUTH__ADMIN_EMAILS", "a@example.com,b@example.com"),
                ("TRIPNEST_AUTH__SESSION_TTL_HOURS", "24"),
            ],
        );
        assert_eq!(cfg.database.name, "from-env");
        assert_eq!(cfg.auth.session_secret.as_deref(), Some("s3cret-value"));
        assert_eq!(cfg.auth.admin_emails, vec!["a@example.com", "b@example.com"]);
        assert_eq!(cfg.auth.session_ttl_hours, 24);
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let env = environment().source(Some(Default::default()));
        let result = AppConfig::from_sources(
            File::from_str("[database]\nbackend = \"sqlite\"\n", FileFormat::Toml),
            env,
        );
        assert!(result.is_err());
    }
}
