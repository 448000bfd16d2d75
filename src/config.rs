//! Configuration for the three binaries.
//!
//! Connection settings live in an ini file under [`CONFIG_FOLDER`] with
//! `[kafka]`, `[schema-registry]` and `[postgres]` sections. API keys for the
//! external services come from the environment. Everything is read once at
//! startup and handed to constructors by reference.

use crate::errors::ConfigError;
use ::config::{Config as IniLoader, File, FileFormat};
use std::collections::BTreeMap;
use std::path::Path;

/// Folder holding the ini files selected with `--config-filename`.
pub const CONFIG_FOLDER: &str = "config";

/// File the streaming binary expects the API keys to be exported from.
pub const ENV_VAR_FILE: &str = ".env_api_keys";

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const PROXYCURL_API_KEY: &str = "PROXYCURL_API_KEY";
pub const SERPAPI_API_KEY: &str = "SERPAPI_API_KEY";

/// Required keys, in the order they are checked.
pub const REQUIRED_API_KEYS: [&str; 3] = [OPENAI_API_KEY, PROXYCURL_API_KEY, SERPAPI_API_KEY];

const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com";
const DEFAULT_PROXYCURL_BASE_URL: &str = "https://nubela.co";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-16k";

/// Credentials for the search, scraping and completion services.
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub openai: String,
    pub proxycurl: String,
    pub serpapi: String,
}

impl ApiKeys {
    /// Reads the three keys from the environment. Empty values count as missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        Ok(Self {
            openai: read(OPENAI_API_KEY)?,
            proxycurl: read(PROXYCURL_API_KEY)?,
            serpapi: read(SERPAPI_API_KEY)?,
        })
    }
}

/// Base URLs and model of the external services.
///
/// The defaults point at the public services; tests point them at a mock server.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub serpapi_base_url: String,
    pub proxycurl_base_url: String,
    pub openai_base_url: String,
    pub openai_model: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            serpapi_base_url: DEFAULT_SERPAPI_BASE_URL.to_string(),
            proxycurl_base_url: DEFAULT_PROXYCURL_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

impl ServiceEndpoints {
    /// Same endpoint for every service, as used against a single mock server.
    pub fn single_host(base_url: &str) -> Self {
        Self {
            serpapi_base_url: base_url.to_string(),
            proxycurl_base_url: base_url.to_string(),
            openai_base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    /// Defaults, overridden by `SERPAPI_BASE_URL`, `PROXYCURL_BASE_URL`,
    /// `OPENAI_BASE_URL` and `OPENAI_MODEL` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let url = |name: &str, default: String| -> Result<String, ConfigError> {
            match std::env::var(name).ok().filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    if !value.starts_with("http://") && !value.starts_with("https://") {
                        return Err(ConfigError::Invalid {
                            key: name.to_string(),
                            reason: "must start with http:// or https://".to_string(),
                        });
                    }
                    Ok(value.trim_end_matches('/').to_string())
                }
                None => Ok(default),
            }
        };

        Ok(Self {
            serpapi_base_url: url("SERPAPI_BASE_URL", defaults.serpapi_base_url)?,
            proxycurl_base_url: url("PROXYCURL_BASE_URL", defaults.proxycurl_base_url)?,
            openai_base_url: url("OPENAI_BASE_URL", defaults.openai_base_url)?,
            openai_model: std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.openai_model),
        })
    }
}

/// `[schema-registry]` section.
#[derive(Debug, Clone)]
pub struct SchemaRegistryConfig {
    pub url: String,
    /// Parsed from `basic.auth.user.info` (`user:password`).
    pub basic_auth: Option<(String, String)>,
}

/// `[postgres]` section.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Everything read from one ini file.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// `[kafka]` entries, passed verbatim to librdkafka.
    pub kafka: BTreeMap<String, String>,
    pub schema_registry: Option<SchemaRegistryConfig>,
    pub postgres: Option<PostgresConfig>,
}

impl ConnectionSettings {
    /// Loads `<folder>/<filename>`.
    pub fn load(folder: &str, filename: &str) -> Result<Self, ConfigError> {
        let path = Path::new(folder).join(filename);
        let origin = path.display().to_string();
        tracing::debug!("Loading connection settings from {}", origin);

        let loader = IniLoader::builder()
            .add_source(File::from(path.as_path()).format(FileFormat::Ini))
            .build()
            .map_err(|source| ConfigError::File {
                path: origin.clone(),
                source,
            })?;

        Self::from_loader(&loader, &origin)
    }

    /// Parses ini text directly.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let loader = IniLoader::builder()
            .add_source(File::from_str(content, FileFormat::Ini))
            .build()
            .map_err(|source| ConfigError::File {
                path: "<inline>".to_string(),
                source,
            })?;

        Self::from_loader(&loader, "<inline>")
    }

    fn from_loader(loader: &IniLoader, origin: &str) -> Result<Self, ConfigError> {
        let kafka = section(loader, "kafka", origin)?.unwrap_or_default();

        let schema_registry = match section(loader, "schema-registry", origin)? {
            Some(mut entries) => {
                let url = entries.remove("url").ok_or(ConfigError::MissingKey {
                    section: "schema-registry",
                    key: "url",
                })?;
                let basic_auth = match entries.remove("basic.auth.user.info") {
                    Some(info) => Some(split_user_info(&info)?),
                    None => None,
                };
                Some(SchemaRegistryConfig {
                    url: url.trim_end_matches('/').to_string(),
                    basic_auth,
                })
            }
            None => None,
        };

        let postgres = match section(loader, "postgres", origin)? {
            Some(mut entries) => {
                let mut take = |key: &'static str| {
                    entries.remove(key).ok_or(ConfigError::MissingKey {
                        section: "postgres",
                        key,
                    })
                };
                let host = take("host")?;
                let port = take("port")?;
                let user = take("user")?;
                let password = take("password")?;
                let database = take("database")?;
                let port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "postgres.port".to_string(),
                    reason: format!("'{}' is not a valid port", port),
                })?;
                Some(PostgresConfig {
                    host,
                    port,
                    user,
                    password,
                    database,
                })
            }
            None => None,
        };

        Ok(Self {
            kafka,
            schema_registry,
            postgres,
        })
    }

    pub fn require_schema_registry(&self) -> Result<&SchemaRegistryConfig, ConfigError> {
        self.schema_registry
            .as_ref()
            .ok_or(ConfigError::MissingSection("schema-registry"))
    }

    /// Postgres URL. `DATABASE_URL` wins over the `[postgres]` section.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                return Err(ConfigError::Invalid {
                    key: "DATABASE_URL".to_string(),
                    reason: "must start with postgresql:// or postgres://".to_string(),
                });
            }
            return Ok(url);
        }

        self.postgres
            .as_ref()
            .map(PostgresConfig::connection_url)
            .ok_or(ConfigError::MissingSection("postgres"))
    }
}

fn section(
    loader: &IniLoader,
    name: &'static str,
    origin: &str,
) -> Result<Option<BTreeMap<String, String>>, ConfigError> {
    let table = match loader.get_table(name) {
        Ok(table) => table,
        Err(::config::ConfigError::NotFound(_)) => return Ok(None),
        Err(source) => {
            return Err(ConfigError::File {
                path: origin.to_string(),
                source,
            })
        }
    };

    table
        .into_iter()
        .map(|(key, value)| {
            value
                .into_string()
                .map(|value| (key, value))
                .map_err(|source| ConfigError::File {
                    path: origin.to_string(),
                    source,
                })
        })
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Some)
}

fn split_user_info(info: &str) -> Result<(String, String), ConfigError> {
    info.split_once(':')
        .map(|(user, pass)| (user.to_string(), pass.to_string()))
        .ok_or_else(|| ConfigError::Invalid {
            key: "schema-registry.basic.auth.user.info".to_string(),
            reason: "expected 'user:password'".to_string(),
        })
}
