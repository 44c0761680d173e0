use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub snapshot: SnapshotConfig,
    pub outbound: OutboundConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Where the recoverable local session snapshot lives.
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    pub directory: PathBuf,
}

#[derive(Clone, Debug)]
pub struct OutboundConfig {
    pub request_timeout_secs: u64,
    pub beacon_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Explicit overrides the host passes in, applied after file and env.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub snapshot_directory: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://attendy.db".to_owned(),
                max_connections: 5,
                timeout_secs: 30,
            },
            snapshot: SnapshotConfig { directory: PathBuf::from(".attendy") },
            outbound: OutboundConfig { request_timeout_secs: 10, beacon_url: None },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then the TOML file, then `ATTENDY_*` env
    /// variables, then explicit overrides, validated at the end.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match locate_file(options.config_path.as_deref()) {
            Some(path) => config.merge_file(&read_file_config(&path)?),
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from("attendy.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.merge_env()?;
        config.merge_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn merge_file(&mut self, file: &FileConfig) {
        if let Some(section) = &file.database {
            merge(&mut self.database.url, &section.url);
            merge(&mut self.database.max_connections, &section.max_connections);
            merge(&mut self.database.timeout_secs, &section.timeout_secs);
        }
        if let Some(section) = &file.snapshot {
            if let Some(directory) = &section.directory {
                self.snapshot.directory = PathBuf::from(directory);
            }
        }
        if let Some(section) = &file.outbound {
            merge(&mut self.outbound.request_timeout_secs, &section.request_timeout_secs);
            if section.beacon_url.is_some() {
                self.outbound.beacon_url = section.beacon_url.clone();
            }
        }
        if let Some(section) = &file.logging {
            merge(&mut self.logging.level, &section.level);
            merge(&mut self.logging.format, &section.format);
        }
    }

    fn merge_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ATTENDY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = parse_env("ATTENDY_DATABASE_MAX_CONNECTIONS")? {
            self.database.max_connections = value;
        }
        if let Some(value) = parse_env("ATTENDY_DATABASE_TIMEOUT_SECS")? {
            self.database.timeout_secs = value;
        }

        if let Some(value) = read_env("ATTENDY_SNAPSHOT_DIRECTORY") {
            self.snapshot.directory = PathBuf::from(value);
        }

        if let Some(value) = parse_env("ATTENDY_OUTBOUND_REQUEST_TIMEOUT_SECS")? {
            self.outbound.request_timeout_secs = value;
        }
        if let Some(value) = read_env("ATTENDY_OUTBOUND_BEACON_URL") {
            self.outbound.beacon_url = Some(value);
        }

        // The short spellings exist for operator muscle memory.
        if let Some(value) =
            read_env("ATTENDY_LOGGING_LEVEL").or_else(|| read_env("ATTENDY_LOG_LEVEL"))
        {
            self.logging.level = value;
        }
        if let Some(value) =
            read_env("ATTENDY_LOGGING_FORMAT").or_else(|| read_env("ATTENDY_LOG_FORMAT"))
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(directory) = overrides.snapshot_directory {
            self.snapshot.directory = directory;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.snapshot.validate()?;
        self.outbound.validate()?;
        self.logging.validate()
    }
}

fn merge<T: Clone>(target: &mut T, source: &Option<T>) {
    if let Some(value) = source {
        *target = value.clone();
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_owned(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be greater than zero".to_owned(),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "database.timeout_secs must be in range 1..=300".to_owned(),
            ));
        }
        Ok(())
    }
}

impl SnapshotConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::Validation("snapshot.directory must not be empty".to_owned()));
        }
        Ok(())
    }
}

impl OutboundConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ConfigError::Validation(
                "outbound.request_timeout_secs must be in range 1..=120".to_owned(),
            ));
        }
        if let Some(beacon_url) = &self.beacon_url {
            if !beacon_url.starts_with("http://") && !beacon_url.starts_with("https://") {
                return Err(ConfigError::Validation(
                    "outbound.beacon_url must start with http:// or https://".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_owned(),
            )),
        }
    }
}

fn locate_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("attendy.toml"), PathBuf::from("config/attendy.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let interpolated = expand_env_refs(&raw)?;
    toml::from_str(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces `${VAR}` references in the raw file with the variable's value.
/// A reference to an unset variable fails the load instead of silently
/// producing an empty string.
fn expand_env_refs(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            return Err(ConfigError::UnterminatedInterpolation);
        };
        let var = &tail[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_owned() })?;
        output.push_str(&value);
        rest = &tail[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_owned(),
                value,
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database: Option<DatabaseSection>,
    snapshot: Option<SnapshotSection>,
    outbound: Option<OutboundSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotSection {
    directory: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutboundSection {
    request_timeout_secs: Option<u64>,
    beacon_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{expand_env_refs, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_validate_cleanly() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["ATTENDY_DATABASE_URL", "ATTENDY_LOGGING_LEVEL"]);

        let config = AppConfig::load(LoadOptions::default()).expect("defaults load");
        assert_eq!(config.database.url, "sqlite://attendy.db");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_values_override_defaults() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["ATTENDY_DATABASE_URL", "ATTENDY_SNAPSHOT_DIRECTORY"]);

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("attendy.toml");
        fs::write(
            &path,
            "[database]\nurl = \"sqlite://custom.db\"\n\n[snapshot]\ndirectory = \"/tmp/attendy\"\n",
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("patched load");

        assert_eq!(config.database.url, "sqlite://custom.db");
        assert_eq!(config.snapshot.directory, PathBuf::from("/tmp/attendy"));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let _guard = env_lock().lock().expect("env lock");
        let missing = PathBuf::from("/definitely/not/here/attendy.toml");

        let error = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect_err("file required");

        assert!(matches!(error, ConfigError::MissingConfigFile(path) if path == missing));
    }

    #[test]
    fn env_refs_expand_and_fail_loudly_when_unset() {
        let _guard = env_lock().lock().expect("env lock");

        env::set_var("ATTENDY_TEST_DB_NAME", "interp");
        let expanded =
            expand_env_refs("url = \"sqlite://${ATTENDY_TEST_DB_NAME}.db\"").expect("expanded");
        assert_eq!(expanded, "url = \"sqlite://interp.db\"");

        env::remove_var("ATTENDY_TEST_DB_NAME");
        let missing = expand_env_refs("url = \"${ATTENDY_TEST_DB_NAME}\"")
            .expect_err("unset variable refused");
        assert!(matches!(missing, ConfigError::MissingEnvInterpolation { .. }));

        let unterminated =
            expand_env_refs("url = \"${ATTENDY_TEST").expect_err("missing brace refused");
        assert!(matches!(unterminated, ConfigError::UnterminatedInterpolation));
    }

    #[test]
    fn invalid_env_override_is_rejected() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("ATTENDY_DATABASE_MAX_CONNECTIONS", "not-a-number");

        let error = AppConfig::load(LoadOptions::default()).expect_err("bad override");
        assert!(matches!(error, ConfigError::InvalidEnvOverride { .. }));

        env::remove_var("ATTENDY_DATABASE_MAX_CONNECTIONS");
    }

    #[test]
    fn non_sqlite_database_url_fails_validation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["ATTENDY_DATABASE_URL"]);

        let error = AppConfig::load(LoadOptions {
            config_path: None,
            require_file: false,
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_owned()),
                ..ConfigOverrides::default()
            },
        })
        .expect_err("postgres refused");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn beacon_url_must_be_http() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("ATTENDY_OUTBOUND_BEACON_URL", "ftp://beacon");

        let error = AppConfig::load(LoadOptions::default()).expect_err("ftp refused");
        assert!(matches!(error, ConfigError::Validation(_)));

        env::remove_var("ATTENDY_OUTBOUND_BEACON_URL");
    }
}
