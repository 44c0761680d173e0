use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use attendy_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = file_path.as_deref().and_then(read_file_doc);

    let beacon_url = config
        .outbound
        .beacon_url
        .as_deref()
        .map(redact_url)
        .unwrap_or_else(|| "<unset>".to_owned());

    // Key path, effective value, and the env var that can override it.
    let entries: [(&str, String, &str); 8] = [
        ("database.url", config.database.url.clone(), "ATTENDY_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "ATTENDY_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "ATTENDY_DATABASE_TIMEOUT_SECS",
        ),
        (
            "snapshot.directory",
            config.snapshot.directory.display().to_string(),
            "ATTENDY_SNAPSHOT_DIRECTORY",
        ),
        (
            "outbound.request_timeout_secs",
            config.outbound.request_timeout_secs.to_string(),
            "ATTENDY_OUTBOUND_REQUEST_TIMEOUT_SECS",
        ),
        ("outbound.beacon_url", beacon_url, "ATTENDY_OUTBOUND_BEACON_URL"),
        ("logging.level", config.logging.level.clone(), "ATTENDY_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "ATTENDY_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_owned()];
    for (key, value, env_key) in entries {
        let source = field_source(key, env_key, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("attendy.toml"), PathBuf::from("config/attendy.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_file_doc(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    let in_file = file_doc.is_some_and(|doc| {
        key_path
            .split('.')
            .try_fold(doc, |current, key| current.get(key))
            .is_some()
    });
    if in_file {
        let shown = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_owned());
        return format!("file ({shown})");
    }

    "default".to_owned()
}

/// The beacon target may carry credentials in its path or query; only the
/// scheme and host are worth showing.
fn redact_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return "<empty>".to_owned();
    }

    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split(['/', '?']).next().unwrap_or(rest);
            format!("{scheme}://{host}/***")
        }
        None => "<redacted>".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_url;

    #[test]
    fn beacon_url_keeps_scheme_and_host_only() {
        assert_eq!(
            redact_url("https://records.example.com/hooks/secret-token?key=abc"),
            "https://records.example.com/***"
        );
        assert_eq!(redact_url("   "), "<empty>");
        assert_eq!(redact_url("not-a-url"), "<redacted>");
    }
}
