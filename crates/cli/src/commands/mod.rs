pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use std::future::Future;

use serde_json::json;

use attendy_core::config::{AppConfig, LoadOptions};
use attendy_db::{connect_with_settings, DbPool};

/// One CLI invocation: a single-line JSON payload for stdout plus the
/// process exit code.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self { exit_code: 0, output: payload(command, "ok", None, &message.into()) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self { exit_code, output: payload(command, "error", Some(error_class), &message.into()) }
    }
}

fn payload(command: &str, status: &str, error_class: Option<&str>, message: &str) -> String {
    json!({
        "command": command,
        "status": status,
        "error_class": error_class,
        "message": message,
    })
    .to_string()
}

/// A failed command step: its error class, the detail message, and the exit
/// code scripts can branch on.
pub(crate) type StepFailure = (&'static str, String, u8);

/// Shared bootstrap for the commands that talk to the database: load the
/// configuration, stand up a current-thread runtime, connect the pool, run
/// the command body, and close the pool. Exit codes 2 (config), 3 (runtime)
/// and 4 (connectivity) are claimed here; bodies use 5 and up.
pub(crate) fn with_pool<F, Fut>(command: &'static str, body: F) -> CommandResult
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = Result<String, StepFailure>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration did not validate: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("could not start the async runtime: {error}"),
                3,
            );
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let result = body(pool.clone()).await;
        pool.close().await;
        result
    });

    match outcome {
        Ok(message) => CommandResult::success(command, message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}
