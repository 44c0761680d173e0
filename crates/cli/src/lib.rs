pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use attendy_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "attendy",
    about = "Attendy operator CLI",
    long_about = "Operate Attendy database migrations, demo fixtures, config inspection, and runtime readiness.",
    after_help = "Examples:\n  attendy doctor --json\n  attendy config\n  attendy migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo catalog and verify it against its contract")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, snapshot directory, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Command {
    fn execute(self) -> CommandResult {
        match self {
            Self::Migrate => commands::migrate::run(),
            Self::Seed => commands::seed::run(),
            Self::Config => CommandResult { exit_code: 0, output: commands::config::run() },
            Self::Doctor { json } => {
                CommandResult { exit_code: 0, output: commands::doctor::run(json) }
            }
        }
    }
}

pub fn run() -> ExitCode {
    init_tracing();

    let result = Cli::parse().command.execute();
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Best-effort subscriber install from the logging config. A config that
/// fails to load here is reported by the command itself, not the logger.
fn init_tracing() {
    let logging = AppConfig::load(LoadOptions::default()).map(|config| config.logging).ok();
    let level =
        logging.as_ref().map(|value| value.level.clone()).unwrap_or_else(|| "info".to_owned());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    // A second init (tests, repeated run()) is harmless.
    let _ = match logging.map(|value| value.format) {
        Some(LogFormat::Json) => builder.json().try_init(),
        Some(LogFormat::Pretty) => builder.pretty().try_init(),
        Some(LogFormat::Compact) | None => builder.compact().try_init(),
    };
}
