use std::fs;

use attendy_core::config::{AppConfig, LoadOptions};
use attendy_db::connect_with_settings;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    fn label(self) -> &'static str {
        match self {
            Self::Pass => "ok",
            Self::Fail => "fail",
            Self::Skipped => "skip",
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
        Self {
            overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
            summary: if all_pass {
                "doctor: all readiness checks passed".to_owned()
            } else {
                "doctor: one or more readiness checks failed".to_owned()
            },
            checks,
        }
    }

    fn human(&self) -> String {
        let mut lines = vec![self.summary.clone()];
        for check in &self.checks {
            lines.push(format!("- [{}] {}: {}", check.status.label(), check.name, check.details));
        }
        lines.join("\n")
    }
}

pub fn run(json_output: bool) -> String {
    let report = build_report();
    if json_output {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"overall_status\":\"fail\",\"summary\":{:?}}}", error.to_string()))
    } else {
        report.human()
    }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_snapshot_directory(&config),
            check_database_connectivity(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("snapshot_directory"),
            DoctorCheck::skipped("database_connectivity"),
        ],
    };
    DoctorReport::from_checks(checks)
}

/// The session snapshot must land on disk mid-attendance; an unwritable
/// directory silently disables reload survival.
fn check_snapshot_directory(config: &AppConfig) -> DoctorCheck {
    let directory = &config.snapshot.directory;
    if let Err(error) = fs::create_dir_all(directory) {
        return DoctorCheck::fail(
            "snapshot_directory",
            format!("could not create `{}`: {error}", directory.display()),
        );
    }

    let probe = directory.join(".doctor-probe");
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            DoctorCheck::pass(
                "snapshot_directory",
                format!("`{}` is writable", directory.display()),
            )
        }
        Err(error) => DoctorCheck::fail(
            "snapshot_directory",
            format!("could not write into `{}`: {error}", directory.display()),
        ),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let probe = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match probe {
        Ok(()) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        ),
        Err(details) => DoctorCheck::fail("database_connectivity", details),
    }
}
