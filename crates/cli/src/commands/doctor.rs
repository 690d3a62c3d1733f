use std::fs::{self, OpenOptions};
use std::path::Path;

use querybot_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exit code is 0 when every non-skipped check passes, 1 otherwise.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_setup(&config));
            checks.push(check_invocation_log(&config.invocation_log.path));
            checks.push(check_executor(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_setup", "invocation_log_writable", "executor_configuration"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_setup(config: &AppConfig) -> DoctorCheck {
    DoctorCheck {
        name: "slack_setup",
        status: CheckStatus::Pass,
        details: format!(
            "app and bot tokens present; handling `{}` via {}",
            config.slack.command, config.slack.api_base_url
        ),
    }
}

// Opens the log for append without writing, creating it if needed.
fn check_invocation_log(path: &Path) -> DoctorCheck {
    let result = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(path).map(drop));

    match result {
        Ok(()) => DoctorCheck {
            name: "invocation_log_writable",
            status: CheckStatus::Pass,
            details: format!("{} is writable", path.display()),
        },
        Err(error) => DoctorCheck {
            name: "invocation_log_writable",
            status: CheckStatus::Fail,
            details: format!("{}: {error}", path.display()),
        },
    }
}

fn check_executor(config: &AppConfig) -> DoctorCheck {
    let executor = &config.executor;
    if !executor.enabled {
        return DoctorCheck {
            name: "executor_configuration",
            status: CheckStatus::Skipped,
            details: "executor dispatch is disabled".to_string(),
        };
    }

    DoctorCheck {
        name: "executor_configuration",
        status: CheckStatus::Pass,
        details: format!(
            "dispatching to `{}` at {} (timeout {}s)",
            executor.function_name,
            executor.base_url.as_deref().unwrap_or("<unset>"),
            executor.timeout_secs
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
