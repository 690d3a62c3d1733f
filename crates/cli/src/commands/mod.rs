pub mod config;
pub mod doctor;
pub mod invoke;

use serde::Serialize;

/// What a subcommand prints and the process exit code that goes with it.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum OutcomeStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    /// Human-readable output that always exits 0.
    pub fn text(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn success(command: &str, message: impl AsRef<str>) -> Self {
        let outcome = CommandOutcome {
            command,
            status: OutcomeStatus::Ok,
            error_class: None,
            message: message.as_ref(),
        };
        Self { exit_code: 0, output: render(&outcome) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl AsRef<str>,
        exit_code: u8,
    ) -> Self {
        let outcome = CommandOutcome {
            command,
            status: OutcomeStatus::Error,
            error_class: Some(error_class),
            message: message.as_ref(),
        };
        Self { exit_code, output: render(&outcome) }
    }
}

fn render(outcome: &CommandOutcome<'_>) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(outcome.command),
            escape_json(&error.to_string())
        )
    })
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn failure_output_names_the_error_class() {
        let result = CommandResult::failure("invoke", "validation", "query text must not be empty", 2);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 2);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "validation");
    }

    #[test]
    fn success_output_omits_error_class() {
        let result = CommandResult::success("invoke", "query-runner returned {}");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["status"], "ok");
        assert!(payload.get("error_class").is_none());
    }
}
