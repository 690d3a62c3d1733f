use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use querybot_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: [(&str, String, &[&str]); 14] = [
        (
            "slack.app_token",
            redact_token(config.slack.app_token.expose_secret()),
            &["QUERYBOT_SLACK_APP_TOKEN", "SLACK_APP_TOKEN"],
        ),
        (
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            &["QUERYBOT_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        ),
        ("slack.command", config.slack.command.clone(), &["QUERYBOT_SLACK_COMMAND"]),
        ("slack.api_base_url", config.slack.api_base_url.clone(), &["QUERYBOT_SLACK_API_BASE_URL"]),
        ("executor.enabled", config.executor.enabled.to_string(), &["QUERYBOT_EXECUTOR_ENABLED"]),
        (
            "executor.base_url",
            config.executor.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["QUERYBOT_EXECUTOR_BASE_URL"],
        ),
        (
            "executor.function_name",
            config.executor.function_name.clone(),
            &["QUERYBOT_EXECUTOR_FUNCTION_NAME"],
        ),
        (
            "executor.api_key",
            if config.executor.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            &["QUERYBOT_EXECUTOR_API_KEY"],
        ),
        (
            "executor.timeout_secs",
            config.executor.timeout_secs.to_string(),
            &["QUERYBOT_EXECUTOR_TIMEOUT_SECS"],
        ),
        (
            "invocation_log.path",
            config.invocation_log.path.display().to_string(),
            &["QUERYBOT_INVOCATION_LOG_PATH"],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["QUERYBOT_SERVER_BIND_ADDRESS"],
        ),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["QUERYBOT_SERVER_HEALTH_CHECK_PORT"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["QUERYBOT_LOGGING_LEVEL", "QUERYBOT_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["QUERYBOT_LOGGING_FORMAT", "QUERYBOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
