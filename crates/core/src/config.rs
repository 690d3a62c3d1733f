use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "querybot.toml";
pub const NESTED_CONFIG_FILE: &str = "config/querybot.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub executor: ExecutorConfig,
    pub invocation_log: InvocationLogConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub command: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub function_name: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct InvocationLogConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_command: Option<String>,
    pub executor_enabled: Option<bool>,
    pub executor_base_url: Option<String>,
    pub executor_function_name: Option<String>,
    pub invocation_log_path: Option<PathBuf>,
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
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                command: "/query".to_string(),
                api_base_url: "https://slack.com/api".to_string(),
            },
            executor: ExecutorConfig {
                enabled: false,
                base_url: None,
                function_name: "query-runner".to_string(),
                api_key: None,
                timeout_secs: 30,
            },
            invocation_log: InvocationLogConfig {
                path: PathBuf::from("querybot-invocations.log"),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = secret_value(app_token);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(command) = slack.command {
                self.slack.command = command;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(executor) = patch.executor {
            if let Some(enabled) = executor.enabled {
                self.executor.enabled = enabled;
            }
            if let Some(base_url) = executor.base_url {
                self.executor.base_url = Some(base_url);
            }
            if let Some(function_name) = executor.function_name {
                self.executor.function_name = function_name;
            }
            if let Some(api_key) = executor.api_key {
                self.executor.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = executor.timeout_secs {
                self.executor.timeout_secs = timeout_secs;
            }
        }

        if let Some(invocation_log) = patch.invocation_log {
            if let Some(path) = invocation_log.path {
                self.invocation_log.path = path;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let app_token =
            read_env("QUERYBOT_SLACK_APP_TOKEN").or_else(|| read_env("SLACK_APP_TOKEN"));
        if let Some(value) = app_token {
            self.slack.app_token = secret_value(value);
        }
        let bot_token =
            read_env("QUERYBOT_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("QUERYBOT_SLACK_COMMAND") {
            self.slack.command = value;
        }
        if let Some(value) = read_env("QUERYBOT_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env("QUERYBOT_EXECUTOR_ENABLED") {
            self.executor.enabled = parse_bool("QUERYBOT_EXECUTOR_ENABLED", &value)?;
        }
        if let Some(value) = read_env("QUERYBOT_EXECUTOR_BASE_URL") {
            self.executor.base_url = Some(value);
        }
        if let Some(value) = read_env("QUERYBOT_EXECUTOR_FUNCTION_NAME") {
            self.executor.function_name = value;
        }
        if let Some(value) = read_env("QUERYBOT_EXECUTOR_API_KEY") {
            self.executor.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("QUERYBOT_EXECUTOR_TIMEOUT_SECS") {
            self.executor.timeout_secs = parse_u64("QUERYBOT_EXECUTOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QUERYBOT_INVOCATION_LOG_PATH") {
            self.invocation_log.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("QUERYBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUERYBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("QUERYBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("QUERYBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("QUERYBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("QUERYBOT_LOGGING_LEVEL").or_else(|| read_env("QUERYBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUERYBOT_LOGGING_FORMAT").or_else(|| read_env("QUERYBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_command) = overrides.slack_command {
            self.slack.command = slack_command;
        }
        if let Some(enabled) = overrides.executor_enabled {
            self.executor.enabled = enabled;
        }
        if let Some(base_url) = overrides.executor_base_url {
            self.executor.base_url = Some(base_url);
        }
        if let Some(function_name) = overrides.executor_function_name {
            self.executor.function_name = function_name;
        }
        if let Some(path) = overrides.invocation_log_path {
            self.invocation_log.path = path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_executor(&self.executor)?;
        validate_invocation_log(&self.invocation_log)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let command = slack.command.trim();
    if !command.starts_with('/') || command.len() < 2 || command.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "slack.command must be a single slash command such as `/query`".to_string(),
        ));
    }

    if !is_http_url(&slack.api_base_url) {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_executor(executor: &ExecutorConfig) -> Result<(), ConfigError> {
    if executor.timeout_secs == 0 || executor.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "executor.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if executor.function_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "executor.function_name must not be empty".to_string(),
        ));
    }

    match executor.base_url.as_deref() {
        Some(base_url) if !is_http_url(base_url) => Err(ConfigError::Validation(
            "executor.base_url must start with http:// or https://".to_string(),
        )),
        None if executor.enabled => Err(ConfigError::Validation(
            "executor.enabled is true but executor.base_url is not configured".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_invocation_log(invocation_log: &InvocationLogConfig) -> Result<(), ConfigError> {
    if invocation_log.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "invocation_log.path must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    executor: Option<ExecutorPatch>,
    invocation_log: Option<InvocationLogPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    command: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutorPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    function_name: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct InvocationLogPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
