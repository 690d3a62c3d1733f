use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use axum::{extract::State, routing::post, Json, Router};
use querybot_cli::commands::{config, doctor, invoke};
use serde_json::{json, Value};
use tempfile::TempDir;

const VALID_TOKENS: [(&str, &str); 2] =
    [("QUERYBOT_SLACK_APP_TOKEN", "xapp-test"), ("QUERYBOT_SLACK_BOT_TOKEN", "xoxb-test")];

#[test]
fn doctor_fails_and_skips_dependent_checks_without_tokens() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1, "missing tokens should fail doctor");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        for check in payload["checks"].as_array().expect("checks").iter().skip(1) {
            assert_eq!(check["status"], "skipped");
        }
    });
}

#[test]
fn doctor_passes_with_valid_env_and_skips_disabled_executor() {
    let dir = TempDir::new().expect("tempdir");
    let log_path = dir.path().join("logs").join("invocations.log");
    let log_path = log_path.to_str().expect("utf-8 path");

    with_env(&[VALID_TOKENS[0], VALID_TOKENS[1], ("QUERYBOT_INVOCATION_LOG_PATH", log_path)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "doctor output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("invocation_log_writable"), "pass");
        assert_eq!(status_of("executor_configuration"), "skipped");
    });

    assert!(dir.path().join("logs").exists(), "doctor should create the log directory");
}

#[test]
fn doctor_human_output_lists_checks() {
    let dir = TempDir::new().expect("tempdir");
    let log_path = dir.path().join("invocations.log");
    let log_path = log_path.to_str().expect("utf-8 path");

    with_env(&[VALID_TOKENS[0], VALID_TOKENS[1], ("QUERYBOT_INVOCATION_LOG_PATH", log_path)], || {
        let result = doctor::run(false);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] config_validation"));
        assert!(result.output.contains("- [skip] executor_configuration"));
    });
}

#[test]
fn config_redacts_tokens_and_attributes_sources() {
    with_env(
        &[
            ("SLACK_APP_TOKEN", "xapp-1-secret"),
            ("QUERYBOT_SLACK_BOT_TOKEN", "xoxb-2-secret"),
            ("QUERYBOT_EXECUTOR_FUNCTION_NAME", "nightly-report"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- slack.app_token = xapp-*** (source: env (SLACK_APP_TOKEN))"));
            assert!(output
                .contains("- slack.bot_token = xoxb-*** (source: env (QUERYBOT_SLACK_BOT_TOKEN))"));
            assert!(output.contains(
                "- executor.function_name = nightly-report (source: env (QUERYBOT_EXECUTOR_FUNCTION_NAME))"
            ));
            assert!(output.contains("- slack.command = /query (source: default)"));
            assert!(!output.contains("secret"));
        },
    );
}

#[test]
fn invoke_requires_executor_endpoint() {
    with_env(&VALID_TOKENS, || {
        let result = invoke::run("SELECT 1", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "invoke");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "executor_not_configured");
    });
}

#[test]
fn invoke_rejects_blank_query() {
    with_env(&VALID_TOKENS, || {
        let result = invoke::run("   ", None);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "validation");
    });
}

#[test]
fn invoke_posts_payload_to_named_function() {
    let server = FunctionServer::start();

    with_env(
        &[VALID_TOKENS[0], VALID_TOKENS[1], ("QUERYBOT_EXECUTOR_BASE_URL", server.base_url.as_str())],
        || {
            let result = invoke::run("SELECT 1", Some("ad-hoc"));
            assert_eq!(result.exit_code, 0, "invoke output: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "ok");
            assert!(payload["message"].as_str().unwrap_or("").starts_with("ad-hoc returned"));
        },
    );

    assert_eq!(server.received(), vec![("ad-hoc".to_owned(), json!({ "query": "SELECT 1" }))]);
}

#[test]
fn invoke_surfaces_function_errors_as_dispatch_failures() {
    let server = FunctionServer::start();

    with_env(
        &[VALID_TOKENS[0], VALID_TOKENS[1], ("QUERYBOT_EXECUTOR_BASE_URL", server.base_url.as_str())],
        || {
            let result = invoke::run("SELEC 1", Some("failing"));
            assert_eq!(result.exit_code, 1);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["error_class"], "dispatch");
            assert!(payload["message"].as_str().unwrap_or("").contains("syntax error"));
        },
    );
}

type Received = Arc<Mutex<Vec<(String, Value)>>>;

/// Fake function endpoint on its own runtime so `invoke::run` can block freely.
struct FunctionServer {
    base_url: String,
    received: Received,
    _runtime: tokio::runtime::Runtime,
}

impl FunctionServer {
    fn start() -> Self {
        async fn ad_hoc(State(received): State<Received>, Json(body): Json<Value>) -> Json<Value> {
            received.lock().expect("lock").push(("ad-hoc".to_owned(), body));
            Json(json!({ "rows": [[1]] }))
        }

        async fn failing(State(received): State<Received>, Json(body): Json<Value>) -> Json<Value> {
            received.lock().expect("lock").push(("failing".to_owned(), body));
            Json(json!({ "errorMessage": "syntax error at or near SELEC" }))
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let received = Received::default();
        let router = Router::new()
            .route("/ad-hoc", post(ad_hoc))
            .route("/failing", post(failing))
            .with_state(received.clone());

        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .expect("bind");
        let address = listener.local_addr().expect("address");
        runtime.spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { base_url: format!("http://{address}"), received, _runtime: runtime }
    }

    fn received(&self) -> Vec<(String, Value)> {
        self.received.lock().expect("lock").clone()
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).unwrap_or_else(|error| {
        panic!("command output should be valid JSON ({error}): {output}");
    })
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "QUERYBOT_SLACK_APP_TOKEN",
        "QUERYBOT_SLACK_BOT_TOKEN",
        "SLACK_APP_TOKEN",
        "SLACK_BOT_TOKEN",
        "QUERYBOT_SLACK_COMMAND",
        "QUERYBOT_SLACK_API_BASE_URL",
        "QUERYBOT_EXECUTOR_ENABLED",
        "QUERYBOT_EXECUTOR_BASE_URL",
        "QUERYBOT_EXECUTOR_FUNCTION_NAME",
        "QUERYBOT_EXECUTOR_API_KEY",
        "QUERYBOT_EXECUTOR_TIMEOUT_SECS",
        "QUERYBOT_INVOCATION_LOG_PATH",
        "QUERYBOT_SERVER_BIND_ADDRESS",
        "QUERYBOT_SERVER_HEALTH_CHECK_PORT",
        "QUERYBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "QUERYBOT_LOGGING_LEVEL",
        "QUERYBOT_LOGGING_FORMAT",
        "QUERYBOT_LOG_LEVEL",
        "QUERYBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
