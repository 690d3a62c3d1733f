pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "querybot",
    about = "Querybot operator CLI",
    long_about = "Inspect querybot configuration, check runtime readiness, and invoke the query executor directly.",
    after_help = "Examples:\n  querybot doctor --json\n  querybot config\n  querybot invoke \"SELECT 1\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack token readiness, invocation log and executor setup")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send a query straight to the executor, bypassing Slack")]
    Invoke {
        #[arg(help = "Query text placed in the {\"query\": ...} payload")]
        query: String,
        #[arg(long, help = "Function to invoke instead of executor.function_name")]
        function: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::CommandResult::text(commands::config::run()),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Invoke { query, function } => commands::invoke::run(&query, function.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
