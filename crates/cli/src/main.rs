use std::process::ExitCode;

fn main() -> ExitCode {
    querybot_cli::run()
}
