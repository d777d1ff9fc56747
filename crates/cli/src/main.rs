use std::process::ExitCode;

fn main() -> ExitCode {
    ledgerchat_cli::run()
}
