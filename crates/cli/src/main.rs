use std::process::ExitCode;

fn main() -> ExitCode {
    attendy_cli::run()
}
