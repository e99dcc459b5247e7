//! Entry point for the `dispatch` binary.
#![forbid(unsafe_code)]

use std::process::ExitCode;

use dispatch_cli::{CliError, run};

#[expect(
    clippy::print_stderr,
    reason = "the binary reports fatal errors on stderr before exiting"
)]
fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("dispatch: {err}");
            ExitCode::FAILURE
        }
    }
}
