//! Binary entrypoint for the digital employee server.

use std::process::ExitCode;

use digital_employee::bootstrap;

/// Start the server and block until shutdown.
fn main() -> ExitCode {
    bootstrap::run()
}
