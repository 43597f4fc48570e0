//! musebox CLI binary
//!
//! This is the minimal entrypoint; all logic is in the library. main only
//! maps the run result to a process exit code.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match musebox::cli::run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
