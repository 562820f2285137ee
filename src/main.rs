use std::process::ExitCode;

use wedding_registry_lib::error::is_retryable_failure;

fn main() -> ExitCode {
    match wedding_registry_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if is_retryable_failure(&err) {
                eprintln!("This was a storage failure; retrying the command may succeed.");
            }
            ExitCode::FAILURE
        }
    }
}
