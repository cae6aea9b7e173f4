//! flatweave binary entry point

use std::process::ExitCode;

fn main() -> ExitCode {
    match flatweave::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
