// src/main.rs

use std::process::ExitCode;

use runtest::harness::Verdict;
use runtest::{cli, logging, run};

fn main() -> ExitCode {
    let args = match cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            // --help and --version also arrive here.
            return if err.use_stderr() {
                ExitCode::from(Verdict::Usage.exit_code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("runtest error: {err:?}");
        return ExitCode::from(Verdict::IoError.exit_code());
    }

    let verdict = match run(&args) {
        Ok(verdict) => verdict,
        Err(err) => {
            eprintln!("runtest error: {err}");
            Verdict::from_error(&err)
        }
    };

    ExitCode::from(verdict.exit_code())
}
