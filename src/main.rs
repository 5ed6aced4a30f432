use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use graft::cli::Cli;
use graft::error::GraftError;
use graft::services::output::print_error;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            eprintln!();
            let _ = Cli::command().write_long_help(&mut std::io::stderr());
            return ExitCode::FAILURE;
        }
    };

    init_logging();

    match graft::commands::dispatch(&cli) {
        Ok(code) => code,
        Err(err) => {
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<GraftError>())
                .map(GraftError::code)
                .unwrap_or("ERROR");
            print_error(cli.json, code, &format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Human-readable logs on stderr; `GRAFT_LOG` takes a filter directive.
fn init_logging() {
    let filter = EnvFilter::try_from_env("GRAFT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
