use clap::Parser;
use koala_asm::cli::{Cli, CliHandler, ExitCode};
use std::process;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { ExitCode::IncompleteOption } else { ExitCode::Ok };
            let _ = e.print();
            process::exit(code.code());
        }
    };
    init_logging(cli.verbose);

    let handler = CliHandler::new();
    if let Err(e) = handler.handle(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.code.code());
    }
}
