use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use grove::cli::{self, Cli};
use grove::ui::output;

fn init_tracing(debug: bool) {
    let default = if debug { "grove=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("GROVE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
