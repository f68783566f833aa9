#![forbid(unsafe_code)]

mod commands;
mod config;
mod defaults;

use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = config::env_var("TOC_LOG")
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cfg = config::parse_args().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(2);
    });
    init_tracing();

    match commands::run(&cfg) {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(err) => {
            tracing::error!(error = %err, "tocctl failed");
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
