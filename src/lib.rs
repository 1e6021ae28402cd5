pub mod aggregator;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod lock;
pub mod packages;
pub mod process;
pub mod project_identity;
pub mod staging;
pub mod status;
pub mod tracking;
pub mod ui;
pub mod utils;

use clap::Parser;
use std::process::exit;

/// Run the appkg CLI entrypoint.
pub fn run_cli() {
    // 1. Signal Handling (lock waits and retries check the flag between polls)
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        ui::mark_interrupted();
        ui::warning("Operation cancelled by user.");
    }) {
        ui::warning(&format!("Could not install the Ctrl-C handler: {}", e));
    }

    // 2. Parse
    let args = cli::args::Cli::parse();
    ui::set_quiet(args.global.quiet);
    ui::set_verbose(args.global.verbose);

    // 3. Colors follow the settings file; a broken file is reported by the command itself
    let color = config::Settings::load()
        .map(|s| s.color().to_string())
        .unwrap_or_else(|_| "auto".to_string());
    ui::init_colors(&color);

    // 4. Run
    if let Err(e) = cli::dispatcher::dispatch(&args) {
        ui::error(&format!("{}", e));
        if let Some(output) = e.raw_output() {
            ui::raw_output(output);
        }
        exit(1);
    }
}
