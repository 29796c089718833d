// Image compressor: manual batches, drag-and-drop, and a single-file folder watch

mod app;
mod batch;
mod cli;
mod compression;
mod config;
mod dispatch;
mod headless;
mod logging;
mod state;
mod watcher;

use clap::Parser;
use cli::{Cli, Commands};
use config::ConfigStore;

fn main() {
    logging::init();
    let cli = Cli::parse();
    let store = ConfigStore::new(cli.config);

    let result = match cli.command.unwrap_or(Commands::Gui) {
        Commands::Gui => app::run(store),
        Commands::Compress(args) => headless::compress(&store, args),
        Commands::Watch(args) => headless::watch(&store, args),
    };
    if let Err(err) = result {
        tracing::error!(error = %format!("{err:#}"), "fatal");
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
