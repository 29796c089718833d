use crate::compression::BelowThreshold;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "image-compressor", version, about = "Compress or copy images, by hand or by watching a folder")]
pub struct Cli {
    /// Config file to load and save.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the window (default).
    Gui,
    Compress(CompressArgs),
    Watch(WatchArgs),
}

/// Process files or folders once and exit.
#[derive(Parser, Debug, Clone)]
pub struct CompressArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Output folder; defaults to the configured save folder.
    #[arg(long)]
    pub out: Option<PathBuf>,
    #[arg(long)]
    pub policy: Option<BelowThreshold>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,
}

/// Watch a folder for one filename until interrupted.
#[derive(Parser, Debug, Clone)]
pub struct WatchArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    #[arg(long)]
    pub file: Option<String>,
}
