//! Command-line front ends over the same processor and watcher the window uses.

use crate::batch::{self, Admission, Batch, LogLine, LogStatus, PendingFiles};
use crate::cli::{CompressArgs, WatchArgs};
use crate::compression::{display_name, Compressor};
use crate::config::ConfigStore;
use crate::dispatch;
use crate::watcher::{WatchConfig, WatchSession};
use anyhow::{bail, Context, Result};
use std::fs;

pub fn compress(store: &ConfigStore, args: CompressArgs) -> Result<()> {
    let mut config = store.load();
    if let Some(policy) = args.policy {
        config.below_threshold = policy;
    }
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    let output_dir = args.out.unwrap_or_else(|| config.save_directory.clone());
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    let mut pending = PendingFiles::default();
    for path in batch::collect_inputs(&args.paths) {
        let name = display_name(&path);
        if pending.add(path) == Admission::Unsupported {
            println!("{}", LogLine::new(LogStatus::Unsupported, name));
        }
    }

    let compressor = Compressor::new(config.compression_options());
    let batch = Batch::prepare(&pending, &output_dir, compressor)?;
    let summary = batch::run_blocking(batch, |item, outcome| {
        println!("{}", LogLine::from_outcome(display_name(&item.path), outcome));
    });
    println!("{summary}. Output folder: {}", output_dir.display());

    if summary.failed > 0 {
        bail!("{} of {} files failed", summary.failed, summary.total);
    }
    Ok(())
}

pub fn watch(store: &ConfigStore, args: WatchArgs) -> Result<()> {
    let mut config = store.load();
    if let Some(dir) = args.dir {
        config.watch_directory = dir;
    }
    if let Some(file) = args.file {
        config.target_filename = file;
    }

    let (dispatcher, reports) = dispatch::channel();
    let watch = WatchConfig {
        directory: config.watch_directory.clone(),
        target: config.target_filename.trim().to_string(),
        output_dir: config.watch_output_dir().to_path_buf(),
    };
    let _session = WatchSession::start(watch, Compressor::new(config.compression_options()), dispatcher)
        .context("start watch")?;
    println!(
        "Watching {} for {} (Ctrl-C to stop)",
        config.watch_directory.display(),
        config.target_filename
    );

    while let Some(report) = reports.recv() {
        println!("{}", LogLine::from_outcome(display_name(&report.path), &report.outcome));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use tempfile::tempdir;

    #[test]
    fn compress_folder_into_fresh_output_dir() -> Result<()> {
        let src = tempdir()?;
        let work = tempdir()?;
        image::RgbImage::from_pixel(5, 5, image::Rgb([9, 9, 9])).save(src.path().join("pic.jpg"))?;
        fs::write(src.path().join("notes.txt"), b"hi")?;
        let store = ConfigStore::with_default_dir(
            work.path().join(CONFIG_FILE),
            work.path().to_path_buf(),
        );
        let out = work.path().join("out");

        compress(
            &store,
            CompressArgs {
                paths: vec![src.path().to_path_buf()],
                out: Some(out.clone()),
                policy: None,
                quality: None,
            },
        )?;

        assert_eq!(
            fs::read(src.path().join("pic.jpg"))?,
            fs::read(out.join("pic_original.jpg"))?
        );
        assert_eq!(fs::read_dir(&out)?.count(), 1);
        Ok(())
    }

    #[test]
    fn compress_with_nothing_supported_fails() -> Result<()> {
        let src = tempdir()?;
        let work = tempdir()?;
        let notes = src.path().join("notes.txt");
        fs::write(&notes, b"hi")?;
        let store = ConfigStore::with_default_dir(
            work.path().join(CONFIG_FILE),
            work.path().to_path_buf(),
        );

        let result = compress(
            &store,
            CompressArgs {
                paths: vec![notes],
                out: None,
                policy: None,
                quality: None,
            },
        );

        assert!(result.is_err());
        Ok(())
    }
}
