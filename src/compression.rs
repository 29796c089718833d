// compression.rs - Size-threshold compression and pass-through rules

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files larger than this are always re-encoded.
pub const SIZE_THRESHOLD: u64 = 10 * 1024 * 1024;
pub const DEFAULT_QUALITY: u8 = 85;

/// What to do with a file at or below the size threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BelowThreshold {
    /// Byte-for-byte copy to `<stem>_original.<ext>`.
    #[default]
    Copy,
    /// Re-encode regardless of size.
    Compress,
    /// Leave the file alone.
    Skip,
}

impl BelowThreshold {
    pub const ALL: [BelowThreshold; 3] = [Self::Copy, Self::Compress, Self::Skip];

    pub fn description(&self) -> &'static str {
        match self {
            Self::Copy => "Copy small files unchanged",
            Self::Compress => "Compress every file",
            Self::Skip => "Skip small files",
        }
    }
}

impl fmt::Display for BelowThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::str::FromStr for BelowThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "compress" => Ok(Self::Compress),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown policy `{other}` (expected copy, compress or skip)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressionOptions {
    pub threshold: u64,
    pub quality: u8,
    pub below_threshold: BelowThreshold,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            threshold: SIZE_THRESHOLD,
            quality: DEFAULT_QUALITY,
            below_threshold: BelowThreshold::default(),
        }
    }
}

/// The cause is rendered inline and not exposed as `source`, so
/// `{:#}` chains and outcome messages carry it exactly once.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("input has no file name")]
    NoFileName,
    #[error("failed to read: {0}")]
    Metadata(io::Error),
    #[error("failed to open: {0}")]
    Decode(ImageError),
    #[error("encode failed: {0}")]
    Encode(ImageError),
    #[error("save failed: {0}")]
    Write(io::Error),
}

/// Result of processing one file. Failures are values, never panics or errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Compressed {
        output: PathBuf,
        original_size: u64,
        new_size: u64,
    },
    Copied {
        output: PathBuf,
        size: u64,
    },
    Skipped {
        filename: String,
        size: u64,
    },
    Failed {
        filename: String,
        message: String,
    },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Path of the file that was written, if any.
    pub fn output(&self) -> Option<&Path> {
        match self {
            Self::Compressed { output, .. } | Self::Copied { output, .. } => Some(output),
            Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compressed {
                output,
                original_size,
                new_size,
            } => write!(
                f,
                "{} ({} → {} KB)",
                display_name(output),
                original_size / 1024,
                new_size / 1024
            ),
            Self::Copied { output, size } => {
                write!(f, "{} (copied, {} KB)", display_name(output), size / 1024)
            }
            Self::Skipped { filename, size } => {
                write!(f, "{filename} below threshold ({} KB), skipped", size / 1024)
            }
            Self::Failed { filename, message } => write!(f, "error ({filename}): {message}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compressor {
    options: CompressionOptions,
}

impl Compressor {
    pub fn new(options: CompressionOptions) -> Self {
        Self { options }
    }

    /// Processes one file into `output_dir`, folding any failure into
    /// [`Outcome::Failed`] tagged with the input's file name.
    pub fn process(&self, input: &Path, output_dir: &Path) -> Outcome {
        match self.try_process(input, output_dir) {
            Ok(outcome) => {
                tracing::debug!(input = %input.display(), output = ?outcome.output(), "processed");
                outcome
            }
            Err(err) => {
                tracing::warn!(input = %input.display(), error = %err, "processing failed");
                Outcome::Failed {
                    filename: display_name(input),
                    message: err.to_string(),
                }
            }
        }
    }

    fn try_process(&self, input: &Path, output_dir: &Path) -> Result<Outcome, ProcessError> {
        let stem = input
            .file_stem()
            .ok_or(ProcessError::NoFileName)?
            .to_string_lossy()
            .into_owned();
        let original_size = fs::metadata(input).map_err(ProcessError::Metadata)?.len();

        if original_size <= self.options.threshold {
            match self.options.below_threshold {
                BelowThreshold::Copy => return copy_original(input, output_dir, &stem, original_size),
                BelowThreshold::Skip => {
                    return Ok(Outcome::Skipped {
                        filename: display_name(input),
                        size: original_size,
                    })
                }
                BelowThreshold::Compress => {}
            }
        }

        let img = image::open(input).map_err(ProcessError::Decode)?;
        let output = output_dir.join(format!("{stem}_compressed.jpg"));
        let new_size = write_jpeg(&img, &output, self.options.quality)?;

        Ok(Outcome::Compressed {
            output,
            original_size,
            new_size,
        })
    }
}

fn copy_original(
    input: &Path,
    output_dir: &Path,
    stem: &str,
    size: u64,
) -> Result<Outcome, ProcessError> {
    let name = match input.extension() {
        Some(ext) => format!("{stem}_original.{}", ext.to_string_lossy()),
        None => format!("{stem}_original"),
    };
    let output = output_dir.join(name);

    if !same_file(input, &output) {
        fs::copy(input, &output).map_err(ProcessError::Write)?;
    }

    Ok(Outcome::Copied { output, size })
}

/// Flattens alpha away and writes a baseline JPEG, returning the written size.
fn write_jpeg(img: &DynamicImage, output: &Path, quality: u8) -> Result<u64, ProcessError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let file = File::create(output).map_err(ProcessError::Write)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode(&rgb, width, height, ColorType::Rgb8)
        .map_err(ProcessError::Encode)?;
    writer.flush().map_err(ProcessError::Write)?;
    drop(writer);

    let new_size = fs::metadata(output).map_err(ProcessError::Write)?.len();
    Ok(new_size)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn write_rgba_png(path: &Path) -> Result<()> {
        let img = RgbaImage::from_fn(64, 48, |x, y| {
            Rgba([(x * 4) as u8, (y * 5) as u8, 128, if x % 2 == 0 { 255 } else { 90 }])
        });
        img.save(path)?;
        Ok(())
    }

    fn compressor(threshold: u64, below_threshold: BelowThreshold) -> Compressor {
        Compressor::new(CompressionOptions {
            threshold,
            quality: DEFAULT_QUALITY,
            below_threshold,
        })
    }

    #[test]
    fn above_threshold_writes_opaque_jpeg() -> Result<()> {
        let dir = tempdir()?;
        let out = tempdir()?;
        let input = dir.path().join("photo.png");
        write_rgba_png(&input)?;

        let outcome = compressor(0, BelowThreshold::Copy).process(&input, out.path());

        let expected = out.path().join("photo_compressed.jpg");
        assert_eq!(outcome.output(), Some(expected.as_path()));
        let decoded = image::open(&expected)?;
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert!(!decoded.color().has_alpha());
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
        assert_eq!(&fs::read(&expected)?[..2], &[0xFF, 0xD8]);
        Ok(())
    }

    #[test]
    fn below_threshold_copy_is_byte_identical() -> Result<()> {
        let dir = tempdir()?;
        let out = tempdir()?;
        let input = dir.path().join("shot.png");
        write_rgba_png(&input)?;

        let outcome = Compressor::default().process(&input, out.path());

        let expected = out.path().join("shot_original.png");
        assert!(matches!(outcome, Outcome::Copied { .. }));
        assert_eq!(fs::read(&input)?, fs::read(&expected)?);
        Ok(())
    }

    #[test]
    fn below_threshold_compress_policy_reencodes() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("small.png");
        write_rgba_png(&input)?;

        let outcome = Compressor::new(CompressionOptions {
            below_threshold: BelowThreshold::Compress,
            ..Default::default()
        })
        .process(&input, dir.path());

        assert!(matches!(outcome, Outcome::Compressed { .. }));
        assert!(dir.path().join("small_compressed.jpg").exists());
        Ok(())
    }

    #[test]
    fn below_threshold_skip_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let out = tempdir()?;
        let input = dir.path().join("tiny.png");
        write_rgba_png(&input)?;

        let outcome = compressor(SIZE_THRESHOLD, BelowThreshold::Skip).process(&input, out.path());

        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(outcome.to_string().contains("below threshold"));
        assert_eq!(fs::read_dir(out.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn copy_onto_itself_is_not_attempted() -> Result<()> {
        let dir = tempdir()?;
        // Stem `a` maps this file onto itself.
        let input = dir.path().join("a_original.png");
        write_rgba_png(&input)?;
        let before = fs::read(&input)?;

        let outcome = copy_original(&input, dir.path(), "a", before.len() as u64)?;

        assert_eq!(outcome.output(), Some(input.as_path()));
        assert_eq!(fs::read(&input)?, before);
        Ok(())
    }

    #[test]
    fn missing_input_is_tagged_failure() {
        let dir = tempdir().expect("tempdir");
        let outcome = Compressor::default().process(&dir.path().join("gone.png"), dir.path());

        match &outcome {
            Outcome::Failed { filename, .. } => assert_eq!(filename, "gone.png"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(outcome.to_string().starts_with("error (gone.png)"));
    }

    #[test]
    fn undecodable_input_fails_without_output() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("broken.jpg");
        fs::write(&input, b"not really a jpeg")?;

        let outcome = compressor(0, BelowThreshold::Copy).process(&input, dir.path());

        assert!(outcome.is_failure());
        assert!(!dir.path().join("broken_compressed.jpg").exists());
        Ok(())
    }

    #[test]
    fn policy_parses_from_cli_names() {
        assert_eq!("copy".parse::<BelowThreshold>(), Ok(BelowThreshold::Copy));
        assert_eq!("SKIP".parse::<BelowThreshold>(), Ok(BelowThreshold::Skip));
        assert!("shrink".parse::<BelowThreshold>().is_err());
    }

    #[test]
    fn error_detail_appears_once_in_chain() {
        let err = ProcessError::Metadata(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(std::error::Error::source(&err).is_none());
        let chained = format!("{:#}", anyhow::Error::new(err).context("x.png"));
        assert_eq!(chained, "x.png: failed to read: gone");
    }
}
