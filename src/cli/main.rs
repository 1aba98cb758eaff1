//! Re-identification backend CLI
//!
//! Identifies model formats, checks weights suffixes and extracts whole-image
//! embeddings through the automatically selected backend.

use crate::{
    config::{Device, SelectorConfig, Weights},
    framework::{identify_framework, Framework, EXPORT_FORMATS},
    selector::ReidAutoBackend,
    services::TracingReporter,
    tracing_config::{init_cli_tracing, spans},
    utils::ReidPreprocessor,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Re-identification backend selection tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "reid-autobackend")]
pub struct Cli {
    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the framework each weights file would be loaded with
    Identify {
        /// Weights files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Report files whose suffix is not in the accepted set
    CheckSuffix {
        /// Accepted suffix (repeatable)
        #[arg(short, long = "suffix", default_value = ".pt")]
        suffixes: Vec<String>,

        /// Prefix for every reported message
        #[arg(long, default_value = "")]
        msg: String,

        /// Files to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List supported model formats
    Formats,

    /// Extract one embedding per image and print JSON lines
    Embed {
        /// Weights file; the extension decides the backend
        #[arg(short, long, required_unless_present = "config")]
        weights: Option<PathBuf>,

        /// JSON selector configuration (weights, device, half)
        #[arg(long, conflicts_with_all = ["weights", "device", "half"])]
        config: Option<PathBuf>,

        /// Execution device (auto, cpu, cuda, cuda:N, coreml)
        #[arg(short, long)]
        device: Option<Device>,

        /// Run the model in half precision
        #[arg(long)]
        half: bool,

        /// Images per forward pass
        #[arg(short, long, default_value_t = 16)]
        batch_size: usize,

        /// Search directories recursively
        #[arg(short, long)]
        recursive: bool,

        /// Input images or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// One line of `embed` output
#[derive(Debug, Serialize)]
struct EmbeddingRecord<'a> {
    path: String,
    framework: Framework,
    embedding: &'a [f32],
}

/// Parse arguments, install tracing and run the requested command
///
/// # Errors
/// - Any command failure, with context
pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
    run(cli)
}

/// Run a parsed command
///
/// # Errors
/// - Any command failure, with context
pub fn run(cli: Cli) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Identify { paths } => identify(&paths, &mut out),
        Command::CheckSuffix {
            suffixes,
            msg,
            paths,
        } => {
            let reporter = TracingReporter;
            let suffixes: Vec<&str> = suffixes.iter().map(String::as_str).collect();
            let mismatches =
                crate::framework::check_suffix(paths, suffixes, &msg, &reporter);
            writeln!(out, "{mismatches}")?;
            if mismatches > 0 {
                anyhow::bail!("{mismatches} file(s) with an unacceptable suffix");
            }
            Ok(())
        },
        Command::Formats => formats(&mut out),
        Command::Embed {
            weights,
            config,
            device,
            half,
            batch_size,
            recursive,
            inputs,
        } => {
            let config = match config {
                Some(path) => SelectorConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => SelectorConfig {
                    weights: weights.map(Weights::Single).unwrap_or_default(),
                    device: device.unwrap_or_default(),
                    half,
                },
            };
            embed(&config, &inputs, batch_size, recursive, &mut out)
        },
    }
}

fn identify<W: Write>(paths: &[PathBuf], out: &mut W) -> Result<()> {
    let mut failures = 0;
    for path in paths {
        match identify_framework(path) {
            Ok(framework) => writeln!(out, "{}\t{framework}", path.display())?,
            Err(e) => {
                failures += 1;
                tracing::error!("{e}");
            },
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} weights file(s) have an unsupported format");
    }
    Ok(())
}

fn formats<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{:<16}{:<14}{:<20}{:<6}{:<6}", "Format", "Argument", "Suffix", "CPU", "GPU")?;
    for format in &EXPORT_FORMATS {
        writeln!(
            out,
            "{:<16}{:<14}{:<20}{:<6}{:<6}",
            format.framework.display_name(),
            format.argument,
            format.suffix,
            format.cpu,
            format.gpu
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Loadable suffixes: {}", Framework::supported_suffixes().join(", "))?;
    Ok(())
}

fn embed<W: Write>(
    config: &SelectorConfig,
    inputs: &[PathBuf],
    batch_size: usize,
    recursive: bool,
    out: &mut W,
) -> Result<()> {
    if batch_size == 0 {
        anyhow::bail!("Batch size must be at least 1");
    }

    let files = collect_images(inputs, recursive)?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(());
    }

    let mut selector = ReidAutoBackend::with_reporter(
        config.weights.clone(),
        config.device,
        config.half,
        Arc::new(TracingReporter),
    )
    .context("Failed to select a backend")?;
    let framework = selector.framework();
    let _span = spans::embedding(selector.weights(), framework.as_str(), files.len()).entered();
    info!("Embedding {} image(s) with {}", files.len(), framework.display_name());

    let progress = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let preprocessor = ReidPreprocessor::default();
    for chunk in files.chunks(batch_size) {
        let mut images = Vec::with_capacity(chunk.len());
        for path in chunk {
            let _image_span = spans::image(path).entered();
            let image = image::open(path)
                .with_context(|| format!("Failed to open image {}", path.display()))?;
            images.push(image.to_rgb8());
        }

        let batch = preprocessor
            .images_to_tensor(&images)
            .context("Failed to preprocess images")?;
        let embeddings = selector.forward(batch).context("Failed to extract embeddings")?;
        debug!("Extracted {:?} embeddings", embeddings.dim());

        for (path, row) in chunk.iter().zip(embeddings.rows()) {
            let embedding = row.to_vec();
            let record = EmbeddingRecord {
                path: path.display().to_string(),
                framework,
                embedding: &embedding,
            };
            serde_json::to_writer(&mut *out, &record)?;
            writeln!(out)?;
        }

        if let Some(ref pb) = progress {
            pb.inc(chunk.len() as u64);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }
    Ok(())
}

/// Expand files and directories into a sorted list of images
fn collect_images(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            if is_image_file(input) {
                files.push(input.clone());
            } else {
                warn!("Skipping unsupported file: {}", input.display());
            }
        } else if input.is_dir() {
            let depth = if recursive { usize::MAX } else { 1 };
            for entry in walkdir::WalkDir::new(input).max_depth(depth) {
                let entry = entry?;
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                input.display()
            );
        }
    }

    // Alphanumeric order keeps output lines stable
    files.sort();
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}
