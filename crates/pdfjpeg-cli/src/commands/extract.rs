//! Extract command - pull JPEG images out of a single PDF.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use pdfjpeg_core::{JpegExtractor, PdfJpegConfig};

use super::config::load_config;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output directory (default: current directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Stop after the first JPEG
    #[arg(long)]
    first: bool,

    /// Password for encrypted documents
    #[arg(long)]
    password: Option<String>,

    /// File name prefix for written images
    #[arg(long)]
    prefix: Option<String>,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// List images instead of writing them
    #[arg(long)]
    list: bool,

    /// Print the listing as JSON (with --list)
    #[arg(long, requires = "list")]
    json: bool,
}

/// What an extraction produced.
#[derive(Debug, Default)]
pub struct ExtractSummary {
    /// Sizes of the extracted images, in order.
    pub sizes: Vec<usize>,
    /// Files written, in order.
    pub files: Vec<PathBuf>,
}

impl ExtractSummary {
    pub fn total_bytes(&self) -> usize {
        self.sizes.iter().sum()
    }
}

pub fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(password) = args.password {
        config.pdf.password = password;
    }
    if let Some(prefix) = args.prefix {
        config.output.file_prefix = prefix;
    }
    if args.force {
        config.output.overwrite = true;
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);

    let output_dir = if args.list {
        None
    } else {
        Some(args.output_dir.unwrap_or_else(|| PathBuf::from(".")))
    };

    let summary = extract_file(&args.input, output_dir.as_deref(), args.first, &config, Some(&pb))?;
    pb.finish_and_clear();

    if args.list {
        print_listing(&summary, args.json)?;
    } else if summary.files.is_empty() {
        println!(
            "{} No JPEG images found in {}",
            style("ℹ").blue(),
            args.input.display()
        );
    } else {
        for file in &summary.files {
            println!("{} {}", style("✓").green(), file.display());
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Run extraction over one PDF, writing images into `output_dir` when given.
pub fn extract_file(
    input: &Path,
    output_dir: Option<&Path>,
    first_only: bool,
    config: &PdfJpegConfig,
    pb: Option<&ProgressBar>,
) -> anyhow::Result<ExtractSummary> {
    let mut extractor = JpegExtractor::open(input, &config.pdf)?;
    let page_count = extractor.page_count();

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
    }

    let mut summary = ExtractSummary::default();

    while let Some(jpeg) = extractor.next() {
        let jpeg = jpeg?;
        let index = summary.sizes.len() + 1;

        if let Some(pb) = pb {
            pb.set_message(format!(
                "page {}/{}: {} images",
                extractor.pages_interpreted(),
                page_count,
                index
            ));
        }

        if let Some(dir) = output_dir {
            let path = dir.join(format!("{}{:03}.jpg", config.output.file_prefix, index));
            if path.exists() && !config.output.overwrite {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                );
            }
            fs::write(&path, &jpeg)?;
            debug!("Wrote {} bytes to {}", jpeg.len(), path.display());
            summary.files.push(path);
        }
        summary.sizes.push(jpeg.len());

        if first_only {
            break;
        }
    }

    Ok(summary)
}

fn print_listing(summary: &ExtractSummary, json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<serde_json::Value> = summary
            .sizes
            .iter()
            .enumerate()
            .map(|(i, size)| serde_json::json!({ "index": i + 1, "bytes": size }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (i, size) in summary.sizes.iter().enumerate() {
        println!("{:>4}  {:>10} bytes", i + 1, size);
    }
    println!(
        "{} {} images, {} bytes",
        style("ℹ").blue(),
        summary.sizes.len(),
        summary.total_bytes()
    );
    Ok(())
}
