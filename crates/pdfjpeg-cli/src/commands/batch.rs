//! Batch command - extract JPEG images from multiple PDF files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, warn};

use super::config::load_config;
use super::extract::extract_file;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory; each PDF gets a subdirectory named after it
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Stop after the first JPEG of each file
    #[arg(long)]
    first: bool,

    /// Also write a summary CSV
    #[arg(long)]
    summary: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single file.
struct BatchResult {
    path: PathBuf,
    images: usize,
    bytes: usize,
    error: Option<String>,
}

pub fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.force {
        config.output.overwrite = true;
    }

    // Expand glob pattern
    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let output_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    let mut used_names = HashMap::new();

    for path in files {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let target = output_dir.join(unique_dir_name(stem, &mut used_names));

        match extract_file(&path, Some(&target), args.first, &config, None) {
            Ok(summary) => results.push(BatchResult {
                path: path.clone(),
                images: summary.sizes.len(),
                bytes: summary.total_bytes(),
                error: None,
            }),
            Err(e) => {
                let error_msg = e.to_string();
                if args.continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(BatchResult {
                        path: path.clone(),
                        images: 0,
                        bytes: 0,
                        error: Some(error_msg),
                    });
                } else {
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    anyhow::bail!("Processing {} failed: {}", path.display(), error_msg);
                }
            }
        }

        overall_pb.inc(1);
    }

    overall_pb.finish_and_clear();

    if args.summary {
        fs::create_dir_all(&output_dir)?;
        let summary_path = output_dir.join("summary.csv");
        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let images: usize = results.iter().map(|r| r.images).sum();

    println!(
        "{} Processed {} files in {:?}: {} images",
        style("✓").green(),
        results.len(),
        start.elapsed(),
        images
    );
    if failed > 0 {
        println!("{} {} files failed", style("✗").red(), failed);
    }

    Ok(())
}

/// Output directory name for a file stem; repeated stems get `-2`, `-3`, ...
fn unique_dir_name(stem: &str, used: &mut HashMap<String, usize>) -> String {
    let count = used.entry(stem.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        stem.to_string()
    } else {
        format!("{}-{}", stem, count)
    }
}

fn write_summary(path: &Path, results: &[BatchResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(["path", "images", "bytes", "error"])?;

    for result in results {
        wtr.write_record([
            result.path.display().to_string(),
            result.images.to_string(),
            result.bytes.to_string(),
            result.error.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_dir_name() {
        let mut used = HashMap::new();
        assert_eq!(unique_dir_name("scan", &mut used), "scan");
        assert_eq!(unique_dir_name("other", &mut used), "other");
        assert_eq!(unique_dir_name("scan", &mut used), "scan-2");
        assert_eq!(unique_dir_name("scan", &mut used), "scan-3");
    }
}
