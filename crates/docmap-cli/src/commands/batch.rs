//! Batch processing command for multiple documents.
//!
//! Documents are extracted as concurrent tasks sharing one registry, so the
//! OCR backend and models are created once. Extraction failures never abort
//! the batch: the degraded result is written like any other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use docmap_core::{DocumentPayload, EngineKind, ExtractionContext, ExtractionResult, ExtractionService};

use super::process::{format_result, supplementary_text, OutputFormat};
use super::{build_service, load_config, load_rules};

const SUPPORTED_EXTENSIONS: [&str; 8] = ["pdf", "png", "jpg", "jpeg", "webp", "tiff", "tif", "bmp"];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input glob pattern (e.g. "inbox/*.pdf")
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Extraction engine; default from config
    #[arg(short, long)]
    engine: Option<String>,

    /// Schema and rules file (JSON)
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Supplementary text sent with every document
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed concurrently
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    result: Option<ExtractionResult>,
    error: Option<String>,
    processing_time_ms: u64,
}

impl ProcessResult {
    fn failed(&self) -> bool {
        self.error.is_some() || self.result.as_ref().is_some_and(ExtractionResult::is_degraded)
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let engine: EngineKind = args.engine.as_deref().unwrap_or(&config.engine).parse()?;
    let rules = Arc::new(load_rules(args.rules.as_deref())?);
    let context = supplementary_text(None, args.context_file.as_ref())?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process with {}",
        style("ℹ").blue(),
        files.len(),
        engine
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let service = build_service(config);
    let jobs = args.jobs.max(1);

    let mut results: Vec<ProcessResult> = stream::iter(files)
        .map(|path| {
            let service = service.clone();
            let rules = Arc::clone(&rules);
            let context = context.clone();
            let pb = overall_pb.clone();
            async move {
                let result = process_single_file(path, &service, engine, rules, context).await;
                pb.inc(1);
                result
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    overall_pb.finish_with_message("Complete");
    results.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Some(extraction) = &result.result {
                let output_name = result.path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document");
                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

                fs::write(&output_path, format_result(extraction, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args.output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results, &rules.field_names())?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.failed()).collect();
    let total_cost: f64 = results
        .iter()
        .filter_map(|r| r.result.as_ref())
        .map(|r| r.usage_metadata.estimated_cost)
        .sum();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed, estimated cost ${:.6}",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red(),
        total_cost
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!("  - {}: {}", result.path.display(), failure_reason(result));
        }
    }

    Ok(())
}

async fn process_single_file(
    path: PathBuf,
    service: &ExtractionService,
    engine: EngineKind,
    rules: Arc<docmap_core::TrainingRules>,
    context: Option<String>,
) -> ProcessResult {
    let file_start = Instant::now();

    let document = match DocumentPayload::from_path(&path) {
        Ok(document) => document,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return ProcessResult {
                path,
                result: None,
                error: Some(e.to_string()),
                processing_time_ms: file_start.elapsed().as_millis() as u64,
            };
        }
    };

    let mut ctx = ExtractionContext::new(document, rules);
    if let Some(text) = context {
        ctx = ctx.with_supplementary_text(text);
    }

    let result = service.extract_with(engine, &ctx).await;

    ProcessResult {
        path,
        result: Some(result),
        error: None,
        processing_time_ms: file_start.elapsed().as_millis() as u64,
    }
}

fn failure_reason(result: &ProcessResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    result
        .result
        .as_ref()
        .and_then(|r| r.unmapped_data.iter().find(|e| e.key == "error"))
        .map(|e| e.value.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn write_summary(path: &Path, results: &[ProcessResult], fields: &[&str]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["filename", "status"];
    header.extend_from_slice(fields);
    header.extend_from_slice(&[
        "line_items",
        "applied_rules",
        "model",
        "total_tokens",
        "estimated_cost",
        "processing_time_ms",
        "error",
    ]);
    wtr.write_record(&header)?;

    for result in results {
        let filename = result.path.display().to_string();
        let status = if result.failed() { "failed" } else { "ok" };
        let mut record = vec![filename, status.to_string()];

        match &result.result {
            Some(extraction) => {
                record.extend(fields.iter().map(|f| {
                    extraction
                        .mapped_data
                        .get(*f)
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                }));
                record.push(extraction.line_items.len().to_string());
                record.push(extraction.applied_rule_ids.join(";"));
                record.push(extraction.usage_metadata.model_name.clone());
                record.push(extraction.usage_metadata.total_tokens.to_string());
                record.push(format!("{:.6}", extraction.usage_metadata.estimated_cost));
            }
            None => {
                record.extend(fields.iter().map(|_| String::new()));
                record.extend(std::iter::repeat_n(String::new(), 5));
            }
        }

        record.push(result.processing_time_ms.to_string());
        record.push(if result.failed() { failure_reason(result) } else { String::new() });
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
