//! Process command - extract data from a single document.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use docmap_core::{DocumentPayload, EngineKind, ExtractionContext, ExtractionResult};

use super::{build_service, load_config, load_rules};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Extraction engine (cloud, local-regex, local-model); default from config
    #[arg(short, long)]
    engine: Option<String>,

    /// Schema and rules file (JSON)
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Supplementary text sent with the document (e.g. the covering email)
    #[arg(long, conflicts_with = "context_file")]
    context: Option<String>,

    /// Read supplementary text from a file
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// Show usage and cost after the result
    #[arg(long)]
    show_usage: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV of line items
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let engine: EngineKind = args.engine.as_deref().unwrap_or(&config.engine).parse()?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let rules = Arc::new(load_rules(args.rules.as_deref())?);
    let document = DocumentPayload::from_path(&args.input)?;

    let mut ctx = ExtractionContext::new(document, rules);
    if let Some(text) = supplementary_text(args.context.as_deref(), args.context_file.as_ref())? {
        ctx = ctx.with_supplementary_text(text);
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("Extracting with {}...", engine));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let service = build_service(config);
    let result = service.extract_with(engine, &ctx).await;

    pb.finish_and_clear();

    if result.is_degraded() {
        eprintln!(
            "{} Extraction failed, writing degraded result",
            style("⚠").yellow()
        );
    }

    let output = format_result(&result, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_usage {
        let usage = &result.usage_metadata;
        eprintln!();
        eprintln!(
            "{} Model: {}, tokens: {} in / {} out, cost: ${:.6}",
            style("ℹ").blue(),
            usage.model_name,
            usage.input_tokens,
            usage.output_tokens,
            usage.estimated_cost
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

pub fn supplementary_text(
    inline: Option<&str>,
    file: Option<&PathBuf>,
) -> anyhow::Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text.to_string())),
        (None, Some(path)) => Ok(Some(fs::read_to_string(path)?)),
        (None, None) => Ok(None),
    }
}

pub fn format_result(result: &ExtractionResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

const CSV_COLUMNS: [&str; 10] = [
    "LineItem",
    "VendorItemNumber",
    "ItemDescription",
    "QuantityOrdered",
    "UnitOfMeasure",
    "CostEach",
    "CostExtended",
    "DateRequired",
    "CustomerReference",
    "SOReference",
];

/// Core columns first, then every extension attribute seen on any row.
fn format_csv(result: &ExtractionResult) -> anyhow::Result<String> {
    let extra_columns: BTreeSet<&str> = result
        .line_items
        .iter()
        .flat_map(|item| item.extra.keys().map(String::as_str))
        .filter(|key| !CSV_COLUMNS.contains(key))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(CSV_COLUMNS.iter().copied().chain(extra_columns.iter().copied()))?;
    for item in &result.line_items {
        wtr.write_record(
            CSV_COLUMNS
                .iter()
                .chain(extra_columns.iter())
                .map(|column| item.attribute(column).unwrap_or_default()),
        )?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ExtractionResult) -> String {
    let mut output = String::new();

    output.push_str("Header:\n");
    for (name, value) in &result.mapped_data {
        match result.confidence.get(name) {
            Some(score) => output.push_str(&format!("  {}: {} ({:.0}%)\n", name, value, score * 100.0)),
            None => output.push_str(&format!("  {}: {}\n", name, value)),
        }
    }
    output.push('\n');

    output.push_str(&format!("Line items ({}):\n", result.line_items.len()));
    for item in &result.line_items {
        output.push_str(&format!(
            "  {:>4}  {:<16} {:<32} {:>8} {:<5} {:>10} {:>10}\n",
            item.line_number.as_deref().unwrap_or(""),
            item.vendor_item_number.as_deref().unwrap_or(""),
            item.description.as_deref().unwrap_or(""),
            item.quantity.map(|q| q.to_string()).unwrap_or_default(),
            item.unit_of_measure.as_deref().unwrap_or(""),
            item.cost_each.map(|c| format!("{:.2}", c)).unwrap_or_default(),
            item.cost_extended.map(|c| format!("{:.2}", c)).unwrap_or_default(),
        ));
    }

    if !result.unmapped_data.is_empty() {
        output.push_str("\nOther:\n");
        for entry in &result.unmapped_data {
            output.push_str(&format!("  {}: {}\n", entry.key, entry.value));
        }
    }

    if !result.terms_and_conditions.is_empty() {
        output.push_str(&format!("\nTerms: {}\n", result.terms_and_conditions));
    }

    if !result.applied_rule_ids.is_empty() {
        output.push_str(&format!("\nApplied rules: {}\n", result.applied_rule_ids.join(", ")));
    }

    output
}
