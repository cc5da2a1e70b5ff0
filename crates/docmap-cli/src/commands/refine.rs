//! Refine command - correct a saved result with free-text feedback.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use docmap_core::DocumentPayload;

use super::process::{format_result, OutputFormat};
use super::{build_service, load_config, load_result, load_rules};

/// Arguments for the refine command.
#[derive(Args)]
pub struct RefineArgs {
    /// The source document (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// The result being corrected (JSON)
    #[arg(long, required = true)]
    result: PathBuf,

    /// What is wrong and how to fix it
    #[arg(short = 'm', long, required = true)]
    feedback: String,

    /// Schema and rules file (JSON)
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Append the suggested rule to this rules file
    #[arg(long)]
    promote_to: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

pub async fn run(args: RefineArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let rules = load_rules(args.rules.as_deref())?;
    let current = load_result(&args.result)?;
    let document = DocumentPayload::from_path(&args.input)?;

    info!("Refining {} with feedback", args.input.display());

    let service = build_service(config);
    let refinement = service
        .feedback()
        .refine(&document, &current, &args.feedback, &rules)
        .await
        .map_err(|e| anyhow::anyhow!("Feedback refinement failed: {}", e))?;

    let updated = refinement.apply_to(&current);
    let output = format_result(&updated, args.format)?;

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

    eprintln!(
        "{} Suggested rule: {}",
        style("ℹ").blue(),
        refinement.suggested_rule
    );
    eprintln!(
        "{} Tokens: {}, cost: ${:.6}",
        style("ℹ").blue(),
        refinement.usage_metadata.total_tokens,
        refinement.usage_metadata.estimated_cost
    );

    if let Some(rules_path) = &args.promote_to {
        let mut target = if rules_path.exists() {
            load_rules(Some(rules_path))?
        } else {
            rules.clone()
        };
        target.promote_rule(&refinement.suggested_rule);
        target.save(rules_path)?;
        eprintln!(
            "{} Rule appended to {}",
            style("✓").green(),
            rules_path.display()
        );
    }

    Ok(())
}
