//! Rules command - audit which conditional rules fire for a saved result.

use std::path::PathBuf;

use clap::Args;
use console::style;

use docmap_core::rules::SubjectSource;
use docmap_core::{evaluate_rules, RuleSubject};

use super::{load_result, load_rules};

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    /// Schema and rules file (JSON)
    #[arg(short, long, required = true)]
    rules: PathBuf,

    /// Saved extraction result (JSON)
    #[arg(long, required = true)]
    result: PathBuf,

    /// Document filename, for FILENAME conditions
    #[arg(long, default_value = "")]
    filename: String,

    /// Print matched rule ids as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: RulesArgs) -> anyhow::Result<()> {
    let rules = load_rules(Some(&args.rules))?;
    let result = load_result(&args.result)?;

    let matched = evaluate_rules(
        &rules.conditional_rules,
        RuleSubject {
            filename: &args.filename,
            mapped_data: &result.mapped_data,
            line_items: &result.line_items,
        },
    );

    if args.json {
        println!("{}", serde_json::to_string(&matched.ids())?);
        return Ok(());
    }

    for rule in &rules.conditional_rules {
        let hit = matched.matches.iter().find(|m| m.rule.id == rule.id);
        match hit {
            Some(m) => {
                let reason = match m.source {
                    SubjectSource::Unconditional => "always".to_string(),
                    SubjectSource::Filename => format!("filename {:?}", m.subjects),
                    SubjectSource::Header => format!("header {:?}", m.subjects),
                    SubjectSource::LineItems => format!("line items {:?}", m.subjects),
                };
                println!(
                    "{} {} ({}): {}",
                    style("✓").green(),
                    rule.id,
                    rule.name,
                    reason
                );
            }
            None if !rule.active => {
                println!("{} {} ({}): inactive", style("-").dim(), rule.id, rule.name);
            }
            None => {
                println!("{} {} ({}): no match", style("✗").red(), rule.id, rule.name);
            }
        }
    }

    println!();
    println!("{} of {} rules fire", matched.len(), rules.conditional_rules.len());

    Ok(())
}
