//! Line-item grammar over spatially reconstructed text.
//!
//! The grammar is an ordered list of (pattern, builder) rules. Each line is
//! tried against the rules in order and the first builder that yields an
//! item wins; lines no rule accepts are ignored.

use regex::{Captures, Regex};
use tracing::{debug, trace};

use super::patterns::{PAGE_NUMBER, RICH_LINE, STANDARD_LINE, SUMMARY_LINE, UPPER_ALNUM};
use crate::models::lenient::parse_number;
use crate::models::result::LineItem;

/// Lines shorter than this are never items.
const MIN_LINE_CHARS: usize = 10;

/// Leading words that are table captions, not part numbers.
const PART_NUMBER_STOP_WORDS: [&str; 5] = ["THE", "ITEM", "DESC", "BILL", "SHIP"];

const DEFAULT_UOM: &str = "EACH";

/// One grammar production.
pub struct GrammarRule {
    pub name: &'static str,
    pub pattern: &'static Regex,
    /// Builds an item from the captures; `None` rejects the line.
    pub build: fn(&Captures<'_>) -> Option<LineItem>,
}

/// The line-item grammar, in precedence order.
pub fn grammar() -> [GrammarRule; 2] {
    [
        GrammarRule {
            name: "rich",
            pattern: &RICH_LINE,
            build: build_rich,
        },
        GrammarRule {
            name: "standard",
            pattern: &STANDARD_LINE,
            build: build_standard,
        },
    ]
}

/// Whether a trimmed line is excluded before the grammar runs.
pub fn is_skipped_line(line: &str) -> bool {
    line.chars().count() < MIN_LINE_CHARS || PAGE_NUMBER.is_match(line) || SUMMARY_LINE.is_match(line)
}

/// Parse line items from reconstructed text, numbering them from 1.
pub fn parse_line_items(text: &str) -> Vec<LineItem> {
    let rules = grammar();
    let mut items = Vec::new();

    for line in text.lines().map(str::trim) {
        if is_skipped_line(line) {
            continue;
        }

        let parsed = rules.iter().find_map(|rule| {
            let caps = rule.pattern.captures(line)?;
            let item = (rule.build)(&caps)?;
            trace!("Line matched {} rule: {}", rule.name, line);
            Some(item)
        });

        if let Some(mut item) = parsed {
            item.line_number = Some((items.len() + 1).to_string());
            items.push(item);
        }
    }

    debug!("Parsed {} line items", items.len());
    items
}

fn build_rich(caps: &Captures<'_>) -> Option<LineItem> {
    let (part, description) = split_part_number(caps[1].trim());

    Some(
        LineItem {
            vendor_item_number: Some(part),
            description: Some(description),
            quantity: parse_number(&caps[5]),
            unit_of_measure: Some(DEFAULT_UOM.to_string()),
            cost_each: parse_number(&caps[2]),
            cost_extended: parse_number(&caps[6]),
            ..LineItem::default()
        }
        .with_extra("Discount", &caps[3]),
    )
}

fn build_standard(caps: &Captures<'_>) -> Option<LineItem> {
    let raw = caps[1].trim();
    if raw.chars().count() <= 3 {
        return None;
    }
    let (part, description) = split_part_number(raw);

    Some(LineItem {
        vendor_item_number: Some(part),
        description: Some(description),
        quantity: parse_number(&caps[3]),
        unit_of_measure: Some(
            caps.get(4)
                .map_or(DEFAULT_UOM, |m| m.as_str())
                .to_string(),
        ),
        cost_each: caps.get(2).map_or(Some(0.0), |m| parse_number(m.as_str())),
        cost_extended: parse_number(&caps[5]),
        ..LineItem::default()
    })
}

/// Split a leading vendor part number off a description.
///
/// The first word is a part number when it has a digit or a hyphen, or is
/// all uppercase alphanumerics, is longer than two characters, and is not a
/// caption word. Otherwise the part number is empty.
pub fn split_part_number(raw: &str) -> (String, String) {
    let Some((first, rest)) = raw.split_once(' ') else {
        return (String::new(), raw.to_string());
    };

    let looks_like_part = first.chars().any(|c| c.is_ascii_digit())
        || first.contains('-')
        || UPPER_ALNUM.is_match(first);
    let is_part = looks_like_part
        && first.chars().count() > 2
        && !PART_NUMBER_STOP_WORDS.contains(&first.to_uppercase().as_str());

    if is_part {
        (first.to_string(), rest.trim().to_string())
    } else {
        (String::new(), raw.to_string())
    }
}
