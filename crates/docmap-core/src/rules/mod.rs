//! Conditional rule evaluation.
//!
//! Decides, from already-extracted data, which conditional rules apply to a
//! document. Evaluation is a pure function of its inputs: no I/O, no state,
//! identical output for identical input.

use tracing::debug;

use crate::models::result::{FieldMap, LineItem};
use crate::models::schema::{ConditionalRule, RuleOperator, FILENAME_FIELD};

/// Where a rule's subject values were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectSource {
    Filename,
    Header,
    LineItems,
    /// `always` rules have no subject.
    Unconditional,
}

/// One rule that matched, with the evidence it matched on.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch<'a> {
    pub rule: &'a ConditionalRule,
    pub source: SubjectSource,
    /// Lowercased subject values the condition was tested against.
    pub subjects: Vec<String>,
}

/// Rules that matched, in their original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedRules<'a> {
    pub matches: Vec<RuleMatch<'a>>,
}

impl<'a> MatchedRules<'a> {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = &'a ConditionalRule> + '_ {
        self.matches.iter().map(|m| m.rule)
    }

    pub fn ids(&self) -> Vec<String> {
        self.rules().map(|r| r.id.clone()).collect()
    }
}

/// Data a rule can be evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct RuleSubject<'a> {
    pub filename: &'a str,
    pub mapped_data: &'a FieldMap,
    pub line_items: &'a [LineItem],
}

/// Evaluate `rules` against extracted data.
///
/// Inactive rules never match. `always` matches unconditionally. Otherwise
/// the subject is resolved in order: the filename for `FILENAME`, a header
/// field present in `mapped_data`, or the attribute's values across every
/// line item that has it. A rule matches when the case-insensitive predicate
/// holds for any subject value.
pub fn evaluate_rules<'a>(rules: &'a [ConditionalRule], subject: RuleSubject<'_>) -> MatchedRules<'a> {
    let matches: Vec<RuleMatch<'a>> = rules
        .iter()
        .filter(|rule| rule.active)
        .filter_map(|rule| evaluate_rule(rule, subject))
        .collect();

    debug!(
        "Rule evaluation: {} of {} rules matched",
        matches.len(),
        rules.len()
    );

    MatchedRules { matches }
}

fn evaluate_rule<'a>(rule: &'a ConditionalRule, subject: RuleSubject<'_>) -> Option<RuleMatch<'a>> {
    let condition = &rule.condition;

    if condition.operator == RuleOperator::Always {
        return Some(RuleMatch {
            rule,
            source: SubjectSource::Unconditional,
            subjects: Vec::new(),
        });
    }

    let (source, subjects) = resolve_subjects(&condition.field, subject)?;
    let expected = condition.value.to_lowercase();

    subjects
        .iter()
        .any(|value| predicate(condition.operator, value, &expected))
        .then_some(RuleMatch {
            rule,
            source,
            subjects,
        })
}

fn resolve_subjects(field: &str, subject: RuleSubject<'_>) -> Option<(SubjectSource, Vec<String>)> {
    if field == FILENAME_FIELD {
        return Some((SubjectSource::Filename, vec![subject.filename.to_lowercase()]));
    }

    if let Some(value) = subject.mapped_data.get(field) {
        return Some((SubjectSource::Header, vec![value.to_string().to_lowercase()]));
    }

    let values: Vec<String> = subject
        .line_items
        .iter()
        .filter_map(|item| item.attribute(field))
        .map(|v| v.to_lowercase())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some((SubjectSource::LineItems, values))
    }
}

fn predicate(operator: RuleOperator, value: &str, expected: &str) -> bool {
    match operator {
        RuleOperator::Equals => value == expected,
        RuleOperator::Contains => value.contains(expected),
        RuleOperator::StartsWith => value.starts_with(expected),
        RuleOperator::Always => true,
        RuleOperator::Unknown => false,
    }
}
