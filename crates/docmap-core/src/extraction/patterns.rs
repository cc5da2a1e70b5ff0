//! Regex patterns for the local pipeline.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Line-item grammar, tried in order.

    /// description, unit price, discount, adjusted price, quantity, amount
    pub static ref RICH_LINE: Regex = Regex::new(
        r"^(.*?)\s+([$\d,]+\.\d{2})\s+([\d.]+%?)\s+([$\d,]+\.\d{2})\s+(\d+)\s+([$\d,]+\.\d{2})$"
    ).unwrap();

    /// description, optional price, quantity, optional unit of measure, amount
    pub static ref STANDARD_LINE: Regex = Regex::new(
        r"^(.*?)\s+([$\d,]+\.\d{2})?\s+(\d+)\s+([a-zA-Z]{1,4})?\s*([$\d,]+\.\d{2})$"
    ).unwrap();

    // Lines never parsed as items
    pub static ref PAGE_NUMBER: Regex = Regex::new(r"(?i)page\s+\d").unwrap();

    pub static ref SUMMARY_LINE: Regex = Regex::new(
        r"(?i)subtotal|tax|vat|total amount|amount due"
    ).unwrap();

    // Part-number heuristics
    pub static ref UPPER_ALNUM: Regex = Regex::new(r"^[A-Z0-9]+$").unwrap();

    // Header value cleanup
    pub static ref HEADER_NUMBER: Regex = Regex::new(r"[\d,]+\.?\d*").unwrap();

    pub static ref LEADING_PUNCT: Regex = Regex::new(r"^[:.\-]\s*").unwrap();
}
