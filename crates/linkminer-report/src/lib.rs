//! Ranked tallies over the aggregate table.

use std::collections::HashMap;

use linkminer_core::RecordTable;
use once_cell::sync::Lazy;
use regex::Regex;

pub mod render;

pub use render::{render_markdown, render_text};

/// Default filter: GitHub repository links.
pub static GITHUB_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://github\.com/.+").unwrap());

/// One distinct value and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTally {
    pub value: String,
    pub count: usize,
}

/// Tally the values of `column` that match `pattern`, returning the top
/// `top` in descending count order. Ties keep first-encounter order.
///
/// An absent column yields an empty tally (the enrichment schema declares
/// its own headers; a table written without the column has nothing to
/// count).
pub fn tally_links(
    table: &RecordTable,
    column: &str,
    pattern: &Regex,
    top: usize,
) -> Vec<LinkTally> {
    let Some(idx) = table.column(column) else {
        return Vec::new();
    };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for row in &table.rows {
        let Some(value) = row.get(idx) else { continue };
        if !pattern.is_match(value) {
            continue;
        }
        let entry = counts.entry(value.as_str()).or_insert(0);
        if *entry == 0 {
            order.push(value.as_str());
        }
        *entry += 1;
    }

    let mut tallies: Vec<LinkTally> = order
        .into_iter()
        .map(|value| LinkTally {
            value: value.to_string(),
            count: counts[value],
        })
        .collect();
    // Stable sort: equal counts keep first-encounter order.
    tallies.sort_by(|a, b| b.count.cmp(&a.count));
    tallies.truncate(top);
    tallies
}
