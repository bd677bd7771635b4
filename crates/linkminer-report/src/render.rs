//! Plain-text and markdown rendering of ranked tallies.

use crate::LinkTally;

/// Render an aligned text table: rank, count, value.
pub fn render_text(tallies: &[LinkTally]) -> String {
    if tallies.is_empty() {
        return "No matching links found.\n".to_string();
    }

    let count_width = tallies
        .iter()
        .map(|t| t.count.to_string().len())
        .max()
        .unwrap_or(1)
        .max("count".len());
    let rank_width = tallies.len().to_string().len().max(1);

    let mut out = String::new();
    out.push_str(&format!(
        "{:>rank_width$}  {:>count_width$}  {}\n",
        "#", "count", "link",
    ));
    for (i, tally) in tallies.iter().enumerate() {
        out.push_str(&format!(
            "{:>rank_width$}  {:>count_width$}  {}\n",
            i + 1,
            tally.count,
            tally.value,
        ));
    }
    out
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|")
}

/// Render a markdown table of the tallies.
pub fn render_markdown(tallies: &[LinkTally]) -> String {
    let mut out = String::from("| # | Count | Link |\n|---|-------|------|\n");
    for (i, tally) in tallies.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            i + 1,
            tally.count,
            md_escape(&tally.value),
        ));
    }
    out
}
