//! Aggregation of annotated documents into one persisted table.
//!
//! The persisted table is a cache keyed by directory: when it already
//! exists it is loaded and returned unchanged, with no directory scan.
//! Deleting the file is the only way to invalidate it.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::checkpoint::is_annotated;
use crate::table::RecordTable;
use crate::{CoreError, PipelineConfig, ProgressEvent};

/// Default file name of the persisted aggregate table.
pub const DEFAULT_TABLE_NAME: &str = "links.csv";

/// Column holding the extracted entity string (link or reference text).
pub const NAME_FIELD: &str = "name";

/// Known trailing fragments left on link strings by the enrichment's
/// tokenizer. Checked in order; exactly one match is stripped.
const TRAILING_SUFFIXES: [&str; 3] = ["/issues", ",", "/"];

/// Strip exactly one matching trailing suffix from an extracted name.
pub fn normalize_name(name: &str) -> String {
    for suffix in TRAILING_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    name.to_string()
}

/// Load the cached aggregate table for `dir`, or build and persist it by
/// scanning every annotated document.
///
/// Malformed or unreadable annotated documents are skipped with a warning.
/// Header lists may vary across documents; the table keeps the first
/// document's headers and later rows are padded or truncated to that width
/// (a tolerated inconsistency of the enrichment contract, logged when hit).
pub fn aggregate_directory(
    dir: &Path,
    config: &PipelineConfig,
    progress: &dyn Fn(ProgressEvent),
) -> Result<RecordTable, CoreError> {
    let table_path = dir.join(&config.table_name);
    if table_path.exists() {
        tracing::debug!(path = %table_path.display(), "aggregate cache hit");
        return RecordTable::load(&table_path);
    }

    let mut annotated: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_annotated(path))
        .collect();
    annotated.sort();

    let total = annotated.len();
    let mut table: Option<RecordTable> = None;

    for (scanned, path) in annotated.iter().enumerate() {
        progress(ProgressEvent::Aggregating {
            scanned: scanned + 1,
            total,
        });

        let Some((headers, rows)) = read_instances(path) else {
            continue;
        };

        let table = table.get_or_insert_with(|| RecordTable::new(headers.clone()));
        if table.headers != headers {
            tracing::warn!(
                file = %path.display(),
                "enrichment headers diverge from aggregate table; keeping first-seen columns"
            );
        }

        let name_idx = headers.iter().position(|h| h == NAME_FIELD);
        for mut row in rows {
            if let Some(idx) = name_idx
                && let Some(cell) = row.get_mut(idx)
            {
                *cell = normalize_name(cell);
            }
            table.push_row(row);
        }
    }

    let Some(table) = table else {
        tracing::debug!(dir = %dir.display(), "no annotated documents; nothing to persist");
        return Ok(RecordTable::default());
    };

    table.write(&table_path)?;
    tracing::info!(
        path = %table_path.display(),
        rows = table.rows.len(),
        "aggregate table persisted"
    );
    Ok(table)
}

/// Pull `instances.headers` / `instances.data` out of one annotated
/// document. Returns `None` (with a warning) on any shape violation.
fn read_instances(path: &Path) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "unreadable annotated document");
            return None;
        }
    };
    let doc: Value = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "malformed annotated document");
            return None;
        }
    };

    let instances = doc.get("instances")?;
    let headers: Vec<String> = instances
        .get("headers")?
        .as_array()?
        .iter()
        .map(|h| h.as_str().map(str::to_string))
        .collect::<Option<_>>()?;
    let rows: Vec<Vec<String>> = instances
        .get("data")?
        .as_array()?
        .iter()
        .filter_map(|row| row.as_array())
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Some((headers, rows))
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_progress(_: ProgressEvent) {}

    fn write_annotated(dir: &Path, name: &str, headers: &[&str], rows: &[Vec<&str>]) -> PathBuf {
        let doc = serde_json::json!({
            "instances": { "headers": headers, "data": rows },
        });
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        path
    }

    #[test]
    fn strips_trailing_issues_fragment() {
        assert_eq!(
            normalize_name("https://github.com/org/repo/issues"),
            "https://github.com/org/repo"
        );
    }

    #[test]
    fn strips_trailing_comma() {
        assert_eq!(
            normalize_name("https://github.com/org/repo,"),
            "https://github.com/org/repo"
        );
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(
            normalize_name("https://github.com/org/repo/"),
            "https://github.com/org/repo"
        );
    }

    #[test]
    fn strips_exactly_one_suffix() {
        // A comma after /issues: only the comma goes.
        assert_eq!(
            normalize_name("https://github.com/org/repo/issues,"),
            "https://github.com/org/repo/issues"
        );
        // A doubled slash loses one.
        assert_eq!(
            normalize_name("https://github.com/org/repo//"),
            "https://github.com/org/repo/"
        );
    }

    #[test]
    fn leaves_clean_names_alone() {
        assert_eq!(
            normalize_name("https://github.com/org/repo"),
            "https://github.com/org/repo"
        );
        assert_eq!(normalize_name("Some Tool v2"), "Some Tool v2");
    }

    #[test]
    fn row_count_is_sum_of_per_document_records() {
        let dir = tempfile::tempdir().unwrap();
        let headers = ["name", "type"];
        write_annotated(
            dir.path(),
            "a-enriched.json",
            &headers,
            &[vec!["https://github.com/a/a", "link"]],
        );
        write_annotated(
            dir.path(),
            "b-enriched.json",
            &headers,
            &[
                vec!["https://github.com/b/b,", "link"],
                vec!["https://github.com/b/b2/", "link"],
            ],
        );

        let config = PipelineConfig::default();
        let table = aggregate_directory(dir.path(), &config, &no_progress).unwrap();
        assert_eq!(table.headers, vec!["name", "type"]);
        assert_eq!(table.rows.len(), 3);
        // Names were normalized on the way in.
        assert_eq!(table.rows[1][0], "https://github.com/b/b");
        assert_eq!(table.rows[2][0], "https://github.com/b/b2");
        assert!(dir.path().join(DEFAULT_TABLE_NAME).exists());
    }

    #[test]
    fn cache_hit_skips_rescan() {
        let dir = tempfile::tempdir().unwrap();
        write_annotated(
            dir.path(),
            "a-enriched.json",
            &["name"],
            &[vec!["https://github.com/a/a"]],
        );

        let config = PipelineConfig::default();
        let first = aggregate_directory(dir.path(), &config, &no_progress).unwrap();
        assert_eq!(first.rows.len(), 1);

        // Sentinel: a new annotated document added after persistence must
        // not show up in the cached result.
        write_annotated(
            dir.path(),
            "sentinel-enriched.json",
            &["name"],
            &[vec!["https://github.com/s/s"]],
        );
        let cached = aggregate_directory(dir.path(), &config, &no_progress).unwrap();
        assert_eq!(cached, first);
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken-enriched.json"), "{oops").unwrap();
        std::fs::write(
            dir.path().join("shapeless-enriched.json"),
            r#"{"no_instances": true}"#,
        )
        .unwrap();
        write_annotated(
            dir.path(),
            "ok-enriched.json",
            &["name"],
            &[vec!["https://github.com/ok/ok"]],
        );

        let config = PipelineConfig::default();
        let table = aggregate_directory(dir.path(), &config, &no_progress).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn divergent_headers_still_contribute_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_annotated(
            dir.path(),
            "a-enriched.json",
            &["name", "type", "subtype"],
            &[vec!["https://github.com/a/a", "link", "url"]],
        );
        write_annotated(
            dir.path(),
            "b-enriched.json",
            &["name", "kind"],
            &[vec!["https://github.com/b/b", "link"]],
        );

        let config = PipelineConfig::default();
        let table = aggregate_directory(dir.path(), &config, &no_progress).unwrap();
        assert_eq!(table.headers, vec!["name", "type", "subtype"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["https://github.com/b/b", "link", ""]);
    }

    #[test]
    fn empty_directory_yields_empty_table_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default();
        let table = aggregate_directory(dir.path(), &config, &no_progress).unwrap();
        assert!(table.is_empty());
        assert!(!dir.path().join(DEFAULT_TABLE_NAME).exists());
    }
}
