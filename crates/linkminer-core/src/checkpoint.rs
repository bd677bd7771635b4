//! Checkpoint resolution: the presence of a derived output file is the sole
//! marker of completed work. Resolution is pure with respect to a filesystem
//! snapshot; the derived-name rule must stay bit-for-bit stable so prior
//! runs' on-disk state keeps counting as done.

use std::path::{Path, PathBuf};

/// Trailing marker carried by every annotated document.
pub const ENRICHED_MARKER: &str = "-enriched.json";

/// Trailing content-type marker of input documents.
pub const INPUT_MARKER: &str = ".json";

/// The partition of an input set against the current filesystem snapshot.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Inputs whose output is missing, in input order.
    pub pending: Vec<PathBuf>,
    /// Every expected output key (already done or to be produced), in input
    /// order. Inputs that are themselves annotated artifacts appear as-is.
    pub expected: Vec<PathBuf>,
}

/// Whether a path already denotes an annotated artifact.
pub fn is_annotated(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(ENRICHED_MARKER))
}

/// Derived output key for an input: the trailing `.json` marker is replaced
/// with `-enriched.json` (`paper.json` -> `paper-enriched.json`). Callers
/// must not pass paths that are already annotated; use [`is_annotated`]
/// first.
pub fn annotated_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let derived = match name.strip_suffix(INPUT_MARKER) {
        Some(stem) => format!("{stem}{ENRICHED_MARKER}"),
        None => format!("{name}{ENRICHED_MARKER}"),
    };
    input.with_file_name(derived)
}

/// Partition `inputs` into done and pending against the current filesystem
/// snapshot. An input that is itself an annotated artifact is classified
/// done without touching the filesystem. No side effects.
pub fn resolve<I>(inputs: I) -> Resolution
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut resolution = Resolution::default();
    for input in inputs {
        if is_annotated(&input) {
            resolution.expected.push(input);
            continue;
        }
        let output = annotated_path(&input);
        if !output.exists() {
            resolution.pending.push(input);
        }
        resolution.expected.push(output);
    }
    tracing::debug!(
        pending = resolution.pending.len(),
        expected = resolution.expected.len(),
        "checkpoint resolved"
    );
    resolution
}

/// List every `*.json` document in a directory, sorted by name. Annotated
/// artifacts are included; [`resolve`] classifies them as done.
pub fn discover_inputs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(INPUT_MARKER))
        })
        .collect();
    inputs.sort();
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_name_replaces_marker() {
        assert_eq!(
            annotated_path(Path::new("/data/paper.json")),
            PathBuf::from("/data/paper-enriched.json")
        );
    }

    #[test]
    fn derived_name_appends_when_marker_absent() {
        assert_eq!(
            annotated_path(Path::new("/data/paper")),
            PathBuf::from("/data/paper-enriched.json")
        );
    }

    #[test]
    fn annotated_detection() {
        assert!(is_annotated(Path::new("/data/paper-enriched.json")));
        assert!(!is_annotated(Path::new("/data/paper.json")));
        assert!(!is_annotated(Path::new("/data/enriched.txt")));
    }

    #[test]
    fn pending_equals_inputs_minus_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        let c = dir.path().join("c.json");
        for p in [&a, &b, &c] {
            std::fs::write(p, "{}").unwrap();
        }
        std::fs::write(annotated_path(&b), "{}").unwrap();

        let resolution = resolve(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(resolution.pending, vec![a.clone(), c.clone()]);
        assert_eq!(
            resolution.expected,
            vec![annotated_path(&a), annotated_path(&b), annotated_path(&c)]
        );
    }

    #[test]
    fn annotated_input_is_done_without_fs_check() {
        // The artifact does not exist on disk; it must still be classified
        // done because its name already carries the marker.
        let input = PathBuf::from("/nonexistent/paper-enriched.json");
        let resolution = resolve(vec![input.clone()]);
        assert!(resolution.pending.is_empty());
        assert_eq!(resolution.expected, vec![input]);
    }

    #[test]
    fn pending_shrinks_monotonically_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = (0..4)
            .map(|i| {
                let p = dir.path().join(format!("doc{i}.json"));
                std::fs::write(&p, "{}").unwrap();
                p
            })
            .collect();

        let mut previous = resolve(inputs.clone()).pending;
        assert_eq!(previous.len(), 4);

        // Simulate work completing one output at a time.
        for input in &inputs {
            std::fs::write(annotated_path(input), "{}").unwrap();
            let current = resolve(inputs.clone()).pending;
            assert!(current.len() < previous.len());
            assert!(current.iter().all(|p| previous.contains(p)));
            previous = current;
        }
        assert!(previous.is_empty());
    }

    #[test]
    fn same_snapshot_same_partition() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        std::fs::write(&a, "{}").unwrap();

        let first = resolve(vec![a.clone()]);
        let second = resolve(vec![a.clone()]);
        assert_eq!(first.pending, second.pending);
        assert_eq!(first.expected, second.expected);
    }

    #[test]
    fn discover_lists_sorted_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::write(dir.path().join("a-enriched.json"), "{}").unwrap();

        let inputs = discover_inputs(dir.path()).unwrap();
        let names: Vec<&str> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a-enriched.json", "a.json", "b.json"]);
    }
}
