//! Idempotent per-document annotation.
//!
//! One input in, at most one output out. The output is staged to a temp file
//! in the target directory and atomically renamed into place, so a crash (or
//! a concurrently overlapping run) can never leave a partial artifact behind:
//! either the final bytes exist under the final name, or nothing does.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::pin::Pin;

use crate::checkpoint::annotated_path;
use crate::{CoreError, ItemOutcome};

/// An external enrichment step applied to one structured document.
///
/// Implementations wrap remote NLP services; tests substitute local fakes.
pub trait Enricher: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Apply the enrichment to a parsed document, returning the enriched
    /// document. Must not write to disk.
    fn enrich<'a>(
        &'a self,
        doc: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CoreError>> + Send + 'a>>;
}

/// Annotate one input document.
///
/// Re-checks output existence first: scheduling and writing are not atomic
/// with the resolver's earlier snapshot, so an overlapping run may have
/// produced the output in the meantime. On enrichment or parse failure no
/// output file is created.
pub async fn annotate_document(
    input: &Path,
    enricher: &dyn Enricher,
) -> Result<ItemOutcome, CoreError> {
    let output = annotated_path(input);
    if output.exists() {
        tracing::debug!(output = %output.display(), "output already present, skipping");
        return Ok(ItemOutcome::AlreadyDone(output));
    }

    let raw = std::fs::read_to_string(input)?;
    let doc: serde_json::Value = serde_json::from_str(&raw)?;

    let enriched = enricher.enrich(&doc).await?;
    let bytes = serde_json::to_vec_pretty(&enriched)?;
    write_atomic(&output, &bytes)?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        enricher = enricher.name(),
        "annotated"
    );
    Ok(ItemOutcome::Annotated(output))
}

/// Write `bytes` to `path` via a temp file in the same directory followed by
/// an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
pub mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Fake enricher counting calls; either passes the document through with
    /// an added `instances` marker or fails on selected inputs.
    pub struct CountingEnricher {
        calls: AtomicUsize,
        fail_on: Option<String>,
    }

    impl CountingEnricher {
        /// Enricher that returns the document unchanged.
        pub fn passthrough() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }

        /// Enricher that fails whenever the document contains `marker`
        /// in its `id` field.
        pub fn failing_on(marker: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: Some(marker.to_string()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Enricher for CountingEnricher {
        fn name(&self) -> &str {
            "counting"
        }

        fn enrich<'a>(
            &'a self,
            doc: &'a serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CoreError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(ref marker) = self.fail_on {
                    let id = doc.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                    if id.contains(marker.as_str()) {
                        return Err(CoreError::Enrich(format!("injected failure for {id}")));
                    }
                }
                Ok(doc.clone())
            })
        }
    }
}
