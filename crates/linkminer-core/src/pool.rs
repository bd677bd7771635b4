//! Fixed-size annotation worker pool.
//!
//! Workers pull jobs from a shared queue and share nothing but the
//! filesystem. The dispatcher collects one explicit [`ItemOutcome`] per
//! submitted item in submission order, isolates failures per item, never
//! retries (the checkpoint resolver is the retry mechanism across runs),
//! and joins the whole pool before returning.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::annotate::{Enricher, annotate_document};
use crate::{ItemOutcome, ProgressEvent};

struct AnnotationJob {
    input: PathBuf,
    index: usize,
    total: usize,
    result_tx: oneshot::Sender<ItemOutcome>,
}

/// Annotate all `pending` inputs across a pool of `num_workers` workers.
///
/// An empty pending list is a hard no-op: no channels are built and no
/// tasks are spawned. Cancellation stops pickup of new items; in-flight
/// items run to completion.
pub async fn run_annotations(
    pending: Vec<PathBuf>,
    enricher: Arc<dyn Enricher>,
    num_workers: usize,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) -> Vec<ItemOutcome> {
    if pending.is_empty() {
        return Vec::new();
    }

    let total = pending.len();
    let workers = num_workers.max(1).min(total);
    let (job_tx, job_rx) = async_channel::unbounded::<AnnotationJob>();

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        handles.push(tokio::spawn(worker_loop(
            job_rx.clone(),
            Arc::clone(&enricher),
            Arc::clone(&progress),
            cancel.clone(),
        )));
    }
    drop(job_rx);

    let mut receivers = Vec::with_capacity(total);
    for (index, input) in pending.into_iter().enumerate() {
        let (result_tx, result_rx) = oneshot::channel();
        let _ = job_tx
            .send(AnnotationJob {
                input: input.clone(),
                index,
                total,
                result_tx,
            })
            .await;
        receivers.push((input, result_rx));
    }
    // Close the queue so workers exit once it drains.
    job_tx.close();

    let mut outcomes = Vec::with_capacity(total);
    for (input, rx) in receivers {
        match rx.await {
            Ok(outcome) => outcomes.push(outcome),
            // The worker died (panicked) before reporting. Surface it as an
            // explicit failure rather than dropping the item silently; the
            // missing output re-queues it on the next run.
            Err(_) => outcomes.push(ItemOutcome::Failed {
                input,
                reason: "worker terminated before reporting a result".into(),
            }),
        }
    }

    for handle in handles {
        let _ = handle.await;
    }

    outcomes
}

async fn worker_loop(
    rx: async_channel::Receiver<AnnotationJob>,
    enricher: Arc<dyn Enricher>,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) {
    while let Ok(job) = rx.recv().await {
        let AnnotationJob {
            input,
            index,
            total,
            result_tx,
        } = job;

        if cancel.is_cancelled() {
            tracing::debug!(input = %input.display(), "skipping: cancelled");
            let _ = result_tx.send(ItemOutcome::Failed {
                input,
                reason: "cancelled".into(),
            });
            continue;
        }

        progress(ProgressEvent::Annotating {
            index,
            total,
            input: input.clone(),
        });

        let outcome = match annotate_document(&input, enricher.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(input = %input.display(), error = %e, "annotation failed");
                ItemOutcome::Failed {
                    input: input.clone(),
                    reason: e.to_string(),
                }
            }
        };

        match &outcome {
            ItemOutcome::Annotated(output) => progress(ProgressEvent::Annotated {
                index,
                total,
                output: output.clone(),
            }),
            ItemOutcome::AlreadyDone(output) => progress(ProgressEvent::Skipped {
                index,
                total,
                output: output.clone(),
            }),
            ItemOutcome::Failed { input, reason } => progress(ProgressEvent::Failed {
                index,
                total,
                input: input.clone(),
                reason: reason.clone(),
            }),
        }

        let _ = result_tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::test_support::CountingEnricher;
    use crate::checkpoint::annotated_path;
    use std::future::Future;
    use std::path::Path;
    use std::pin::Pin;

    fn no_progress() -> Arc<dyn Fn(ProgressEvent) + Send + Sync> {
        Arc::new(|_| {})
    }

    fn write_doc(dir: &Path, name: &str, id: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!(r#"{{"id":"{id}"}}"#)).unwrap();
        path
    }

    #[tokio::test]
    async fn empty_pending_is_noop() {
        let enricher = Arc::new(CountingEnricher::passthrough());
        let outcomes = run_annotations(
            Vec::new(),
            enricher.clone(),
            4,
            no_progress(),
            CancellationToken::new(),
        )
        .await;
        assert!(outcomes.is_empty());
        assert_eq!(enricher.calls(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = (1..=5)
            .map(|i| {
                let id = if i == 3 {
                    format!("poison-{i}")
                } else {
                    format!("doc-{i}")
                };
                write_doc(dir.path(), &format!("doc{i}.json"), &id)
            })
            .collect();

        let enricher = Arc::new(CountingEnricher::failing_on("poison"));
        let outcomes = run_annotations(
            inputs.clone(),
            enricher,
            5,
            no_progress(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 5);
        for (i, input) in inputs.iter().enumerate() {
            if i == 2 {
                assert!(outcomes[i].is_failed());
                assert!(!annotated_path(input).exists());
            } else {
                assert!(matches!(outcomes[i], ItemOutcome::Annotated(_)));
                assert!(annotated_path(input).exists());
            }
        }
    }

    #[tokio::test]
    async fn outcomes_follow_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = (0..8)
            .map(|i| write_doc(dir.path(), &format!("d{i}.json"), &format!("d{i}")))
            .collect();

        let enricher = Arc::new(CountingEnricher::passthrough());
        let outcomes = run_annotations(
            inputs.clone(),
            enricher,
            3,
            no_progress(),
            CancellationToken::new(),
        )
        .await;

        for (input, outcome) in inputs.iter().zip(&outcomes) {
            match outcome {
                ItemOutcome::Annotated(output) => {
                    assert_eq!(output, &annotated_path(input));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn in_worker_recheck_reports_already_done() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_doc(dir.path(), "doc.json", "doc");
        std::fs::write(annotated_path(&input), "{}").unwrap();

        let enricher = Arc::new(CountingEnricher::passthrough());
        let outcomes = run_annotations(
            vec![input],
            enricher.clone(),
            1,
            no_progress(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(outcomes[0], ItemOutcome::AlreadyDone(_)));
        assert_eq!(enricher.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_items_are_not_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<PathBuf> = (0..3)
            .map(|i| write_doc(dir.path(), &format!("d{i}.json"), &format!("d{i}")))
            .collect();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let enricher = Arc::new(CountingEnricher::passthrough());
        let outcomes =
            run_annotations(inputs.clone(), enricher.clone(), 2, no_progress(), cancel).await;

        assert_eq!(enricher.calls(), 0);
        assert!(outcomes.iter().all(|o| o.is_failed()));
        assert!(inputs.iter().all(|i| !annotated_path(i).exists()));
    }

    /// Enricher that panics on a marked document; exercises worker-death
    /// reporting.
    struct PanickingEnricher;

    impl Enricher for PanickingEnricher {
        fn name(&self) -> &str {
            "panicking"
        }

        fn enrich<'a>(
            &'a self,
            doc: &'a serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, crate::CoreError>> + Send + 'a>>
        {
            Box::pin(async move {
                let id = doc.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                if id.contains("panic") {
                    panic!("enricher blew up on {id}");
                }
                Ok(doc.clone())
            })
        }
    }

    #[tokio::test]
    async fn worker_panic_surfaces_as_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let good1 = write_doc(dir.path(), "a.json", "a");
        let bad = write_doc(dir.path(), "b.json", "panic-b");
        let good2 = write_doc(dir.path(), "c.json", "c");

        let outcomes = run_annotations(
            vec![good1.clone(), bad.clone(), good2.clone()],
            Arc::new(PanickingEnricher),
            3,
            no_progress(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ItemOutcome::Annotated(_)));
        assert!(outcomes[1].is_failed());
        assert!(matches!(outcomes[2], ItemOutcome::Annotated(_)));
        assert!(!annotated_path(&bad).exists());
    }
}
