//! Paginated article search with checkpointed parallel download.
//!
//! A count query (`limit: 0`) establishes the expected page total, then each
//! page's hits become download tasks keyed by document hash. A hit whose
//! target file already exists is skipped; a fetched document gets its
//! `description` and `file-info` injected before a single-shot write, so a
//! file on disk is always complete and parseable.

use std::io::Write;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};
use serde_json::{Value, json};

use crate::{DocIntClient, DocIntError};

/// Fields requested for listing pages.
const LIST_SOURCE_FIELDS: [&str; 4] = [
    "description",
    "_s3_data.json-document",
    "file-info.document-hash",
    "file-info.filename",
];

/// Fields requested when falling back to a by-hash fetch.
const FETCH_SOURCE_FIELDS: [&str; 7] = [
    "description",
    "_s3_data.json-document",
    "file-info.document-hash",
    "file-info.filename",
    "main-text",
    "tables",
    "figures",
];

/// Default size of the fixed download worker pool.
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 16;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub index: String,
    pub query: String,
    pub chunk_size: usize,
}

impl SearchQuery {
    pub fn new(index: impl Into<String>, query: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            index: index.into(),
            query: query.into(),
            chunk_size: chunk_size.max(1),
        }
    }
}

/// One document to fetch into the output directory.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Pre-signed direct URL, when the hit carried one.
    pub url: Option<String>,
    /// Target file: `<document-hash>.json` under the output directory.
    pub target: PathBuf,
    pub document_hash: String,
    pub description: Value,
    pub file_info: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub fetched: usize,
    pub present: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    Counted { total: u64, chunks: u64 },
    Page { page: u64, chunks: u64 },
    Fetched { file: PathBuf },
    Skipped { file: PathBuf },
    Failed { file: PathBuf, reason: String },
}

/// Number of pages needed for `total` documents at `chunk_size` per page.
pub fn expected_chunks(total: u64, chunk_size: usize) -> u64 {
    let chunk = chunk_size.max(1) as u64;
    total.div_ceil(chunk)
}

/// Count the documents matching a query (`limit: 0` request).
pub async fn count_documents(
    client: &DocIntClient,
    query: &SearchQuery,
) -> Result<u64, DocIntError> {
    let body = json!({
        "query": query.query,
        "source": LIST_SOURCE_FIELDS,
        "limit": 0,
    });
    let response = client
        .post_json(&format!("/indexes/{}/query", query.index), &body)
        .await?;
    response
        .pointer("/outputs/data_count")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| DocIntError::Shape("count response lacks outputs.data_count".into()))
}

/// Build a download task from one search hit. Returns `None` when the hit
/// lacks a document hash.
pub fn task_from_hit(hit: &Value, out_dir: &Path) -> Option<DownloadTask> {
    let source = hit.get("_source")?;
    let file_info = source.get("file-info")?.clone();
    let hash = file_info.get("document-hash")?.as_str()?.to_string();
    let url = source
        .pointer("/_s3_data/json-document/url")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(DownloadTask {
        url,
        target: out_dir.join(format!("{hash}.json")),
        document_hash: hash,
        description: source.get("description").cloned().unwrap_or(Value::Null),
        file_info,
    })
}

/// Run the search and download every matching document into `out_dir`.
///
/// Pages are walked sequentially; each page's pending downloads run across
/// a fixed pool of `workers`. A page with nothing pending spawns no
/// downloads at all. Per-document failures are isolated: the target file
/// stays absent and the document is retried on the next invocation.
pub async fn search_and_download(
    client: &DocIntClient,
    query: &SearchQuery,
    out_dir: &Path,
    workers: usize,
    progress: &(dyn Fn(SearchEvent) + Sync),
) -> Result<DownloadSummary, DocIntError> {
    std::fs::create_dir_all(out_dir)?;

    let total = count_documents(client, query).await?;
    let chunks = expected_chunks(total, query.chunk_size);
    progress(SearchEvent::Counted { total, chunks });
    tracing::info!(total, chunks, index = %query.index, "search counted");

    let workers = workers.max(1);
    let mut summary = DownloadSummary::default();

    for page in 0..chunks {
        progress(SearchEvent::Page { page, chunks });
        let body = json!({
            "query": query.query,
            "source": LIST_SOURCE_FIELDS,
            "limit": query.chunk_size,
            "offset": page * query.chunk_size as u64,
        });
        let response = client
            .post_json(&format!("/indexes/{}/query", query.index), &body)
            .await?;
        let hits = response
            .pointer("/outputs/data_outputs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DocIntError::Shape("query response lacks outputs.data_outputs".into()))?;

        let mut tasks = Vec::new();
        for hit in hits {
            let Some(task) = task_from_hit(hit, out_dir) else {
                tracing::warn!("search hit without document hash, skipping");
                continue;
            };
            if task.target.exists() {
                summary.present += 1;
                progress(SearchEvent::Skipped {
                    file: task.target,
                });
                continue;
            }
            tasks.push(task);
        }

        if tasks.is_empty() {
            continue;
        }

        let outcomes: Vec<Result<PathBuf, (PathBuf, String)>> = stream::iter(
            tasks
                .into_iter()
                .map(|task| retrieve_document(client, query, task)),
        )
        .buffer_unordered(workers)
        .collect()
        .await;

        for outcome in outcomes {
            match outcome {
                Ok(file) => {
                    summary.fetched += 1;
                    progress(SearchEvent::Fetched { file });
                }
                Err((file, reason)) => {
                    tracing::warn!(file = %file.display(), reason = %reason, "download failed");
                    summary.failed += 1;
                    progress(SearchEvent::Failed { file, reason });
                }
            }
        }
    }

    Ok(summary)
}

/// Fetch one document: direct URL first, by-hash query as fallback, then a
/// single-shot atomic write of the decorated document.
async fn retrieve_document(
    client: &DocIntClient,
    query: &SearchQuery,
    task: DownloadTask,
) -> Result<PathBuf, (PathBuf, String)> {
    // Defensive re-check: an overlapping run may have fetched it already.
    if task.target.exists() {
        return Ok(task.target);
    }

    let mut doc = None;
    if let Some(ref url) = task.url {
        match client.get_url_json(url).await {
            Ok(fetched) => doc = Some(fetched),
            Err(e) => {
                tracing::debug!(hash = %task.document_hash, error = %e, "direct fetch failed, falling back to query");
            }
        }
    }

    let mut doc = match doc {
        Some(doc) => doc,
        None => fetch_by_hash(client, query, &task.document_hash)
            .await
            .map_err(|e| (task.target.clone(), e.to_string()))?,
    };

    if let Some(map) = doc.as_object_mut() {
        map.insert("description".into(), task.description.clone());
        map.insert("file-info".into(), task.file_info.clone());
    }

    let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| (task.target.clone(), e.to_string()))?;
    write_atomic(&task.target, &bytes).map_err(|e| (task.target.clone(), e.to_string()))?;
    Ok(task.target)
}

async fn fetch_by_hash(
    client: &DocIntClient,
    query: &SearchQuery,
    hash: &str,
) -> Result<Value, DocIntError> {
    let body = json!({
        "query": format!("file-info.document-hash:{hash}"),
        "source": FETCH_SOURCE_FIELDS,
        "limit": 1,
    });
    let response = client
        .post_json(&format!("/indexes/{}/query", query.index), &body)
        .await?;
    response
        .pointer("/outputs/data_outputs/0/_source")
        .cloned()
        .ok_or_else(|| DocIntError::Shape(format!("no document found for hash {hash}")))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}
