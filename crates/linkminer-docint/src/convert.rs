//! PDF conversion workflow: submit each PDF for remote conversion, download
//! the result bundle, and unpack it next to the source.
//!
//! A PDF whose `.json` sibling already exists is never resubmitted; the
//! sibling is the checkpoint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{DocIntClient, DocIntError};

/// Conversion settings forwarded to the service.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub project_key: String,
    pub ocr_enabled: bool,
    /// Service-side OCR backend name; the service default when `None`.
    pub ocr_backend: Option<String>,
}

impl ConversionSettings {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            ocr_enabled: false,
            ocr_backend: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum ConvertEvent {
    Converting {
        index: usize,
        total: usize,
        file: PathBuf,
    },
    Converted {
        file: PathBuf,
    },
    Skipped {
        file: PathBuf,
    },
    Failed {
        file: PathBuf,
        reason: String,
    },
    Unpacked {
        archive: PathBuf,
    },
}

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: usize = 300;

/// Expected converted-output path for a PDF: same stem, `.json` extension.
pub fn converted_target(pdf: &Path) -> PathBuf {
    pdf.with_extension("json")
}

/// List PDFs in `dir` that have no converted sibling yet, sorted by name.
pub fn pending_pdfs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .filter(|path| !converted_target(path).exists())
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

/// Convert every unconverted PDF in `dir`, then unpack any downloaded
/// result bundles.
pub async fn convert_directory(
    client: &DocIntClient,
    settings: &ConversionSettings,
    dir: &Path,
    progress: &(dyn Fn(ConvertEvent) + Sync),
) -> Result<ConvertSummary, DocIntError> {
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    convert_files(client, settings, dir, pdfs, progress).await
}

/// Convert the given PDFs, writing result bundles into `dir` and unpacking
/// them afterwards. A single PDF's failure is isolated: it stays
/// unconverted and is retried on the next invocation.
pub async fn convert_files(
    client: &DocIntClient,
    settings: &ConversionSettings,
    dir: &Path,
    pdfs: Vec<PathBuf>,
    progress: &(dyn Fn(ConvertEvent) + Sync),
) -> Result<ConvertSummary, DocIntError> {
    let mut summary = ConvertSummary::default();

    let total = pdfs.len();
    for (index, pdf) in pdfs.into_iter().enumerate() {
        if converted_target(&pdf).exists() {
            summary.skipped += 1;
            progress(ConvertEvent::Skipped { file: pdf });
            continue;
        }

        progress(ConvertEvent::Converting {
            index,
            total,
            file: pdf.clone(),
        });
        match convert_one(client, settings, &pdf, dir).await {
            Ok(()) => {
                summary.converted += 1;
                progress(ConvertEvent::Converted { file: pdf });
            }
            Err(e) => {
                tracing::warn!(file = %pdf.display(), error = %e, "conversion failed");
                summary.failed += 1;
                progress(ConvertEvent::Failed {
                    file: pdf,
                    reason: e.to_string(),
                });
            }
        }
    }

    unpack_bundles(dir, progress)?;
    Ok(summary)
}

/// Submit one PDF, poll the task until it settles, download the bundle.
async fn convert_one(
    client: &DocIntClient,
    settings: &ConversionSettings,
    pdf: &Path,
    dir: &Path,
) -> Result<(), DocIntError> {
    let file_name = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();
    let bytes = std::fs::read(pdf)?;

    let mut query = vec![
        ("filename", file_name.clone()),
        ("ocr", settings.ocr_enabled.to_string()),
    ];
    if let Some(ref backend) = settings.ocr_backend {
        query.push(("ocr_backend", backend.clone()));
    }

    let submitted = client
        .post_bytes(
            &format!("/projects/{}/conversions", settings.project_key),
            &query,
            "application/pdf",
            bytes,
        )
        .await?;
    let task_id = submitted
        .get("task_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DocIntError::Shape("conversion response lacks task_id".into()))?
        .to_string();

    let result_url = poll_task(client, &settings.project_key, &task_id).await?;

    let bundle = client.get_url_bytes(&result_url).await?;
    let bundle_path = dir.join(format!(
        "{}.zip",
        pdf.file_stem().and_then(|s| s.to_str()).unwrap_or("result")
    ));
    std::fs::write(&bundle_path, bundle)?;
    tracing::debug!(file = %pdf.display(), bundle = %bundle_path.display(), "bundle downloaded");
    Ok(())
}

async fn poll_task(
    client: &DocIntClient,
    project_key: &str,
    task_id: &str,
) -> Result<String, DocIntError> {
    let path = format!("/projects/{project_key}/conversions/{task_id}");
    for _ in 0..MAX_POLLS {
        let status = client.get_json(&path).await?;
        match status.get("status").and_then(|v| v.as_str()) {
            Some("success") => {
                return status
                    .get("result_url")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        DocIntError::Shape("successful task lacks result_url".into())
                    });
            }
            Some("failure") => {
                let message = status
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error");
                return Err(DocIntError::Conversion(message.to_string()));
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
    Err(DocIntError::Conversion(format!(
        "task {task_id} did not settle after {MAX_POLLS} polls"
    )))
}

/// Extract every `*.zip` bundle in `dir` into `dir`, removing each archive
/// after a successful extraction.
pub fn unpack_bundles(
    dir: &Path,
    progress: &(dyn Fn(ConvertEvent) + Sync),
) -> Result<(), DocIntError> {
    let mut bundles: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect();
    bundles.sort();

    for bundle in bundles {
        let file = std::fs::File::open(&bundle)?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(dir)?;
        std::fs::remove_file(&bundle)?;
        tracing::debug!(archive = %bundle.display(), "bundle unpacked and removed");
        progress(ConvertEvent::Unpacked { archive: bundle });
    }
    Ok(())
}

/// Parse a JSON conversion-status payload. Split out for testability.
#[cfg(test)]
fn status_of(payload: &serde_json::Value) -> Option<&str> {
    payload.get("status").and_then(|v| v.as_str())
}
