use std::io::Write;

use linkminer_core::{ProgressEvent, RunSummary};
use linkminer_docint::{ConvertEvent, DownloadSummary};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn short_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Print a real-time annotation progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Resolved { pending, done } => {
            writeln!(w, "{} documents pending, {} already annotated", pending, done)?;
        }
        ProgressEvent::Annotating {
            index,
            total,
            input,
        } => {
            writeln!(
                w,
                "[{}/{}] Annotating: {}",
                index + 1,
                total,
                short_name(input)
            )?;
        }
        ProgressEvent::Annotated {
            index,
            total,
            output,
        } => {
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] -> {} {}",
                    index + 1,
                    total,
                    "DONE".green(),
                    short_name(output)
                )?;
            } else {
                writeln!(
                    w,
                    "[{}/{}] -> DONE {}",
                    index + 1,
                    total,
                    short_name(output)
                )?;
            }
        }
        ProgressEvent::Skipped {
            index,
            total,
            output,
        } => {
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] -> {} {}",
                    index + 1,
                    total,
                    "SKIPPED".dimmed(),
                    short_name(output)
                )?;
            } else {
                writeln!(
                    w,
                    "[{}/{}] -> SKIPPED {}",
                    index + 1,
                    total,
                    short_name(output)
                )?;
            }
        }
        ProgressEvent::Failed {
            index,
            total,
            input,
            reason,
        } => {
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] -> {} {} ({})",
                    index + 1,
                    total,
                    "FAILED".red(),
                    short_name(input),
                    reason
                )?;
            } else {
                writeln!(
                    w,
                    "[{}/{}] -> FAILED {} ({})",
                    index + 1,
                    total,
                    short_name(input),
                    reason
                )?;
            }
        }
        ProgressEvent::Aggregating { .. } => {
            // Covered by the scan progress bar.
        }
    }
    Ok(())
}

/// Print the annotation run summary.
pub fn print_run_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color.enabled() {
        writeln!(
            w,
            "{} annotated, {} already done, {} failed",
            summary.annotated.green(),
            summary.already_done.dimmed(),
            summary.failed.red()
        )?;
    } else {
        writeln!(
            w,
            "{} annotated, {} already done, {} failed",
            summary.annotated, summary.already_done, summary.failed
        )?;
    }
    if summary.failed > 0 {
        writeln!(
            w,
            "Failed documents stay unannotated; re-run to retry them."
        )?;
    }
    Ok(())
}

/// Print a conversion progress event.
pub fn print_convert_event(
    w: &mut dyn Write,
    event: &ConvertEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ConvertEvent::Converting { index, total, file } => {
            writeln!(
                w,
                "[{}/{}] Converting: {}",
                index + 1,
                total,
                short_name(file)
            )?;
        }
        ConvertEvent::Converted { file } => {
            if color.enabled() {
                writeln!(w, "  -> {} {}", "CONVERTED".green(), short_name(file))?;
            } else {
                writeln!(w, "  -> CONVERTED {}", short_name(file))?;
            }
        }
        ConvertEvent::Skipped { file } => {
            if color.enabled() {
                writeln!(w, "  -> {} {}", "SKIPPED".dimmed(), short_name(file))?;
            } else {
                writeln!(w, "  -> SKIPPED {}", short_name(file))?;
            }
        }
        ConvertEvent::Failed { file, reason } => {
            if color.enabled() {
                writeln!(
                    w,
                    "  -> {} {} ({})",
                    "FAILED".red(),
                    short_name(file),
                    reason
                )?;
            } else {
                writeln!(w, "  -> FAILED {} ({})", short_name(file), reason)?;
            }
        }
        ConvertEvent::Unpacked { archive } => {
            writeln!(w, "Unpacked bundle {}", short_name(archive))?;
        }
    }
    Ok(())
}

/// Print the download summary after a search run.
pub fn print_download_summary(
    w: &mut dyn Write,
    summary: &DownloadSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} fetched, {} already present, {} failed",
            summary.fetched.green(),
            summary.present.dimmed(),
            summary.failed.red()
        )?;
    } else {
        writeln!(
            w,
            "{} fetched, {} already present, {} failed",
            summary.fetched, summary.present, summary.failed
        )?;
    }
    Ok(())
}
