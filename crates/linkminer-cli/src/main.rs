use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use linkminer_core::config_file::{self, ConfigFile};
use linkminer_core::{PipelineConfig, ProgressEvent, discover_inputs, run_pipeline};
use linkminer_docint::{
    ApiProfile, ConversionSettings, DocIntClient, NlpEnricher, SearchEvent, SearchQuery,
    convert_directory, convert_files, search_and_download,
};
use linkminer_report::{GITHUB_PATTERN, render_markdown, render_text, tally_links};

mod output;

use output::ColorMode;

/// Mine software-repository links from scientific documents
#[derive(Parser, Debug)]
#[command(name = "linkminer", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert PDFs to structured JSON via the document-intelligence service
    Convert {
        /// Input PDF file or directory of PDF files
        #[arg(short, long)]
        input: PathBuf,

        /// Conversion project key
        #[arg(long)]
        project_key: Option<String>,

        /// Enable OCR during conversion
        #[arg(long)]
        ocr: bool,

        /// Service-side OCR backend name
        #[arg(long)]
        ocr_backend: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Annotate structured documents and tabulate repository links
    Mine {
        /// Input JSON file or directory of JSON documents
        #[arg(short, long)]
        input: PathBuf,

        /// Annotation worker-pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// How many top links to report
        #[arg(short = 'k', long, default_value_t = 25)]
        top: usize,

        /// Aggregate table file name
        #[arg(long)]
        table: Option<String>,

        /// Regex the tallied link values must match
        #[arg(long)]
        pattern: Option<String>,

        /// Emit the ranked summary as markdown
        #[arg(long)]
        markdown: bool,

        /// Path to output report file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Search the article index and download matching documents
    Search {
        /// Query to search for documents
        #[arg(short, long)]
        query: String,

        /// Index to search
        #[arg(short, long)]
        index: Option<String>,

        /// Page size for the paginated query
        #[arg(short, long)]
        chunk_size: Option<usize>,

        /// Output directory for downloaded documents
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Download worker-pool size
        #[arg(long)]
        download_workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file_config = config_file::load_config();

    match cli.command {
        Command::Convert {
            input,
            project_key,
            ocr,
            ocr_backend,
            no_color,
        } => convert(input, project_key, ocr, ocr_backend, no_color, &file_config).await,
        Command::Mine {
            input,
            workers,
            top,
            table,
            pattern,
            markdown,
            output,
            no_color,
        } => {
            mine(
                input,
                workers,
                top,
                table,
                pattern,
                markdown,
                output,
                no_color,
                &file_config,
            )
            .await
        }
        Command::Search {
            query,
            index,
            chunk_size,
            output_dir,
            download_workers,
        } => search(query, index, chunk_size, output_dir, download_workers, &file_config).await,
    }
}

/// Resolve service credentials once, at process start: env > config file.
fn resolve_profile(file_config: &ConfigFile) -> anyhow::Result<ApiProfile> {
    let api = file_config.api.clone().unwrap_or_default();
    let host = std::env::var("DOCINT_HOST").ok().or(api.host);
    let username = std::env::var("DOCINT_USERNAME").ok().or(api.username);
    let api_key = std::env::var("DOCINT_API_KEY").ok().or(api.api_key);
    match (host, username, api_key) {
        (Some(host), Some(username), Some(api_key)) => {
            Ok(ApiProfile::new(host, username, api_key))
        }
        _ => anyhow::bail!(
            "service credentials are not configured; set DOCINT_HOST, DOCINT_USERNAME, \
             and DOCINT_API_KEY (or an [api] section in the config file)"
        ),
    }
}

async fn convert(
    input: PathBuf,
    project_key: Option<String>,
    ocr: bool,
    ocr_backend: Option<String>,
    no_color: bool,
    file_config: &ConfigFile,
) -> anyhow::Result<()> {
    if !input.exists() {
        anyhow::bail!("Input not found: {}", input.display());
    }

    let profile = resolve_profile(file_config)?;
    let project_key = project_key
        .or_else(|| std::env::var("DOCINT_PROJECT_KEY").ok())
        .or_else(|| {
            file_config
                .api
                .as_ref()
                .and_then(|a| a.project_key.clone())
        })
        .ok_or_else(|| {
            anyhow::anyhow!("no conversion project key; pass --project-key or set DOCINT_PROJECT_KEY")
        })?;

    let client = DocIntClient::new(profile);
    let mut settings = ConversionSettings::new(project_key);
    settings.ocr_enabled = ocr;
    settings.ocr_backend = ocr_backend;

    let color = ColorMode(!no_color);
    let writer: Arc<Mutex<Box<dyn Write + Send>>> = Arc::new(Mutex::new(Box::new(std::io::stdout())));
    let progress = {
        let writer = Arc::clone(&writer);
        move |event: linkminer_docint::ConvertEvent| {
            if let Ok(mut w) = writer.lock() {
                let _ = output::print_convert_event(&mut *w, &event, color);
                let _ = w.flush();
            }
        }
    };

    let summary = if input.is_dir() {
        convert_directory(&client, &settings, &input, &progress).await?
    } else {
        let dir = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        convert_files(&client, &settings, &dir, vec![input.clone()], &progress).await?
    };

    println!(
        "\n{} converted, {} skipped, {} failed",
        summary.converted, summary.skipped, summary.failed
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn mine(
    input: PathBuf,
    workers: Option<usize>,
    top: usize,
    table: Option<String>,
    pattern: Option<String>,
    markdown: bool,
    output: Option<PathBuf>,
    no_color: bool,
    file_config: &ConfigFile,
) -> anyhow::Result<()> {
    if !input.exists() {
        anyhow::bail!("Input not found: {}", input.display());
    }

    // Resolve configuration: CLI flags > env vars > config file > defaults
    let defaults = PipelineConfig::default();
    let pipeline_file = file_config.pipeline.clone().unwrap_or_default();
    let config = PipelineConfig {
        num_workers: workers
            .or_else(|| {
                std::env::var("LINKMINER_WORKERS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .or(pipeline_file.num_workers)
            .unwrap_or(defaults.num_workers),
        table_name: table
            .or(pipeline_file.table_name)
            .unwrap_or(defaults.table_name),
    };

    let (dir, inputs) = if input.is_dir() {
        let inputs = discover_inputs(&input)?;
        (input.clone(), inputs)
    } else {
        let dir = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        (dir, vec![input.clone()])
    };

    // Credentials are resolved once here and live inside the shared client.
    let profile = resolve_profile(file_config)?;
    let client = Arc::new(DocIntClient::new(profile));
    let enricher = Arc::new(NlpEnricher::new(client));

    let use_color = !no_color && output.is_none();
    let color = ColorMode(use_color);

    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    // Progress goes to stderr when the report is redirected to a file.
    let progress_writer: Arc<Mutex<Box<dyn Write + Send>>> = if output.is_some() {
        Arc::new(Mutex::new(Box::new(std::io::stderr())))
    } else {
        Arc::new(Mutex::new(Box::new(std::io::stdout())))
    };

    let scan_bar = ProgressBar::new(0);
    scan_bar.set_style(
        ProgressStyle::with_template("{spinner:.green} scanning annotated documents {pos}/{len}")
            .unwrap(),
    );

    let progress_cb = {
        let pw = Arc::clone(&progress_writer);
        let scan_bar = scan_bar.clone();
        move |event: ProgressEvent| {
            if let ProgressEvent::Aggregating { scanned, total } = event {
                if scan_bar.length() == Some(0) {
                    scan_bar.set_length(total as u64);
                }
                scan_bar.set_position(scanned as u64);
                return;
            }
            if let Ok(mut w) = pw.lock() {
                let _ = output::print_progress(&mut *w, &event, color);
                let _ = w.flush();
            }
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let (summary, table) =
        run_pipeline(&dir, inputs, enricher, &config, progress_cb, cancel).await?;
    scan_bar.finish_and_clear();

    if let Ok(mut w) = progress_writer.lock() {
        let _ = output::print_run_summary(&mut *w, &summary, color);
        let _ = w.flush();
    }

    let custom_pattern = pattern
        .map(|p| regex::Regex::new(&p))
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --pattern: {e}"))?;
    let pattern = custom_pattern.as_ref().unwrap_or(&*GITHUB_PATTERN);

    let tallies = tally_links(&table, linkminer_core::NAME_FIELD, pattern, top);
    writeln!(writer)?;
    if markdown {
        write!(writer, "{}", render_markdown(&tallies))?;
    } else {
        write!(writer, "{}", render_text(&tallies))?;
    }

    Ok(())
}

async fn search(
    query: String,
    index: Option<String>,
    chunk_size: Option<usize>,
    output_dir: PathBuf,
    download_workers: Option<usize>,
    file_config: &ConfigFile,
) -> anyhow::Result<()> {
    let search_file = file_config.search.clone().unwrap_or_default();
    let index = index
        .or(search_file.index)
        .unwrap_or_else(|| "arxiv".to_string());
    let chunk_size = chunk_size.or(search_file.chunk_size).unwrap_or(100);
    let workers = download_workers
        .or(search_file.download_workers)
        .unwrap_or(linkminer_docint::search::DEFAULT_DOWNLOAD_WORKERS);

    let profile = resolve_profile(file_config)?;
    let client = DocIntClient::new(profile);
    let search_query = SearchQuery::new(index.clone(), query, chunk_size);

    // Downloaded documents land under <output_dir>/<index>/json.
    let download_dir = output_dir.join(&index).join("json");

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {msg} [{bar:40.cyan/dim}] page {pos}/{len} (eta {eta})",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    bar.set_message(index.clone());

    let progress = {
        let bar = bar.clone();
        move |event: SearchEvent| match event {
            SearchEvent::Counted { total, chunks } => {
                bar.set_length(chunks);
                bar.println(format!("{total} matching documents across {chunks} pages"));
            }
            SearchEvent::Page { page, .. } => {
                bar.set_position(page + 1);
            }
            SearchEvent::Failed { file, reason } => {
                bar.println(format!(
                    "download failed: {} ({reason})",
                    file.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                ));
            }
            SearchEvent::Fetched { .. } | SearchEvent::Skipped { .. } => {}
        }
    };

    let summary =
        search_and_download(&client, &search_query, &download_dir, workers, &progress).await?;
    bar.finish_and_clear();

    let mut stdout = std::io::stdout();
    output::print_download_summary(&mut stdout, &summary, ColorMode(true))?;
    println!("Documents saved under {}", download_dir.display());
    Ok(())
}
