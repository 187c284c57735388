//! Amnesia Comics
//!
//! Command line front end for the comic page engine: inspect a book,
//! render a single page or dump thumbnails.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amnesia_comics::{
    BookReader, BookReaderFactory, CacheStats, ContainerKind, EngineConfig, FilterKind,
    OutputFormat, PageIndex, RenderTarget,
};

#[derive(Parser)]
#[command(name = "amnesia-comics")]
#[command(version, about = "Comic book page engine", long_about = None)]
#[command(after_help = "EXAMPLES:
    amnesia-comics info issue.cbz                  List pages
    amnesia-comics render issue.cbr 0 --out p.jpg  Render the first page
    amnesia-comics thumbs issue.cb7 --out-dir th   Write one thumbnail per page")]
struct Cli {
    /// Print machine-readable JSON, including cache statistics
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show container kind, page count and page entries
    Info {
        /// Book file (cbz, cbr, cb7, cbt, pdf, epub)
        path: PathBuf,
    },
    /// Render one page to an image file
    Render {
        path: PathBuf,
        /// Zero-based page index
        #[arg(allow_negative_numbers = true)]
        index: i64,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// brightness, contrast, grayscale, sepia or sharpen
        #[arg(long)]
        filter: Option<String>,
        /// Output file; format follows the extension (jpg or png)
        #[arg(long, default_value = "page.jpg")]
        out: PathBuf,
    },
    /// Write a thumbnail for every page
    Thumbs {
        path: PathBuf,
        #[arg(long, default_value = "thumbs")]
        out_dir: PathBuf,
        /// Longest thumbnail edge; defaults to the configured size
        #[arg(long)]
        size: Option<u32>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoReport {
    path: String,
    kind: ContainerKind,
    page_count: usize,
    entries: Vec<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputReport {
    written: Vec<String>,
    failed: Vec<usize>,
    cache: CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amnesia_comics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    let mut factory = BookReaderFactory::new(config);

    let result = match cli.command {
        Command::Info { path } => info(&mut factory, &path, cli.json).await,
        Command::Render {
            path,
            index,
            width,
            height,
            filter,
            out,
        } => {
            let filter = filter
                .as_deref()
                .map(|name| FilterKind::from_name(name).ok_or_else(|| anyhow!("unknown filter: {name}")))
                .transpose()?;
            render(&mut factory, &path, index, (width, height), filter, &out, cli.json).await
        }
        Command::Thumbs { path, out_dir, size } => {
            thumbs(&mut factory, &path, &out_dir, size, cli.json).await
        }
    };

    // Always remove extraction workspaces, even after a failure
    factory.release_resources().await;
    result
}

async fn info(factory: &mut BookReaderFactory, path: &Path, json: bool) -> Result<()> {
    let (reader, page_count) = factory
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let report = InfoReport {
        path: path.display().to_string(),
        kind: reader.kind(),
        page_count,
        entries: (0..page_count).map(|i| reader.entry_name(i)).collect(),
        cover: reader.inner().as_epub().and_then(|epub| epub.cover()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", report.path);
    println!("Kind: {}", report.kind);
    println!("Pages: {}", report.page_count);
    if let Some(cover) = &report.cover {
        println!("Cover: {cover}");
    }
    for (index, entry) in report.entries.iter().enumerate() {
        match entry {
            Some(name) => println!("{index:>5}  {name}"),
            None => println!("{index:>5}  (rendered page)"),
        }
    }
    Ok(())
}

async fn render(
    factory: &mut BookReaderFactory,
    path: &Path,
    raw_index: i64,
    bounds: (Option<u32>, Option<u32>),
    filter: Option<FilterKind>,
    out: &Path,
    json: bool,
) -> Result<()> {
    let (reader, page_count) = factory
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let index = PageIndex::checked(raw_index, page_count)?;

    let default_size = factory.config().render.max_image_size;
    let target = RenderTarget::new(bounds.0.unwrap_or(default_size), bounds.1.unwrap_or(default_size));
    let page = reader.render_page(index, target).await?;

    let optimizer = factory.optimizer();
    let page = match filter {
        Some(kind) => optimizer.apply_filter(&page, kind),
        None => (*page).clone(),
    };

    let format = output_format(out);
    let bytes = optimizer.encode(&page, format)?;
    std::fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))?;

    let report = OutputReport {
        written: vec![out.display().to_string()],
        failed: Vec::new(),
        cache: factory.cache().stats(),
    };
    print_outputs(&report, json)
}

async fn thumbs(
    factory: &mut BookReaderFactory,
    path: &Path,
    out_dir: &Path,
    size: Option<u32>,
    json: bool,
) -> Result<()> {
    let (reader, page_count) = factory
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let size = size.unwrap_or(factory.config().render.thumbnail_size);
    let mut report = OutputReport {
        written: Vec::new(),
        failed: Vec::new(),
        cache: CacheStats::default(),
    };

    for index in 0..page_count {
        let thumbnail = match reader.render_thumbnail(index, size).await {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                // One bad page does not stop the batch
                tracing::warn!(index, error = %e, "thumbnail failed");
                report.failed.push(index);
                continue;
            }
        };
        let file = out_dir.join(format!("{index:05}.jpg"));
        let bytes = factory.optimizer().encode(&thumbnail, OutputFormat::Jpeg)?;
        std::fs::write(&file, bytes).with_context(|| format!("failed to write {}", file.display()))?;
        report.written.push(file.display().to_string());
    }

    report.cache = factory.cache().stats();
    print_outputs(&report, json)
}

fn output_format(out: &Path) -> OutputFormat {
    out.extension()
        .and_then(|ext| ext.to_str())
        .and_then(OutputFormat::from_extension)
        .unwrap_or_default()
}

fn print_outputs(report: &OutputReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for file in &report.written {
        println!("wrote {file}");
    }
    if !report.failed.is_empty() {
        println!("failed pages: {:?}", report.failed);
    }
    println!(
        "cache: {} entries, hit rate {:.0}%",
        report.cache.pool_size(),
        report.cache.hit_rate() * 100.0
    );
    Ok(())
}
