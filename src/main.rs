//! PDF Image Stamper CLI
//!
//! Command-line interface for stamping images onto PDFs and extracting pages.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use stamp_pdf::{
    extract_pages_bytes, page_count, page_sizes, parse_page_range, stamp_pdf_bytes, update,
    Action, EditorState, ExportOptions, Layout, ViewerGeometry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stamp images onto PDF pages, or extract a subset of pages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw the images listed in a layout file onto the PDF
    Stamp {
        /// Input PDF file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// JSON layout listing the overlays (image paths relative to it)
        #[arg(short, long)]
        layout: PathBuf,

        /// Viewer page width the layout positions refer to (overrides the layout)
        #[arg(long)]
        viewer_width: Option<f64>,

        /// Re-encode opaque non-JPEG images as JPEG at this quality (1-100)
        #[arg(short = 'q', long)]
        jpeg_quality: Option<u8>,

        /// Leave PDF streams uncompressed
        #[arg(long)]
        no_compress: bool,
    },
    /// Write the selected pages to a new PDF
    Extract {
        /// Input PDF file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Pages to keep, e.g. "1, 3-5, 8"
        #[arg(short, long)]
        pages: String,

        /// Leave PDF streams uncompressed
        #[arg(long)]
        no_compress: bool,
    },
    /// Print page count and page sizes
    Info {
        /// Input PDF file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match args.command {
        Command::Stamp {
            input,
            output,
            layout,
            viewer_width,
            jpeg_quality,
            no_compress,
        } => {
            let options = ExportOptions {
                compress_streams: !no_compress,
                jpeg_quality,
            };
            run_stamp(&input, &output, &layout, viewer_width, &options)
        }
        Command::Extract {
            input,
            output,
            pages,
            no_compress,
        } => {
            let options = ExportOptions {
                compress_streams: !no_compress,
                jpeg_quality: None,
            };
            run_extract(&input, &output, &pages, &options)
        }
        Command::Info { input } => run_info(&input),
    }
}

fn read_pdf(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

fn run_stamp(
    input: &Path,
    output: &Path,
    layout_path: &Path,
    viewer_width: Option<f64>,
    options: &ExportOptions,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(layout_path)
        .with_context(|| format!("Failed to read layout {:?}", layout_path))?;
    let layout = Layout::from_json(&text)?;

    let base = layout_path.parent().unwrap_or_else(|| Path::new("."));
    let images = layout
        .overlays
        .iter()
        .map(|entry| {
            let path = base.join(&entry.image);
            std::fs::read(&path)
                .map(Arc::<[u8]>::from)
                .with_context(|| format!("Failed to read image {:?}", path))
        })
        .collect::<anyhow::Result<Vec<Arc<[u8]>>>>()?;

    let bytes: Arc<[u8]> = Arc::from(read_pdf(input)?);
    let page_count = page_count(&bytes)?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let state = update(
        EditorState::new(),
        Action::Open {
            name,
            bytes: Arc::clone(&bytes),
            page_count,
        },
    );
    let mut state = layout.apply(state, images)?;
    if let Some(width) = viewer_width {
        state.geometry = ViewerGeometry::new(width);
    }

    if !state.can_export_stamped() {
        bail!("Layout {:?} places no images on this document", layout_path);
    }

    println!("PDF Image Stamper");
    println!("=================");

    let (stamped, result) = stamp_pdf_bytes(&bytes, &state.overlays, state.geometry, options)?;
    std::fs::write(output, stamped).with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "\nDone! Stamped {} images on a {}-page document, {} skipped",
        result.stamped_overlays, result.page_count, result.skipped_overlays
    );
    println!("Output saved to: {:?}", output);

    Ok(())
}

fn run_extract(
    input: &Path,
    output: &Path,
    pages: &str,
    options: &ExportOptions,
) -> anyhow::Result<()> {
    let bytes = read_pdf(input)?;
    let page_count = page_count(&bytes)?;

    let indices = parse_page_range(pages, page_count);
    if indices.is_empty() {
        bail!(
            "\"{}\" selects no pages of a {}-page document",
            pages,
            page_count
        );
    }

    let extracted = extract_pages_bytes(&bytes, &indices, options)?;
    std::fs::write(output, extracted).with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "Extracted {} of {} pages to {:?}",
        indices.len(),
        page_count,
        output
    );
    Ok(())
}

fn run_info(input: &Path) -> anyhow::Result<()> {
    let bytes = read_pdf(input)?;
    let sizes = page_sizes(&bytes)?;

    println!("{:?}: {} pages", input, sizes.len());
    for (i, size) in sizes.iter().enumerate() {
        println!("  page {}: {:.1} x {:.1} pt", i + 1, size.width, size.height);
    }
    Ok(())
}
