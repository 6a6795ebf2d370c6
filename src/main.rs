//! PDF content editing CLI.
//!
//! This binary exposes the unmark library: document summaries, page
//! analysis, single page previews and full reconstruction with removal
//! targets and overlays.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use unmark::domain::{Compaction, SaveOptions};
use unmark::editing::read_input;
use unmark::{EditConfig, EditReport, EditService, OverlayPlan, TargetSet};

/// PDF content editor
///
/// Removes targeted text, images, drawings, form fields and links from PDF
/// pages and stamps text or image overlays.
#[derive(Parser)]
#[command(name = "unmark")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Edit inputs shared by `preview` and `reconstruct`.
#[derive(clap::Args)]
struct EditArgs {
    /// Removal targets as JSON, or a path to a JSON file
    #[arg(short, long, value_name = "JSON|FILE")]
    targets: Option<String>,

    /// Overlays keyed by page index as JSON, or a path to a JSON file
    #[arg(long, value_name = "JSON|FILE")]
    overlays: Option<String>,

    /// Image used by image overlays that carry no data of their own
    #[arg(long, value_name = "FILE")]
    watermark_image: Option<PathBuf>,

    /// Write the edit report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a JSON summary of a document
    Info {
        /// Input PDF file path
        input: PathBuf,
    },

    /// Print the texts and elements of one page as JSON
    Analyze {
        /// Input PDF file path
        input: PathBuf,

        /// Zero-based page index
        #[arg(short, long, default_value_t = 0)]
        page: usize,

        /// Also suggest watermark texts repeated across pages
        #[arg(long)]
        all: bool,
    },

    /// Edit one page and render it to PNG
    Preview {
        /// Input PDF file path
        input: PathBuf,

        /// Zero-based page index
        #[arg(short, long, default_value_t = 0)]
        page: usize,

        /// Output PNG file path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Edit every page and write the resulting PDF
    Reconstruct {
        /// Input PDF file path
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        edit: EditArgs,

        /// Store streams uncompressed
        #[arg(long)]
        no_compress: bool,

        /// Unused object removal on save
        #[arg(long, value_enum, default_value_t = CompactionArg::Full)]
        compaction: CompactionArg,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CompactionArg {
    None,
    Prune,
    Full,
}

impl From<CompactionArg> for Compaction {
    fn from(arg: CompactionArg) -> Self {
        match arg {
            CompactionArg::None => Compaction::None,
            CompactionArg::Prune => Compaction::Prune,
            CompactionArg::Full => Compaction::Full,
        }
    }
}

/// Parsed edit inputs.
struct EditInputs {
    targets: TargetSet,
    overlays: OverlayPlan,
    shared_image: Option<Vec<u8>>,
}

/// Command handler over an edit service.
struct EditHandler {
    service: EditService,
    verbose: bool,
}

impl EditHandler {
    fn new(config: EditConfig, verbose: bool) -> Self {
        Self {
            service: EditService::with_lopdf().with_config(config),
            verbose,
        }
    }

    fn info(&self, input: &Path) -> Result<()> {
        let bytes = read_input(input)?;
        let info = self
            .service
            .info(&bytes)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        Ok(())
    }

    fn analyze(&self, input: &Path, page: usize, all: bool) -> Result<()> {
        let bytes = read_input(input)?;
        let analysis = self
            .service
            .analyze(&bytes, page, all)
            .with_context(|| format!("Failed to analyze page {} of {}", page, input.display()))?;
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        Ok(())
    }

    fn preview(&self, input: &Path, page: usize, output: &Path, edit: &EditArgs) -> Result<()> {
        let bytes = read_input(input)?;
        let inputs = load_edit_inputs(edit)?;
        let (png, report) = self
            .service
            .preview(
                &bytes,
                page,
                &inputs.targets,
                &inputs.overlays,
                inputs.shared_image.as_deref(),
            )
            .with_context(|| "Preview failed")?;

        std::fs::write(output, &png)
            .with_context(|| format!("Failed to write to {}", output.display()))?;
        self.finish(&report, edit.report.as_deref())?;
        println!("✓ Rendered page {} → {}", page, output.display());
        Ok(())
    }

    fn reconstruct(&self, input: &Path, output: &Path, edit: &EditArgs) -> Result<()> {
        let bytes = read_input(input)?;
        let inputs = load_edit_inputs(edit)?;

        if self.verbose {
            println!("Input:  {}", input.display());
            println!("Output: {}", output.display());
            println!("Targets: {} removal target(s)", inputs.targets.len());
        }

        let (pdf, report) = self
            .service
            .reconstruct(
                &bytes,
                &inputs.targets,
                &inputs.overlays,
                inputs.shared_image.as_deref(),
            )
            .with_context(|| "Reconstruction failed")?;

        std::fs::write(output, &pdf)
            .with_context(|| format!("Failed to write to {}", output.display()))?;
        self.finish(&report, edit.report.as_deref())?;

        if report.has_changes() {
            println!(
                "✓ Applied {} element(s) across {} page(s) → {}",
                report.applied_count(),
                report.pages_modified,
                output.display()
            );
        } else {
            println!("⚠ No changes applied → {}", output.display());
        }
        Ok(())
    }

    /// Prints the summary and writes the JSON report when requested.
    fn finish(&self, report: &EditReport, path: Option<&Path>) -> Result<()> {
        if self.verbose {
            println!("\nEdit Summary:\n{}", report);
        }
        if report.failed_count() > 0 {
            println!("⚠ {} element(s) failed", report.failed_count());
        }
        if let Some(path) = path {
            let json = serde_json::to_string_pretty(report)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        Ok(())
    }
}

/// Reads a JSON argument given inline or as a path to a file.
fn json_argument(value: &str) -> Result<String> {
    let path = Path::new(value);
    if !value.trim_start().starts_with(['{', '[']) && path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    Ok(value.to_string())
}

fn load_edit_inputs(edit: &EditArgs) -> Result<EditInputs> {
    let targets = match &edit.targets {
        Some(value) => TargetSet::from_json(&json_argument(value)?).context("Invalid removal targets")?,
        None => TargetSet::new(),
    };
    let overlays = match &edit.overlays {
        Some(value) => OverlayPlan::from_json(&json_argument(value)?).context("Invalid overlays")?,
        None => OverlayPlan::new(),
    };
    let shared_image = edit
        .watermark_image
        .as_deref()
        .map(read_input)
        .transpose()
        .context("Failed to read watermark image")?;
    Ok(EditInputs {
        targets,
        overlays,
        shared_image,
    })
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Info { input } => {
            EditHandler::new(EditConfig::default(), cli.verbose).info(input)?;
        }
        Commands::Analyze { input, page, all } => {
            EditHandler::new(EditConfig::default(), cli.verbose).analyze(input, *page, *all)?;
        }
        Commands::Preview {
            input,
            page,
            output,
            edit,
        } => {
            EditHandler::new(EditConfig::default(), cli.verbose).preview(input, *page, output, edit)?;
        }
        Commands::Reconstruct {
            input,
            output,
            edit,
            no_compress,
            compaction,
        } => {
            let config = EditConfig::default().with_save_options(SaveOptions {
                compaction: (*compaction).into(),
                compress: !no_compress,
                ..SaveOptions::default()
            });
            EditHandler::new(config, cli.verbose).reconstruct(input, output, edit)?;
        }
    }

    Ok(())
}
