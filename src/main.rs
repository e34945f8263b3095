//! sheetbatch CLI - export every sheet of every workbook in a folder

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;

use sheetbatch::{
    BatchBuilder, CollisionPolicy, ExportFormat, NativeEngine, OfficeConfig, RunEvent,
    DEFAULT_INPUT_ROOT,
};

#[derive(Parser)]
#[command(name = "sheetbatch")]
#[command(version)]
#[command(about = "Export each sheet of each workbook in a folder to PDF, PNG or Markdown", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum)]
    format: FormatArg,

    /// Folder to scan recursively
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_INPUT_ROOT)]
    input: PathBuf,

    /// Output folder (default: output, output_images or output_md)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// File extension to include (repeatable)
    #[arg(short, long = "ext", value_name = "EXT", default_value = "xlsx")]
    extensions: Vec<String>,

    /// What to do when two sheets map to the same output file
    #[arg(long, value_enum, default_value = "overwrite")]
    on_collision: CollisionArg,

    /// LibreOffice executable used for PDF export
    #[arg(long, value_name = "PROGRAM", env = "SHEETBATCH_OFFICE", default_value = "soffice")]
    office: PathBuf,

    /// Time limit in seconds for converting one sheet to PDF
    #[arg(long, value_name = "SECS", default_value = "120")]
    timeout: u64,

    /// Write a JSON report of the run
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Printable area of each sheet as PDF
    Pdf,
    /// All shapes, charts and pictures of each sheet as one PNG
    Png,
    /// Cell data of each sheet as a Markdown table
    Md,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Pdf => ExportFormat::Pdf,
            FormatArg::Png => ExportFormat::Png,
            FormatArg::Md => ExportFormat::Markdown,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CollisionArg {
    /// Later sheets overwrite earlier files
    Overwrite,
    /// Append _2, _3, ... to repeated names
    Suffix,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(policy: CollisionArg) -> Self {
        match policy {
            CollisionArg::Overwrite => CollisionPolicy::Overwrite,
            CollisionArg::Suffix => CollisionPolicy::Suffix,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = BatchBuilder::new(cli.format.into())
        .with_input_root(cli.input)
        .with_extensions(cli.extensions)
        .with_collision_policy(cli.on_collision.into());
    if let Some(output) = cli.output {
        builder = builder.with_output_root(output);
    }
    let batch = builder.build()?;

    let report = if cli.format == FormatArg::Pdf {
        let office = OfficeConfig::default()
            .with_program(cli.office)
            .with_timeout(Duration::from_secs(cli.timeout));
        batch.run_with_progress(NativeEngine::with_office(office)?, print_event)?
    } else {
        batch.run_with_progress(NativeEngine::new(), print_event)?
    };

    if let Some(path) = cli.report {
        fs::write(&path, report.to_json()?)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn print_event(event: &RunEvent) {
    let line = event.to_string();
    match event {
        e if e.is_failure() => println!("{}", line.red()),
        RunEvent::InputRootMissing { .. } => println!("{}", line.yellow()),
        RunEvent::SheetExported { .. } => println!("{}", line.green()),
        _ => println!("{}", line),
    }
}
