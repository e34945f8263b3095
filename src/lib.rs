//! sheetbatch - Directory-driven batch conversion of spreadsheets
//!
//! This crate walks a folder tree of workbooks and exports every sheet of every
//! workbook as a separate file: a PDF of the sheet, a PNG combining all drawable
//! objects (pictures, shapes, charts) on the sheet, or a Markdown table of its cells.
//!
//! Output files are named `{workbook}_{sheet}.{ext}`, with characters that are
//! illegal in file names removed from the sheet name. A failure on one file or
//! sheet is reported and the run moves on; only failing to create the output
//! folder aborts the run.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sheetbatch::{BatchBuilder, ExportFormat, NativeEngine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // input/**/*.xlsx -> output_md/{workbook}_{sheet}.md
//!     let batch = BatchBuilder::new(ExportFormat::Markdown).build()?;
//!     let report = batch.run_with_progress(NativeEngine::new(), |event| println!("{}", event))?;
//!
//!     println!("{} sheet(s) exported", report.sheets_exported());
//!     Ok(())
//! }
//! ```
//!
//! # PDF export
//!
//! PDF export drives a headless LibreOffice installation:
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sheetbatch::{BatchBuilder, ExportFormat, NativeEngine, OfficeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let office = OfficeConfig::default()
//!         .with_program("/usr/bin/soffice")
//!         .with_timeout(Duration::from_secs(60));
//!     let engine = NativeEngine::with_office(office)?;
//!
//!     let batch = BatchBuilder::new(ExportFormat::Pdf)
//!         .with_input_root("reports")
//!         .build()?;
//!     batch.run(engine)?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom engines
//!
//! The run driver only talks to the [`Engine`] and [`Document`] traits, so any
//! spreadsheet backend can be plugged in. Capabilities a backend does not
//! implement report [`EngineError::Unsupported`] for the affected sheets.

mod api;
mod builder;
mod engine;
mod error;
mod export;
mod markdown;
mod naming;
mod report;
mod security;
mod table;
mod walker;

// 公開API
pub use api::{CollisionPolicy, ExportFormat};
pub use builder::{Batch, BatchBuilder, RunConfig, DEFAULT_INPUT_ROOT};
pub use engine::{
    Bounds, ContainerId, Document, Drawable, DrawableKind, Engine, EngineSession, FixedFormat,
    NativeEngine, OfficeConfig, OpenDocument, Picture, Sheet,
};
pub use error::{BatchError, EngineError};
pub use export::SheetOutcome;
pub use markdown::render_table;
pub use naming::{sanitize, OutputTarget, RESERVED_CHARS};
pub use report::{FileReport, RunEvent, RunReport, SheetReport, SheetStatus};
pub use table::{CellValue, Table};
pub use walker::{walk, ExtensionFilter, FileWalker, InputFile};
