//! Native Engine Module
//!
//! calamineとパッケージの直接解析で動作する変換エンジン。
//!
//! - セルの値: calamine
//! - 描画オブジェクト・列幅・行高: [`super::package`]
//! - 画像の合成と一時コンテナ: [`super::canvas`]
//! - PDF出力: LibreOffice（[`OfficeConfig`]を指定した場合のみ）

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};

use super::canvas::{self, Canvas};
use super::office::{OfficeConfig, OfficeRunner};
use super::package::{Package, SheetKind, SheetPart};
use super::{Bounds, ContainerId, Document, Drawable, Engine, FixedFormat, Picture, Sheet};
use crate::error::EngineError;
use crate::security::SecurityConfig;
use crate::table::{serial_to_datetime, CellValue, Table};

/// calamineとパッケージ解析による変換エンジン
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetbatch::{BatchBuilder, ExportFormat, NativeEngine};
///
/// let batch = BatchBuilder::new(ExportFormat::Markdown)
///     .with_input_root("input")
///     .build()?;
/// let report = batch.run(NativeEngine::new())?;
/// println!("{} sheets exported", report.sheets_exported());
/// # Ok::<(), sheetbatch::BatchError>(())
/// ```
#[derive(Debug, Default)]
pub struct NativeEngine {
    office: Option<OfficeRunner>,
    limits: SecurityConfig,
}

impl NativeEngine {
    /// PDF出力を行わないエンジンを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// LibreOfficeによるPDF出力を有効にしたエンジンを作成
    ///
    /// LibreOffice用の一時プロファイルを作成します。
    pub fn with_office(config: OfficeConfig) -> Result<Self, EngineError> {
        Ok(Self {
            office: Some(OfficeRunner::start(config)?),
            limits: SecurityConfig::default(),
        })
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &str {
        if self.office.is_some() {
            "native+office"
        } else {
            "native"
        }
    }

    fn open(&mut self, path: &Path) -> Result<Box<dyn Document + '_>, EngineError> {
        self.limits.check_input_file(path)?;
        let bytes = fs::read(path)?;

        let package = Package::open(bytes.clone(), &self.limits)?;
        let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

        let mut index = 0;
        let mut sheets = Vec::new();
        for part in package.sheets() {
            if part.kind == SheetKind::Worksheet {
                sheets.push((Sheet::new(index, part.name.clone()), part.clone()));
                index += 1;
            } else {
                log::debug!("Skipping non-worksheet '{}' in {}", part.name, path.display());
            }
        }

        Ok(Box::new(NativeDocument {
            path: path.to_path_buf(),
            package,
            workbook,
            sheets,
            containers: HashMap::new(),
            next_container: 1,
            office: self.office.as_ref(),
            limits: &self.limits,
        }))
    }

    fn quit(&mut self) -> Result<(), EngineError> {
        match self.office.take() {
            Some(office) => office.shutdown(),
            None => Ok(()),
        }
    }
}

/// [`NativeEngine`]で開いたワークブック
struct NativeDocument<'e> {
    path: PathBuf,
    package: Package,
    workbook: Sheets<Cursor<Vec<u8>>>,
    sheets: Vec<(Sheet, SheetPart)>,
    containers: HashMap<ContainerId, Canvas>,
    next_container: u32,
    office: Option<&'e OfficeRunner>,
    limits: &'e SecurityConfig,
}

impl NativeDocument<'_> {
    fn part(&self, sheet: &Sheet) -> Result<&SheetPart, EngineError> {
        self.sheets
            .iter()
            .find(|(s, _)| s == sheet)
            .map(|(_, part)| part)
            .ok_or_else(|| EngineError::SheetNotFound(sheet.name.clone()))
    }

    fn range(&mut self, sheet: &Sheet) -> Result<Range<Data>, EngineError> {
        self.part(sheet)?;
        Ok(self.workbook.worksheet_range(&sheet.name)?)
    }

    fn container(&mut self, id: ContainerId) -> Result<&mut Canvas, EngineError> {
        self.containers
            .get_mut(&id)
            .ok_or(EngineError::ContainerNotFound(id.0))
    }
}

impl Document for NativeDocument<'_> {
    fn sheets(&mut self) -> Result<Vec<Sheet>, EngineError> {
        Ok(self.sheets.iter().map(|(sheet, _)| sheet.clone()).collect())
    }

    fn used_range(&mut self, sheet: &Sheet) -> Result<Bounds, EngineError> {
        let range = self.range(sheet)?;
        let (start, end) = match (range.start(), range.end()) {
            (Some(start), Some(end)) if !range.is_empty() => (start, end),
            _ => return Ok(Bounds::default()),
        };
        let part = self.part(sheet)?.clone();
        let geometry = self.package.geometry(&part)?;
        Ok(geometry.cell_range(start, end))
    }

    fn drawables(&mut self, sheet: &Sheet) -> Result<Vec<Drawable>, EngineError> {
        let part = self.part(sheet)?.clone();
        let geometry = self.package.geometry(&part)?;
        self.package.drawables(&part, &geometry)
    }

    fn export_fixed_format(
        &mut self,
        sheet: &Sheet,
        format: FixedFormat,
        path: &Path,
    ) -> Result<(), EngineError> {
        let office = self.office.ok_or_else(|| {
            EngineError::Unsupported(format!(
                "{:?} export requires an office installation",
                format
            ))
        })?;
        let position = self.part(sheet)?.position;
        let isolated = self.package.isolate_sheet(position)?;
        match format {
            FixedFormat::Pdf => office.convert_to_pdf(&isolated, path),
        }
    }

    fn copy_picture(
        &mut self,
        sheet: &Sheet,
        drawables: &[Drawable],
    ) -> Result<Picture, EngineError> {
        self.part(sheet)?;
        let package = &mut self.package;
        canvas::compose(drawables, self.limits, |media| package.read_part(media))
    }

    fn add_container(&mut self, sheet: &Sheet, bounds: Bounds) -> Result<ContainerId, EngineError> {
        self.part(sheet)?;
        let id = ContainerId(self.next_container);
        self.next_container += 1;
        self.containers.insert(id, Canvas::new(bounds, self.limits)?);
        log::trace!("Added container {} on '{}'", id, sheet.name);
        Ok(id)
    }

    fn paste(&mut self, container: ContainerId, picture: Picture) -> Result<(), EngineError> {
        self.container(container)?.paste(&picture);
        Ok(())
    }

    fn export_container(&mut self, container: ContainerId, path: &Path) -> Result<(), EngineError> {
        let canvas = self.container(container)?;
        let (width, height) = canvas.dimensions();
        log::trace!("Exporting container {} ({}x{})", container, width, height);
        canvas.save_png(path)
    }

    fn delete_container(&mut self, container: ContainerId) -> Result<(), EngineError> {
        self.containers
            .remove(&container)
            .map(|_| ())
            .ok_or(EngineError::ContainerNotFound(container.0))
    }

    fn load_table(&mut self, sheet: &Sheet) -> Result<Table, EngineError> {
        let range = self.range(sheet)?;
        let is_1904 = self.package.is_1904();
        let grid = range
            .rows()
            .map(|row| row.iter().map(|cell| cell_value(cell, is_1904)).collect())
            .collect();
        Ok(Table::from_grid(grid))
    }

    fn close(&mut self, save: bool) -> Result<(), EngineError> {
        if save {
            return Err(EngineError::Unsupported("saving workbooks".to_string()));
        }
        if !self.containers.is_empty() {
            log::warn!(
                "Discarding {} temporary container(s) in {}",
                self.containers.len(),
                self.path.display()
            );
            self.containers.clear();
        }
        Ok(())
    }
}

/// calamineのセル値を変換
fn cell_value(cell: &Data, is_1904: bool) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if dt.is_duration() {
                CellValue::Duration(serial)
            } else {
                serial_to_datetime(serial, is_1904)
                    .map(CellValue::DateTime)
                    .unwrap_or(CellValue::Number(serial))
            }
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    #[test]
    fn test_cell_value_mapping() {
        assert_eq!(cell_value(&Data::Empty, false), CellValue::Empty);
        assert_eq!(cell_value(&Data::Int(3), false), CellValue::Number(3.0));
        assert_eq!(cell_value(&Data::Float(2.5), false), CellValue::Number(2.5));
        assert_eq!(
            cell_value(&Data::String("x".to_string()), false),
            CellValue::Text("x".to_string())
        );
        assert_eq!(cell_value(&Data::Bool(true), false), CellValue::Bool(true));
        assert_eq!(
            cell_value(&Data::Error(CellErrorType::Div0), false),
            CellValue::Error("#DIV/0!".to_string())
        );
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = NativeEngine::new();
        assert!(engine.open(&dir.path().join("missing.xlsx")).is_err());
    }

    #[test]
    fn test_open_non_workbook_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.xlsx");
        fs::write(&path, b"this is not a zip archive").unwrap();
        let mut engine = NativeEngine::new();
        assert!(engine.open(&path).is_err());
    }

    #[test]
    fn test_quit_without_office() {
        let mut engine = NativeEngine::new();
        assert_eq!(engine.name(), "native");
        engine.quit().unwrap();
    }
}
