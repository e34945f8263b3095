//! Exporter Module
//!
//! 1シートを1ファイルに書き出す処理を、出力フォーマットごとに実装するモジュール。

use std::fs;
use std::path::{Path, PathBuf};

use crate::api::ExportFormat;
use crate::engine::{Document, FixedFormat, Sheet};
use crate::error::EngineError;
use crate::markdown::render_table;

/// 1シートのエクスポート結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetOutcome {
    /// ファイルを書き出した
    Written(PathBuf),
    /// 出力する内容がなかった（ファイルは作成しない）
    ///
    /// 描画オブジェクトのないシートを画像出力した場合に返されます。
    NothingToExport,
}

/// 出力フォーマットごとのエクスポーター
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exporter {
    /// 印刷範囲のPDF
    Pdf,
    /// 描画オブジェクトを合成したPNG
    CompositeImage,
    /// セルデータのMarkdownテーブル
    Markdown,
}

impl Exporter {
    /// 出力フォーマットからエクスポーターを生成
    pub fn from_format(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Pdf => Exporter::Pdf,
            ExportFormat::Png => Exporter::CompositeImage,
            ExportFormat::Markdown => Exporter::Markdown,
        }
    }

    /// シートを`target`に書き出す
    ///
    /// # 戻り値
    ///
    /// * `Ok(SheetOutcome::Written)` - ファイルを1つ書き出した場合
    /// * `Ok(SheetOutcome::NothingToExport)` - 出力する内容がなかった場合
    /// * `Err(EngineError)` - エクスポートに失敗した場合
    pub fn export(
        &self,
        doc: &mut dyn Document,
        sheet: &Sheet,
        target: &Path,
    ) -> Result<SheetOutcome, EngineError> {
        match self {
            Exporter::Pdf => export_pdf(doc, sheet, target),
            Exporter::CompositeImage => export_composite_image(doc, sheet, target),
            Exporter::Markdown => export_markdown(doc, sheet, target),
        }
    }
}

fn export_pdf(
    doc: &mut dyn Document,
    sheet: &Sheet,
    target: &Path,
) -> Result<SheetOutcome, EngineError> {
    doc.export_fixed_format(sheet, FixedFormat::Pdf, target)?;
    Ok(SheetOutcome::Written(target.to_path_buf()))
}

/// 描画オブジェクトを1枚の画像にまとめて書き出す
///
/// 1. 描画オブジェクトを重なり順に取得（0個なら何もしない）
/// 2. まとめて1枚のビットマップとしてコピー
/// 3. 使用範囲の大きさの一時コンテナに貼り付けて画像として書き出す
/// 4. 一時コンテナを削除（書き出しに失敗した場合も必ず削除する）
fn export_composite_image(
    doc: &mut dyn Document,
    sheet: &Sheet,
    target: &Path,
) -> Result<SheetOutcome, EngineError> {
    let drawables = doc.drawables(sheet)?;
    if drawables.is_empty() {
        return Ok(SheetOutcome::NothingToExport);
    }

    let picture = doc.copy_picture(sheet, &drawables)?;
    let bounds = doc.used_range(sheet)?;
    let container = doc.add_container(sheet, bounds)?;
    log::debug!(
        "Pasting {} object(s) of '{}' into container {}",
        drawables.len(),
        sheet.name,
        container
    );

    let exported = doc
        .paste(container, picture)
        .and_then(|()| doc.export_container(container, target));
    let deleted = doc.delete_container(container);

    match (exported, deleted) {
        (Ok(()), Ok(())) => Ok(SheetOutcome::Written(target.to_path_buf())),
        (Ok(()), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            log::warn!(
                "Failed to delete container {} on '{}': {}",
                container,
                sheet.name,
                cleanup
            );
            Err(e)
        }
    }
}

fn export_markdown(
    doc: &mut dyn Document,
    sheet: &Sheet,
    target: &Path,
) -> Result<SheetOutcome, EngineError> {
    // 空のシートも空のファイルとして書き出す
    let table = doc.load_table(sheet)?;
    fs::write(target, render_table(&table))?;
    Ok(SheetOutcome::Written(target.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Bounds, ContainerId, Drawable, DrawableKind, Picture};
    use crate::table::{CellValue, Table};
    use image::RgbaImage;

    /// 呼び出しを記録するドキュメント
    #[derive(Default)]
    struct RecordingDocument {
        drawables: Vec<Drawable>,
        fail_export: bool,
        table: Table,
        calls: Vec<String>,
    }

    impl Document for RecordingDocument {
        fn sheets(&mut self) -> Result<Vec<Sheet>, EngineError> {
            Ok(vec![Sheet::new(0, "S")])
        }

        fn used_range(&mut self, _sheet: &Sheet) -> Result<Bounds, EngineError> {
            self.calls.push("used_range".to_string());
            Ok(Bounds::new(0.0, 0.0, 10.0, 10.0))
        }

        fn drawables(&mut self, _sheet: &Sheet) -> Result<Vec<Drawable>, EngineError> {
            self.calls.push("drawables".to_string());
            Ok(self.drawables.clone())
        }

        fn export_fixed_format(
            &mut self,
            _sheet: &Sheet,
            format: FixedFormat,
            path: &Path,
        ) -> Result<(), EngineError> {
            self.calls.push(format!("{:?}", format));
            fs::write(path, b"%PDF")?;
            Ok(())
        }

        fn copy_picture(
            &mut self,
            _sheet: &Sheet,
            drawables: &[Drawable],
        ) -> Result<Picture, EngineError> {
            self.calls.push(format!("copy_picture({})", drawables.len()));
            Ok(Picture {
                image: RgbaImage::new(2, 2),
            })
        }

        fn add_container(
            &mut self,
            _sheet: &Sheet,
            _bounds: Bounds,
        ) -> Result<ContainerId, EngineError> {
            self.calls.push("add_container".to_string());
            Ok(ContainerId(7))
        }

        fn paste(&mut self, _container: ContainerId, _picture: Picture) -> Result<(), EngineError> {
            self.calls.push("paste".to_string());
            Ok(())
        }

        fn export_container(
            &mut self,
            _container: ContainerId,
            path: &Path,
        ) -> Result<(), EngineError> {
            self.calls.push("export_container".to_string());
            if self.fail_export {
                return Err(EngineError::Unsupported("export".to_string()));
            }
            fs::write(path, b"png")?;
            Ok(())
        }

        fn delete_container(&mut self, container: ContainerId) -> Result<(), EngineError> {
            self.calls.push(format!("delete_container({})", container.0));
            Ok(())
        }

        fn load_table(&mut self, _sheet: &Sheet) -> Result<Table, EngineError> {
            Ok(self.table.clone())
        }

        fn close(&mut self, _save: bool) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn picture(name: &str) -> Drawable {
        Drawable::new(name, DrawableKind::Picture, Bounds::new(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn test_from_format() {
        assert_eq!(Exporter::from_format(ExportFormat::Pdf), Exporter::Pdf);
        assert_eq!(
            Exporter::from_format(ExportFormat::Png),
            Exporter::CompositeImage
        );
        assert_eq!(
            Exporter::from_format(ExportFormat::Markdown),
            Exporter::Markdown
        );
    }

    #[test]
    fn test_image_without_drawables_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book_S.png");
        let mut doc = RecordingDocument::default();

        let outcome = Exporter::CompositeImage
            .export(&mut doc, &Sheet::new(0, "S"), &target)
            .unwrap();

        assert_eq!(outcome, SheetOutcome::NothingToExport);
        assert!(!target.exists());
        assert_eq!(doc.calls, vec!["drawables"]);
    }

    #[test]
    fn test_image_export_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book_S.png");
        let mut doc = RecordingDocument {
            drawables: vec![picture("a"), picture("b")],
            ..Default::default()
        };

        let outcome = Exporter::CompositeImage
            .export(&mut doc, &Sheet::new(0, "S"), &target)
            .unwrap();

        assert_eq!(outcome, SheetOutcome::Written(target.clone()));
        assert!(target.exists());
        assert_eq!(
            doc.calls,
            vec![
                "drawables",
                "copy_picture(2)",
                "used_range",
                "add_container",
                "paste",
                "export_container",
                "delete_container(7)",
            ]
        );
    }

    #[test]
    fn test_container_deleted_when_export_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = RecordingDocument {
            drawables: vec![picture("a")],
            fail_export: true,
            ..Default::default()
        };

        let result =
            Exporter::CompositeImage.export(&mut doc, &Sheet::new(0, "S"), &dir.path().join("x.png"));

        assert!(result.is_err());
        assert_eq!(doc.calls.last().unwrap(), "delete_container(7)");
    }

    #[test]
    fn test_pdf_export() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book_S.pdf");
        let mut doc = RecordingDocument::default();

        let outcome = Exporter::Pdf
            .export(&mut doc, &Sheet::new(0, "S"), &target)
            .unwrap();
        assert_eq!(outcome, SheetOutcome::Written(target));
        assert_eq!(doc.calls, vec!["Pdf"]);
    }

    #[test]
    fn test_markdown_export() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book_S.md");
        let mut doc = RecordingDocument {
            table: Table::from_grid(vec![
                vec![CellValue::Text("A".into())],
                vec![CellValue::Number(1.0)],
            ]),
            ..Default::default()
        };

        Exporter::Markdown
            .export(&mut doc, &Sheet::new(0, "S"), &target)
            .unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "|   A |\n|----:|\n|   1 |");
    }

    #[test]
    fn test_markdown_empty_sheet_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book_S.md");
        let mut doc = RecordingDocument::default();

        let outcome = Exporter::Markdown
            .export(&mut doc, &Sheet::new(0, "S"), &target)
            .unwrap();
        assert_eq!(outcome, SheetOutcome::Written(target.clone()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "");
    }
}
