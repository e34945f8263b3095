//! Builder Module
//!
//! Fluent Builder APIで実行設定を構築し、バッチ変換（Run Driver）を実行するモジュール。

use std::error::Error as _;
use std::fs;
use std::path::PathBuf;

use crate::api::{CollisionPolicy, ExportFormat};
use crate::engine::{Document, Engine, EngineSession, Sheet};
use crate::error::{BatchError, EngineError};
use crate::export::{Exporter, SheetOutcome};
use crate::naming::{NameRegistry, OutputTarget};
use crate::report::{FileReport, RunEvent, RunReport, SheetReport, SheetStatus};
use crate::walker::{walk, ExtensionFilter, InputFile};

/// 既定の入力フォルダ
pub const DEFAULT_INPUT_ROOT: &str = "input";

/// バッチ変換の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// 走査する入力フォルダ
    pub input_root: PathBuf,
    /// 出力ファイルを書き出すフォルダ（存在しなければ作成）
    pub output_root: PathBuf,
    /// 対象とするファイルの拡張子
    pub extension_filter: ExtensionFilter,
    /// 出力フォーマット
    pub format: ExportFormat,
    /// 出力ファイル名が衝突した場合の扱い
    pub collision_policy: CollisionPolicy,
}

/// Fluent Builder APIを提供する構造体
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetbatch::{BatchBuilder, CollisionPolicy, ExportFormat};
///
/// # fn main() -> Result<(), sheetbatch::BatchError> {
/// let batch = BatchBuilder::new(ExportFormat::Png)
///     .with_input_root("reports")
///     .with_output_root("images")
///     .with_extensions(["xlsx", "xlsm"])
///     .with_collision_policy(CollisionPolicy::Suffix)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    format: ExportFormat,
    input_root: PathBuf,
    output_root: Option<PathBuf>,
    extensions: Vec<String>,
    collision_policy: CollisionPolicy,
}

impl BatchBuilder {
    /// デフォルト設定を持つビルダーを生成する
    ///
    /// # デフォルト設定
    ///
    /// - 入力フォルダ: `input`
    /// - 出力フォルダ: `output`（PDF）/ `output_images`（PNG）/ `output_md`（Markdown）
    /// - 拡張子: `xlsx`
    /// - 衝突時: 上書き
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            input_root: PathBuf::from(DEFAULT_INPUT_ROOT),
            output_root: None,
            extensions: vec!["xlsx".to_string()],
            collision_policy: CollisionPolicy::default(),
        }
    }

    /// 入力フォルダを指定する
    pub fn with_input_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_root = path.into();
        self
    }

    /// 出力フォルダを指定する
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = Some(path.into());
        self
    }

    /// 対象とする拡張子を指定する（大文字小文字は区別しない）
    ///
    /// 先頭のドットは省略できます（`.xlsx`と`xlsx`は同じ）。
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// 出力ファイル名の衝突時の扱いを指定する
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// 設定を検証して`Batch`を生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(Batch)` - 設定が有効な場合
    /// * `Err(BatchError::Config)` - 拡張子のリストが空、または無効な拡張子を含む場合
    pub fn build(self) -> Result<Batch, BatchError> {
        if self.extensions.is_empty() {
            return Err(BatchError::Config(
                "at least one file extension is required".to_string(),
            ));
        }

        for ext in &self.extensions {
            let bare = ext.trim_start_matches('.');
            if bare.is_empty() || bare.contains(['.', '/', '\\']) {
                return Err(BatchError::Config(format!(
                    "invalid file extension: '{}'",
                    ext
                )));
            }
        }

        let output_root = self
            .output_root
            .unwrap_or_else(|| PathBuf::from(self.format.default_output_root()));

        Ok(Batch {
            config: RunConfig {
                input_root: self.input_root,
                output_root,
                extension_filter: ExtensionFilter::new(&self.extensions),
                format: self.format,
                collision_policy: self.collision_policy,
            },
        })
    }
}

/// バッチ変換（Run Driver）
///
/// 入力フォルダ以下のファイルを1つずつ開き、すべてのシートを書き出します。
/// ファイル単位・シート単位の失敗は[`RunReport`]に記録され、処理は継続します。
/// 実行全体が中断されるのは出力フォルダを作成できない場合だけです。
#[derive(Debug, Clone)]
pub struct Batch {
    config: RunConfig,
}

impl Batch {
    /// 実行設定
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// バッチ変換を実行する
    pub fn run<E: Engine>(&self, engine: E) -> Result<RunReport, BatchError> {
        self.run_with_progress(engine, |_| {})
    }

    /// 進捗イベントを受け取りながらバッチ変換を実行する
    ///
    /// `progress`には1行の進捗メッセージに対応する[`RunEvent`]が順に渡されます。
    /// エンジンは実行の最後に1度だけ終了されます（致命的なエラーで中断した場合も同様）。
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use sheetbatch::{BatchBuilder, ExportFormat, NativeEngine};
    ///
    /// # fn main() -> Result<(), sheetbatch::BatchError> {
    /// let batch = BatchBuilder::new(ExportFormat::Markdown).build()?;
    /// let report = batch.run_with_progress(NativeEngine::new(), |event| println!("{}", event))?;
    /// assert_eq!(report.failures(), 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn run_with_progress<E, F>(&self, engine: E, mut progress: F) -> Result<RunReport, BatchError>
    where
        E: Engine,
        F: FnMut(&RunEvent),
    {
        let config = &self.config;
        let mut session = EngineSession::new(engine);

        // 1. 出力フォルダの作成（唯一の致命的エラー）
        if !config.output_root.is_dir() {
            if let Err(source) = fs::create_dir_all(&config.output_root) {
                if let Err(e) = session.finish() {
                    log::warn!("Failed to shut down engine: {}", e);
                }
                return Err(BatchError::OutputDir {
                    path: config.output_root.clone(),
                    source,
                });
            }
            progress(&RunEvent::OutputRootCreated {
                path: config.output_root.clone(),
            });
        }

        // 2. 入力フォルダの確認
        if !config.input_root.is_dir() {
            progress(&RunEvent::InputRootMissing {
                path: config.input_root.clone(),
            });
        }

        // 3. ファイルごとの処理
        let exporter = Exporter::from_format(config.format);
        let mut registry = NameRegistry::new(config.collision_policy);
        let mut report = RunReport::new(&config.output_root);

        for file in walk(&config.input_root, &config.extension_filter) {
            let file_report =
                self.process_file(&mut session, &file, exporter, &mut registry, &mut progress);
            report.files.push(file_report);
        }

        // 4. エンジンの終了
        if let Err(e) = session.finish() {
            log::warn!("Failed to shut down engine: {}", e);
        }

        Ok(report)
    }

    /// 1ファイルを開き、すべてのシートを書き出して閉じる
    fn process_file<E: Engine>(
        &self,
        session: &mut EngineSession<E>,
        file: &InputFile,
        exporter: Exporter,
        registry: &mut NameRegistry,
        progress: &mut dyn FnMut(&RunEvent),
    ) -> FileReport {
        let mut report = FileReport::new(&file.path);
        progress(&RunEvent::FileStarted {
            path: file.path.clone(),
        });

        let mut doc = match session.open(&file.path) {
            Ok(doc) => doc,
            Err(e) => {
                log_error_chain(&e);
                report.error = Some(e.to_string());
                progress(&RunEvent::FileOpenFailed {
                    path: file.path.clone(),
                    error: e.to_string(),
                });
                return report;
            }
        };
        report.opened = true;

        match doc.sheets() {
            Ok(sheets) => {
                for sheet in &sheets {
                    let sheet_report =
                        self.process_sheet(&mut *doc, file, sheet, exporter, registry, progress);
                    report.sheets.push(sheet_report);
                }
            }
            Err(e) => {
                log_error_chain(&e);
                report.error = Some(e.to_string());
                progress(&RunEvent::FileFailed {
                    path: file.path.clone(),
                    error: e.to_string(),
                });
            }
        }

        // 成功・失敗にかかわらず保存せずに閉じる
        if let Err(e) = doc.close() {
            log::warn!("Failed to close {}: {}", file.path.display(), e);
            progress(&RunEvent::CloseFailed {
                path: file.path.clone(),
                error: e.to_string(),
            });
        }

        report
    }

    fn process_sheet(
        &self,
        doc: &mut dyn Document,
        file: &InputFile,
        sheet: &Sheet,
        exporter: Exporter,
        registry: &mut NameRegistry,
        progress: &mut dyn FnMut(&RunEvent),
    ) -> SheetReport {
        let target = registry.assign(OutputTarget::new(
            &self.config.output_root,
            &file.base_name,
            &sheet.name,
            self.config.format.extension(),
        ));

        let status = match exporter.export(doc, sheet, &target.path()) {
            Ok(SheetOutcome::Written(path)) => {
                progress(&RunEvent::SheetExported {
                    sheet: sheet.name.clone(),
                    path: path.clone(),
                });
                SheetStatus::Exported { path }
            }
            Ok(SheetOutcome::NothingToExport) => {
                progress(&RunEvent::SheetEmpty {
                    sheet: sheet.name.clone(),
                });
                SheetStatus::NothingToExport
            }
            Err(e) => {
                log_error_chain(&e);
                progress(&RunEvent::SheetFailed {
                    sheet: sheet.name.clone(),
                    path: file.path.clone(),
                    error: e.to_string(),
                });
                SheetStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        SheetReport {
            index: sheet.index,
            name: sheet.name.clone(),
            status,
        }
    }
}

/// エラーの原因を順にデバッグログへ出力
fn log_error_chain(error: &EngineError) {
    let mut source = error.source();
    while let Some(cause) = source {
        log::debug!("  caused by: {}", cause);
        source = cause.source();
    }
}
