//! Run Report Module
//!
//! 実行中のイベント（1イベント = 1行の進捗メッセージ）と、
//! ファイル単位・シート単位の結果をまとめたレポートを定義するモジュール。

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// 実行中に発生するイベント
///
/// `Display`で1行の進捗メッセージになります。
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RunEvent {
    /// 出力フォルダを作成した
    OutputRootCreated { path: PathBuf },
    /// 入力フォルダが存在しない
    InputRootMissing { path: PathBuf },
    /// ファイルの処理を開始した
    FileStarted { path: PathBuf },
    /// ファイルを開けなかった（このファイルはスキップ）
    FileOpenFailed { path: PathBuf, error: String },
    /// シート一覧の取得など、シート単位以外の処理に失敗した
    FileFailed { path: PathBuf, error: String },
    /// シートを書き出した
    SheetExported { sheet: String, path: PathBuf },
    /// シートに出力する内容がなかった
    SheetEmpty { sheet: String },
    /// シートの書き出しに失敗した（残りのシートは続行）
    SheetFailed {
        sheet: String,
        path: PathBuf,
        error: String,
    },
    /// ファイルを閉じられなかった
    CloseFailed { path: PathBuf, error: String },
}

impl RunEvent {
    /// 失敗を表すイベントかどうか
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunEvent::FileOpenFailed { .. }
                | RunEvent::FileFailed { .. }
                | RunEvent::SheetFailed { .. }
                | RunEvent::CloseFailed { .. }
        )
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::OutputRootCreated { path } => {
                write!(f, "Created output folder: {}", path.display())
            }
            RunEvent::InputRootMissing { path } => {
                write!(f, "Input folder not found: {}", path.display())
            }
            RunEvent::FileStarted { path } => write!(f, "Processing: {}", path.display()),
            RunEvent::FileOpenFailed { path, error } => {
                write!(f, "  Failed to open {}: {}", path.display(), error)
            }
            RunEvent::FileFailed { path, error } => {
                write!(f, "  Error while processing {}: {}", path.display(), error)
            }
            RunEvent::SheetExported { sheet, path } => {
                write!(f, "  Exported '{}': {}", sheet, path.display())
            }
            RunEvent::SheetEmpty { sheet } => {
                write!(f, "  Sheet '{}' has nothing to export", sheet)
            }
            RunEvent::SheetFailed { sheet, path, error } => write!(
                f,
                "  Failed to export sheet '{}' of {}: {}",
                sheet,
                path.display(),
                error
            ),
            RunEvent::CloseFailed { path, error } => {
                write!(f, "  Failed to close {}: {}", path.display(), error)
            }
        }
    }
}

/// シートの処理結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetStatus {
    Exported { path: PathBuf },
    NothingToExport,
    Failed { error: String },
}

/// シート単位の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetReport {
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub status: SheetStatus,
}

/// ファイル単位の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// ファイルを開けたかどうか
    pub opened: bool,
    /// ファイルを開けなかった、またはシート一覧を取得できなかった場合のエラー
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sheets: Vec<SheetReport>,
}

impl FileReport {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            opened: false,
            error: None,
            sheets: Vec::new(),
        }
    }
}

/// 実行全体の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub output_root: PathBuf,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub(crate) fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            files: Vec::new(),
        }
    }

    /// 開くことができたファイルの数
    pub fn files_processed(&self) -> usize {
        self.files.iter().filter(|f| f.opened).count()
    }

    /// 書き出したシートの数
    pub fn sheets_exported(&self) -> usize {
        self.sheets()
            .filter(|s| matches!(s.status, SheetStatus::Exported { .. }))
            .count()
    }

    /// 失敗の数（ファイル単位 + シート単位）
    pub fn failures(&self) -> usize {
        let file_failures = self.files.iter().filter(|f| f.error.is_some()).count();
        let sheet_failures = self
            .sheets()
            .filter(|s| matches!(s.status, SheetStatus::Failed { .. }))
            .count();
        file_failures + sheet_failures
    }

    /// 書き出したファイルのパス（処理順）
    pub fn written_paths(&self) -> impl Iterator<Item = &Path> {
        self.sheets().filter_map(|s| match &s.status {
            SheetStatus::Exported { path } => Some(path.as_path()),
            _ => None,
        })
    }

    /// JSON文字列に変換
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn sheets(&self) -> impl Iterator<Item = &SheetReport> {
        self.files.iter().flat_map(|f| f.sheets.iter())
    }
}
