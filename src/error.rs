//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。
//!
//! エラーは2層に分かれます。
//!
//! - [`BatchError`]: 実行全体を中断する致命的なエラー（出力フォルダ作成失敗など）
//! - [`EngineError`]: ファイル単位・シート単位の失敗。ドライバーが捕捉して報告し、処理を継続します。

use std::path::PathBuf;

use thiserror::Error;

/// 実行全体を中断する致命的なエラー
///
/// `Batch::run`から返される唯一のエラー型です。
/// ファイルやシート単位の失敗はこの型では表現されず、
/// `RunReport`に記録されます。
#[derive(Error, Debug)]
pub enum BatchError {
    /// 出力フォルダを作成できなかった
    ///
    /// この場合、入力ファイルは1件も処理されません。
    #[error("Failed to create output folder '{}': {source}", path.display())]
    OutputDir {
        /// 作成しようとしたパス
        path: PathBuf,
        /// 原因となったI/Oエラー
        #[source]
        source: std::io::Error,
    },

    /// 設定の検証に失敗したエラー
    ///
    /// `BatchBuilder::build()`時に設定を検証し、無効な設定が検出された場合に発生します。
    ///
    /// # 例
    ///
    /// ```rust
    /// use sheetbatch::{BatchBuilder, BatchError, ExportFormat};
    ///
    /// let result = BatchBuilder::new(ExportFormat::Markdown)
    ///     .with_extensions(Vec::<String>::new())
    ///     .build();
    ///
    /// assert!(matches!(result, Err(BatchError::Config(_))));
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// 変換エンジンの起動に失敗したエラー
    #[error("Failed to start conversion engine: {0}")]
    Engine(#[from] EngineError),
}

/// 変換エンジン（スプレッドシートアプリケーション相当）の操作で発生するエラー
///
/// ワークブックのオープン、シートのエクスポート、一時コンテナの操作など、
/// 外部コラボレーターに対するすべての操作がこの型を返します。
#[derive(Error, Debug)]
pub enum EngineError {
    /// I/O操作中に発生したエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// calamineがExcelファイルを解析する際に発生したエラー
    #[error("Failed to parse Excel file: {0}")]
    Parse(#[from] calamine::Error),

    /// ZIPアーカイブの読み書きエラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// パッケージ内XMLの解析エラー
    #[error("XML error: {0}")]
    Xml(String),

    /// UTF-8文字列の変換エラー
    #[error("UTF-8 conversion error: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// 画像のデコード・エンコードエラー
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// 外部プロセスが異常終了した
    #[error("'{program}' exited with {status}: {stderr}")]
    Process {
        /// 実行したプログラム
        program: String,
        /// 終了ステータス
        status: String,
        /// 標準エラー出力の内容
        stderr: String,
    },

    /// 外部プロセスが制限時間内に終了しなかった
    #[error("'{program}' did not finish within {seconds} seconds")]
    Timeout {
        /// 実行したプログラム
        program: String,
        /// 制限時間（秒）
        seconds: u64,
    },

    /// エンジンがサポートしていない操作
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// 指定されたシートがドキュメント内に存在しない
    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    /// 指定された一時コンテナが存在しない（削除済みなど）
    #[error("Temporary container #{0} not found")]
    ContainerNotFound(u32),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb攻撃、パストラバーサル攻撃、ファイルサイズ制限などの
    /// セキュリティ制限に違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl From<zip::result::ZipError> for EngineError {
    fn from(err: zip::result::ZipError) -> Self {
        EngineError::Zip(err.to_string())
    }
}

impl From<quick_xml::Error> for EngineError {
    fn from(err: quick_xml::Error) -> Self {
        EngineError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for EngineError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        EngineError::Xml(format!("attribute error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_output_dir_error_display() {
        let error = BatchError::OutputDir {
            path: PathBuf::from("out/md"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"),
        };

        let msg = error.to_string();
        assert!(msg.contains("out/md"));
        assert!(msg.contains("Permission denied"));
    }

    #[test]
    fn test_output_dir_error_source() {
        use std::error::Error as _;

        let error = BatchError::OutputDir {
            path: PathBuf::from("out"),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "exists"),
        };
        assert!(error.source().is_some());
    }

    #[test]
    fn test_config_error_display() {
        let error = BatchError::Config("extension filter is empty".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: extension filter is empty"
        );
    }

    #[test]
    fn test_engine_error_into_batch_error() {
        let error: BatchError = EngineError::Unsupported("quit".to_string()).into();
        match error {
            BatchError::Engine(EngineError::Unsupported(op)) => assert_eq!(op, "quit"),
            _ => panic!("Expected Engine error"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error: EngineError = io_err.into();

        match error {
            EngineError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_parse_error_display() {
        let error: EngineError = calamine::Error::Msg("Corrupted file").into();
        let msg = error.to_string();
        assert!(msg.starts_with("Failed to parse Excel file"));
        assert!(msg.contains("Corrupted file"));
    }

    #[test]
    fn test_timeout_display() {
        let error = EngineError::Timeout {
            program: "soffice".to_string(),
            seconds: 30,
        };
        assert_eq!(
            error.to_string(),
            "'soffice' did not finish within 30 seconds"
        );
    }

    #[test]
    fn test_process_display() {
        let error = EngineError::Process {
            program: "soffice".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "source file could not be loaded".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("exit status: 1"));
        assert!(msg.contains("could not be loaded"));
    }

    #[test]
    fn test_question_mark_conversion() {
        fn io_operation() -> Result<(), EngineError> {
            let _file = std::fs::File::open("nonexistent_file.xlsx")?;
            Ok(())
        }

        assert!(matches!(io_operation(), Err(EngineError::Io(_))));
    }
}
