//! Security Module
//!
//! 信頼できない入力ワークブックに対する制限を実装するモジュール。
//! ZIP bomb、パストラバーサル、巨大な合成画像によるメモリ枯渇への対策を提供します。

use std::io::{Read, Seek};
use std::path::Path;

use zip::ZipArchive;

use crate::error::EngineError;

/// セキュリティ制限
#[derive(Debug, Clone)]
pub(crate) struct SecurityConfig {
    /// 展開後の合計サイズの上限（バイト）。デフォルト: 1GB
    pub max_decompressed_size: u64,
    /// アーカイブ内のエントリ数の上限。デフォルト: 10000
    pub max_file_count: usize,
    /// 単一エントリの展開後サイズの上限（バイト）。デフォルト: 100MB
    pub max_file_size: u64,
    /// 入力ファイルのサイズの上限（バイト）。デフォルト: 2GB
    pub max_input_file_size: u64,
    /// 合成画像・コンテナの画素数の上限。デフォルト: 1億画素
    pub max_canvas_pixels: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: 1_073_741_824,
            max_file_count: 10_000,
            max_file_size: 104_857_600,
            max_input_file_size: 2_147_483_648,
            max_canvas_pixels: 100_000_000,
        }
    }
}

impl SecurityConfig {
    /// 入力ファイルのサイズを確認する
    pub fn check_input_file(&self, path: &Path) -> Result<(), EngineError> {
        let size = std::fs::metadata(path)?.len();
        if size > self.max_input_file_size {
            return Err(EngineError::SecurityViolation(format!(
                "Input file exceeds maximum size: {} bytes (max: {} bytes)",
                size, self.max_input_file_size
            )));
        }
        Ok(())
    }

    /// アーカイブ全体（エントリ数・パス・展開後サイズ）を検証する
    pub fn check_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(), EngineError> {
        if archive.len() > self.max_file_count {
            return Err(EngineError::SecurityViolation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                archive.len(),
                self.max_file_count
            )));
        }

        let mut total = 0u64;
        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name();
            validate_zip_path(name)?;

            let size = file.size();
            if size > self.max_file_size {
                return Err(EngineError::SecurityViolation(format!(
                    "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    name, size, self.max_file_size
                )));
            }

            total = total.checked_add(size).ok_or_else(|| {
                EngineError::SecurityViolation(
                    "Total decompressed size calculation overflow".to_string(),
                )
            })?;
            if total > self.max_decompressed_size {
                return Err(EngineError::SecurityViolation(format!(
                    "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                    total, self.max_decompressed_size
                )));
            }
        }

        Ok(())
    }

    /// 画像の大きさを確認する
    pub fn check_canvas(&self, width: u32, height: u32) -> Result<(), EngineError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_canvas_pixels {
            return Err(EngineError::SecurityViolation(format!(
                "Image of {}x{} pixels exceeds maximum of {} pixels",
                width, height, self.max_canvas_pixels
            )));
        }
        Ok(())
    }
}

/// アーカイブ内のエントリ名を検証
///
/// 空のパス、絶対パス、`..`、バックスラッシュを含むパスを拒否します。
pub(crate) fn validate_zip_path(path: &str) -> Result<(), EngineError> {
    let reason = if path.is_empty() {
        "empty path"
    } else if path.starts_with('/') || path.get(1..3) == Some(":\\") {
        "absolute path"
    } else if path.split('/').any(|segment| segment == "..") {
        "path traversal"
    } else if path.contains('\\') {
        "backslash in path"
    } else {
        return Ok(());
    };

    Err(EngineError::SecurityViolation(format!(
        "Invalid ZIP path ({}): {}",
        reason, path
    )))
}
