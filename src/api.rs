//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

use serde::Serialize;

/// 出力フォーマット
///
/// 各シートを書き出す形式を指定します。
/// 形式ごとに、出力ファイルの拡張子と既定の出力フォルダ名が決まります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ExportFormat {
    /// シートの印刷範囲をPDFとして出力
    ///
    /// 拡張子: `pdf`、既定の出力フォルダ: `output`
    Pdf,

    /// シート上のすべての描画オブジェクト（図形、グラフ、画像）を
    /// 重なり順を保ったまま1枚のPNG画像として出力
    ///
    /// 拡張子: `png`、既定の出力フォルダ: `output_images`
    Png,

    /// シートのセルデータをMarkdownテーブルとして出力
    ///
    /// 拡張子: `md`、既定の出力フォルダ: `output_md`
    Markdown,
}

impl ExportFormat {
    /// 出力ファイルの拡張子（ドットなし）
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Png => "png",
            ExportFormat::Markdown => "md",
        }
    }

    /// 既定の出力フォルダ名
    pub fn default_output_root(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "output",
            ExportFormat::Png => "output_images",
            ExportFormat::Markdown => "output_md",
        }
    }
}

/// 出力ファイル名の衝突時の扱い
///
/// 2つのシート（または異なるフォルダにある同名のファイル）が
/// 同じ出力ファイル名に変換された場合の動作を指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum CollisionPolicy {
    /// 後から書き込んだファイルで上書きする（デフォルト）
    ///
    /// 出力ファイル名は常に `{ファイル名}_{シート名}.{拡張子}` のままです。
    #[default]
    Overwrite,

    /// 連番サフィックスを付けて別名で保存する
    ///
    /// 例: `book_Sheet.md` が既に出力済みなら `book_Sheet_2.md`
    Suffix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        assert_eq!(ExportFormat::Pdf.extension(), "pdf");
        assert_eq!(ExportFormat::Png.extension(), "png");
        assert_eq!(ExportFormat::Markdown.extension(), "md");
    }

    #[test]
    fn test_default_output_roots() {
        assert_eq!(ExportFormat::Pdf.default_output_root(), "output");
        assert_eq!(ExportFormat::Png.default_output_root(), "output_images");
        assert_eq!(ExportFormat::Markdown.default_output_root(), "output_md");
    }

    #[test]
    fn test_default_collision_policy() {
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::Overwrite);
    }
}
