//! Naming Module
//!
//! 出力ファイル名の生成を担当するモジュール。
//!
//! 出力ファイル名は `{入力ファイル名}_{サニタイズ済みシート名}.{拡張子}` の形式です。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::api::CollisionPolicy;

/// ファイル名に使用できない文字
pub const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// ファイル名に使用できない文字を取り除く
///
/// 残りの文字の順序は保持されます。冪等です（`sanitize(sanitize(x)) == sanitize(x)`）。
/// 空文字列やすべてが禁止文字の入力は空文字列になります。
///
/// # 使用例
///
/// ```rust
/// use sheetbatch::sanitize;
///
/// assert_eq!(sanitize("Q1/Q2: <Sales>"), "Q1Q2 Sales");
/// assert_eq!(sanitize("???"), "");
/// ```
pub fn sanitize(name: &str) -> String {
    name.chars().filter(|c| !RESERVED_CHARS.contains(c)).collect()
}

/// 出力先（出力フォルダとファイル名の組）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// 出力フォルダ
    pub dir: PathBuf,
    /// 生成されたファイル名
    pub file_name: String,
}

impl OutputTarget {
    /// 入力ファイル名・シート名・拡張子から出力先を計算
    pub fn new(dir: impl Into<PathBuf>, base_name: &str, sheet_name: &str, ext: &str) -> Self {
        Self {
            dir: dir.into(),
            file_name: format!("{}_{}.{}", base_name, sanitize(sheet_name), ext),
        }
    }

    /// 出力ファイルのフルパス
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// 実行中に割り当てた出力ファイル名の記録
///
/// `CollisionPolicy::Suffix` の場合、既に割り当て済みの名前には
/// `_2`, `_3`, ... を拡張子の前に付けて重複を避けます。
/// 比較は大文字小文字を区別しません（Windows/macOSのファイルシステムに合わせる）。
#[derive(Debug, Default)]
pub(crate) struct NameRegistry {
    policy: CollisionPolicy,
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            used: HashSet::new(),
        }
    }

    /// 出力先を確定する
    pub fn assign(&mut self, mut target: OutputTarget) -> OutputTarget {
        if self.policy == CollisionPolicy::Suffix {
            let (stem, ext) = split_extension(&target.file_name);
            let mut candidate = target.file_name.clone();
            let mut n = 2;
            while self.used.contains(&candidate.to_lowercase()) {
                candidate = format!("{}_{}{}", stem, n, ext);
                n += 1;
            }
            target.file_name = candidate;
        }

        self.used.insert(target.file_name.to_lowercase());
        target
    }
}

/// `"a_b.md"` -> `("a_b", ".md")`
fn split_extension(file_name: &str) -> (&str, &str) {
    match Path::new(file_name).extension() {
        Some(ext) => {
            let split = file_name.len() - ext.len() - 1;
            file_name.split_at(split)
        }
        None => (file_name, ""),
    }
}
