//! File Walker Module
//!
//! 入力フォルダ以下を再帰的に走査し、拡張子フィルタに一致するファイルを列挙するモジュール。
//!
//! 走査は遅延評価で、各ディレクトリのエントリは名前順にソートされるため、
//! 変更のないツリーに対しては常に同じ順序で結果を返します。
//! ルートが存在しない場合は空のシーケンスになります（呼び出し側で確認・報告すること）。

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// 走査で見つかった入力ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// ファイルの絶対パス
    pub path: PathBuf,
    /// ディレクトリと拡張子を除いたファイル名
    pub base_name: String,
}

impl InputFile {
    /// パスから入力ファイルを生成
    ///
    /// 相対パスはカレントディレクトリを基準に絶対パスへ変換されます。
    pub fn new(path: PathBuf) -> Self {
        let path = std::path::absolute(&path).unwrap_or(path);
        let base_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, base_name }
    }
}

/// 拡張子フィルタ（大文字小文字を区別しない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// 拡張子のリストからフィルタを生成
    ///
    /// 先頭のドットは取り除かれます（`.xlsx` と `xlsx` は同じ）。
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    /// 対象拡張子のリスト（小文字）
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// パスがフィルタに一致するか
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(["xlsx"])
    }
}

/// 入力ファイルの遅延イテレータ
///
/// 深さ優先で走査し、各ディレクトリ内ではファイルをサブディレクトリより先に、
/// それぞれ名前順で返します。読み取れないディレクトリは`log::warn!`で報告してスキップします。
/// ディレクトリへのシンボリックリンクは辿りません（ファイルへのリンクは対象になります）。
#[derive(Debug)]
pub struct FileWalker {
    filter: ExtensionFilter,
    /// 未展開のディレクトリ（末尾から取り出す）
    pending_dirs: Vec<PathBuf>,
    /// 現在のディレクトリで見つかったファイル（末尾から取り出す）
    pending_files: Vec<PathBuf>,
}

impl FileWalker {
    /// ルートフォルダと拡張子フィルタから走査を開始
    pub fn new(root: impl AsRef<Path>, filter: ExtensionFilter) -> Self {
        let root = root.as_ref();
        let pending_dirs = if root.is_dir() {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };

        Self {
            filter,
            pending_dirs,
            pending_files: Vec::new(),
        }
    }

    /// ディレクトリを1段展開し、ファイルとサブディレクトリを待ち行列に積む
    fn expand(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to read directory {} ({})", dir.display(), e);
                return;
            }
        };

        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to read entry under {} ({})", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    log::warn!("Failed to stat {} ({})", path.display(), e);
                    continue;
                }
            };

            // ディレクトリへのリンクは辿らない
            if file_type.is_dir() {
                dirs.push(path);
            } else if file_type.is_symlink() && path.is_dir() {
                log::debug!("Not following directory link {}", path.display());
            } else if path.is_file() && self.filter.matches(&path) {
                files.push(path);
            }
        }

        // 末尾から取り出すため逆順に積む
        dirs.sort();
        files.sort();
        self.pending_dirs.extend(dirs.into_iter().rev());
        self.pending_files.extend(files.into_iter().rev());
    }
}

impl Iterator for FileWalker {
    type Item = InputFile;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.pending_files.pop() {
                return Some(InputFile::new(path));
            }
            let dir = self.pending_dirs.pop()?;
            self.expand(&dir);
        }
    }
}

/// `FileWalker::new` の短縮形
pub fn walk(root: impl AsRef<Path>, filter: &ExtensionFilter) -> FileWalker {
    FileWalker::new(root, filter.clone())
}
