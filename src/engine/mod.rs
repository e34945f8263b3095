//! Engine Module
//!
//! 変換エンジン（スプレッドシートアプリケーション相当の外部コラボレーター）との境界を定義するモジュール。
//!
//! - [`Engine`]: 実行全体で1つだけ使用されるプロセスレベルのリソース
//! - [`Document`]: 開いているワークブック。同時に開けるのは1つだけ
//! - [`EngineSession`] / [`OpenDocument`]: 解放処理を保証するスコープガード
//!
//! エンジンが対応していない操作は、既定実装により[`EngineError::Unsupported`]を返します。

mod canvas;
mod native;
mod office;
mod package;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::error::EngineError;
use crate::table::Table;

pub use native::NativeEngine;
pub use office::OfficeConfig;

/// ドキュメント内のシート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    /// ドキュメント内での位置（0始まり、自然な順序）
    pub index: usize,
    /// シート名
    pub name: String,
}

impl Sheet {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// シート上の矩形（ピクセル単位、96 DPI）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// 面積が0かどうか
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// 2つの矩形を含む最小の矩形
    pub fn union(&self, other: &Bounds) -> Bounds {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Bounds {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// 描画オブジェクトの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawableKind {
    /// 埋め込み画像
    Picture,
    /// 図形・テキストボックス
    Shape,
    /// 埋め込みグラフ
    Chart,
    /// グループ化された図形
    Group,
    /// コネクター（線）
    Connector,
}

/// シート上の描画オブジェクト
///
/// [`Document::drawables`]は重なり順（背面が先）で返します。
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    /// オブジェクト名（例: `Picture 1`）
    pub name: String,
    pub kind: DrawableKind,
    /// シート上の位置
    pub bounds: Bounds,
    /// 塗りつぶし色（RGBA）。`None`は塗りなし
    pub fill: Option<[u8; 4]>,
    /// 枠線の色（RGBA）。`None`は枠線なし
    pub line: Option<[u8; 4]>,
    /// 画像データのパッケージ内パス（`Picture`のみ）
    pub media: Option<String>,
}

impl Drawable {
    pub fn new(name: impl Into<String>, kind: DrawableKind, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            kind,
            bounds,
            fill: None,
            line: None,
            media: None,
        }
    }
}

/// 複数の描画オブジェクトをまとめてコピーしたビットマップ
#[derive(Debug, Clone)]
pub struct Picture {
    pub image: RgbaImage,
}

/// 一時コンテナ（画像を貼り付けるためのグラフ領域）の識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u32);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 固定レイアウト形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedFormat {
    Pdf,
}

/// 変換エンジン
///
/// 実行開始時に1度だけ取得し、すべてのファイルの処理が終わったら
/// [`Engine::quit`]で1度だけ解放します（[`EngineSession`]が保証します）。
pub trait Engine {
    /// ログ出力用の名前
    fn name(&self) -> &str;

    /// ワークブックを開く
    ///
    /// 返されたドキュメントはエンジンを借用するため、
    /// 同時に2つのドキュメントを開くことはできません。
    fn open(&mut self, path: &Path) -> Result<Box<dyn Document + '_>, EngineError>;

    /// プロセスレベルのリソースを解放する
    fn quit(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// 開いているワークブック
pub trait Document {
    /// シートの一覧（自然な順序）
    fn sheets(&mut self) -> Result<Vec<Sheet>, EngineError>;

    /// 使用範囲の矩形
    fn used_range(&mut self, sheet: &Sheet) -> Result<Bounds, EngineError> {
        let _ = sheet;
        Err(EngineError::Unsupported("used range".to_string()))
    }

    /// 描画オブジェクトの一覧（背面が先）
    fn drawables(&mut self, sheet: &Sheet) -> Result<Vec<Drawable>, EngineError> {
        let _ = sheet;
        Err(EngineError::Unsupported("drawable objects".to_string()))
    }

    /// シートを固定レイアウト形式で書き出す
    fn export_fixed_format(
        &mut self,
        sheet: &Sheet,
        format: FixedFormat,
        path: &Path,
    ) -> Result<(), EngineError> {
        let _ = (sheet, path);
        Err(EngineError::Unsupported(format!("{:?} export", format)))
    }

    /// 描画オブジェクトを重なり順を保って1枚のビットマップとしてコピーする
    fn copy_picture(
        &mut self,
        sheet: &Sheet,
        drawables: &[Drawable],
    ) -> Result<Picture, EngineError> {
        let _ = (sheet, drawables);
        Err(EngineError::Unsupported("copy as picture".to_string()))
    }

    /// シート上に一時コンテナを作成する
    fn add_container(&mut self, sheet: &Sheet, bounds: Bounds) -> Result<ContainerId, EngineError> {
        let _ = (sheet, bounds);
        Err(EngineError::Unsupported("temporary container".to_string()))
    }

    /// コンテナに画像を貼り付ける
    fn paste(&mut self, container: ContainerId, picture: Picture) -> Result<(), EngineError> {
        let _ = picture;
        Err(EngineError::ContainerNotFound(container.0))
    }

    /// コンテナを画像として書き出す
    fn export_container(&mut self, container: ContainerId, path: &Path) -> Result<(), EngineError> {
        let _ = path;
        Err(EngineError::ContainerNotFound(container.0))
    }

    /// コンテナを削除する
    fn delete_container(&mut self, container: ContainerId) -> Result<(), EngineError> {
        Err(EngineError::ContainerNotFound(container.0))
    }

    /// シートを表として読み込む
    fn load_table(&mut self, sheet: &Sheet) -> Result<Table, EngineError> {
        let _ = sheet;
        Err(EngineError::Unsupported("table loading".to_string()))
    }

    /// ドキュメントを閉じる
    fn close(&mut self, save: bool) -> Result<(), EngineError>;
}

/// 実行全体のエンジン所有権
///
/// [`EngineSession::finish`]で明示的に終了するか、ドロップ時に自動で
/// [`Engine::quit`]を呼び出します。どちらの経路でも`quit`は1度だけ呼ばれます。
pub struct EngineSession<E: Engine> {
    engine: E,
    finished: bool,
}

impl<E: Engine> EngineSession<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            finished: false,
        }
    }

    /// ワークブックを開く
    pub fn open(&mut self, path: &Path) -> Result<OpenDocument<'_>, EngineError> {
        let inner = self.engine.open(path)?;
        Ok(OpenDocument {
            inner,
            path: path.to_path_buf(),
            closed: false,
        })
    }

    /// エンジンを終了する
    pub fn finish(mut self) -> Result<(), EngineError> {
        self.finished = true;
        log::debug!("Shutting down engine '{}'", self.engine.name());
        self.engine.quit()
    }
}

impl<E: Engine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Err(e) = self.engine.quit() {
                log::warn!("Failed to shut down engine '{}': {}", self.engine.name(), e);
            }
        }
    }
}

/// 開いているドキュメントのガード
///
/// [`OpenDocument::close`]を呼ばずにスコープを抜けた場合でも、
/// ドロップ時に保存せずに閉じます。
pub struct OpenDocument<'e> {
    inner: Box<dyn Document + 'e>,
    path: PathBuf,
    closed: bool,
}

impl OpenDocument<'_> {
    /// 開いているファイルのパス
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存せずに閉じる
    pub fn close(mut self) -> Result<(), EngineError> {
        self.closed = true;
        self.inner.close(false)
    }
}

impl<'e> Deref for OpenDocument<'e> {
    type Target = dyn Document + 'e;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for OpenDocument<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for OpenDocument<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.inner.close(false) {
                log::warn!("Failed to close {}: {}", self.path.display(), e);
            }
        }
    }
}
