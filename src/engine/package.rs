//! Package Reader Module
//!
//! XLSXパッケージ（ZIPアーカイブ内のXML）から、calamineでは取得できない情報を抽出するモジュール。
//!
//! - ワークブックのシート一覧（ワークシート/グラフシートの区別）と1904年エポック
//! - 列幅・行高（使用範囲や描画オブジェクトの位置をピクセルに換算するため）
//! - 描画オブジェクト（DrawingMLのアンカー）と画像データ
//! - 1枚のシートだけを表示状態にしたワークブックのコピー（PDF出力用）

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::engine::{Bounds, Drawable, DrawableKind};
use crate::error::EngineError;
use crate::security::SecurityConfig;

/// 1ピクセルあたりのEMU（96 DPI）
pub(crate) const EMU_PER_PIXEL: f64 = 9525.0;

/// 列幅・行高の既定値（Calibri 11pt、既定のテーマ）
const DEFAULT_COLUMN_PX: f64 = 64.0;
const DEFAULT_ROW_PX: f64 = 20.0;
const MAX_DIGIT_WIDTH_PX: f64 = 7.0;

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_WORKSHEET: &str = "/worksheet";
const REL_CHARTSHEET: &str = "/chartsheet";

/// 既定テーマの色（accent1 = 青）
const ACCENT1: [u8; 4] = [0x44, 0x72, 0xC4, 0xFF];
const ACCENT1_DARK: [u8; 4] = [0x2F, 0x52, 0x8F, 0xFF];
const WHITE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const TEXT_BOX_LINE: [u8; 4] = [0xBF, 0xBF, 0xBF, 0xFF];
const CHART_BORDER: [u8; 4] = [0xD9, 0xD9, 0xD9, 0xFF];

/// シートの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SheetKind {
    Worksheet,
    Chartsheet,
    Other,
}

/// ワークブックに登録されたシート
#[derive(Debug, Clone)]
pub(crate) struct SheetPart {
    pub name: String,
    /// `<sheets>`内での位置（すべての種類を数える）
    pub position: usize,
    /// パッケージ内のパス
    pub part: Option<String>,
    pub kind: SheetKind,
}

/// パッケージ内の関係（`.rels`の`Relationship`要素）
#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    rel_type: String,
    target: String,
    external: bool,
}

/// 列幅・行高と描画への参照
#[derive(Debug, Clone)]
pub(crate) struct SheetGeometry {
    default_col_px: f64,
    default_row_px: f64,
    /// (最初の列, 最後の列, 幅) 列は0始まり
    cols: Vec<(u32, u32, f64)>,
    /// 行（0始まり） -> 高さ
    rows: HashMap<u32, f64>,
    drawing_rel: Option<String>,
}

impl Default for SheetGeometry {
    fn default() -> Self {
        Self {
            default_col_px: DEFAULT_COLUMN_PX,
            default_row_px: DEFAULT_ROW_PX,
            cols: Vec::new(),
            rows: HashMap::new(),
            drawing_rel: None,
        }
    }
}

impl SheetGeometry {
    /// 列の左端（ピクセル）
    pub fn column_left(&self, col: u32) -> f64 {
        let mut left = f64::from(col) * self.default_col_px;
        for &(min, max, width) in &self.cols {
            let covered = max.saturating_add(1).min(col).saturating_sub(min);
            left += f64::from(covered) * (width - self.default_col_px);
        }
        left
    }

    /// 行の上端（ピクセル）
    pub fn row_top(&self, row: u32) -> f64 {
        let mut top = f64::from(row) * self.default_row_px;
        for (&r, &height) in &self.rows {
            if r < row {
                top += height - self.default_row_px;
            }
        }
        top
    }

    /// セル範囲（両端を含む）の矩形
    pub fn cell_range(&self, first: (u32, u32), last: (u32, u32)) -> Bounds {
        let (first_row, first_col) = first;
        let (last_row, last_col) = last;
        let left = self.column_left(first_col);
        let top = self.row_top(first_row);
        Bounds::new(
            left,
            top,
            self.column_left(last_col.saturating_add(1)) - left,
            self.row_top(last_row.saturating_add(1)) - top,
        )
    }

    fn marker_point(&self, marker: &Marker) -> (f64, f64) {
        (
            self.column_left(marker.col) + marker.col_off as f64 / EMU_PER_PIXEL,
            self.row_top(marker.row) + marker.row_off as f64 / EMU_PER_PIXEL,
        )
    }
}

/// 開いたXLSXパッケージ
pub(crate) struct Package {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    workbook_part: String,
    is_1904: bool,
    sheets: Vec<SheetPart>,
}

impl Package {
    /// パッケージを開き、ワークブックの構造を読み込む
    pub fn open(bytes: Vec<u8>, limits: &SecurityConfig) -> Result<Self, EngineError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        limits.check_archive(&mut archive)?;

        // 1. ルートの関係からワークブックのパスを特定
        let workbook_part = match read_entry(&mut archive, "_rels/.rels")? {
            Some(xml) => parse_relationships(&xml)?
                .into_values()
                .find(|rel| rel.rel_type.ends_with(REL_OFFICE_DOCUMENT) && !rel.external)
                .map(|rel| resolve_target("", &rel.target))
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()),
            None => DEFAULT_WORKBOOK_PART.to_string(),
        };

        // 2. xl/workbook.xml を解析
        let workbook_xml = read_entry(&mut archive, &workbook_part)?
            .ok_or_else(|| EngineError::Xml(format!("'{}' is missing", workbook_part)))?;
        let (entries, is_1904) = parse_workbook(&workbook_xml)?;

        // 3. シートのパスを関係から解決
        let rels = match read_entry(&mut archive, &rels_path(&workbook_part))? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };

        let sheets = entries
            .into_iter()
            .enumerate()
            .map(|(position, (name, rel_id))| {
                let rel = rel_id.as_deref().and_then(|id| rels.get(id));
                let kind = match rel {
                    Some(rel) if rel.rel_type.ends_with(REL_WORKSHEET) => SheetKind::Worksheet,
                    Some(rel) if rel.rel_type.ends_with(REL_CHARTSHEET) => SheetKind::Chartsheet,
                    _ => SheetKind::Other,
                };
                SheetPart {
                    name,
                    position,
                    part: rel.map(|rel| resolve_target(&workbook_part, &rel.target)),
                    kind,
                }
            })
            .collect();

        Ok(Self {
            archive,
            workbook_part,
            is_1904,
            sheets,
        })
    }

    /// 1904年エポックを使用するかどうか
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// ワークブックに登録されたシート（`<sheets>`の順序）
    pub fn sheets(&self) -> &[SheetPart] {
        &self.sheets
    }

    /// パッケージ内のパートを読み込む
    pub fn read_part(&mut self, path: &str) -> Result<Vec<u8>, EngineError> {
        read_entry(&mut self.archive, path)?
            .ok_or_else(|| EngineError::Zip(format!("'{}' is missing from the package", path)))
    }

    /// ワークシートの列幅・行高を読み込む
    pub fn geometry(&mut self, sheet: &SheetPart) -> Result<SheetGeometry, EngineError> {
        let part = sheet
            .part
            .as_deref()
            .ok_or_else(|| EngineError::SheetNotFound(sheet.name.clone()))?;
        let xml = self.read_part(part)?;
        parse_geometry(&xml)
    }

    /// ワークシート上の描画オブジェクトを重なり順で読み込む
    pub fn drawables(
        &mut self,
        sheet: &SheetPart,
        geometry: &SheetGeometry,
    ) -> Result<Vec<Drawable>, EngineError> {
        let (part, rel_id) = match (sheet.part.as_deref(), geometry.drawing_rel.as_deref()) {
            (Some(part), Some(rel_id)) => (part, rel_id),
            _ => return Ok(Vec::new()),
        };

        // シート -> 描画パート
        let sheet_rels = match read_entry(&mut self.archive, &rels_path(part))? {
            Some(xml) => parse_relationships(&xml)?,
            None => return Ok(Vec::new()),
        };
        let drawing_part = match sheet_rels.get(rel_id) {
            Some(rel) if !rel.external => resolve_target(part, &rel.target),
            _ => return Ok(Vec::new()),
        };
        let drawing_xml = match read_entry(&mut self.archive, &drawing_part)? {
            Some(xml) => xml,
            None => {
                log::warn!("Drawing part '{}' is missing", drawing_part);
                return Ok(Vec::new());
            }
        };

        // 描画パート -> 画像パート
        let media: HashMap<String, String> =
            match read_entry(&mut self.archive, &rels_path(&drawing_part))? {
                Some(xml) => parse_relationships(&xml)?
                    .into_iter()
                    .filter(|(_, rel)| !rel.external)
                    .map(|(id, rel)| (id, resolve_target(&drawing_part, &rel.target)))
                    .collect(),
                None => HashMap::new(),
            };

        parse_drawing(&drawing_xml, geometry, &media)
    }

    /// 指定したシートだけを表示状態にしたパッケージのコピーを作成
    ///
    /// 他のシートは`state="hidden"`になり、指定したシートがアクティブになります。
    /// ワークブック以外のパートは再圧縮せずにコピーします。
    pub fn isolate_sheet(&mut self, position: usize) -> Result<Vec<u8>, EngineError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for i in 0..self.archive.len() {
            let mut file = self.archive.by_index(i)?;
            if file.name() == self.workbook_part {
                let mut xml = Vec::new();
                file.read_to_end(&mut xml)?;
                let rewritten = show_single_sheet(&xml, position)?;
                writer.start_file(self.workbook_part.as_str(), FileOptions::default())?;
                writer.write_all(&rewritten)?;
            } else {
                writer.raw_copy_file(file)?;
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// エントリを読み込む（存在しない場合は`None`）
fn read_entry(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    name: &str,
) -> Result<Option<Vec<u8>>, EngineError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// パートに対応する`.rels`のパス（`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`）
fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// 関係のターゲットをパッケージ内の絶対パスに解決
///
/// `("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml")` -> `"xl/drawings/drawing1.xml"`
fn resolve_target(base_part: &str, target: &str) -> String {
    let mut segments: Vec<&str> = if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute.split('/'));
    } else {
        match base_part.rsplit_once('/') {
            Some((dir, _)) => dir.split('/').collect(),
            None => Vec::new(),
        }
    };
    segments.extend(target.split('/'));
    normalize(segments.into_iter())
}

fn normalize<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in segments {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

/// 属性の値を取得（名前空間プレフィックスは無視）
fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, EngineError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key {
            let raw = std::str::from_utf8(&attr.value)?;
            let value = unescape(raw).map_err(|e| EngineError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// `.rels`の解析（Id -> 関係）
fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, Relationship>, EngineError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut rels = HashMap::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                let target = attr_value(&e, b"Target")?;
                if let (Some(id), Some(target)) = (id, target) {
                    let rel_type = attr_value(&e, b"Type")?.unwrap_or_default();
                    let external = attr_value(&e, b"TargetMode")?
                        .map(|mode| mode == "External")
                        .unwrap_or(false);
                    rels.insert(
                        id,
                        Relationship {
                            rel_type,
                            target,
                            external,
                        },
                    );
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// xl/workbook.xml の解析
///
/// `<sheet name="..." r:id="..."/>`の並びと`<workbookPr date1904="..."/>`を返します。
#[allow(clippy::type_complexity)]
fn parse_workbook(xml: &[u8]) -> Result<(Vec<(String, Option<String>)>, bool), EngineError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut sheets = Vec::new();
    let mut is_1904 = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr_value(&e, b"name")?.unwrap_or_default();
                    let rel_id = attr_value(&e, b"id")?;
                    sheets.push((name, rel_id));
                }
                b"workbookPr" => {
                    if let Some(value) = attr_value(&e, b"date1904")? {
                        is_1904 = parse_bool(&value);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, is_1904))
}

/// 列幅（文字数、余白込み）をピクセルに換算
fn column_width_px(width: f64) -> f64 {
    ((256.0 * width + (128.0 / MAX_DIGIT_WIDTH_PX).trunc()) / 256.0 * MAX_DIGIT_WIDTH_PX).trunc()
}

/// 行高（ポイント）をピクセルに換算
fn row_height_px(points: f64) -> f64 {
    points * 96.0 / 72.0
}

/// ワークシートXMLから列幅・行高・描画参照を読み込む
fn parse_geometry(xml: &[u8]) -> Result<SheetGeometry, EngineError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut geometry = SheetGeometry::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheetFormatPr" => {
                    if let Some(width) = attr_value(&e, b"defaultColWidth")? {
                        if let Ok(width) = width.parse::<f64>() {
                            geometry.default_col_px = column_width_px(width);
                        }
                    } else if let Some(base) = attr_value(&e, b"baseColWidth")? {
                        if let Ok(base) = base.parse::<f64>() {
                            // 余白5pxを加え、8の倍数に切り上げ
                            geometry.default_col_px =
                                ((base * MAX_DIGIT_WIDTH_PX + 5.0) / 8.0).ceil() * 8.0;
                        }
                    }
                    if let Some(height) = attr_value(&e, b"defaultRowHeight")? {
                        if let Ok(height) = height.parse::<f64>() {
                            geometry.default_row_px = row_height_px(height);
                        }
                    }
                }
                b"col" => {
                    let min = attr_value(&e, b"min")?.and_then(|v| v.parse::<u32>().ok());
                    let max = attr_value(&e, b"max")?.and_then(|v| v.parse::<u32>().ok());
                    let hidden = attr_value(&e, b"hidden")?
                        .map(|v| parse_bool(&v))
                        .unwrap_or(false);
                    let width = attr_value(&e, b"width")?
                        .and_then(|v| v.parse::<f64>().ok())
                        .map(column_width_px);
                    if let (Some(min), Some(max)) = (min, max) {
                        if min >= 1 && max >= min {
                            let px = if hidden {
                                0.0
                            } else {
                                width.unwrap_or(geometry.default_col_px)
                            };
                            geometry.cols.push((min - 1, max - 1, px));
                        }
                    }
                }
                b"row" => {
                    let r = attr_value(&e, b"r")?.and_then(|v| v.parse::<u32>().ok());
                    let hidden = attr_value(&e, b"hidden")?
                        .map(|v| parse_bool(&v))
                        .unwrap_or(false);
                    let height = attr_value(&e, b"ht")?.and_then(|v| v.parse::<f64>().ok());
                    if let Some(r) = r.filter(|r| *r >= 1) {
                        if hidden {
                            geometry.rows.insert(r - 1, 0.0);
                        } else if let Some(height) = height {
                            geometry.rows.insert(r - 1, row_height_px(height));
                        }
                    }
                }
                b"drawing" => {
                    geometry.drawing_rel = attr_value(&e, b"id")?;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(geometry)
}

/// アンカー内のセル位置（`<xdr:from>`/`<xdr:to>`）
#[derive(Debug, Clone, Copy, Default)]
struct Marker {
    col: u32,
    col_off: i64,
    row: u32,
    row_off: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorKind {
    TwoCell,
    OneCell,
    Absolute,
}

/// 塗り・線の指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paint {
    NoFill,
    Solid([u8; 4]),
}

/// 解析中のアンカー
#[derive(Debug)]
struct Anchor {
    kind: AnchorKind,
    from: Marker,
    to: Marker,
    pos: (i64, i64),
    ext: (i64, i64),
    object: Option<DrawableKind>,
    name: Option<String>,
    embed: Option<String>,
    fill: Option<Paint>,
    line: Option<Paint>,
    text_box: bool,
}

impl Anchor {
    fn new(kind: AnchorKind) -> Self {
        Self {
            kind,
            from: Marker::default(),
            to: Marker::default(),
            pos: (0, 0),
            ext: (0, 0),
            object: None,
            name: None,
            embed: None,
            fill: None,
            line: None,
            text_box: false,
        }
    }

    fn bounds(&self, geometry: &SheetGeometry) -> Bounds {
        let emu = |v: i64| v as f64 / EMU_PER_PIXEL;
        match self.kind {
            AnchorKind::TwoCell => {
                let (left, top) = geometry.marker_point(&self.from);
                let (right, bottom) = geometry.marker_point(&self.to);
                Bounds::new(left, top, (right - left).max(0.0), (bottom - top).max(0.0))
            }
            AnchorKind::OneCell => {
                let (left, top) = geometry.marker_point(&self.from);
                Bounds::new(left, top, emu(self.ext.0), emu(self.ext.1))
            }
            AnchorKind::Absolute => Bounds::new(
                emu(self.pos.0),
                emu(self.pos.1),
                emu(self.ext.0),
                emu(self.ext.1),
            ),
        }
    }

    fn into_drawable(
        self,
        index: usize,
        geometry: &SheetGeometry,
        media: &HashMap<String, String>,
    ) -> Option<Drawable> {
        let kind = self.object?;
        let bounds = self.bounds(geometry);
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("Object {}", index + 1));

        let resolve = |paint: Option<Paint>, default: Option<[u8; 4]>| match paint {
            Some(Paint::Solid(color)) => Some(color),
            Some(Paint::NoFill) => None,
            None => default,
        };

        let mut drawable = Drawable::new(name, kind, bounds);
        match kind {
            DrawableKind::Picture => {
                drawable.line = resolve(self.line, None);
                drawable.media = self.embed.as_ref().and_then(|id| media.get(id)).cloned();
            }
            DrawableKind::Shape if self.text_box => {
                drawable.fill = resolve(self.fill, Some(WHITE));
                drawable.line = resolve(self.line, Some(TEXT_BOX_LINE));
            }
            DrawableKind::Shape => {
                drawable.fill = resolve(self.fill, Some(ACCENT1));
                drawable.line = resolve(self.line, Some(ACCENT1_DARK));
            }
            DrawableKind::Connector => {
                drawable.line = resolve(self.line, Some(ACCENT1));
            }
            DrawableKind::Chart => {
                drawable.fill = Some(WHITE);
                drawable.line = Some(CHART_BORDER);
            }
            DrawableKind::Group => {
                drawable.fill = resolve(self.fill, None);
                drawable.line = resolve(self.line, Some(CHART_BORDER));
            }
        }
        Some(drawable)
    }
}

fn object_kind(local_name: &[u8]) -> Option<DrawableKind> {
    match local_name {
        b"pic" => Some(DrawableKind::Picture),
        b"sp" => Some(DrawableKind::Shape),
        b"graphicFrame" => Some(DrawableKind::Chart),
        b"grpSp" => Some(DrawableKind::Group),
        b"cxnSp" => Some(DrawableKind::Connector),
        _ => None,
    }
}

fn anchor_kind(local_name: &[u8]) -> Option<AnchorKind> {
    match local_name {
        b"twoCellAnchor" => Some(AnchorKind::TwoCell),
        b"oneCellAnchor" => Some(AnchorKind::OneCell),
        b"absoluteAnchor" => Some(AnchorKind::Absolute),
        _ => None,
    }
}

/// 既定テーマの配色
fn scheme_color(name: &str) -> Option<[u8; 4]> {
    let rgb = match name {
        "dk1" | "tx1" => [0x00, 0x00, 0x00],
        "lt1" | "bg1" => [0xFF, 0xFF, 0xFF],
        "dk2" | "tx2" => [0x44, 0x54, 0x6A],
        "lt2" | "bg2" => [0xE7, 0xE6, 0xE6],
        "accent1" => [0x44, 0x72, 0xC4],
        "accent2" => [0xED, 0x7D, 0x31],
        "accent3" => [0xA5, 0xA5, 0xA5],
        "accent4" => [0xFF, 0xC0, 0x00],
        "accent5" => [0x5B, 0x9B, 0xD5],
        "accent6" => [0x70, 0xAD, 0x47],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 0xFF])
}

fn hex_color(value: &str) -> Option<[u8; 4]> {
    if value.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(value.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?, 0xFF])
}

/// 描画パートのXMLを解析し、アンカーごとに描画オブジェクトを返す
///
/// グループ内の図形は個別に展開せず、グループ全体で1つのオブジェクトとして扱います。
fn parse_drawing(
    xml: &[u8],
    geometry: &SheetGeometry,
    media: &HashMap<String, String>,
) -> Result<Vec<Drawable>, EngineError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut drawables = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut anchor: Option<Anchor> = None;
    let mut objects_open = 0usize;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let (e, is_empty) = match event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::Text(text) => {
                if let Some(anchor) = anchor.as_mut() {
                    let text = text.unescape()?;
                    apply_marker_text(anchor, &stack, &text);
                }
                buf.clear();
                continue;
            }
            Event::End(_) => {
                if let Some(name) = stack.pop() {
                    if object_kind(&name).is_some() && anchor.is_some() {
                        objects_open = objects_open.saturating_sub(1);
                    }
                    if anchor_kind(&name).is_some() {
                        if let Some(done) = anchor.take() {
                            let index = drawables.len();
                            drawables.extend(done.into_drawable(index, geometry, media));
                        }
                        objects_open = 0;
                    }
                }
                buf.clear();
                continue;
            }
            Event::Eof => break,
            _ => {
                buf.clear();
                continue;
            }
        };

        let local = e.local_name().as_ref().to_vec();

        if anchor.is_none() {
            if let Some(kind) = anchor_kind(&local) {
                anchor = Some(Anchor::new(kind));
            }
        } else if let Some(current) = anchor.as_mut() {
            if let Some(kind) = object_kind(&local) {
                if !is_empty {
                    objects_open += 1;
                }
                if current.object.is_none() {
                    current.object = Some(kind);
                }
            } else if objects_open == 1 || (objects_open == 0 && current.object.is_none()) {
                apply_element(current, &stack, &local, &e)?;
            }
        }

        if !is_empty {
            stack.push(local);
        }
        buf.clear();
    }

    Ok(drawables)
}

/// アンカー直下・先頭オブジェクト内の要素を反映
fn apply_element(
    anchor: &mut Anchor,
    stack: &[Vec<u8>],
    local: &[u8],
    e: &BytesStart<'_>,
) -> Result<(), EngineError> {
    let parent = stack.last().map(Vec::as_slice);
    let grandparent = stack.len().checked_sub(2).map(|i| stack[i].as_slice());
    let parent_is_anchor = parent.map(|p| anchor_kind(p).is_some()).unwrap_or(false);
    let in_line = stack.iter().any(|name| name.as_slice() == b"ln");
    let in_shape_props = stack.iter().any(|name| name.as_slice() == b"spPr");
    let parse_emu = |v: Option<String>| v.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);

    match local {
        b"pos" if parent_is_anchor => {
            anchor.pos = (
                parse_emu(attr_value(e, b"x")?),
                parse_emu(attr_value(e, b"y")?),
            );
        }
        b"ext" if parent_is_anchor => {
            anchor.ext = (
                parse_emu(attr_value(e, b"cx")?),
                parse_emu(attr_value(e, b"cy")?),
            );
        }
        b"cNvPr" if anchor.name.is_none() => {
            anchor.name = attr_value(e, b"name")?;
        }
        b"cNvSpPr" => {
            if let Some(value) = attr_value(e, b"txBox")? {
                anchor.text_box = parse_bool(&value);
            }
        }
        b"blip" => {
            if anchor.embed.is_none() {
                anchor.embed = attr_value(e, b"embed")?;
            }
        }
        b"noFill" if in_shape_props => {
            if in_line {
                anchor.line = Some(Paint::NoFill);
            } else if parent == Some(b"spPr".as_slice()) {
                anchor.fill = Some(Paint::NoFill);
            }
        }
        b"srgbClr" | b"sysClr" | b"schemeClr" if in_shape_props => {
            if parent != Some(b"solidFill".as_slice()) {
                return Ok(());
            }
            let color = match local {
                b"srgbClr" => attr_value(e, b"val")?.as_deref().and_then(hex_color),
                b"sysClr" => attr_value(e, b"lastClr")?.as_deref().and_then(hex_color),
                _ => attr_value(e, b"val")?.as_deref().and_then(scheme_color),
            };
            if let Some(color) = color {
                if grandparent == Some(b"ln".as_slice()) {
                    anchor.line = Some(Paint::Solid(color));
                } else if grandparent == Some(b"spPr".as_slice()) {
                    anchor.fill = Some(Paint::Solid(color));
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// `<xdr:from>`/`<xdr:to>`内のテキストをマーカーに反映
fn apply_marker_text(anchor: &mut Anchor, stack: &[Vec<u8>], text: &str) {
    let n = stack.len();
    if n < 2 {
        return;
    }
    let marker = match stack[n - 2].as_slice() {
        b"from" => &mut anchor.from,
        b"to" => &mut anchor.to,
        _ => return,
    };
    let text = text.trim();
    match stack[n - 1].as_slice() {
        b"col" => marker.col = text.parse().unwrap_or(0),
        b"colOff" => marker.col_off = text.parse().unwrap_or(0),
        b"row" => marker.row = text.parse().unwrap_or(0),
        b"rowOff" => marker.row_off = text.parse().unwrap_or(0),
        _ => {}
    }
}

/// 要素をコピーし、属性を入れ替える
fn rewrite_element(
    e: &BytesStart<'_>,
    drop: &[&[u8]],
    extra: &[(&str, String)],
) -> Result<BytesStart<'static>, EngineError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if !drop.contains(&attr.key.local_name().as_ref()) {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    for (key, value) in extra {
        out.push_attribute((*key, value.as_str()));
    }
    Ok(out)
}

/// `<sheet>`と`<workbookView>`の属性を書き換える（対象外の要素は`None`）
fn rewrite_workbook_element(
    e: &BytesStart<'_>,
    index: &mut usize,
    position: usize,
) -> Result<Option<BytesStart<'static>>, EngineError> {
    match e.local_name().as_ref() {
        b"sheet" => {
            let extra = if *index == position {
                Vec::new()
            } else {
                vec![("state", "hidden".to_string())]
            };
            *index += 1;
            rewrite_element(e, &[b"state"], &extra).map(Some)
        }
        b"workbookView" => rewrite_element(
            e,
            &[b"activeTab", b"firstSheet"],
            &[("activeTab", position.to_string())],
        )
        .map(Some),
        _ => Ok(None),
    }
}

/// ワークブックXMLを書き換え、`position`番目のシートだけを表示状態にする
fn show_single_sheet(xml: &[u8], position: usize) -> Result<Vec<u8>, EngineError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut index = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(e) => match rewrite_workbook_element(&e, &mut index, position)? {
                Some(changed) => writer.write_event(Event::Start(changed))?,
                None => writer.write_event(Event::Start(e))?,
            },
            Event::Empty(e) => match rewrite_workbook_element(&e, &mut index, position)? {
                Some(changed) => writer.write_event(Event::Empty(changed))?,
                None => writer.write_event(Event::Empty(e))?,
            },
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}
