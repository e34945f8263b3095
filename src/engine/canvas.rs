//! Canvas Module
//!
//! 描画オブジェクトのラスタライズと、一時コンテナ（貼り付け先のビットマップ）を扱うモジュール。

use std::path::Path;

use image::{imageops, ImageFormat, Pixel, Rgba, RgbaImage};

use crate::engine::{Bounds, Drawable, DrawableKind, Picture};
use crate::error::EngineError;
use crate::security::SecurityConfig;

const BACKGROUND: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const PLACEHOLDER_FILL: [u8; 4] = [0xF2, 0xF2, 0xF2, 0xFF];
const PLACEHOLDER_LINE: [u8; 4] = [0xA6, 0xA6, 0xA6, 0xFF];

/// ピクセル数に換算（最低1）
fn to_pixels(length: f64) -> u32 {
    length.ceil().max(1.0).min(f64::from(u32::MAX)) as u32
}

/// 一時コンテナ
///
/// 白い背景のビットマップで、貼り付けた画像が収まらない場合は拡張されます。
#[derive(Debug, Clone)]
pub(crate) struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(bounds: Bounds, limits: &SecurityConfig) -> Result<Self, EngineError> {
        let (width, height) = (to_pixels(bounds.width), to_pixels(bounds.height));
        limits.check_canvas(width, height)?;
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, Rgba(BACKGROUND)),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 左上に画像を貼り付ける
    pub fn paste(&mut self, picture: &Picture) {
        let (width, height) = self.image.dimensions();
        let (pic_width, pic_height) = picture.image.dimensions();

        if pic_width > width || pic_height > height {
            let mut grown = RgbaImage::from_pixel(
                width.max(pic_width),
                height.max(pic_height),
                Rgba(BACKGROUND),
            );
            imageops::replace(&mut grown, &self.image, 0, 0);
            self.image = grown;
        }

        imageops::overlay(&mut self.image, &picture.image, 0, 0);
    }

    /// PNGとして書き出す
    pub fn save_png(&self, path: &Path) -> Result<(), EngineError> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// 描画オブジェクトを重なり順に描画し、全体を囲む1枚の画像にする
///
/// 画像が読み込めない場合は警告を出して枠だけを描画します。
pub(crate) fn compose<F>(
    drawables: &[Drawable],
    limits: &SecurityConfig,
    mut load_media: F,
) -> Result<Picture, EngineError>
where
    F: FnMut(&str) -> Result<Vec<u8>, EngineError>,
{
    let area = drawables
        .iter()
        .map(|d| d.bounds)
        .reduce(|acc, b| acc.union(&b))
        .ok_or_else(|| EngineError::Unsupported("nothing to copy".to_string()))?;

    let (width, height) = (to_pixels(area.width), to_pixels(area.height));
    limits.check_canvas(width, height)?;
    let mut image = RgbaImage::new(width, height);

    for drawable in drawables {
        let rect = Rect::relative(&drawable.bounds, &area);
        if rect.width == 0 || rect.height == 0 {
            continue;
        }

        match drawable.kind {
            DrawableKind::Picture => {
                match load_picture(drawable, &rect, &mut load_media) {
                    Ok(scaled) => imageops::overlay(&mut image, &scaled, rect.x, rect.y),
                    Err(e) => {
                        log::warn!("Cannot render picture '{}': {}", drawable.name, e);
                        fill_rect(&mut image, &rect, PLACEHOLDER_FILL);
                        stroke_rect(&mut image, &rect, PLACEHOLDER_LINE);
                    }
                }
                if let Some(line) = drawable.line {
                    stroke_rect(&mut image, &rect, line);
                }
            }
            DrawableKind::Connector => {
                if let Some(line) = drawable.line {
                    draw_line(
                        &mut image,
                        (rect.x, rect.y),
                        (rect.right() - 1, rect.bottom() - 1),
                        line,
                    );
                }
            }
            DrawableKind::Shape | DrawableKind::Chart | DrawableKind::Group => {
                if let Some(fill) = drawable.fill {
                    fill_rect(&mut image, &rect, fill);
                }
                if let Some(line) = drawable.line {
                    stroke_rect(&mut image, &rect, line);
                }
            }
        }
    }

    Ok(Picture { image })
}

fn load_picture<F>(drawable: &Drawable, rect: &Rect, load_media: &mut F) -> Result<RgbaImage, EngineError>
where
    F: FnMut(&str) -> Result<Vec<u8>, EngineError>,
{
    let media = drawable
        .media
        .as_deref()
        .ok_or_else(|| EngineError::Unsupported("picture without image data".to_string()))?;
    let bytes = load_media(media)?;
    let decoded = image::load_from_memory(&bytes)?.to_rgba8();
    Ok(imageops::resize(
        &decoded,
        rect.width,
        rect.height,
        imageops::FilterType::Triangle,
    ))
}

/// 画像内の整数座標の矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
}

impl Rect {
    fn relative(bounds: &Bounds, origin: &Bounds) -> Self {
        let x = (bounds.left - origin.left).round();
        let y = (bounds.top - origin.top).round();
        let right = (bounds.right() - origin.left).round();
        let bottom = (bounds.bottom() - origin.top).round();
        Self {
            x: x as i64,
            y: y as i64,
            width: (right - x).max(0.0) as u32,
            height: (bottom - y).max(0.0) as u32,
        }
    }

    fn right(&self) -> i64 {
        self.x + i64::from(self.width)
    }

    fn bottom(&self) -> i64 {
        self.y + i64::from(self.height)
    }
}

fn blend_pixel(image: &mut RgbaImage, x: i64, y: i64, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    if x < image.width() && y < image.height() {
        image.get_pixel_mut(x, y).blend(&Rgba(color));
    }
}

fn fill_rect(image: &mut RgbaImage, rect: &Rect, color: [u8; 4]) {
    let x_end = rect.right().min(i64::from(image.width()));
    let y_end = rect.bottom().min(i64::from(image.height()));
    for y in rect.y.max(0)..y_end {
        for x in rect.x.max(0)..x_end {
            blend_pixel(image, x, y, color);
        }
    }
}

fn stroke_rect(image: &mut RgbaImage, rect: &Rect, color: [u8; 4]) {
    let (left, top) = (rect.x, rect.y);
    let (right, bottom) = (rect.right() - 1, rect.bottom() - 1);
    for x in left..=right {
        blend_pixel(image, x, top, color);
        if bottom != top {
            blend_pixel(image, x, bottom, color);
        }
    }
    for y in (top + 1)..bottom {
        blend_pixel(image, left, y, color);
        if right != left {
            blend_pixel(image, right, y, color);
        }
    }
}

/// Bresenhamの直線描画
fn draw_line(image: &mut RgbaImage, from: (i64, i64), to: (i64, i64), color: [u8; 4]) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        blend_pixel(image, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RED: [u8; 4] = [0xFF, 0x00, 0x00, 0xFF];
    const BLUE: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn shape(name: &str, bounds: Bounds, fill: [u8; 4]) -> Drawable {
        let mut drawable = Drawable::new(name, DrawableKind::Shape, bounds);
        drawable.fill = Some(fill);
        drawable
    }

    fn no_media(_: &str) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Unsupported("no media".to_string()))
    }

    #[test]
    fn test_compose_uses_union_of_bounds() {
        let drawables = vec![
            shape("a", Bounds::new(10.0, 10.0, 20.0, 10.0), RED),
            shape("b", Bounds::new(25.0, 15.0, 20.0, 20.0), BLUE),
        ];
        let picture = compose(&drawables, &SecurityConfig::default(), no_media).unwrap();
        assert_eq!(picture.image.dimensions(), (35, 25));
    }

    #[test]
    fn test_compose_preserves_stacking_order() {
        let drawables = vec![
            shape("back", Bounds::new(0.0, 0.0, 10.0, 10.0), RED),
            shape("front", Bounds::new(5.0, 5.0, 10.0, 10.0), BLUE),
        ];
        let picture = compose(&drawables, &SecurityConfig::default(), no_media).unwrap();
        assert_eq!(picture.image.get_pixel(2, 2).0, RED);
        assert_eq!(picture.image.get_pixel(7, 7).0, BLUE);
        // 何も描画されていない部分は透明
        assert_eq!(picture.image.get_pixel(14, 0).0[3], 0);
    }

    #[test]
    fn test_compose_scales_pictures() {
        let mut picture = Drawable::new(
            "Picture 1",
            DrawableKind::Picture,
            Bounds::new(0.0, 0.0, 8.0, 6.0),
        );
        picture.media = Some("xl/media/image1.png".to_string());
        let bytes = png_bytes(2, 2, BLUE);

        let result = compose(&[picture], &SecurityConfig::default(), |path| {
            assert_eq!(path, "xl/media/image1.png");
            Ok(bytes.clone())
        })
        .unwrap();

        assert_eq!(result.image.dimensions(), (8, 6));
        assert_eq!(result.image.get_pixel(4, 3).0, BLUE);
    }

    #[test]
    fn test_unreadable_picture_becomes_placeholder() {
        let mut picture = Drawable::new(
            "Broken",
            DrawableKind::Picture,
            Bounds::new(0.0, 0.0, 4.0, 4.0),
        );
        picture.media = Some("xl/media/image1.emf".to_string());

        let result = compose(&[picture], &SecurityConfig::default(), |_| {
            Ok(b"not an image".to_vec())
        })
        .unwrap();
        assert_eq!(result.image.get_pixel(1, 1).0, PLACEHOLDER_FILL);
    }

    #[test]
    fn test_compose_without_drawables_fails() {
        assert!(compose(&[], &SecurityConfig::default(), no_media).is_err());
    }

    #[test]
    fn test_compose_respects_canvas_limit() {
        let limits = SecurityConfig {
            max_canvas_pixels: 10,
            ..SecurityConfig::default()
        };
        let drawables = vec![shape("big", Bounds::new(0.0, 0.0, 100.0, 100.0), RED)];
        assert!(matches!(
            compose(&drawables, &limits, no_media),
            Err(EngineError::SecurityViolation(_))
        ));
    }

    #[test]
    fn test_connector_draws_diagonal() {
        let mut line = Drawable::new(
            "Connector",
            DrawableKind::Connector,
            Bounds::new(0.0, 0.0, 5.0, 5.0),
        );
        line.line = Some(RED);
        let picture = compose(&[line], &SecurityConfig::default(), no_media).unwrap();
        for i in 0..5 {
            assert_eq!(picture.image.get_pixel(i, i).0, RED);
        }
        assert_eq!(picture.image.get_pixel(4, 0).0[3], 0);
    }

    #[test]
    fn test_canvas_grows_to_fit_picture() {
        let mut canvas =
            Canvas::new(Bounds::new(0.0, 0.0, 4.0, 4.0), &SecurityConfig::default()).unwrap();
        let picture = Picture {
            image: RgbaImage::from_pixel(6, 2, Rgba(RED)),
        };
        canvas.paste(&picture);

        assert_eq!(canvas.dimensions(), (6, 4));
        assert_eq!(canvas.image.get_pixel(5, 1).0, RED);
        assert_eq!(canvas.image.get_pixel(5, 3).0, BACKGROUND);
    }

    #[test]
    fn test_canvas_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let canvas =
            Canvas::new(Bounds::new(0.0, 0.0, 3.0, 2.0), &SecurityConfig::default()).unwrap();
        canvas.save_png(&path).unwrap();

        let loaded = image::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (3, 2));
    }
}
