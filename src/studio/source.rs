//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `SourceImage` 表示用户选中的原图（不可变字节 + 尺寸）
//! - `MaskStroke` 表示画布上的一笔
//! - `RawMaskImage` 表示画布导出的彩色带透明度遮罩
//! - `BinaryMaskImage` 表示严格黑白的遮罩（只能由归一化器产出）
//! - `ResultImage` 表示服务端返回的图片字节

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// 遮罩中“未选中”像素。
pub const MASK_BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
/// 遮罩中“选中”像素。
pub const MASK_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 画布显示尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    /// 在不放大的前提下，按比例缩放到 `max_width x max_height` 以内。
    ///
    /// # 示例
    /// ```rust
    /// use image_studio::studio::DisplaySize;
    ///
    /// let size = DisplaySize::fit_within(4000, 2000, 1024, 1024);
    /// assert_eq!((size.width, size.height), (1024, 512));
    /// ```
    pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> Self {
        if width <= max_width && height <= max_height {
            return Self { width, height };
        }

        let width_scale = max_width as f64 / width as f64;
        let height_scale = max_height as f64 / height as f64;

        if width_scale <= height_scale {
            Self {
                width: max_width,
                height: ((height as f64 * width_scale).round() as u32).clamp(1, max_height),
            }
        } else {
            Self {
                width: ((width as f64 * height_scale).round() as u32).clamp(1, max_width),
                height: max_height,
            }
        }
    }
}

/// 用户选中的原图。
///
/// 选中后字节不可变；重新选择会整体替换。
#[derive(Debug, Clone)]
pub struct SourceImage {
    bytes: Bytes,
    format: ImageFormat,
    width: u32,
    height: u32,
    display: DisplaySize,
}

impl SourceImage {
    pub(crate) fn new(bytes: Bytes, format: ImageFormat, width: u32, height: u32, display: DisplaySize) -> Self {
        Self {
            bytes,
            format,
            width,
            height,
            display,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// 原始像素尺寸。
    pub fn natural_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 画布显示尺寸。
    pub fn display_size(&self) -> DisplaySize {
        self.display
    }

    /// 显示尺寸是否小于原始尺寸。
    pub fn is_scaled(&self) -> bool {
        self.display.width != self.width || self.display.height != self.height
    }
}

/// 画布坐标系中的一个点。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}

fn default_brush_color() -> [u8; 4] {
    [255, 255, 255, 255]
}

/// 画笔模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BrushMode {
    /// 以指定 RGBA 颜色涂抹。
    Paint {
        #[serde(default = "default_brush_color")]
        color: [u8; 4],
    },
    /// 橡皮擦：清除已涂抹像素的透明度。
    Erase,
}

impl Default for BrushMode {
    fn default() -> Self {
        Self::Paint {
            color: default_brush_color(),
        }
    }
}

/// 一笔：有序点序列 + 半径 + 模式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStroke {
    pub radius: u32,
    #[serde(flatten)]
    pub mode: BrushMode,
    pub points: Vec<StrokePoint>,
}

/// 画布导出的原始遮罩（彩色 + 透明度）。
#[derive(Debug, Clone, PartialEq)]
pub struct RawMaskImage(RgbaImage);

impl RawMaskImage {
    pub fn new(image: RgbaImage) -> Self {
        Self(image)
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }
}

/// 严格黑白遮罩。
///
/// 每个像素只可能是 `MASK_BLACK` 或 `MASK_WHITE`。
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMaskImage(RgbaImage);

impl BinaryMaskImage {
    /// 仅供归一化器与对齐逻辑使用，调用方保证像素已二值化。
    pub(crate) fn from_binary_pixels(image: RgbaImage) -> Self {
        Self(image)
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn into_inner(self) -> RgbaImage {
        self.0
    }

    /// 选中（白色）像素数量。
    pub fn white_pixel_count(&self) -> usize {
        self.0.pixels().filter(|p| **p == MASK_WHITE).count()
    }

    pub fn is_all_black(&self) -> bool {
        self.0.pixels().all(|p| *p == MASK_BLACK)
    }

    pub fn is_all_white(&self) -> bool {
        self.0.pixels().all(|p| *p == MASK_WHITE)
    }
}

/// 服务端返回的结果图片。
#[derive(Debug, Clone)]
pub struct ResultImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_within_never_upscales() {
        let size = DisplaySize::fit_within(300, 200, 1024, 1024);
        assert_eq!(size, DisplaySize { width: 300, height: 200 });
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        let portrait = DisplaySize::fit_within(1000, 3000, 512, 512);
        assert_eq!(portrait, DisplaySize { width: 171, height: 512 });

        let tiny = DisplaySize::fit_within(10_000, 1, 100, 100);
        assert_eq!(tiny, DisplaySize { width: 100, height: 1 });
    }

    #[test]
    fn stroke_json_uses_flat_mode_tag() {
        let json = r#"[
            { "radius": 20, "mode": "paint", "color": [255, 0, 0, 255], "points": [{ "x": 1.0, "y": 2.0 }] },
            { "radius": 10, "mode": "erase", "points": [] },
            { "radius": 12, "mode": "paint", "points": [] }
        ]"#;

        let strokes: Vec<MaskStroke> = serde_json::from_str(json).expect("stroke json should parse");

        assert_eq!(strokes[0].mode, BrushMode::Paint { color: [255, 0, 0, 255] });
        assert_eq!(strokes[1].mode, BrushMode::Erase);
        assert_eq!(strokes[2].mode, BrushMode::default());
        assert_eq!(strokes[0].points[0], StrokePoint { x: 1.0, y: 2.0 });
    }
}
