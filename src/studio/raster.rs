//! # 栅格能力模块
//!
//! ## 设计思路
//!
//! 浏览器里由 canvas / `<img>` 提供的解码、绘制、编码能力，在这里抽象为 `RasterBackend`：
//! `load(bytes)`、`rasterize(strokes, w, h)`、`encode(raster, format)`。
//! 任何运行环境只要提供等价实现即可复用上层流水线。
//!
//! ## 实现思路
//!
//! 默认实现 `ImageRasterBackend` 基于 `image` crate：
//! 1. 加载时先猜测格式、读取 header 尺寸并按像素上限快速拒绝，再完整解码
//! 2. 绘制时沿线段按固定间距盖圆形笔触（dab），边缘保留 1 像素抗锯齿
//! 3. 编码支持 PNG / JPEG（可设质量）/ WebP

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbaImage};

use super::source::{BrushMode, MaskStroke};
use super::StudioError;

/// 笔触间距占半径的比例。
const DAB_SPACING: f32 = 0.25;

/// 编码目标格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Png,
    Jpeg { quality: u8 },
    WebP,
}

impl EncodeFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
            Self::WebP => "webp",
        }
    }
}

/// 解码结果：原始格式 + RGBA 像素。
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub pixels: RgbaImage,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// 解码 / 绘制 / 编码能力接口。
pub trait RasterBackend: Send + Sync {
    /// 将图片字节解码为 RGBA 栅格。
    fn load(&self, bytes: &[u8]) -> Result<DecodedImage, StudioError>;

    /// 将笔画绘制到 `width x height` 的透明画布上。
    fn rasterize(&self, strokes: &[MaskStroke], width: u32, height: u32) -> Result<RgbaImage, StudioError>;

    /// 将栅格编码为指定格式的字节。
    fn encode(&self, raster: &RgbaImage, format: EncodeFormat) -> Result<Vec<u8>, StudioError>;
}

/// 基于 `image` crate 的默认实现。
#[derive(Debug, Clone)]
pub struct ImageRasterBackend {
    max_decoded_pixels: u64,
}

impl ImageRasterBackend {
    pub fn new(max_decoded_pixels: u64) -> Self {
        Self { max_decoded_pixels }
    }

    /// 仅通过内存中的图片头信息读取宽高。
    ///
    /// 用于在完整解码前做像素限制检查。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), StudioError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| StudioError::Decode(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| StudioError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(&self, width: u32, height: u32) -> Result<(), StudioError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| StudioError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels == 0 {
            return Err(StudioError::Decode("图片尺寸为 0".to_string()));
        }

        if pixels > self.max_decoded_pixels {
            return Err(StudioError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.max_decoded_pixels
            )));
        }

        Ok(())
    }
}

impl RasterBackend for ImageRasterBackend {
    fn load(&self, bytes: &[u8]) -> Result<DecodedImage, StudioError> {
        if bytes.is_empty() {
            return Err(StudioError::Decode("图片内容为空".to_string()));
        }

        let format = image::guess_format(bytes)
            .map_err(|e| StudioError::Decode(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(bytes)?;
        self.validate_pixel_limits(header_width, header_height)?;

        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| StudioError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        self.validate_pixel_limits(width, height)?;

        log::debug!("🖼️ 图片解码成功 - 格式: {:?} 尺寸: {}x{}", format, width, height);

        Ok(DecodedImage {
            format,
            pixels: decoded.to_rgba8(),
        })
    }

    fn rasterize(&self, strokes: &[MaskStroke], width: u32, height: u32) -> Result<RgbaImage, StudioError> {
        self.validate_pixel_limits(width, height)?;

        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        for stroke in strokes {
            stamp_stroke(&mut canvas, stroke);
        }

        Ok(canvas)
    }

    fn encode(&self, raster: &RgbaImage, format: EncodeFormat) -> Result<Vec<u8>, StudioError> {
        let mut cursor = Cursor::new(Vec::new());

        match format {
            EncodeFormat::Png => DynamicImage::ImageRgba8(raster.clone())
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|e| StudioError::Encode(format!("PNG 编码失败：{}", e)))?,
            EncodeFormat::WebP => DynamicImage::ImageRgba8(raster.clone())
                .write_to(&mut cursor, ImageFormat::WebP)
                .map_err(|e| StudioError::Encode(format!("WebP 编码失败：{}", e)))?,
            EncodeFormat::Jpeg { quality } => {
                let rgb = DynamicImage::ImageRgba8(raster.clone()).to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100));
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| StudioError::Encode(format!("JPEG 编码失败：{}", e)))?;
            }
        }

        Ok(cursor.into_inner())
    }
}

/// 沿笔画路径按间距盖 dab。
fn stamp_stroke(canvas: &mut RgbaImage, stroke: &MaskStroke) {
    let radius = stroke.radius.max(1) as f32;
    let spacing = (radius * DAB_SPACING).max(1.0);

    let mut points = stroke
        .points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite());

    let Some(first) = points.next() else {
        return;
    };

    stamp_dab(canvas, first.x, first.y, radius, stroke.mode);

    let mut prev = *first;
    for point in points {
        let dx = point.x - prev.x;
        let dy = point.y - prev.y;
        let length = (dx * dx + dy * dy).sqrt();
        let steps = (length / spacing).ceil() as u32;

        for step in 1..=steps {
            let t = step as f32 / steps as f32;
            stamp_dab(canvas, prev.x + dx * t, prev.y + dy * t, radius, stroke.mode);
        }

        prev = *point;
    }
}

/// 盖一个圆形 dab，边缘 1 像素线性衰减。
fn stamp_dab(canvas: &mut RgbaImage, cx: f32, cy: f32, radius: f32, mode: BrushMode) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let min_x = (cx - radius - 1.0).floor().max(0.0) as i64;
    let min_y = (cy - radius - 1.0).floor().max(0.0) as i64;
    let max_x = ((cx + radius + 1.0).ceil() as i64).min(width as i64 - 1);
    let max_y = ((cy + radius + 1.0).ceil() as i64).min(height as i64 - 1);

    if min_x > max_x || min_y > max_y {
        return;
    }

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let dx = px as f32 + 0.5 - cx;
            let dy = py as f32 + 0.5 - cy;
            let coverage = (radius + 0.5 - (dx * dx + dy * dy).sqrt()).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }

            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            match mode {
                BrushMode::Paint { color } => {
                    let alpha = (color[3] as f32 * coverage).round() as u8;
                    if alpha > pixel[3] {
                        *pixel = Rgba([color[0], color[1], color[2], alpha]);
                    }
                }
                BrushMode::Erase => {
                    let remaining = (pixel[3] as f32 * (1.0 - coverage)).round() as u8;
                    *pixel = if remaining == 0 {
                        Rgba([0, 0, 0, 0])
                    } else {
                        Rgba([pixel[0], pixel[1], pixel[2], remaining])
                    };
                }
            }
        }
    }
}
