//! # 遮罩归一化模块
//!
//! ## 设计思路
//!
//! 画笔颜色只是给用户看的；推理后端只认严格黑白的遮罩。
//! 这里把任意颜色、带抗锯齿的导出结果二值化，隔离绘制体验与传输格式。
//!
//! ## 实现思路
//!
//! - 画布导出：alpha > 0 → 白 `(255,255,255,255)`，否则 → 黑 `(0,0,0,255)`。
//! - 手动上传的遮罩：含透明像素时同样按 alpha 判定；完全不透明时按亮度阈值判定，
//!   保证手绘的黑白 PNG 保持原意。
//! - 逐像素、与顺序无关、幂等，输出尺寸与输入一致。

use image::{Rgba, RgbaImage};

use super::source::{BinaryMaskImage, RawMaskImage, MASK_BLACK, MASK_WHITE};

/// 亮度阈值：luma ≥ 该值视为选中。
pub const LUMA_THRESHOLD: u8 = 128;

/// 二值化规则。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskRule {
    /// alpha > 0 视为选中。
    Alpha,
    /// 亮度 ≥ 阈值视为选中。
    Luma { threshold: u8 },
}

impl MaskRule {
    /// 为上传的遮罩选择规则：有透明像素用 alpha，否则用亮度。
    pub fn detect(image: &RgbaImage) -> Self {
        if image.pixels().any(|p| p[3] < 255) {
            Self::Alpha
        } else {
            Self::Luma {
                threshold: LUMA_THRESHOLD,
            }
        }
    }

    fn is_selected(self, pixel: &Rgba<u8>) -> bool {
        match self {
            Self::Alpha => pixel[3] > 0,
            Self::Luma { threshold } => luma(pixel) >= threshold,
        }
    }
}

/// ITU-R BT.601 整数亮度。
fn luma(pixel: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// 按指定规则逐像素二值化。
pub fn binarize(image: &RgbaImage, rule: MaskRule) -> BinaryMaskImage {
    let (width, height) = image.dimensions();
    let mut out = RgbaImage::new(width, height);

    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = if rule.is_selected(src) { MASK_WHITE } else { MASK_BLACK };
    }

    BinaryMaskImage::from_binary_pixels(out)
}

/// 归一化画布导出的原始遮罩。
pub fn normalize_mask(raw: &RawMaskImage) -> BinaryMaskImage {
    let binary = binarize(raw.as_rgba(), MaskRule::Alpha);
    log::debug!(
        "⚫ 遮罩二值化完成 - 尺寸: {}x{} 选中像素: {}",
        binary.dimensions().0,
        binary.dimensions().1,
        binary.white_pixel_count()
    );
    binary
}

/// 归一化手动上传的遮罩（自动选择规则）。
pub fn normalize_uploaded_mask(image: &RgbaImage) -> BinaryMaskImage {
    let rule = MaskRule::detect(image);
    log::debug!("⚫ 上传遮罩二值化规则：{:?}", rule);
    binarize(image, rule)
}

/// 对已二值化的遮罩再次归一化（如缩放之后）。
///
/// 二值遮罩的黑白像素都完全不透明，只能按亮度区分，因此固定使用亮度规则。
pub fn renormalize(mask: &BinaryMaskImage) -> BinaryMaskImage {
    binarize(
        mask.as_rgba(),
        MaskRule::Luma {
            threshold: LUMA_THRESHOLD,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_rule_ignores_color() {
        let mut raw = RgbaImage::new(3, 1);
        raw.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        raw.put_pixel(1, 0, Rgba([0, 0, 0, 1]));
        raw.put_pixel(2, 0, Rgba([255, 0, 0, 128]));

        let binary = normalize_mask(&RawMaskImage::new(raw));

        assert_eq!(*binary.as_rgba().get_pixel(0, 0), MASK_BLACK);
        assert_eq!(*binary.as_rgba().get_pixel(1, 0), MASK_WHITE);
        assert_eq!(*binary.as_rgba().get_pixel(2, 0), MASK_WHITE);
    }

    #[test]
    fn transparent_white_pixel_stays_black() {
        let raw = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 0]));

        assert!(normalize_mask(&RawMaskImage::new(raw)).is_all_black());
    }

    #[test]
    fn opaque_upload_uses_luma_threshold() {
        let mut upload = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        upload.put_pixel(1, 0, Rgba([200, 200, 200, 255]));

        let binary = normalize_uploaded_mask(&upload);

        assert_eq!(*binary.as_rgba().get_pixel(0, 0), MASK_BLACK);
        assert_eq!(*binary.as_rgba().get_pixel(1, 0), MASK_WHITE);
    }

    #[test]
    fn transparent_upload_uses_alpha_rule() {
        let mut upload = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        upload.put_pixel(1, 0, Rgba([10, 10, 10, 255]));

        assert_eq!(MaskRule::detect(&upload), MaskRule::Alpha);
        let binary = normalize_uploaded_mask(&upload);

        assert_eq!(*binary.as_rgba().get_pixel(0, 0), MASK_BLACK);
        assert_eq!(*binary.as_rgba().get_pixel(1, 0), MASK_WHITE);
    }

    #[test]
    fn renormalize_is_identity() {
        let mut raw = RgbaImage::new(4, 4);
        raw.put_pixel(1, 2, Rgba([9, 9, 9, 9]));
        let once = normalize_mask(&RawMaskImage::new(raw));

        assert_eq!(once.white_pixel_count(), 1);
        assert_eq!(renormalize(&once), once);
    }

    #[test]
    fn renormalize_keeps_black_pixels_black() {
        let binary = normalize_mask(&RawMaskImage::new(RgbaImage::new(3, 3)));

        assert!(renormalize(&binary).is_all_black());
    }
}
