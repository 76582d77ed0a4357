//! # 上传负载构建模块
//!
//! ## 设计思路
//!
//! 把原图、二值遮罩、提示词与附加字段打包为一次 multipart 提交，
//! 并在“尽可能早”的阶段完成全部校验：缺字段、尺寸不一致、单个分片超限都在这里失败，
//! 不产生任何网络请求。
//!
//! ## 实现思路
//!
//! 1. 按功能校验提示词（擦除允许为空并回退到默认填充指令）
//! 2. 编辑类功能要求原图与遮罩同时存在
//! 3. 原图格式规整：擦除统一转为最高质量 JPEG；其余功能保留 PNG/JPEG/WebP 原字节，其它格式转 PNG
//! 4. 遮罩对齐到原图原始尺寸（最近邻缩放后再次二值化），编码为 PNG
//! 5. 分片体积校验（默认 4 MiB）
//!
//! 负载以字节形式保存，每次发送时重新生成 `multipart::Form`，便于重试。

use bytes::Bytes;
use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{ImageBuffer, ImageFormat, Rgba};
use reqwest::multipart::{Form, Part};

use super::config::{AspectRatio, Feature};
use super::normalizer::renormalize;
use super::raster::{EncodeFormat, RasterBackend};
use super::source::{BinaryMaskImage, SourceImage};
use super::{StudioConfig, StudioError};

/// 原图转 JPEG 时使用的质量（擦除功能要求最高质量）。
const JPEG_QUALITY: u8 = 100;

/// multipart 中的一个二进制分片。
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Bytes,
}

impl FilePart {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn to_part(&self) -> Result<Part, StudioError> {
        Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name.clone())
            .mime_str(self.mime_type)
            .map_err(|e| StudioError::Request(format!("无法设置分片类型：{}", e)))
    }
}

/// 已打包、可重复发送的上传负载。
#[derive(Debug, Clone)]
pub struct UploadPayload {
    feature: Feature,
    image: Option<FilePart>,
    mask: Option<FilePart>,
    image_size: Option<(u32, u32)>,
    mask_size: Option<(u32, u32)>,
    prompt: String,
    extra_fields: Vec<(&'static str, String)>,
}

impl UploadPayload {
    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn image(&self) -> Option<&FilePart> {
        self.image.as_ref()
    }

    pub fn mask(&self) -> Option<&FilePart> {
        self.mask.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn extra_fields(&self) -> &[(&'static str, String)] {
        &self.extra_fields
    }

    /// 原图与遮罩的像素尺寸（编辑类功能）。
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    /// 二进制分片总字节数。
    pub fn binary_len(&self) -> u64 {
        self.image.as_ref().map_or(0, FilePart::len) + self.mask.as_ref().map_or(0, FilePart::len)
    }

    /// 必填字段与体积校验。构建时与提交前各执行一次。
    pub fn validate(&self, max_part_bytes: u64) -> Result<(), StudioError> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::Validation("提示词不能为空".to_string()));
        }

        if self.feature.requires_image() {
            let image = self
                .image
                .as_ref()
                .filter(|part| !part.is_empty())
                .ok_or_else(|| StudioError::Validation("请先选择图片".to_string()))?;
            let mask = self
                .mask
                .as_ref()
                .filter(|part| !part.is_empty())
                .ok_or_else(|| StudioError::Validation("缺少遮罩".to_string()))?;

            if self.image_size != self.mask_size {
                return Err(StudioError::Validation(format!(
                    "遮罩尺寸 {:?} 与图片尺寸 {:?} 不一致",
                    self.mask_size, self.image_size
                )));
            }

            for (part, name) in [(image, "image"), (mask, "mask")] {
                if part.len() > max_part_bytes {
                    return Err(StudioError::PayloadTooLarge {
                        part: name,
                        size: part.len(),
                        limit: max_part_bytes,
                    });
                }
            }
        }

        Ok(())
    }

    /// 生成一次性的 multipart 表单。
    pub fn to_form(&self) -> Result<Form, StudioError> {
        let mut form = Form::new();

        if let Some(image) = &self.image {
            form = form.part("image", image.to_part()?);
        }
        if let Some(mask) = &self.mask {
            form = form.part("mask", mask.to_part()?);
        }

        form = form.text("prompt", self.prompt.clone());
        for (name, value) in &self.extra_fields {
            form = form.text(*name, value.clone());
        }

        Ok(form)
    }
}

/// 构建入参。
#[derive(Debug, Clone, Copy)]
pub struct PayloadInput<'a> {
    pub feature: Feature,
    pub image: Option<&'a SourceImage>,
    pub mask: Option<&'a BinaryMaskImage>,
    pub prompt: &'a str,
    pub aspect_ratio: Option<AspectRatio>,
}

/// 上传负载构建器。
pub struct UploadPayloadBuilder<'a> {
    config: &'a StudioConfig,
    backend: &'a dyn RasterBackend,
}

impl<'a> UploadPayloadBuilder<'a> {
    pub fn new(config: &'a StudioConfig, backend: &'a dyn RasterBackend) -> Self {
        Self { config, backend }
    }

    /// 校验并打包。任何失败都发生在网络请求之前。
    pub fn build(&self, input: PayloadInput<'_>) -> Result<UploadPayload, StudioError> {
        let prompt = self.resolve_prompt(input.feature, input.prompt)?;

        let payload = if input.feature.requires_image() {
            let source = input
                .image
                .ok_or_else(|| StudioError::Validation("请先选择图片".to_string()))?;
            let mask = input
                .mask
                .ok_or_else(|| StudioError::Validation("缺少遮罩".to_string()))?;

            let image_part = self.encode_source_image(input.feature, source)?;
            let (width, height) = source.natural_size();
            let aligned = self.align_mask(mask, width, height)?;
            let mask_bytes = self.backend.encode(aligned.as_rgba(), EncodeFormat::Png)?;

            UploadPayload {
                feature: input.feature,
                image: Some(image_part),
                mask: Some(FilePart {
                    file_name: "mask.png".to_string(),
                    mime_type: EncodeFormat::Png.mime_type(),
                    bytes: Bytes::from(mask_bytes),
                }),
                image_size: Some((width, height)),
                mask_size: Some(aligned.dimensions()),
                prompt,
                extra_fields: Vec::new(),
            }
        } else {
            let ratio = input.aspect_ratio.unwrap_or_default();
            UploadPayload {
                feature: input.feature,
                image: None,
                mask: None,
                image_size: None,
                mask_size: None,
                prompt,
                extra_fields: vec![("aspect_ratio", ratio.as_str().to_string())],
            }
        };

        payload.validate(self.config.max_part_bytes)?;

        log::info!(
            "📦 负载构建完成 - 功能: {} 二进制: {} bytes 尺寸: {:?}",
            payload.feature.as_str(),
            payload.binary_len(),
            payload.dimensions()
        );

        Ok(payload)
    }

    fn resolve_prompt(&self, feature: Feature, prompt: &str) -> Result<String, StudioError> {
        let trimmed = prompt.trim();
        if !trimmed.is_empty() {
            return Ok(prompt.to_string());
        }

        match feature {
            Feature::Erase => Ok(self.config.erase_default_prompt.clone()),
            Feature::Generate => Err(StudioError::Validation("请输入提示词".to_string())),
            Feature::Inpaint | Feature::InpaintUpload => {
                Err(StudioError::Validation("请上传图片并输入提示词".to_string()))
            }
        }
    }

    /// 原图格式规整。
    fn encode_source_image(&self, feature: Feature, source: &SourceImage) -> Result<FilePart, StudioError> {
        let passthrough = match (feature, source.format()) {
            (Feature::Erase, _) => None,
            (_, ImageFormat::Png) => Some(EncodeFormat::Png),
            (_, ImageFormat::Jpeg) => Some(EncodeFormat::Jpeg { quality: JPEG_QUALITY }),
            (_, ImageFormat::WebP) => Some(EncodeFormat::WebP),
            _ => None,
        };

        if let Some(format) = passthrough {
            return Ok(FilePart {
                file_name: format!("image.{}", format.extension()),
                mime_type: format.mime_type(),
                bytes: source.bytes().clone(),
            });
        }

        let target = match feature {
            Feature::Erase => EncodeFormat::Jpeg { quality: JPEG_QUALITY },
            _ => EncodeFormat::Png,
        };

        let decoded = self.backend.load(source.bytes())?;
        let bytes = self.backend.encode(&decoded.pixels, target)?;

        log::debug!(
            "🔁 原图重新编码 - {:?} -> {} ({} bytes)",
            source.format(),
            target.mime_type(),
            bytes.len()
        );

        Ok(FilePart {
            file_name: format!("image.{}", target.extension()),
            mime_type: target.mime_type(),
            bytes: Bytes::from(bytes),
        })
    }

    /// 将遮罩缩放到原图尺寸，保持严格二值。
    pub(crate) fn align_mask(
        &self,
        mask: &BinaryMaskImage,
        width: u32,
        height: u32,
    ) -> Result<BinaryMaskImage, StudioError> {
        if mask.dimensions() == (width, height) {
            return Ok(mask.clone());
        }

        log::debug!(
            "📐 遮罩对齐：{}x{} -> {}x{}",
            mask.dimensions().0,
            mask.dimensions().1,
            width,
            height
        );

        let resized = match Self::resize_with_fast_image_resize(mask, width, height) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩放遮罩失败，回退 image::imageops::resize：{}", err);
                let fallback = image::imageops::resize(mask.as_rgba(), width, height, FilterType::Nearest);
                BinaryMaskImage::from_binary_pixels(fallback)
            }
        };

        Ok(renormalize(&resized))
    }

    fn resize_with_fast_image_resize(
        mask: &BinaryMaskImage,
        target_width: u32,
        target_height: u32,
    ) -> Result<BinaryMaskImage, StudioError> {
        let (src_width, src_height) = mask.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            mask.as_rgba().as_raw().clone(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| StudioError::ResourceLimit(format!("构建遮罩缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest);

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| StudioError::ResourceLimit(format!("遮罩缩放失败：{}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
            .ok_or_else(|| StudioError::ResourceLimit("遮罩缩放输出缓冲长度异常".to_string()))?;

        Ok(BinaryMaskImage::from_binary_pixels(rgba))
    }
}
