//! # 表单会话模块
//!
//! ## 设计思路
//!
//! 每个表单（inpaint / inpaint-upload / erase / generate）对应一个 `FormSession`，
//! 显式持有自己的全部状态：配置快照、原图、遮罩录制器或上传遮罩、提示词、宽高比、
//! 提交控制器与结果展示器。不存在全局单例，测试可随意创建独立实例。
//!
//! ## 实现思路
//!
//! - 选择原图：文件来源先做存在性与 metadata 体积检查，再读取；解码后计算画布显示尺寸，
//!   并以该尺寸重建录制器
//! - 准备负载：画布功能导出并归一化遮罩，上传功能使用已归一化的上传遮罩，交给构建器
//! - 提交：控制器负责状态机与重试，成功后交给展示器

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::config::{AspectRatio, Feature};
use super::normalizer::{normalize_mask, normalize_uploaded_mask};
use super::payload::{PayloadInput, UploadPayload, UploadPayloadBuilder};
use super::presenter::{ObjectUrlStore, PresentedResult, ResultPresenter};
use super::raster::{EncodeFormat, ImageRasterBackend, RasterBackend};
use super::recorder::CanvasMaskRecorder;
use super::source::{BinaryMaskImage, DisplaySize, SourceImage};
use super::submit::{SubmissionController, SubmissionState};
use super::{StudioConfig, StudioError};

/// 单个表单的会话状态。
pub struct FormSession {
    feature: Feature,
    config: StudioConfig,
    backend: Arc<dyn RasterBackend>,
    controller: Arc<SubmissionController>,
    presenter: ResultPresenter,
    image: Option<SourceImage>,
    recorder: Option<CanvasMaskRecorder>,
    uploaded_mask: Option<BinaryMaskImage>,
    prompt: String,
    aspect_ratio: AspectRatio,
}

impl FormSession {
    /// 使用默认栅格后端与独立的控制器、URL 存储创建会话。
    pub fn new(feature: Feature, config: StudioConfig) -> Result<Self, StudioError> {
        config.validate()?;

        let backend: Arc<dyn RasterBackend> = Arc::new(ImageRasterBackend::new(config.max_decoded_pixels));
        let controller = Arc::new(SubmissionController::new(&config)?);

        Ok(Self::with_parts(feature, config, backend, controller, ObjectUrlStore::new()))
    }

    /// 注入各组件创建会话（多个表单可共享同一 URL 存储）。
    pub fn with_parts(
        feature: Feature,
        config: StudioConfig,
        backend: Arc<dyn RasterBackend>,
        controller: Arc<SubmissionController>,
        store: ObjectUrlStore,
    ) -> Self {
        log::debug!("🧾 创建表单会话 - 功能: {}", feature.as_str());

        Self {
            feature,
            config,
            backend,
            controller,
            presenter: ResultPresenter::new(store),
            image: None,
            recorder: None,
            uploaded_mask: None,
            prompt: String::new(),
            aspect_ratio: AspectRatio::default(),
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<SubmissionController> {
        &self.controller
    }

    pub fn image(&self) -> Option<&SourceImage> {
        self.image.as_ref()
    }

    pub fn uploaded_mask(&self) -> Option<&BinaryMaskImage> {
        self.uploaded_mask.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.aspect_ratio = ratio;
    }

    /// 选择原图（内存字节）。重新选择会替换原图，重置画布并丢弃已上传的遮罩。
    pub fn select_image(&mut self, bytes: impl Into<Bytes>) -> Result<&SourceImage, StudioError> {
        if !self.feature.requires_image() {
            return Err(StudioError::Validation(format!(
                "{} 功能不接受图片输入",
                self.feature.as_str()
            )));
        }

        let bytes = bytes.into();
        let decoded = self.backend.load(&bytes)?;
        let (width, height) = decoded.dimensions();
        let display = DisplaySize::fit_within(
            width,
            height,
            self.config.display_max_width,
            self.config.display_max_height,
        );

        log::info!(
            "🖼️ 已选择原图 - 格式: {:?} 尺寸: {}x{} 画布: {}x{}",
            decoded.format,
            width,
            height,
            display.width,
            display.height
        );

        self.recorder = self
            .feature
            .uses_canvas()
            .then(|| CanvasMaskRecorder::new(display, &self.config));
        self.uploaded_mask = None;

        let image = self
            .image
            .insert(SourceImage::new(bytes, decoded.format, width, height, display));
        Ok(&*image)
    }

    /// 从本地文件选择原图。
    pub async fn select_image_file(&mut self, path: &Path) -> Result<&SourceImage, StudioError> {
        let bytes = self.read_source_file(path).await?;
        self.select_image(bytes)
    }

    /// 选择手动上传的遮罩（仅 inpaint-upload）。
    pub fn select_mask(&mut self, bytes: impl Into<Bytes>) -> Result<&BinaryMaskImage, StudioError> {
        if self.feature != Feature::InpaintUpload {
            return Err(StudioError::Validation(format!(
                "{} 功能的遮罩来自画布，不接受上传",
                self.feature.as_str()
            )));
        }

        let bytes = bytes.into();
        let decoded = self.backend.load(&bytes)?;
        let mask = normalize_uploaded_mask(&decoded.pixels);

        log::info!(
            "⚫ 已选择遮罩 - 尺寸: {}x{} 选中像素: {}",
            mask.dimensions().0,
            mask.dimensions().1,
            mask.white_pixel_count()
        );

        Ok(&*self.uploaded_mask.insert(mask))
    }

    pub async fn select_mask_file(&mut self, path: &Path) -> Result<&BinaryMaskImage, StudioError> {
        let bytes = self.read_source_file(path).await?;
        self.select_mask(bytes)
    }

    /// 画布录制器。需要先选择原图，且功能使用画布。
    pub fn recorder_mut(&mut self) -> Result<&mut CanvasMaskRecorder, StudioError> {
        if !self.feature.uses_canvas() {
            return Err(StudioError::Validation(format!(
                "{} 功能不使用画布",
                self.feature.as_str()
            )));
        }

        self.recorder
            .as_mut()
            .ok_or_else(|| StudioError::Validation("请先选择图片".to_string()))
    }

    pub fn recorder(&self) -> Option<&CanvasMaskRecorder> {
        self.recorder.as_ref()
    }

    /// 导出与原图等大的二值遮罩，不做上传编码与体积校验。
    pub fn export_mask(&self) -> Result<BinaryMaskImage, StudioError> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| StudioError::Validation("请先选择图片".to_string()))?;

        let mask = match (self.feature, &self.recorder, &self.uploaded_mask) {
            (Feature::InpaintUpload, _, Some(uploaded)) => uploaded.clone(),
            (Feature::InpaintUpload, _, None) => {
                return Err(StudioError::Validation("缺少遮罩".to_string()));
            }
            (_, Some(recorder), _) => {
                let canvas_mask = normalize_mask(&recorder.export(self.backend.as_ref())?);
                if !image.is_scaled() {
                    return Ok(canvas_mask);
                }
                canvas_mask
            }
            (_, None, _) => {
                return Err(StudioError::Validation(format!(
                    "{} 功能没有遮罩",
                    self.feature.as_str()
                )));
            }
        };

        let (width, height) = image.natural_size();
        UploadPayloadBuilder::new(&self.config, self.backend.as_ref()).align_mask(&mask, width, height)
    }

    /// 以 PNG 编码 `export_mask` 的结果。
    pub fn export_mask_png(&self) -> Result<Vec<u8>, StudioError> {
        let mask = self.export_mask()?;
        self.backend.encode(mask.as_rgba(), EncodeFormat::Png)
    }

    /// 导出遮罩并构建上传负载。
    pub fn prepare_payload(&self) -> Result<UploadPayload, StudioError> {
        let started = Instant::now();

        let canvas_mask = match (&self.recorder, self.feature.uses_canvas()) {
            (Some(recorder), true) => Some(normalize_mask(&recorder.export(self.backend.as_ref())?)),
            _ => None,
        };

        let mask = match self.feature {
            Feature::Inpaint | Feature::Erase => canvas_mask.as_ref(),
            Feature::InpaintUpload => self.uploaded_mask.as_ref(),
            Feature::Generate => None,
        };

        let payload = UploadPayloadBuilder::new(&self.config, self.backend.as_ref()).build(PayloadInput {
            feature: self.feature,
            image: self.image.as_ref(),
            mask,
            prompt: &self.prompt,
            aspect_ratio: Some(self.aspect_ratio),
        })?;

        log::debug!("⏱️ 负载准备耗时：{:?}", started.elapsed());
        Ok(payload)
    }

    pub async fn submit(&mut self) -> Result<PresentedResult, StudioError> {
        self.submit_with_hooks(|_| {}).await
    }

    /// 准备负载、提交并展示结果；`on_state` 接收每次状态迁移。
    pub async fn submit_with_hooks<F>(&mut self, on_state: F) -> Result<PresentedResult, StudioError>
    where
        F: Fn(&SubmissionState) + Send + Sync,
    {
        let payload = match self.prepare_payload() {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("❌ 负载校验失败：{}", err);
                on_state(&SubmissionState::Failed {
                    message: err.user_message(),
                });
                return Err(err);
            }
        };

        let image = self.controller.submit_with_hooks(&payload, on_state).await?;
        Ok(self.presenter.present(self.feature, image))
    }

    pub fn current_result(&self) -> Option<&PresentedResult> {
        self.presenter.current()
    }

    pub fn presenter(&self) -> &ResultPresenter {
        &self.presenter
    }

    /// 将当前结果保存到目录，返回文件路径。
    pub fn save_download(&self, dir: &Path) -> Result<std::path::PathBuf, StudioError> {
        self.presenter.save_download(dir)
    }

    async fn read_source_file(&self, path: &Path) -> Result<Bytes, StudioError> {
        log::info!("📁 开始读取本地文件 - 路径: {}", path.display());

        if !path.exists() {
            return Err(StudioError::FileSystem(format!("文件不存在：{}", path.display())));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StudioError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > self.config.max_source_bytes {
            return Err(StudioError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                self.config.max_source_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StudioError::FileSystem(format!("无法读取文件：{}", e)))?;

        Ok(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::source::{BrushMode, MaskStroke, StrokePoint};
    use image::{Rgba, RgbaImage};

    fn png(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        ImageRasterBackend::new(40_000_000)
            .encode(&RgbaImage::from_pixel(width, height, pixel), EncodeFormat::Png)
            .expect("encode png")
    }

    fn session(feature: Feature) -> FormSession {
        FormSession::new(feature, StudioConfig::default()).expect("session")
    }

    #[test]
    fn large_image_gets_scaled_canvas() {
        let mut session = session(Feature::Inpaint);
        let image = session
            .select_image(png(2048, 1024, Rgba([1, 2, 3, 255])))
            .expect("select image");

        assert_eq!(image.natural_size(), (2048, 1024));
        assert_eq!(image.display_size(), DisplaySize { width: 1024, height: 512 });
        assert_eq!(
            session.recorder_mut().expect("recorder").size(),
            DisplaySize { width: 1024, height: 512 }
        );
    }

    #[test]
    fn reselecting_image_resets_recorder() {
        let mut session = session(Feature::Erase);
        session.select_image(png(32, 32, Rgba([0, 0, 0, 255]))).expect("select image");
        session.recorder_mut().expect("recorder").begin_stroke(4.0, 4.0);

        session.select_image(png(16, 16, Rgba([0, 0, 0, 255]))).expect("reselect image");

        let recorder = session.recorder_mut().expect("recorder");
        assert!(recorder.is_empty());
        assert_eq!(recorder.size(), DisplaySize { width: 16, height: 16 });
    }

    #[test]
    fn recorder_requires_image_and_canvas_feature() {
        assert!(matches!(session(Feature::Inpaint).recorder_mut(), Err(StudioError::Validation(_))));
        assert!(matches!(
            session(Feature::InpaintUpload).recorder_mut(),
            Err(StudioError::Validation(_))
        ));
    }

    #[test]
    fn mask_upload_is_limited_to_upload_feature() {
        let mut session = session(Feature::Inpaint);

        assert!(matches!(
            session.select_mask(png(8, 8, Rgba([255, 255, 255, 255]))),
            Err(StudioError::Validation(_))
        ));
    }

    #[test]
    fn generate_rejects_image_input() {
        let mut session = session(Feature::Generate);

        assert!(matches!(
            session.select_image(png(8, 8, Rgba([0, 0, 0, 255]))),
            Err(StudioError::Validation(_))
        ));
    }

    #[test]
    fn prepare_payload_exports_canvas_mask_at_natural_size() {
        let mut session = session(Feature::Inpaint);
        session.select_image(png(2048, 1024, Rgba([9, 9, 9, 255]))).expect("select image");
        session.set_prompt("a red balloon");
        session.recorder_mut().expect("recorder").push_stroke(MaskStroke {
            radius: 20,
            mode: BrushMode::default(),
            points: vec![StrokePoint { x: 100.0, y: 100.0 }],
        });

        let payload = session.prepare_payload().expect("payload");

        assert_eq!(payload.dimensions(), Some((2048, 1024)));
        assert_eq!(payload.prompt(), "a red balloon");
    }

    #[test]
    fn upload_feature_requires_uploaded_mask() {
        let mut session = session(Feature::InpaintUpload);
        session.select_image(png(8, 8, Rgba([0, 0, 0, 255]))).expect("select image");
        session.set_prompt("a lake");

        assert!(matches!(session.prepare_payload(), Err(StudioError::Validation(_))));

        session
            .select_mask(png(8, 8, Rgba([255, 255, 255, 255])))
            .expect("select mask");
        assert!(session.prepare_payload().is_ok());
    }

    #[test]
    fn reselecting_image_drops_uploaded_mask() {
        let mut session = session(Feature::InpaintUpload);
        session.select_image(png(8, 8, Rgba([0, 0, 0, 255]))).expect("select image");
        session.set_prompt("a lake");
        session
            .select_mask(png(8, 8, Rgba([255, 255, 255, 255])))
            .expect("select mask");

        session.select_image(png(16, 16, Rgba([0, 0, 0, 255]))).expect("reselect image");

        assert!(session.uploaded_mask().is_none());
        assert!(matches!(session.prepare_payload(), Err(StudioError::Validation(_))));
    }

    #[test]
    fn export_mask_ignores_upload_size_limit() {
        let mut config = StudioConfig::default();
        config.max_part_bytes = 1024;
        let mut session = FormSession::new(Feature::Erase, config).expect("session");

        let mut seed: u32 = 7;
        let noisy = RgbaImage::from_fn(256, 128, |_, _| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [r, g, b, _] = seed.to_be_bytes();
            Rgba([r, g, b, 255])
        });
        let bytes = ImageRasterBackend::new(40_000_000)
            .encode(&noisy, EncodeFormat::Png)
            .expect("encode noisy png");
        session.select_image(bytes).expect("select image");
        session.recorder_mut().expect("recorder").begin_stroke(10.0, 10.0);

        assert!(matches!(session.prepare_payload(), Err(StudioError::PayloadTooLarge { .. })));

        let mask = session.export_mask().expect("export mask");
        assert_eq!(mask.dimensions(), (256, 128));
        assert_eq!(*mask.as_rgba().get_pixel(10, 10), Rgba([255, 255, 255, 255]));
        assert_eq!(*mask.as_rgba().get_pixel(200, 100), Rgba([0, 0, 0, 255]));
        assert!(session.export_mask_png().is_ok());
    }

    #[test]
    fn export_mask_is_aligned_for_scaled_canvas() {
        let mut session = session(Feature::Erase);
        session.select_image(png(2048, 1024, Rgba([9, 9, 9, 255]))).expect("select image");
        session.recorder_mut().expect("recorder").begin_stroke(10.0, 10.0);

        let mask = session.export_mask().expect("export mask");

        assert_eq!(mask.dimensions(), (2048, 1024));
        assert_eq!(*mask.as_rgba().get_pixel(20, 20), Rgba([255, 255, 255, 255]));
        assert_eq!(*mask.as_rgba().get_pixel(2000, 1000), Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn missing_file_is_reported_before_reading() {
        let mut session = session(Feature::Inpaint);

        let result = session
            .select_image_file(Path::new("/definitely/not/here/image.png"))
            .await;

        assert!(matches!(result, Err(StudioError::FileSystem(_))));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_by_metadata() {
        let mut config = StudioConfig::default();
        config.max_part_bytes = 1024;
        config.max_source_bytes = 1024;
        let mut session = FormSession::new(Feature::Erase, config).expect("session");

        let path = std::env::temp_dir().join(format!("image-studio-session-{}.png", std::process::id()));
        std::fs::write(&path, vec![0u8; 4096]).expect("write temp file");

        let result = session.select_image_file(&path).await;
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(StudioError::ResourceLimit(_))));
    }
}
