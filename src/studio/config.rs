//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `StudioConfig`，保证提交链路的行为可观测、可调整、可测试。
//! 功能类型（inpaint / inpaint-upload / erase / generate）与宽高比作为高层语义，
//! 映射到接口路径、下载文件名与表单字段。
//!
//! ## 实现思路
//!
//! - `Default` 提供与线上表单一致的默认值（4 MiB、60 秒、3 次、2 秒）。
//! - 配置来源按优先级叠加：JSON 文件 → 环境变量 → 命令行参数。
//! - `validate` 对每个字段做范围校验，拒绝明显错误的组合。
//! - `Feature` / `AspectRatio` 负责字符串解析与反向输出。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::StudioError;

/// 覆盖服务地址的环境变量名。
pub const BASE_URL_ENV: &str = "IMAGE_STUDIO_BASE_URL";

/// 擦除功能在提示词为空时使用的填充指令。
pub const DEFAULT_ERASE_PROMPT: &str =
    "Seamlessly remove the masked area and fill it naturally matching the surrounding environment";

/// 提交链路配置。
///
/// 字段覆盖了加载、画布、打包与提交四个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// 推理后端基础地址（不含功能路径）。
    pub base_url: String,
    /// 单个二进制分片（图片/遮罩）允许的最大体积（字节）。
    pub max_part_bytes: u64,
    /// 从本地读取原图/遮罩文件时允许的最大体积（字节）。
    pub max_source_bytes: u64,
    /// 单次请求超时时间（秒）。
    pub request_timeout_secs: u64,
    /// 建立连接超时时间（秒）。
    pub connect_timeout_secs: u64,
    /// 传输失败时的总尝试次数（含首次）。
    pub max_attempts: u32,
    /// 两次尝试之间的固定间隔（毫秒）。
    pub retry_delay_ms: u64,
    /// 画笔半径下限（像素）。
    pub min_brush_radius: u32,
    /// 画笔半径上限（像素）。
    pub max_brush_radius: u32,
    /// 新画布的默认画笔半径（像素）。
    pub default_brush_radius: u32,
    /// 画布显示尺寸的最大宽度。
    pub display_max_width: u32,
    /// 画布显示尺寸的最大高度。
    pub display_max_height: u32,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 擦除功能的默认填充指令。
    pub erase_default_prompt: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            max_part_bytes: 4 * 1024 * 1024,
            max_source_bytes: 32 * 1024 * 1024,
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            min_brush_radius: 5,
            max_brush_radius: 60,
            default_brush_radius: 15,
            display_max_width: 1024,
            display_max_height: 1024,
            max_decoded_pixels: 40_000_000,
            erase_default_prompt: DEFAULT_ERASE_PROMPT.to_string(),
        }
    }
}

impl StudioConfig {
    /// 从 JSON 文件加载配置，缺省字段使用默认值。
    pub fn load_from_path(path: &Path) -> Result<Self, StudioError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StudioError::FileSystem(format!("无法读取配置文件 {}：{}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| StudioError::InvalidConfig(format!("解析配置文件失败：{}", e)))
    }

    /// 应用环境变量覆盖（目前仅服务地址）。
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            let trimmed = base_url.trim();
            if !trimmed.is_empty() {
                log::debug!("⚙️ 使用环境变量 {} 覆盖服务地址", BASE_URL_ENV);
                self.base_url = trimmed.to_string();
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            inter_attempt_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// 将画笔半径收敛到允许范围。
    pub fn clamp_brush_radius(&self, radius: u32) -> u32 {
        radius.clamp(self.min_brush_radius, self.max_brush_radius)
    }

    /// 校验配置取值范围。
    pub fn validate(&self) -> Result<(), StudioError> {
        let parsed = reqwest::Url::parse(&self.base_url)
            .map_err(|e| StudioError::InvalidConfig(format!("base_url 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(StudioError::InvalidConfig("base_url 仅支持 HTTP/HTTPS".to_string()));
        }
        if self.max_part_bytes < 1024 {
            return Err(StudioError::InvalidConfig("max_part_bytes 不能小于 1KB".to_string()));
        }
        if self.max_source_bytes < self.max_part_bytes {
            return Err(StudioError::InvalidConfig("max_source_bytes 不能小于 max_part_bytes".to_string()));
        }
        if !(1..=600).contains(&self.request_timeout_secs) {
            return Err(StudioError::InvalidConfig("request_timeout_secs 必须在 1~600 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout_secs) {
            return Err(StudioError::InvalidConfig("connect_timeout_secs 必须在 1~120 秒之间".to_string()));
        }
        if !(1..=10).contains(&self.max_attempts) {
            return Err(StudioError::InvalidConfig("max_attempts 必须在 1~10 之间".to_string()));
        }
        if self.retry_delay_ms > 60_000 {
            return Err(StudioError::InvalidConfig("retry_delay_ms 不能超过 60000 毫秒".to_string()));
        }
        if self.min_brush_radius == 0 || self.min_brush_radius > self.max_brush_radius {
            return Err(StudioError::InvalidConfig("画笔半径范围无效".to_string()));
        }
        if !(self.min_brush_radius..=self.max_brush_radius).contains(&self.default_brush_radius) {
            return Err(StudioError::InvalidConfig("default_brush_radius 超出画笔半径范围".to_string()));
        }
        if self.display_max_width == 0 || self.display_max_height == 0 {
            return Err(StudioError::InvalidConfig("显示尺寸上限必须大于 0".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(StudioError::InvalidConfig("max_decoded_pixels 必须大于 0".to_string()));
        }
        Ok(())
    }
}

/// 有界顺序重试策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次）。
    pub max_attempts: u32,
    /// 两次尝试之间的固定等待。
    pub inter_attempt_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        StudioConfig::default().retry_policy()
    }
}

/// 表单功能类型。
///
/// - `Inpaint`：画布绘制遮罩后重绘
/// - `InpaintUpload`：手动上传遮罩文件后重绘
/// - `Erase`：画布绘制遮罩后擦除
/// - `Generate`：纯文本生成图片
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Inpaint,
    InpaintUpload,
    Erase,
    Generate,
}

impl Feature {
    /// 从外部字符串解析功能类型。
    ///
    /// # 示例
    /// ```rust
    /// use image_studio::studio::Feature;
    ///
    /// let f = Feature::from_str("erase")?;
    /// assert_eq!(f.as_str(), "erase");
    /// # Ok::<(), image_studio::studio::StudioError>(())
    /// ```
    pub fn from_str(feature: &str) -> Result<Self, StudioError> {
        match feature.trim().to_lowercase().as_str() {
            "inpaint" => Ok(Self::Inpaint),
            "inpaint-upload" | "inpaint_upload" => Ok(Self::InpaintUpload),
            "erase" => Ok(Self::Erase),
            "generate" => Ok(Self::Generate),
            other => Err(StudioError::Validation(format!(
                "未知功能类型：{}（可选：inpaint / inpaint-upload / erase / generate）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inpaint => "inpaint",
            Self::InpaintUpload => "inpaint-upload",
            Self::Erase => "erase",
            Self::Generate => "generate",
        }
    }

    /// 相对基础地址的接口路径（不带前导斜杠）。
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::Inpaint => "inpaint",
            Self::InpaintUpload => "inpaint_direct_upload",
            Self::Erase => "erase_direct_upload",
            Self::Generate => "generate",
        }
    }

    /// 结果下载时的固定文件名。
    pub fn download_file_name(self) -> &'static str {
        match self {
            Self::Inpaint | Self::InpaintUpload => "result.png",
            Self::Erase => "erased.png",
            Self::Generate => "generated.png",
        }
    }

    /// 是否需要原图与遮罩。
    pub fn requires_image(self) -> bool {
        !matches!(self, Self::Generate)
    }

    /// 遮罩是否来自画布（否则来自上传文件）。
    pub fn uses_canvas(self) -> bool {
        matches!(self, Self::Inpaint | Self::Erase)
    }
}

/// 生成图片的宽高比。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Wide,
    Portrait,
    Standard,
}

impl AspectRatio {
    /// 从 `1:1` / `16:9` / `9:16` / `4:3` 解析。
    pub fn from_str(ratio: &str) -> Result<Self, StudioError> {
        match ratio.trim() {
            "1:1" => Ok(Self::Square),
            "16:9" => Ok(Self::Wide),
            "9:16" => Ok(Self::Portrait),
            "4:3" => Ok(Self::Standard),
            other => Err(StudioError::Validation(format!(
                "不支持的宽高比：{}（可选：1:1 / 16:9 / 9:16 / 4:3）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Wide => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
        }
    }
}
