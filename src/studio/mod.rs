//! # 图像工作室模块（studio）
//!
//! ## 设计思路
//!
//! 把“选图 → 画遮罩 → 遮罩二值化 → 打包 → 提交 → 展示结果”按职责拆分为多个子模块：
//!
//! - `config`：配置、功能类型、宽高比、重试策略
//! - `error`：统一错误枚举与分类
//! - `source`：原图、笔画、遮罩与结果等中间数据模型
//! - `raster`：解码 / 绘制 / 编码能力接口与默认实现
//! - `recorder`：画布遮罩录制
//! - `normalizer`：遮罩二值化
//! - `payload`：上传负载构建与校验
//! - `submit`：提交状态机与重试
//! - `presenter`：对象 URL 与下载
//! - `session`：单个表单的状态与编排
//!
//! ## 新同事快速上手
//!
//! ```text
//! FormSession::select_image / select_image_file
//!    ↓
//! recorder.rs（begin_stroke / stroke_to / end_stroke / undo / clear）
//!    ↓ export（raster.rs 栅格化）
//! normalizer.rs（alpha > 0 → 白，其余 → 黑）
//!    ↓
//! payload.rs（提示词/必填项校验 + 格式规整 + 遮罩对齐 + 4 MiB 限制）
//!    ↓
//! submit.rs（Idle → Validating → Submitting → Retrying* → Succeeded | Failed）
//!    ↓
//! presenter.rs（blob URL + 固定下载文件名）
//! ```
//!
//! ## 分层职责建议
//!
//! - 接口路径、默认值、文件名变更优先改 `config.rs`
//! - 重试、状态、错误体解析变更优先改 `submit.rs`
//! - 绘制手感（间距、抗锯齿）变更优先改 `raster.rs`

mod config;
mod error;
mod normalizer;
mod payload;
mod presenter;
mod raster;
mod recorder;
mod session;
mod source;
mod submit;

pub use config::{AspectRatio, BASE_URL_ENV, DEFAULT_ERASE_PROMPT, Feature, RetryPolicy, StudioConfig};
pub use error::{ErrorKind, StudioError};
pub use normalizer::{LUMA_THRESHOLD, MaskRule, binarize, normalize_mask, normalize_uploaded_mask, renormalize};
pub use payload::{FilePart, PayloadInput, UploadPayload, UploadPayloadBuilder};
pub use presenter::{ObjectUrlStore, PresentedResult, ResultPresenter};
pub use raster::{DecodedImage, EncodeFormat, ImageRasterBackend, RasterBackend};
pub use recorder::CanvasMaskRecorder;
pub use session::FormSession;
pub use source::{
    BinaryMaskImage, BrushMode, DisplaySize, MASK_BLACK, MASK_WHITE, MaskStroke, RawMaskImage, ResultImage,
    SourceImage, StrokePoint,
};
pub use submit::{SubmissionController, SubmissionState};
