//! # 图像工作室 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 调用方（CLI / 嵌入式 UI）                 │
//! │                                                          │
//! │  FormSession ×4（inpaint / inpaint-upload / erase / generate）
//! │       │  (每个表单独立状态，无全局单例)                   │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, StudioError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            studio                                │
//! │                                                          │
//! │  ├─ recorder ─── 画布笔画录制                             │
//! │  ├─ raster ───── 解码 · 栅格化 · 编码 (image)             │
//! │  ├─ normalizer ─ 遮罩二值化                               │
//! │  ├─ payload ──── 校验 + multipart 打包 (fast_image_resize) │
//! │  ├─ submit ───── 状态机 + 有界重试 (reqwest + tokio)      │
//! │  └─ presenter ── 对象 URL + 下载                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 应用级错误 `AppError`，命令行边界统一输出 |
//! | [`studio`] | 遮罩录制、二值化、负载构建、提交与结果展示 |

pub mod error;
pub mod studio;
