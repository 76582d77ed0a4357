//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 库内部使用 `StudioError` 表达提交链路的错误；命令行边界还会遇到
//! 参数错误、笔画文件解析错误与 I/O 错误，统一收敛到 `AppError`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `StudioError` 与 `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 `--json` 输出。

use serde::Serialize;

use crate::studio::StudioError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 提交链路错误（校验 / 传输 / 服务端 / 运行时）
    #[error("{0}")]
    Studio(#[from] StudioError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置来源无效
    #[error("配置错误: {0}")]
    Config(String),

    /// 命令行输入无效（笔画文件等）
    #[error("输入无效: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Studio(err) => err.code(),
            Self::Io(_) => "E_RUNTIME",
            Self::Config(_) | Self::InvalidInput(_) => "E_VALIDATION",
        }
    }

    /// 面向用户的提示文案。
    pub fn user_message(&self) -> String {
        match self {
            Self::Studio(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
