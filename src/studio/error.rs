//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载提交链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 每个分支归入四类之一（校验 / 传输 / 服务端 / 运行时），
//! 决定是否重试以及展示给用户的文案。

/// 错误大类，对应用户可见的提示形态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 缺少字段或超出体积限制，不发起网络请求。
    Validation,
    /// 网络不可达、超时或连接中断，可重试。
    Transport,
    /// 服务端返回非成功状态码，不重试。
    Server,
    /// 其余意外失败（图片处理、请求构造等）。
    Runtime,
}

/// 提交链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("校验失败：{0}")]
    Validation(String),

    #[error("{part} 体积过大：{size} 字节（限制：{limit} 字节）")]
    PayloadTooLarge {
        part: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("网络错误：{0}")]
    Transport(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("服务器错误（HTTP {status}）：{message}")]
    Server { status: u16, message: String },

    #[error("请求构造失败：{0}")]
    Request(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("配置错误：{0}")]
    InvalidConfig(String),

    #[error("已有提交正在进行：{0}")]
    Busy(String),
}

impl StudioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::PayloadTooLarge { .. } | Self::InvalidConfig(_) => {
                ErrorKind::Validation
            }
            Self::Transport(_) | Self::Timeout(_) => ErrorKind::Transport,
            Self::Server { .. } => ErrorKind::Server,
            Self::Request(_)
            | Self::Decode(_)
            | Self::Encode(_)
            | Self::FileSystem(_)
            | Self::ResourceLimit(_)
            | Self::Busy(_) => ErrorKind::Runtime,
        }
    }

    /// 仅传输层失败进入重试。
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// 稳定错误码，供前端或脚本按码处理。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy(_) => "E_BUSY",
            _ => match self.kind() {
                ErrorKind::Validation => "E_VALIDATION",
                ErrorKind::Transport => "E_TRANSPORT",
                ErrorKind::Server => "E_SERVER",
                ErrorKind::Runtime => "E_RUNTIME",
            },
        }
    }

    /// 出错阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::PayloadTooLarge { .. } | Self::InvalidConfig(_) => "validate",
            Self::Transport(_) | Self::Timeout(_) | Self::Request(_) | Self::Busy(_) => "submit",
            Self::Server { .. } => "response",
            Self::Decode(_) | Self::Encode(_) | Self::ResourceLimit(_) => "process",
            Self::FileSystem(_) => "load",
        }
    }

    /// 面向用户的提示文案。
    ///
    /// 服务端错误原样展示后端消息；传输错误提示检查网络；其余附带底层信息。
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { message, .. } => format!("服务器错误：{}", message),
            Self::Transport(detail) | Self::Timeout(detail) => {
                format!("无法连接到服务器，请检查网络后重试（{}）", detail)
            }
            Self::Busy(_) => "正在处理上一次提交，请稍候".to_string(),
            other if other.kind() == ErrorKind::Validation => other.to_string(),
            other => format!("发生错误：{}", other),
        }
    }
}

impl From<StudioError> for String {
    /// 兼容仅需要文本错误的调用点。
    fn from(error: StudioError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(StudioError::Transport("connection reset".into()).is_retryable());
        assert!(StudioError::Timeout("60s".into()).is_retryable());
        assert!(!StudioError::Server { status: 500, message: "boom".into() }.is_retryable());
        assert!(!StudioError::Validation("missing prompt".into()).is_retryable());
        assert!(!StudioError::Request("bad url".into()).is_retryable());
    }

    #[test]
    fn server_message_is_shown_verbatim() {
        let err = StudioError::Server {
            status: 500,
            message: "model overloaded".into(),
        };

        assert!(err.user_message().contains("model overloaded"));
        assert_eq!(err.code(), "E_SERVER");
        assert_eq!(err.stage(), "response");
    }

    #[test]
    fn size_guard_is_a_validation_error() {
        let err = StudioError::PayloadTooLarge {
            part: "mask",
            size: 5 * 1024 * 1024,
            limit: 4 * 1024 * 1024,
        };

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "E_VALIDATION");
        assert!(err.user_message().contains("mask"));
    }
}
