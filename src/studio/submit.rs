//! # 提交控制模块
//!
//! ## 设计思路
//!
//! 把一次提交建模为显式状态机：
//! `Idle → Validating → Submitting → (Retrying → Submitting)* → Succeeded | Failed`。
//! 每次状态迁移都会通知观察者，命令行据此输出进度。
//!
//! ## 实现思路
//!
//! 1. 同一控制器同一时刻只允许一次提交：`InFlightGuard`（RAII）占用标志，`Drop` 时释放；
//!    并发的第二次提交立即以 `Busy` 拒绝，不影响正在进行的那一次
//! 2. 发送前再次校验负载（缺字段 / 超限 → Failed，无网络请求）
//! 3. 每次尝试都重新生成 multipart 表单，附带 `Accept: image/*`
//! 4. 仅传输层失败（连接失败、超时、连接中断）按固定间隔顺序重试，用尽后返回最后一次错误
//! 5. 非 2xx 状态码不重试，尽力从响应体中提取后端错误信息
//! 6. 2xx 响应体必须非空且文件签名为图片

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;

use super::config::{Feature, RetryPolicy};
use super::payload::UploadPayload;
use super::source::ResultImage;
use super::{StudioConfig, StudioError};

/// 错误响应体截断长度（字符）。
const ERROR_BODY_MAX_CHARS: usize = 500;

/// 提交状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Validating,
    Submitting {
        attempt: u32,
    },
    Retrying {
        attempt: u32,
        #[serde(rename = "delay_ms", serialize_with = "serialize_duration_ms")]
        delay: Duration,
        last_error: String,
    },
    Succeeded,
    Failed {
        message: String,
    },
}

fn serialize_duration_ms<S>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(delay.as_millis() as u64)
}

impl SubmissionState {
    /// 是否处于终态。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// RAII 在途标志：构造时占用，`Drop` 时释放。
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 提交控制器。
///
/// 可通过 `Arc` 在多个任务间共享；同一时刻只有一次提交在途。
pub struct SubmissionController {
    client: reqwest::Client,
    base_url: reqwest::Url,
    policy: RetryPolicy,
    max_part_bytes: u64,
    request_timeout: Duration,
    in_flight: AtomicBool,
    state: Mutex<SubmissionState>,
}

impl SubmissionController {
    pub fn new(config: &StudioConfig) -> Result<Self, StudioError> {
        let mut base_url = reqwest::Url::parse(&config.base_url)
            .map_err(|e| StudioError::InvalidConfig(format!("base_url 格式错误：{}", e)))?;

        // 保证 join 时保留基础路径
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StudioError::Request(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            base_url,
            policy: config.retry_policy(),
            max_part_bytes: config.max_part_bytes,
            request_timeout: config.request_timeout(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SubmissionState::Idle),
        })
    }

    /// 当前状态快照。
    pub fn state(&self) -> SubmissionState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// 功能对应的完整接口地址。
    pub fn endpoint_url(&self, feature: Feature) -> Result<reqwest::Url, StudioError> {
        self.base_url
            .join(feature.endpoint_path())
            .map_err(|e| StudioError::Request(format!("接口地址拼接失败：{}", e)))
    }

    pub async fn submit(&self, payload: &UploadPayload) -> Result<ResultImage, StudioError> {
        self.submit_with_hooks(payload, |_| {}).await
    }

    /// 提交并在每次状态迁移时回调 `on_state`。
    pub async fn submit_with_hooks<F>(&self, payload: &UploadPayload, on_state: F) -> Result<ResultImage, StudioError>
    where
        F: Fn(&SubmissionState) + Send + Sync,
    {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            log::warn!("⏳ 已有提交在途，拒绝新的提交");
            return Err(StudioError::Busy(format!("{} 提交尚未完成", payload.feature().as_str())));
        };

        let started = Instant::now();
        let result = self.run(payload, &on_state).await;

        match &result {
            Ok(image) => {
                self.transition(SubmissionState::Succeeded, &on_state);
                log::info!(
                    "✅ 提交成功 - 功能: {} 结果: {} ({} bytes) 耗时: {:?}",
                    payload.feature().as_str(),
                    image.mime_type,
                    image.bytes.len(),
                    started.elapsed()
                );
            }
            Err(err) => {
                self.transition(
                    SubmissionState::Failed {
                        message: err.user_message(),
                    },
                    &on_state,
                );
                log::warn!(
                    "❌ 提交失败 - 功能: {} 阶段: {} 错误: {} 耗时: {:?}",
                    payload.feature().as_str(),
                    err.stage(),
                    err,
                    started.elapsed()
                );
            }
        }

        result
    }

    async fn run<F>(&self, payload: &UploadPayload, on_state: &F) -> Result<ResultImage, StudioError>
    where
        F: Fn(&SubmissionState) + Send + Sync,
    {
        self.transition(SubmissionState::Validating, on_state);
        payload.validate(self.max_part_bytes)?;

        let url = self.endpoint_url(payload.feature())?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            self.transition(SubmissionState::Submitting { attempt }, on_state);
            log::debug!(
                "📡 发送请求（第 {}/{} 次）- URL: {}",
                attempt,
                max_attempts,
                redact_url_for_log(url.as_str())
            );

            match self.exchange(&url, payload).await {
                Ok(image) => return Ok(image),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.inter_attempt_delay;
                    log::warn!(
                        "⚠️ 请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    self.transition(
                        SubmissionState::Retrying {
                            attempt,
                            delay,
                            last_error: err.to_string(),
                        },
                        on_state,
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// 单次请求 + 响应处理。
    async fn exchange(&self, url: &reqwest::Url, payload: &UploadPayload) -> Result<ResultImage, StudioError> {
        let form = payload.to_form()?;

        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "image/*")
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url.as_str()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e, url.as_str()))?;

        if !status.is_success() {
            let message = decode_error_body(status, &body);
            log::debug!("服务端返回 HTTP {}：{}", status.as_u16(), message);
            return Err(StudioError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let mime_type = validate_result_signature(&body)?;
        if let Some(ct) = content_type.as_deref() {
            if !ct.starts_with("image/") {
                log::debug!("响应 Content-Type 为 {}，以文件签名 {} 为准", ct, mime_type);
            }
        }

        Ok(ResultImage {
            bytes: body,
            mime_type: mime_type.to_string(),
        })
    }

    fn transition<F>(&self, next: SubmissionState, on_state: &F)
    where
        F: Fn(&SubmissionState) + Send + Sync,
    {
        match self.state.lock() {
            Ok(mut guard) => *guard = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }
        on_state(&next);
    }

    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> StudioError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            StudioError::Timeout(format!("请求超时（{}秒）", self.request_timeout.as_secs()))
        } else if e.is_connect() {
            StudioError::Transport(format!("无法连接：{}", err_msg))
        } else if e.is_builder() {
            StudioError::Request(err_msg)
        } else {
            StudioError::Transport(format!("请求失败：{}", err_msg))
        }
    }
}

/// 日志中去掉 query 与 fragment。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

/// 通过文件签名确认响应体是图片，返回识别出的 MIME。
fn validate_result_signature(bytes: &[u8]) -> Result<&'static str, StudioError> {
    if bytes.is_empty() {
        return Err(StudioError::Decode("服务器返回了空结果".to_string()));
    }

    let kind = infer::get(bytes).ok_or_else(|| StudioError::Decode("无法识别结果图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(StudioError::Decode(format!(
            "结果签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(kind.mime_type())
}

/// 从错误响应体中提取后端消息。
///
/// 依次尝试 JSON 的 `error` / `message` / `errors[]` / `detail`，
/// 其次是纯文本，最后回退到状态行。
fn decode_error_body(status: reqwest::StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = extract_json_message(&value) {
            return message;
        }
    }

    if !trimmed.is_empty() {
        return truncate_chars(trimmed, ERROR_BODY_MAX_CHARS);
    }

    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

fn extract_json_message(value: &serde_json::Value) -> Option<String> {
    for key in ["error", "message"] {
        match value.get(key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(nested) if nested.is_object() => {
                if let Some(inner) = extract_json_message(nested) {
                    return Some(inner);
                }
            }
            _ => {}
        }
    }

    if let Some(serde_json::Value::Array(items)) = value.get("errors") {
        let messages: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.clone()),
                other => extract_json_message(other),
            })
            .collect();
        if !messages.is_empty() {
            return Some(messages.join("; "));
        }
    }

    match value.get("detail") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(other) if other.is_array() || other.is_object() => Some(other.to_string()),
        _ => None,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
