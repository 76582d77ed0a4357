//! # 结果展示模块
//!
//! ## 设计思路
//!
//! 结果图片以“对象 URL”的形式登记在进程内存储中，展示层只持有 URL。
//! 新结果到达时释放上一个 URL；展示器销毁时释放全部，避免结果字节常驻内存。
//!
//! ## 实现思路
//!
//! - `ObjectUrlStore`：`blob:image-studio/<序号>` → `ResultImage` 的共享映射
//! - `ResultPresenter`：记录当前结果，提供下载文件名、`data:` URL 与落盘能力

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;

use super::config::Feature;
use super::source::ResultImage;
use super::StudioError;

const OBJECT_URL_PREFIX: &str = "blob:image-studio/";

/// 进程内对象 URL 存储。克隆后共享同一份数据。
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlStore {
    entries: Arc<Mutex<HashMap<String, ResultImage>>>,
    next_id: Arc<AtomicU64>,
}

impl ObjectUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记结果并返回新的对象 URL。
    pub fn create(&self, image: ResultImage) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("{}{}", OBJECT_URL_PREFIX, id);

        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(url.clone(), image);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(url.clone(), image);
            }
        }

        url
    }

    /// 解析对象 URL；已释放或未知的 URL 返回 `None`。
    pub fn resolve(&self, url: &str) -> Option<ResultImage> {
        let entries = self.entries.lock().ok()?;
        entries.get(url).cloned()
    }

    /// 释放对象 URL，返回是否确实存在。
    pub fn revoke(&self, url: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => entries.remove(url).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(url).is_some(),
        }
    }

    /// 当前存活的 URL 数量。
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 已展示的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentedResult {
    pub feature: &'static str,
    pub display_url: String,
    pub download_file_name: &'static str,
    pub mime_type: String,
    pub byte_len: usize,
}

/// 结果展示器。
#[derive(Debug)]
pub struct ResultPresenter {
    store: ObjectUrlStore,
    current: Option<PresentedResult>,
}

impl ResultPresenter {
    pub fn new(store: ObjectUrlStore) -> Self {
        Self { store, current: None }
    }

    pub fn store(&self) -> &ObjectUrlStore {
        &self.store
    }

    /// 展示新结果，并释放上一个结果的 URL。
    pub fn present(&mut self, feature: Feature, image: ResultImage) -> PresentedResult {
        self.release();

        let mime_type = image.mime_type.clone();
        let byte_len = image.bytes.len();
        let presented = PresentedResult {
            feature: feature.as_str(),
            display_url: self.store.create(image),
            download_file_name: feature.download_file_name(),
            mime_type,
            byte_len,
        };

        log::info!(
            "🖼️ 结果已展示 - {} ({} bytes) 下载名: {}",
            presented.display_url,
            presented.byte_len,
            presented.download_file_name
        );

        self.current = Some(presented.clone());
        presented
    }

    pub fn current(&self) -> Option<&PresentedResult> {
        self.current.as_ref()
    }

    /// 释放当前结果。
    pub fn release(&mut self) {
        if let Some(previous) = self.current.take() {
            if self.store.revoke(&previous.display_url) {
                log::debug!("🧹 已释放对象 URL：{}", previous.display_url);
            }
        }
    }

    /// 当前结果的 `data:` URL。
    pub fn data_url(&self) -> Option<String> {
        let current = self.current.as_ref()?;
        let image = self.store.resolve(&current.display_url)?;
        Some(format!(
            "data:{};base64,{}",
            image.mime_type,
            general_purpose::STANDARD.encode(&image.bytes)
        ))
    }

    /// 将当前结果写入 `dir/<下载文件名>`，返回写入路径。
    pub fn save_download(&self, dir: &Path) -> Result<PathBuf, StudioError> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| StudioError::Validation("当前没有可下载的结果".to_string()))?;
        let image = self
            .store
            .resolve(&current.display_url)
            .ok_or_else(|| StudioError::FileSystem(format!("对象 URL 已失效：{}", current.display_url)))?;

        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .map_err(|e| StudioError::FileSystem(format!("无法创建目录 {}：{}", dir.display(), e)))?;
        }

        let path = dir.join(current.download_file_name);
        std::fs::write(&path, &image.bytes)
            .map_err(|e| StudioError::FileSystem(format!("无法写入 {}：{}", path.display(), e)))?;

        log::info!("💾 结果已保存：{}", path.display());
        Ok(path)
    }
}

impl Drop for ResultPresenter {
    fn drop(&mut self) {
        self.release();
    }
}
