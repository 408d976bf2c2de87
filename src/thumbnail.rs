//! 首页缩略图的生成与文件系统缓存。
//!
//! 缓存目录为扁平命名空间，文件名为 `<文档名>.png`。缩略图首次请求时渲染，
//! 之后直接从磁盘返回；写入经过临时文件与原子重命名，读者不会看到半截文件。

use image::ImageFormat;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::atomic::{AtomicFile, is_temp_file_name};
use crate::library::{Library, LibraryError};
use crate::locking::LockManager;
use crate::rasterizer::{PageRange, Rasterizer};

pub const THUMBNAIL_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("PDF not found")]
    NotFound,
    #[error("thumbnail render failed: {0}")]
    RenderFailure(String),
}

pub struct ThumbnailCache {
    library: Arc<Library>,
    cache_dir: PathBuf,
    rasterizer: Arc<dyn Rasterizer>,
    locks: LockManager,
    dpi: u32,
    render_wait: Duration,
    refresh_stale: bool,
}

impl ThumbnailCache {
    pub fn new(
        library: Arc<Library>,
        cache_dir: PathBuf,
        rasterizer: Arc<dyn Rasterizer>,
        dpi: u32,
    ) -> Self {
        Self {
            library,
            cache_dir,
            rasterizer,
            locks: LockManager::new(),
            dpi,
            render_wait: Duration::from_secs(crate::config::DEFAULT_RENDER_WAIT_SECS),
            refresh_stale: false,
        }
    }

    /// 等待同一文档并发渲染的最长时间，超时后自行渲染。
    pub fn with_render_wait(mut self, render_wait: Duration) -> Self {
        self.render_wait = render_wait;
        self
    }

    /// 开启后，早于文档修改时间的缩略图视为未命中。
    pub fn with_refresh_stale(mut self, refresh_stale: bool) -> Self {
        self.refresh_stale = refresh_stale;
        self
    }

    pub async fn ensure_cache_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir).await
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// 文档对应的缓存路径。
    pub fn cache_path(&self, document: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{document}.{THUMBNAIL_EXTENSION}"))
    }

    /// 返回文档缩略图路径，缓存缺失时渲染首页并落盘。
    pub async fn resolve(&self, document: &str) -> Result<PathBuf, ThumbnailError> {
        let source = self
            .library
            .resolve_document(document)
            .await
            .map_err(|err| match err {
                LibraryError::InvalidName | LibraryError::NotFound => ThumbnailError::NotFound,
                LibraryError::Io(err) => ThumbnailError::RenderFailure(err.to_string()),
            })?;
        let target = self.cache_path(document);

        if self.is_cached(&source, &target).await {
            debug!(document, "thumbnail cache hit");
            return Ok(target);
        }

        let guard = self
            .locks
            .lock_with_timeout(document, self.render_wait)
            .await;
        if guard.is_none() {
            warn!(document, "timed out waiting for concurrent render, rendering anyway");
        }
        // 等锁期间可能已有其他请求完成渲染
        if self.is_cached(&source, &target).await {
            debug!(document, "thumbnail rendered by concurrent request");
            return Ok(target);
        }

        self.render(document, &source, &target).await?;
        Ok(target)
    }

    async fn is_cached(&self, source: &Path, target: &Path) -> bool {
        let Ok(thumbnail) = fs::metadata(target).await else {
            return false;
        };
        if !thumbnail.is_file() {
            return false;
        }
        if !self.refresh_stale {
            return true;
        }
        let document_modified = fs::metadata(source)
            .await
            .and_then(|metadata| metadata.modified());
        // 文档时间戳在未来时无法比较新旧，沿用已有缩略图
        match (document_modified, thumbnail.modified()) {
            (Ok(document_modified), Ok(thumbnail_modified)) => {
                thumbnail_modified >= document_modified || document_modified > SystemTime::now()
            }
            _ => true,
        }
    }

    async fn render(
        &self,
        document: &str,
        source: &Path,
        target: &Path,
    ) -> Result<(), ThumbnailError> {
        let started = Instant::now();
        let rasterizer = self.rasterizer.clone();
        let source = source.to_path_buf();
        let dpi = self.dpi;

        let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ThumbnailError> {
            let images = rasterizer
                .render(&source, PageRange::single(1), dpi)
                .map_err(|err| ThumbnailError::RenderFailure(err.to_string()))?;
            let first = images.into_iter().next().ok_or_else(|| {
                ThumbnailError::RenderFailure("rasterizer returned no pages".into())
            })?;
            let mut buffer = Cursor::new(Vec::new());
            first
                .write_to(&mut buffer, ImageFormat::Png)
                .map_err(|err| ThumbnailError::RenderFailure(err.to_string()))?;
            Ok(buffer.into_inner())
        })
        .await
        .map_err(|err| ThumbnailError::RenderFailure(err.to_string()))??;

        AtomicFile::write_all(target, &png)
            .await
            .map_err(|err| ThumbnailError::RenderFailure(err.to_string()))?;

        info!(
            document,
            bytes = png.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "thumbnail rendered"
        );
        Ok(())
    }

    /// 清理崩溃或中断遗留的临时文件，并回收空闲的渲染锁。
    pub async fn cleanup_temp_files(&self, max_age: Duration) -> io::Result<usize> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_temp_file_name(&name) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age && fs::remove_file(entry.path()).await.is_ok() {
                debug!(file = %name, "removed stale thumbnail temp file");
                removed += 1;
            }
        }

        self.locks.prune_idle().await;
        Ok(removed)
    }
}
