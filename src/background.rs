//! 会话清理与缩略图临时文件清理的后台任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::{AuthConfig, prune_expired_sessions, prune_login_attempts};
use crate::config::{SESSION_PRUNE_INTERVAL_SECS, TEMP_CLEAN_INTERVAL_SECS, TEMP_FILE_TTL_SECS};
use crate::thumbnail::ThumbnailCache;

/// 启动后台任务（会话清理与缓存目录临时文件清理）。
pub fn spawn_background_tasks(auth: Arc<AuthConfig>, thumbnails: Arc<ThumbnailCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            prune_expired_sessions(&auth).await;
            prune_login_attempts(&auth).await;
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_CLEAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match thumbnails
                .cleanup_temp_files(Duration::from_secs(TEMP_FILE_TTL_SECS))
                .await
            {
                Ok(0) => {}
                Ok(removed) => info!(removed, "removed stale thumbnail temp files"),
                Err(err) => warn!(error = %err, "thumbnail temp cleanup failed"),
            }
        }
    });
}
