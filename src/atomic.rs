//! 临时写入与原子替换：读者只会看到完整的缓存文件。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// 临时文件名前缀与后缀标记，后台清理据此识别残留文件。
pub const TEMP_MARKER: &str = ".tmp.";

/// 可用于原子替换的临时文件封装。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// 在目标路径同目录创建隐藏的临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid target path"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{base}{TEMP_MARKER}{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    /// 写入完整内容并替换目标；失败时清理临时文件。
    pub async fn write_all(target: &Path, data: &[u8]) -> io::Result<()> {
        let mut atomic = Self::new(target).await?;
        if let Err(err) = atomic.file.write_all(data).await {
            atomic.cleanup().await;
            return Err(err);
        }
        atomic.finalize().await
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步并原子替换目标文件。
    pub async fn finalize(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok()
                    && fs::rename(&self.temp_path, &self.target).await.is_ok()
                {
                    return sync_parent(&self.target).await;
                }
            }
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        sync_parent(&self.target).await
    }
}

/// 判断文件名是否为 `AtomicFile` 产生的临时文件。
pub fn is_temp_file_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

async fn sync_parent(target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        let _ = sync_dir(parent).await;
    }
    Ok(())
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_all_replaces_target_without_leftovers() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("report.pdf.png");
        std::fs::write(&target, b"old").expect("seed target");

        AtomicFile::write_all(&target, b"new contents")
            .await
            .expect("atomic write");

        assert_eq!(std::fs::read(&target).expect("read"), b"new contents");
        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .expect("read dir")
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_removes_temp_file() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("a.png");
        let atomic = AtomicFile::new(&target).await.expect("create temp");
        atomic.cleanup().await;

        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn recognizes_temp_names() {
        assert!(is_temp_file_name(".a.pdf.png.tmp.0d9c"));
        assert!(!is_temp_file_name("a.pdf.png"));
    }
}
