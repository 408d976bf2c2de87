//! 文档库：只读访问 PDF 目录，校验文档名并解析路径。

use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;

pub const DOCUMENT_EXTENSION: &str = "pdf";

#[derive(Clone, Debug)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 列出目录下全部 PDF 文件名（按小写名排序）。
    pub async fn list(&self) -> Result<Vec<String>, LibraryError> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !has_document_extension(&name) {
                continue;
            }
            // file_type 不跟随符号链接，链接本身会被跳过
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            names.push(name);
        }

        names.sort_by_key(|name| name.to_lowercase());
        Ok(names)
    }

    /// 校验文档名并返回其在库中的路径，文档必须是存在的普通文件。
    pub async fn resolve_document(&self, name: &str) -> Result<PathBuf, LibraryError> {
        validate_document_name(name)?;
        let target = self.root.join(name);
        match fs::symlink_metadata(&target).await {
            Ok(metadata) if metadata.file_type().is_file() => Ok(target),
            Ok(_) => Err(LibraryError::NotFound),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(LibraryError::NotFound),
            Err(err) => Err(LibraryError::Io(err)),
        }
    }
}

/// 文档名必须是单个路径分量，且以 `.pdf` 结尾。
pub fn validate_document_name(name: &str) -> Result<(), LibraryError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(LibraryError::InvalidName);
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(LibraryError::InvalidName),
    }
    if !has_document_extension(name) {
        return Err(LibraryError::InvalidName);
    }
    Ok(())
}

fn has_document_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

#[derive(Debug)]
pub enum LibraryError {
    InvalidName,
    NotFound,
    Io(io::Error),
}

impl From<io::Error> for LibraryError {
    fn from(err: io::Error) -> Self {
        LibraryError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{Library, LibraryError, validate_document_name};
    use tempfile::tempdir;

    #[test]
    fn document_name_validation() {
        assert!(validate_document_name("report.pdf").is_ok());
        assert!(validate_document_name("Annual Report.PDF").is_ok());
        assert!(validate_document_name("notes.txt").is_err());
        assert!(validate_document_name("../secret.pdf").is_err());
        assert!(validate_document_name("nested/report.pdf").is_err());
        assert!(validate_document_name("..\\report.pdf").is_err());
        assert!(validate_document_name(".hidden.pdf").is_err());
        assert!(validate_document_name("").is_err());
    }

    #[tokio::test]
    async fn list_returns_only_pdf_files_sorted() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        std::fs::write(root.join("b.pdf"), b"%PDF").expect("write b");
        std::fs::write(root.join("A.PDF"), b"%PDF").expect("write a");
        std::fs::write(root.join("notes.txt"), b"text").expect("write txt");
        std::fs::write(root.join(".draft.pdf"), b"%PDF").expect("write hidden");
        std::fs::create_dir(root.join("folder.pdf")).expect("create dir");

        let library = Library::new(root.to_path_buf());
        let names = library.list().await.expect("list");
        assert_eq!(names, vec!["A.PDF".to_string(), "b.pdf".to_string()]);
    }

    #[tokio::test]
    async fn resolve_missing_document_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let library = Library::new(temp.path().to_path_buf());
        let result = library.resolve_document("missing.pdf").await;
        assert!(matches!(result, Err(LibraryError::NotFound)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_symlink() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root).expect("create root");

        let outside = temp.path().join("outside.pdf");
        std::fs::write(&outside, b"%PDF").expect("write outside file");
        symlink(&outside, root.join("link.pdf")).expect("symlink");

        let library = Library::new(root);
        let result = library.resolve_document("link.pdf").await;
        assert!(matches!(result, Err(LibraryError::NotFound)));
    }
}
