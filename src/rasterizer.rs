//! PDF 光栅化后端：进程内 pdfium 与外部 `pdftoppm`。
//!
//! `Rasterizer::render` 为阻塞调用，由调用方放入 `spawn_blocking` 执行。

use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{Args, RasterizerKind};

/// PDF points per inch; pdfium sizes pages in points.
const POINTS_PER_INCH: f32 = 72.0;

/// 1 起始、闭区间的页码范围。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub const fn single(page: u32) -> Self {
        Self {
            first: page,
            last: page,
        }
    }

    fn is_valid(self) -> bool {
        self.first >= 1 && self.first <= self.last
    }
}

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("rasterizer unavailable: {0}")]
    Unavailable(String),
    #[error("invalid page range {}-{}", .0.first, .0.last)]
    InvalidRange(PageRange),
    #[error("failed to open document: {0}")]
    Document(String),
    #[error("rasterizer process failed: {0}")]
    Process(String),
    #[error("failed to decode rendered page: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 将 PDF 页码范围转换为位图。
pub trait Rasterizer: Send + Sync {
    fn render(
        &self,
        document: &Path,
        pages: PageRange,
        dpi: u32,
    ) -> Result<Vec<DynamicImage>, RasterizeError>;
}

/// 根据配置构建光栅化后端；pdfium 无法绑定时直接报错，服务不启动。
pub fn build_rasterizer(args: &Args) -> Result<Arc<dyn Rasterizer>, RasterizeError> {
    let rasterizer: Arc<dyn Rasterizer> = match args.rasterizer {
        RasterizerKind::Pdfium => Arc::new(PdfiumRasterizer::bind(args.pdfium_lib_dir.as_deref())?),
        RasterizerKind::Pdftoppm => Arc::new(PdftoppmRasterizer::new(args.pdftoppm_bin.clone())),
    };
    Ok(rasterizer)
}

pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// 优先从指定目录绑定 pdfium，失败时回退到系统库。
    pub fn bind(lib_dir: Option<&str>) -> Result<Self, RasterizeError> {
        let bindings = match lib_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .or_else(|_| Pdfium::bind_to_system_library()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|err| RasterizeError::Unavailable(format!("failed to bind pdfium: {err:?}")))?;
        info!("pdfium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn render(
        &self,
        document: &Path,
        pages: PageRange,
        dpi: u32,
    ) -> Result<Vec<DynamicImage>, RasterizeError> {
        if !pages.is_valid() {
            return Err(RasterizeError::InvalidRange(pages));
        }
        let document = self
            .pdfium
            .load_pdf_from_file(document, None)
            .map_err(|err| RasterizeError::Document(format!("{err:?}")))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / POINTS_PER_INCH);
        let page_count = document.pages().len() as u32;
        let last = pages.last.min(page_count);

        let mut images = Vec::new();
        for number in pages.first..=last {
            let page = document
                .pages()
                .get((number - 1) as u16)
                .map_err(|err| RasterizeError::Document(format!("{err:?}")))?;
            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| RasterizeError::Document(format!("{err:?}")))?;
            let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
            let image = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(
                || RasterizeError::Document(format!("bitmap size mismatch for page {number}")),
            )?;
            images.push(DynamicImage::ImageRgba8(image));
        }
        Ok(images)
    }
}

/// 通过 poppler 的 `pdftoppm` 渲染。
pub struct PdftoppmRasterizer {
    program: String,
}

impl PdftoppmRasterizer {
    pub fn new(program: String) -> Self {
        Self { program }
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn render(
        &self,
        document: &Path,
        pages: PageRange,
        dpi: u32,
    ) -> Result<Vec<DynamicImage>, RasterizeError> {
        if !pages.is_valid() {
            return Err(RasterizeError::InvalidRange(pages));
        }
        let workdir = tempfile::tempdir()?;
        let prefix = workdir.path().join("page");

        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(pages.first.to_string())
            .arg("-l")
            .arg(pages.last.to_string())
            .arg(document)
            .arg(&prefix)
            .output()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => {
                    RasterizeError::Unavailable(format!("{} not found", self.program))
                }
                _ => RasterizeError::Io(err),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RasterizeError::Process(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // pdftoppm 以统一宽度的零填充页码命名输出，字典序即页序
        let mut outputs = std::fs::read_dir(workdir.path())?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().map(|ext| ext == "png").unwrap_or(false))
            .collect::<Vec<_>>();
        outputs.sort();

        outputs
            .iter()
            .map(|path| {
                let bytes = std::fs::read(path)?;
                Ok(image::load_from_memory_with_format(
                    &bytes,
                    ImageFormat::Png,
                )?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_validation() {
        assert!(PageRange::single(1).is_valid());
        assert!(!PageRange::single(0).is_valid());
        assert!(!PageRange { first: 3, last: 2 }.is_valid());
    }

    #[test]
    fn pdftoppm_rejects_invalid_range_before_spawning() {
        let rasterizer = PdftoppmRasterizer::new("pdftoppm".into());
        let result = rasterizer.render(Path::new("report.pdf"), PageRange::single(0), 72);
        assert!(matches!(result, Err(RasterizeError::InvalidRange(_))));
    }

    #[test]
    fn default_backend_builds_without_pdfium() {
        use clap::Parser;
        let args = Args::try_parse_from(["pdf-shelf"]).expect("parse defaults");
        assert_eq!(args.rasterizer, RasterizerKind::Pdftoppm);
        assert!(build_rasterizer(&args).is_ok());
    }

    #[test]
    fn missing_pdftoppm_binary_is_unavailable() {
        let rasterizer = PdftoppmRasterizer::new("pdf-shelf-no-such-binary".into());
        let result = rasterizer.render(Path::new("report.pdf"), PageRange::single(1), 72);
        assert!(matches!(result, Err(RasterizeError::Unavailable(_))));
    }
}
