//! CLI arguments and server configuration defaults.

use clap::{Parser, ValueEnum};
use shadow_rs::formatcp;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_AUTH_USER: &str = "admin";
pub const DEFAULT_AUTH_PASS: &str = "admin";
pub const AUTH_COOKIE_NAME: &str = "PDF_SESSION";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOGIN_WINDOW_SECS: u64 = 5 * 60;
pub const DEFAULT_LOGIN_LOCKOUT_SECS: u64 = 10 * 60;
pub const DEFAULT_THUMBNAIL_DPI: u32 = 72;
pub const DEFAULT_RENDER_WAIT_SECS: u64 = 30;
pub const SESSION_PRUNE_INTERVAL_SECS: u64 = 300;
pub const TEMP_CLEAN_INTERVAL_SECS: u64 = 900;
pub const TEMP_FILE_TTL_SECS: u64 = 60 * 60;
pub const CORS_MIRROR_ORIGIN: &str = "*";

/// Loads `.env` from the working directory or one of its parents, if present.
///
/// Values already set in the process environment take precedence.
pub fn load_env_file() -> Option<PathBuf> {
    dotenv::dotenv().ok()
}

/// Which backend turns a PDF page into pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RasterizerKind {
    /// In-process rendering through a dynamically bound libpdfium.
    Pdfium,
    /// Poppler's `pdftoppm` run as a subprocess.
    Pdftoppm,
}

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "pdf-shelf", version = VERSION_INFO, about = "PDF library server")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "PDF_DIR",
        default_value = "pdfs",
        help = "Directory holding the PDF documents"
    )]
    pub pdf_dir: String,
    #[arg(
        short = 't',
        long,
        env = "PDF_THUMBNAIL_DIR",
        default_value = "thumbnails",
        help = "Directory for cached first-page thumbnails"
    )]
    pub thumbnail_dir: String,
    #[arg(
        long,
        env = "LOGIN_USERNAME",
        default_value = DEFAULT_AUTH_USER,
        help = "Login username"
    )]
    pub auth_user: String,
    #[arg(
        long,
        env = "LOGIN_PASSWORD",
        default_value = DEFAULT_AUTH_PASS,
        help = "Login password"
    )]
    pub auth_pass: String,
    #[arg(
        short = 'b',
        long,
        env = "PDF_BIND",
        default_value = "127.0.0.1",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "VITE_FLASK_PORT",
        default_value_t = 5000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "PDF_CORS_ORIGINS",
        default_value = CORS_MIRROR_ORIGIN,
        help = "Comma separated CORS origins, `*` mirrors the request origin, empty disables CORS"
    )]
    pub cors_origins: String,
    #[arg(
        long,
        env = "PDF_SESSION_TTL_SECS",
        default_value_t = DEFAULT_SESSION_TTL_SECS,
        help = "Session cookie lifetime in seconds"
    )]
    pub session_ttl_secs: u64,
    #[arg(
        long,
        env = "PDF_LOGIN_MAX_ATTEMPTS",
        default_value_t = DEFAULT_LOGIN_MAX_ATTEMPTS,
        help = "Max login attempts before lockout (0 to disable)"
    )]
    pub login_max_attempts: u32,
    #[arg(
        long,
        env = "PDF_LOGIN_WINDOW_SECS",
        default_value_t = DEFAULT_LOGIN_WINDOW_SECS,
        help = "Login attempt window in seconds"
    )]
    pub login_window_secs: u64,
    #[arg(
        long,
        env = "PDF_LOGIN_LOCKOUT_SECS",
        default_value_t = DEFAULT_LOGIN_LOCKOUT_SECS,
        help = "Login lockout time after max attempts"
    )]
    pub login_lockout_secs: u64,
    #[arg(
        long,
        env = "PDF_RASTERIZER",
        value_enum,
        default_value_t = RasterizerKind::Pdftoppm,
        help = "Backend used to render thumbnails"
    )]
    pub rasterizer: RasterizerKind,
    #[arg(
        long,
        env = "PDF_PDFIUM_LIB_DIR",
        help = "Directory containing the pdfium shared library"
    )]
    pub pdfium_lib_dir: Option<String>,
    #[arg(
        long,
        env = "PDF_PDFTOPPM_BIN",
        default_value = "pdftoppm",
        help = "pdftoppm executable"
    )]
    pub pdftoppm_bin: String,
    #[arg(
        long,
        env = "PDF_THUMBNAIL_DPI",
        default_value_t = DEFAULT_THUMBNAIL_DPI,
        value_parser = clap::value_parser!(u32).range(1..=600),
        help = "Thumbnail render resolution"
    )]
    pub thumbnail_dpi: u32,
    #[arg(
        long,
        env = "PDF_RENDER_WAIT_SECS",
        default_value_t = DEFAULT_RENDER_WAIT_SECS,
        help = "How long a request waits on a concurrent render of the same document"
    )]
    pub render_wait_secs: u64,
    #[arg(
        long,
        env = "PDF_REFRESH_STALE_THUMBNAILS",
        help = "Re-render thumbnails older than their document"
    )]
    pub refresh_stale_thumbnails: bool,
}
