//! PDF 列表、PDF 下载与缩略图处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path as UrlPath};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, if_range_matches, is_not_modified};
use crate::library::Library;
use crate::thumbnail::ThumbnailCache;

/// 列出文档库中的 PDF 文件名。
pub async fn list_pdfs(
    Extension(library): Extension<Arc<Library>>,
) -> Result<JsonResponse<Vec<String>>, ApiError> {
    let names = library.list().await?;
    info!(count = names.len(), "list pdfs");
    Ok(JsonResponse(names))
}

/// 返回 PDF 文件，支持 Range 请求。
pub async fn serve_pdf(
    UrlPath(filename): UrlPath<String>,
    request_headers: HeaderMap,
    Extension(library): Extension<Arc<Library>>,
) -> Result<Response, ApiError> {
    let target = library.resolve_document(&filename).await?;
    debug!(document = %filename, "serve pdf");
    serve_file(&target, &request_headers).await
}

/// 返回 PDF 首页缩略图，首次请求时生成。
pub async fn serve_thumbnail(
    UrlPath(filename): UrlPath<String>,
    request_headers: HeaderMap,
    Extension(thumbnails): Extension<Arc<ThumbnailCache>>,
) -> Result<Response, ApiError> {
    let target = thumbnails.resolve(&filename).await?;
    serve_file(&target, &request_headers).await
}

/// 以流的形式返回磁盘文件，附带缓存校验头与单段 Range 支持。
async fn serve_file(target: &Path, request_headers: &HeaderMap) -> Result<Response, ApiError> {
    // 元数据取自已打开的句柄，长度与实际读取的内容一致
    let mut file = File::open(target).await.map_err(|err| match err.kind() {
        ErrorKind::NotFound => ApiError::NotFound("not found".into()),
        _ => ApiError::Internal(err.to_string()),
    })?;
    let metadata = file
        .metadata()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mime = mime_guess::from_path(target).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, header_value(mime.essence_str())?);
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::ETAG, header_value(&etag)?);
    if let Some(modified) = modified {
        response_headers.insert(header::LAST_MODIFIED, header_value(&fmt_http_date(modified))?);
    }

    if is_not_modified(request_headers, &etag, modified) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let range = if if_range_matches(request_headers, &etag, modified) {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(path = %target.display(), start, end, length, "range request accepted");
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        response_headers.insert(
            header::CONTENT_RANGE,
            header_value(&format!("bytes {start}-{end}/{file_size}"))?,
        );
        response_headers.insert(header::CONTENT_LENGTH, header_value(&length.to_string())?);
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, header_value(&file_size.to_string())?);
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|_| ApiError::Internal("invalid header value".into()))
}

/// 解析 Range 头，返回可读取的闭区间。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if file_size == 0 {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
    let Some(range) = value.strip_prefix("bytes=") else {
        return Err(ApiError::BadRequest("invalid Range header".into()));
    };
    if range.contains(',') {
        return Err(ApiError::BadRequest("multiple ranges not supported".into()));
    }

    let mut parts = range.splitn(2, '-');
    let start_part = parts.next().unwrap_or_default().trim();
    let end_part = parts.next().unwrap_or_default().trim();

    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
        if suffix == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start: u64 = start_part
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
        let end: u64 = if end_part.is_empty() {
            file_size - 1
        } else {
            end_part
                .parse::<u64>()
                .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?
                .min(file_size - 1)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    Ok(Some((start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(value: &'static str, size: u64) -> Result<Option<(u64, u64)>, ApiError> {
        parse_range(Some(&HeaderValue::from_static(value)), size)
    }

    #[test]
    fn parses_bounded_and_open_ranges() {
        assert!(matches!(range("bytes=0-99", 1000), Ok(Some((0, 99)))));
        assert!(matches!(range("bytes=500-", 1000), Ok(Some((500, 999)))));
        assert!(matches!(range("bytes=-100", 1000), Ok(Some((900, 999)))));
        assert!(matches!(range("bytes=-5000", 1000), Ok(Some((0, 999)))));
        assert!(matches!(range("bytes=900-5000", 1000), Ok(Some((900, 999)))));
        assert!(matches!(parse_range(None, 1000), Ok(None)));
    }

    #[test]
    fn rejects_unsatisfiable_and_malformed_ranges() {
        assert!(matches!(
            range("bytes=1000-", 1000),
            Err(ApiError::RangeNotSatisfiable(1000))
        ));
        assert!(matches!(
            range("bytes=50-10", 1000),
            Err(ApiError::RangeNotSatisfiable(_))
        ));
        assert!(matches!(
            range("bytes=0-1", 0),
            Err(ApiError::RangeNotSatisfiable(0))
        ));
        assert!(matches!(range("items=0-1", 10), Err(ApiError::BadRequest(_))));
        assert!(matches!(range("bytes=0-1,4-5", 10), Err(ApiError::BadRequest(_))));
        assert!(matches!(range("bytes=a-b", 10), Err(ApiError::BadRequest(_))));
    }
}
