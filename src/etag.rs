//! ETag 计算与条件 GET 校验。

use axum::http::{HeaderMap, header};
use httpdate::parse_http_date;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    if let Ok(modified) = metadata.modified()
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// 判断客户端缓存是否仍然有效（应返回 304）。
///
/// `If-None-Match` 存在时优先生效，否则比较 `If-Modified-Since`。
pub fn is_not_modified(
    headers: &HeaderMap,
    current_etag: &str,
    modified: Option<SystemTime>,
) -> bool {
    if let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return value.trim() == "*" || etag_matches(value, current_etag);
    }

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_http_date(v).ok());
    match (since, modified) {
        // HTTP 日期精度为秒
        (Some(since), Some(modified)) => truncate_to_secs(modified) <= since,
        _ => false,
    }
}

/// 判断 `If-Range` 是否允许返回部分内容。
///
/// 弱 ETag 不能用于 `If-Range`；HTTP 日期须与修改时间（秒级）完全一致。
/// 未携带该头时返回 true。
pub fn if_range_matches(
    headers: &HeaderMap,
    current_etag: &str,
    modified: Option<SystemTime>,
) -> bool {
    let Some(value) = headers
        .get(header::IF_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    else {
        return true;
    };

    if value.starts_with('"') || value.starts_with("W/") {
        return !is_weak(value) && !is_weak(current_etag) && value == current_etag;
    }

    match (parse_http_date(value).ok(), modified) {
        (Some(date), Some(modified)) => truncate_to_secs(modified) == date,
        _ => false,
    }
}

fn is_weak(etag: &str) -> bool {
    etag.starts_with("W/")
}

fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => UNIX_EPOCH + std::time::Duration::from_secs(duration.as_secs()),
        Err(_) => time,
    }
}

fn etag_matches(header_value: &str, current: &str) -> bool {
    header_value
        .split(',')
        .map(|item| item.trim())
        .any(|item| item == current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use httpdate::fmt_http_date;
    use std::time::Duration;

    #[test]
    fn if_none_match_list_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("W/\"1-2-3\", W/\"10-20-30\""),
        );
        assert!(is_not_modified(&headers, "W/\"10-20-30\"", None));
        assert!(!is_not_modified(&headers, "W/\"4-5-6\"", None));
    }

    #[test]
    fn if_modified_since_compares_whole_seconds() {
        let modified = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&fmt_http_date(modified)).expect("header value"),
        );
        assert!(is_not_modified(&headers, "W/\"x\"", Some(modified)));

        let later = modified + Duration::from_secs(5);
        assert!(!is_not_modified(&headers, "W/\"x\"", Some(later)));
    }

    #[test]
    fn weak_etag_never_satisfies_if_range() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_RANGE, HeaderValue::from_static("W/\"10-20-30\""));
        assert!(!if_range_matches(&headers, "W/\"10-20-30\"", None));

        headers.insert(header::IF_RANGE, HeaderValue::from_static("\"10-20-30\""));
        assert!(!if_range_matches(&headers, "W/\"10-20-30\"", None));
        assert!(if_range_matches(&headers, "\"10-20-30\"", None));
        assert!(!if_range_matches(&headers, "\"10-20-31\"", None));
    }

    #[test]
    fn if_range_date_must_equal_last_modified() {
        let modified = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_RANGE,
            HeaderValue::from_str(&fmt_http_date(modified)).expect("header value"),
        );
        assert!(if_range_matches(&headers, "W/\"x\"", Some(modified)));
        assert!(!if_range_matches(
            &headers,
            "W/\"x\"",
            Some(modified + Duration::from_secs(5))
        ));
        assert!(!if_range_matches(&headers, "W/\"x\"", None));
        assert!(if_range_matches(&HeaderMap::new(), "W/\"x\"", None));
    }

    #[test]
    fn no_conditional_headers_is_modified() {
        assert!(!is_not_modified(&HeaderMap::new(), "W/\"x\"", None));
    }
}
