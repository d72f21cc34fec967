//! Probe protocol (§4.6.2), grounded on
//! `examples/original_source/link_validator.py::check_single_link`.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

/// Outcome of a single probe. `reason` is `None` only when `is_valid`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub is_valid: bool,
    pub status_code: Option<u16>,
    pub response_time: Option<f64>,
    pub reason: Option<&'static str>,
}

impl ProbeOutcome {
    fn valid(status: u16, elapsed: Duration) -> Self {
        Self { is_valid: true, status_code: Some(status), response_time: Some(elapsed.as_secs_f64()), reason: None }
    }

    fn invalid(reason: &'static str, status: Option<u16>, elapsed: Option<Duration>) -> Self {
        Self { is_valid: false, status_code: status, response_time: elapsed.map(|d| d.as_secs_f64()), reason: Some(reason) }
    }
}

pub const REASON_FORMAT_ERROR: &str = "格式错误";
pub const REASON_STATUS_CODE: &str = "状态码错误";
pub const REASON_NETDISK_INVALID: &str = "网盘链接失效";
pub const REASON_PAGE_ERROR: &str = "页面错误";
pub const REASON_NETWORK_TIMEOUT: &str = "网络超时";
pub const REASON_NETWORK_ERROR: &str = "网络错误";
pub const REASON_CHECK_EXCEPTION: &str = "检测异常";
pub const REASON_PROVIDER_LIMITED: &str = "网盘限制";

pub const RETRYABLE_REASONS: &[&str] =
    &[REASON_NETWORK_TIMEOUT, REASON_NETWORK_ERROR, REASON_STATUS_CODE, REASON_CHECK_EXCEPTION];
pub const TERMINAL_REASONS: &[&str] =
    &[REASON_FORMAT_ERROR, REASON_NETDISK_INVALID, REASON_PAGE_ERROR, REASON_PROVIDER_LIMITED];

pub fn is_retryable(reason: &str) -> bool {
    RETRYABLE_REASONS.contains(&reason)
}

static GENERAL_INVALID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"页面不存在",
        r"访问被拒绝",
        r"服务器错误",
        r"页面未找到",
        r"无法访问",
        r"连接超时",
        r"404\s*(错误|页面|not\s*found)",
    ]
    .iter()
    .map(|p| regex::RegexBuilder::new(p).case_insensitive(true).build().unwrap())
    .collect()
});

/// Provider-specific invalid-content phrases (§4.6.2 step 5).
fn netdisk_invalid_patterns(provider: &str) -> &'static [&'static str] {
    match provider {
        "百度网盘" => &["文件不存在", "分享已失效", "链接已过期", "分享链接已失效", "文件已被删除", "分享已取消", "访问被拒绝"],
        "夸克网盘" => &["文件不存在或已被删除", "分享链接已失效", "文件已被删除", "分享已过期", "访问被拒绝"],
        _ => &["文件不存在", "分享已失效", "链接已过期", "文件已被删除"],
    }
}

/// Check `content` against a provider's invalid-content phrases, then the
/// general set, returning the matched reason if any.
pub fn classify_content(provider: &str, content: &str) -> Option<&'static str> {
    for phrase in netdisk_invalid_patterns(provider) {
        if content.contains(phrase) {
            return Some(REASON_NETDISK_INVALID);
        }
    }
    if GENERAL_INVALID_PATTERNS.iter().any(|re| re.is_match(content)) {
        return Some(REASON_PAGE_ERROR);
    }
    None
}

/// Reject anything that is not an absolute `http`/`https` URL (§4.6.2 step 1).
pub fn validate_url_format(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A prober backend, dispatched by enum rather than a `dyn` trait object,
/// since there are only ever two variants. The `Stub` variant lets tests
/// exercise retry/circuit-breaker logic with no real network I/O
/// (SPEC_FULL.md §8).
pub enum Prober {
    Http(HttpProber),
    /// Not `cfg(test)`-gated so `tests/test_api.rs` can drive the
    /// link-validation batch engine without real network I/O — integration
    /// tests compile the library without `cfg(test)` set.
    Stub(fn(&str, &str) -> ProbeOutcome),
}

impl Prober {
    pub async fn probe(&self, url: &str, provider: &str) -> ProbeOutcome {
        match self {
            Prober::Http(inner) => inner.probe(url, provider).await,
            Prober::Stub(f) => f(url, provider),
        }
    }
}

/// Production prober backed by `reqwest` (rustls-tls), browser-like headers
/// with Brotli intentionally excluded, 15s total deadline (§4.6.2 step 3).
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".parse().unwrap());
        headers.insert(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8".parse().unwrap());
        headers.insert(reqwest::header::ACCEPT_ENCODING, "gzip, deflate".parse().unwrap());
        headers.insert(reqwest::header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert("Sec-Fetch-Dest", "document".parse().unwrap());
        headers.insert("Sec-Fetch-Mode", "navigate".parse().unwrap());
        headers.insert("Sec-Fetch-Site", "none".parse().unwrap());

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpProber {
    async fn probe(&self, url: &str, provider: &str) -> ProbeOutcome {
        if !validate_url_format(url) {
            return ProbeOutcome::invalid(REASON_FORMAT_ERROR, None, None);
        }

        let started = std::time::Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return ProbeOutcome::invalid(REASON_NETWORK_TIMEOUT, None, Some(started.elapsed())),
            Err(_) => return ProbeOutcome::invalid(REASON_NETWORK_ERROR, None, Some(started.elapsed())),
        };

        let status = response.status().as_u16();
        if status != 200 {
            return ProbeOutcome::invalid(REASON_STATUS_CODE, Some(status), Some(started.elapsed()));
        }

        let body = match response.text().await {
            Ok(text) => text,
            Err(_) => return ProbeOutcome::invalid(REASON_CHECK_EXCEPTION, Some(status), Some(started.elapsed())),
        };

        if let Some(reason) = classify_content(provider, &body) {
            return ProbeOutcome::invalid(reason, Some(status), Some(started.elapsed()));
        }

        ProbeOutcome::valid(status, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert!(!validate_url_format("ftp://example.com/x"));
        assert!(!validate_url_format("not a url"));
        assert!(validate_url_format("https://pan.quark.cn/s/abc"));
    }

    #[test]
    fn classifies_provider_specific_invalid_content() {
        assert_eq!(classify_content("百度网盘", "该分享已失效"), Some(REASON_NETDISK_INVALID));
    }

    #[test]
    fn classifies_general_invalid_content() {
        assert_eq!(classify_content("夸克网盘", "抱歉，页面不存在"), Some(REASON_PAGE_ERROR));
    }

    #[test]
    fn valid_content_classifies_to_none() {
        assert_eq!(classify_content("夸克网盘", "一切正常的分享页面"), None);
    }

    #[test]
    fn retryable_and_terminal_reasons_partition_the_space() {
        for r in RETRYABLE_REASONS {
            assert!(is_retryable(r));
        }
        for r in TERMINAL_REASONS {
            assert!(!is_retryable(r));
        }
    }
}
