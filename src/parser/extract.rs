//! URL Extractor (§4.1) — enumerates every URL reachable from a message:
//! inline entities, inline-keyboard button URLs, the webpage-preview URL,
//! and a general bare-text scan recognizing both explicit `http(s)://` URLs
//! and bare domains (e.g. `pan.quark.cn/...`).

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Structured metadata accompanying a message's raw text, abstracting over
/// the Telegram transport's entity/button/webpage-preview shapes (kept out
/// of scope per spec.md §1 and specified only by this interface).
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    /// URLs carried by text-url entities (`url` field) or bare-url entities
    /// (the highlighted substring equals the URL).
    pub entity_urls: Vec<String>,
    /// URLs of every inline-keyboard button whose kind is a "URL button".
    pub button_urls: Vec<String>,
    /// URL of the message's webpage preview, if any.
    pub webpage_preview_url: Option<String>,
}

static EXPLICIT_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>\x22']+").unwrap());

/// Bare-domain scan: a dotted host followed by an optional path, anchored so
/// it won't match inside a larger word. Requires at least one path segment
/// or a dot-separated host of 2+ labels with a plausible TLD, matching the
/// kind of text `monitor.py`'s `URLExtract`-based scan recognizes.
static BARE_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:[a-z0-9][a-z0-9-]*\.)+[a-z]{2,}(?:/[^\s<>\x22']*)?").unwrap()
});

/// Returns the **set** of distinct URLs reachable from `text`/`metadata`,
/// after percent-decoding exactly once. Sources are consulted in the order
/// given by spec.md §4.1; duplicates across sources collapse into the set.
pub fn extract_all_urls(text: &str, metadata: &MessageMetadata) -> BTreeSet<String> {
    let mut urls = BTreeSet::new();

    for url in &metadata.entity_urls {
        urls.insert(percent_decode_once(url));
    }
    for url in &metadata.button_urls {
        urls.insert(percent_decode_once(url));
    }
    if let Some(url) = &metadata.webpage_preview_url {
        urls.insert(percent_decode_once(url));
    }

    for line in text.lines() {
        for m in EXPLICIT_URL_RE.find_iter(line) {
            urls.insert(percent_decode_once(m.as_str()));
        }
        for m in BARE_DOMAIN_RE.find_iter(line) {
            let candidate = m.as_str();
            // Skip fragments already covered by the explicit-scheme scan
            // (an `http://example.com` match also satisfies the bare regex).
            if EXPLICIT_URL_RE.is_match(candidate) {
                continue;
            }
            urls.insert(percent_decode_once(candidate));
        }
    }

    urls
}

/// Percent-decode a string exactly once. Invalid escapes are left verbatim
/// rather than erroring — a missing field is treated as absent elsewhere in
/// this component and the same tolerance applies here.
pub fn percent_decode_once(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Extract the host portion of a URL, with or without an explicit scheme,
/// for classification by the Link Classifier (§4.2).
pub fn extract_host(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let end = without_scheme
        .find(['/', '?', '#'])
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_explicit_and_bare_urls() {
        let text = "主链：https://pan.quark.cn/s/abc\n备用 pan.baidu.com/s/xyz?pwd=0000";
        let urls = extract_all_urls(text, &MessageMetadata::default());
        assert!(urls.contains("https://pan.quark.cn/s/abc"));
        assert!(urls.iter().any(|u| u.contains("pan.baidu.com/s/xyz")));
    }

    #[test]
    fn entity_and_button_and_webpage_urls_are_included() {
        let metadata = MessageMetadata {
            entity_urls: vec!["https://pan.quark.cn/s/e1".into()],
            button_urls: vec!["https://pan.baidu.com/s/b1".into()],
            webpage_preview_url: Some("https://cloud.189.cn/s/w1".into()),
        };
        let urls = extract_all_urls("no links here", &metadata);
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn percent_decoding_happens_exactly_once() {
        let decoded = percent_decode_once("https://pan.quark.cn/s/a%2520b");
        assert_eq!(decoded, "https://pan.quark.cn/s/a%20b");
    }

    #[test]
    fn duplicate_urls_collapse_into_one_set_entry() {
        let metadata = MessageMetadata {
            entity_urls: vec!["https://pan.quark.cn/s/abc".into()],
            ..Default::default()
        };
        let text = "见上 https://pan.quark.cn/s/abc";
        let urls = extract_all_urls(text, &metadata);
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn extract_host_strips_scheme_and_path() {
        assert_eq!(extract_host("https://pan.quark.cn/s/abc"), "pan.quark.cn");
        assert_eq!(extract_host("pan.baidu.com/s/xyz?pwd=1"), "pan.baidu.com");
    }
}
