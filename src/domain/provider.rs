//! Link Classifier (§4.2) — maps a URL's host to one of a fixed set of
//! provider tags via a case-insensitive, first-match-wins substring table.
//!
//! Provider detection by substring on host is intentionally lax (it accepts
//! `115` inside arbitrary hosts). Preserve this behavior; tightening it would
//! reclassify historical records (spec.md §9).

/// Authoritative classifier table, in match-priority order. Each provider's
/// substrings are matched case-insensitively against the URL's host.
const PROVIDER_TABLE: &[(&str, &[&str])] = &[
    ("夸克网盘", &["quark", "夸克"]),
    ("阿里云盘", &["aliyundrive", "aliyun", "alipan", "阿里"]),
    ("百度网盘", &["baidu", "pan.baidu"]),
    ("115网盘", &["115.com", "115pan", "115cdn.com", "115网盘", "115"]),
    ("天翼云盘", &["cloud.189", "189.cn", "天翼"]),
    ("123云盘", &["123pan.com", "www.123pan.com", "123912.com", "www.123912.com", "123"]),
    ("UC网盘", &["ucdisk", "ucloud", "drive.uc.cn", "uc网盘"]),
    ("迅雷", &["xunlei", "thunder", "迅雷"]),
];

/// Sentinel tag for hosts matching no provider. Never appears as a key in a
/// persisted `Message.links` map.
pub const UNKNOWN: &str = "unknown";

/// Classify a URL's host into a provider tag, or `None` if it matches no
/// entry in the table (§4.2: "A URL whose host matches no entry is
/// classified as 'unknown' and excluded from the Message's `links`.").
pub fn classify_host(host: &str) -> Option<&'static str> {
    let host_lower = host.to_ascii_lowercase();
    for (tag, substrings) in PROVIDER_TABLE {
        if substrings.iter().any(|s| host_lower.contains(&s.to_ascii_lowercase())) {
            return Some(tag);
        }
    }
    None
}

/// All canonical provider tags the classifier can produce, in table order.
pub fn known_providers() -> impl Iterator<Item = &'static str> {
    PROVIDER_TABLE.iter().map(|(tag, _)| *tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quark_matches_both_substrings() {
        assert_eq!(classify_host("pan.quark.cn"), Some("夸克网盘"));
        assert_eq!(classify_host("夸克.example.com"), Some("夸克网盘"));
    }

    #[test]
    fn first_match_wins_for_overlapping_tables() {
        // Host contains both "baidu" (row 3) and "123" (row 6); table order
        // must pick the earlier row.
        assert_eq!(classify_host("baidu123.example.com"), Some("百度网盘"));
    }

    #[test]
    fn unknown_host_classifies_to_none() {
        assert_eq!(classify_host("example.com"), None);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_host("PAN.BAIDU.COM"), Some("百度网盘"));
    }

    #[test]
    fn lax_substring_matching_is_preserved() {
        // "115" appears inside an unrelated host — intentionally still matches.
        assert_eq!(classify_host("my115service.example.net"), Some("115网盘"));
    }
}
