//! Controlled label vocabulary and Stage C keyword/ad tables (§4.3, §9).
//!
//! Ported byte-for-byte from `examples/original_source/app/core/monitor.py`'s
//! `valid_labels` set and `skip_keywords`/ad-pattern lists, since spec.md
//! describes them only by example. Kept as plain data so tests can exercise
//! them directly, matching spec.md §9 ("data, not code").

/// The controlled label vocabulary: quality/variant markers admitted as
/// per-link annotations in §4.3 Stage B.
pub const VALID_LABELS: &[&str] = &[
    "普码", "高码", "主链", "备用", "4K", "HDR", "SDR", "1080P", "4K 120FPS", "4K HDR", "4K HQ",
    "4K EDR", "4K DV", "4K SDR", "4K 60FPS", "4K HQ 高码率", "前 42 集", "ATVP", "1080P 5.96G",
    "4K HDR 60FPS", "4K 5.96G", "4K 14.9GB", "4K 8.5GB", "4K 24.1GB", "4K HDR&DV",
    "大包", "大包2", "大包3", "大包4", "大包5",
    "1号文件夹", "2号文件夹", "3号文件夹", "4号文件夹", "5号文件夹",
    "备用链", "备用链接", "普码版", "高码版", "标准版", "高清版",
    "4K版", "1080P版", "HDR版", "杜比版", "完整版", "精简版",
    "导演版", "加长版", "国语版", "粤语版", "英语版", "多语版",
    "无删减", "剧场版", "特别版", "典藏版", "豪华版",
];

/// Header-line keyword prefixes mapped to a `Message` metadata field. A
/// keyword mapping to `None` means the line is dropped with no field write
/// (`monitor.py`'s `🔍 投稿/搜索` and `⚠️`).
pub const SKIP_KEYWORDS: &[(&str, Option<&str>)] = &[
    ("🎉 来自", Some("source")),
    ("📢 频道", Some("channel")),
    ("👥 群组", Some("group_name")),
    ("🤖 投稿", Some("bot")),
    ("🔍 投稿/搜索", None),
    ("⚠️", None),
];

/// Leading bullet markers stripped from a line before keyword matching.
pub const BULLET_PREFIXES: &[&str] = &["* ", "- ", "+ ", "> ", ">> ", "• ", "➤ ", "▪ ", "√ "];

/// Size-line unit tokens; a `大小：` line is retained only if its remainder
/// contains one of these (case-insensitive).
pub const SIZE_UNIT_TOKENS: &[&str] =
    &["GB", "MB", "TB", "KB", "G", "M", "T", "K", "B", "字节", "左右", "约", "每集", "单集"];

/// Literal line prefixes dropped outright in Stage C.
pub const DROPPED_LINE_PREFIXES: &[&str] = &["链接：", "描述区域", "分享：", "网址：", "🌍", "🔥"];

/// Hardcoded ad-pattern fragments for the hosting operator's airport and
/// VidHub promos; a line containing any of these (case-insensitive) is
/// dropped in Stage C.
pub const AD_PATTERN_FRAGMENTS: &[&[&str]] = &[
    &["群主自用机场", "守候网络", "9折活动"],
    &["云盘播放神器", "VidHub"],
];

/// Bare provider short-names stripped from the finalized description text.
pub const PROVIDER_SHORT_NAMES: &[&str] =
    &["夸克", "迅雷", "百度", "UC", "阿里", "天翼", "115", "123云盘"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_contains_core_markers() {
        for label in ["主链", "备用", "普码", "高码", "4K", "HDR", "1080P", "导演版", "国语版"] {
            assert!(VALID_LABELS.contains(&label), "missing label: {label}");
        }
    }

    #[test]
    fn skip_keywords_map_to_expected_fields() {
        let map: std::collections::HashMap<_, _> = SKIP_KEYWORDS.iter().cloned().collect();
        assert_eq!(map.get("🎉 来自"), Some(&Some("source")));
        assert_eq!(map.get("🔍 投稿/搜索"), Some(&None));
    }
}
