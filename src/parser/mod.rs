//! Message Parser (§4.3) — a pure function from `(text, metadata)` to a
//! normalized record: title, description, tags, and typed cloud-storage
//! links with optional quality/variant labels.

pub mod extract;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::labels::{
    AD_PATTERN_FRAGMENTS, BULLET_PREFIXES, DROPPED_LINE_PREFIXES, PROVIDER_SHORT_NAMES,
    SIZE_UNIT_TOKENS, SKIP_KEYWORDS, VALID_LABELS,
};
use crate::domain::provider::classify_host;
use crate::domain::LinkEntry;
use extract::{extract_all_urls, extract_host, MessageMetadata};

/// Output of the Message Parser: everything needed to build a `Message`
/// except the store-assigned `id`, `timestamp`, `netdisk_types`, and
/// `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    pub title: String,
    pub description: String,
    pub links: BTreeMap<String, Vec<LinkEntry>>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub channel: Option<String>,
    pub group_name: Option<String>,
    pub bot: Option<String>,
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([\p{Han}A-Za-z0-9_]+)").unwrap());
static AT_HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]+").unwrap());
static HTTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://").unwrap());
static SIZE_HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\p{Han}A-Za-z0-9]*大小[：:\s]").unwrap());
static VIA_RE: Lazy<Regex> =
    Lazy::new(|| regex::RegexBuilder::new(r"via\s*\S*").case_insensitive(true).build().unwrap());
static META_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    regex::RegexBuilder::new(r"(标签|投稿人|频道|搜索|机场)\s*[：:]")
        .case_insensitive(true)
        .build()
        .unwrap()
});
static TRAILING_COLON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)：\s*$").unwrap());
static PUNCT_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[.。·、,，\-]+$").unwrap());
/// A standalone quality/variant label (e.g. a lone `高码` line used by Stage
/// B rule (c) as the "previous short line" label source). Such a line is
/// dropped outright rather than entering the description.
static LABEL_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(主链|备用|普码|高码|HDR|杜比|IQ|[\p{Han}A-Za-z0-9]+码)$").unwrap());

/// Parse `text` (plus any transport metadata) into a normalized record.
///
/// Deterministic: given the same input this produces the same record
/// byte-for-byte (spec.md §4.3).
pub fn parse_message(text: &str, metadata: &MessageMetadata) -> ParsedMessage {
    let original_lines: Vec<&str> = text.lines().collect();

    // Stage B — link collection, run over the full original text so label
    // lookup can reference any line (spec.md §4.3 Stage B searches "the
    // original lines").
    let all_urls = extract_all_urls(text, metadata);
    let mut links: BTreeMap<String, Vec<LinkEntry>> = BTreeMap::new();
    for url in &all_urls {
        let host = extract_host(url);
        let Some(provider) = classify_host(host) else { continue };
        let label = find_label(&original_lines, url);
        let entry = links.entry(provider.to_string()).or_default();
        if !entry.iter().any(|e| &e.url == url) {
            entry.push(LinkEntry { label, url: url.clone() });
        }
    }

    // Stage A — title.
    let (title, remaining_lines) = extract_title(&original_lines);

    // Stage C — description and tags.
    let mut tags: Vec<String> = Vec::new();
    let mut seen_tags = std::collections::HashSet::new();
    let mut desc_lines: Vec<String> = Vec::new();
    let mut source = None;
    let mut channel = None;
    let mut group_name = None;
    let mut bot = None;

    for raw_line in &remaining_lines {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if HTTP_RE.is_match(line) || BARE_DOMAIN_HINT.is_match(line) {
            continue;
        }
        if AT_HANDLE_RE.is_match(line) {
            continue;
        }

        let cleaned = strip_bullet_prefix(line);

        if LABEL_LINE_RE.is_match(&cleaned) {
            continue;
        }

        if let Some((field, value)) = match_skip_keyword(&cleaned) {
            match field {
                Some("source") => source = Some(value),
                Some("channel") => channel = Some(value),
                Some("group_name") => group_name = Some(value),
                Some("bot") => bot = Some(value),
                _ => {}
            }
            continue;
        }

        if SIZE_HEAD_RE.is_match(&cleaned) {
            let remainder = SIZE_HEAD_RE.replace(&cleaned, "");
            if contains_size_unit(&remainder) {
                desc_lines.push(cleaned);
            }
            continue;
        }

        if DROPPED_LINE_PREFIXES.iter().any(|p| cleaned.starts_with(p)) {
            continue;
        }

        if is_ad_line(&cleaned) {
            continue;
        }

        let mut cleaned_line = cleaned;
        for m in TAG_RE.find_iter(&cleaned_line.clone()) {
            let tag = m.as_str().trim_start_matches('#').to_string();
            if seen_tags.insert(tag.clone()) {
                tags.push(tag);
            }
        }
        cleaned_line = TAG_RE.replace_all(&cleaned_line, "").trim().to_string();

        if META_LINE_RE.is_match(&cleaned_line) {
            continue;
        }

        cleaned_line = VIA_RE.replace_all(&cleaned_line, "").trim().to_string();

        if cleaned_line.is_empty() {
            continue;
        }

        desc_lines.push(cleaned_line);
    }

    let description = finalize_description(desc_lines);

    ParsedMessage { title, description, links, tags, source, channel, group_name, bot }
}

static BARE_DOMAIN_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:[a-z0-9][a-z0-9-]*\.)+[a-z]{2,}(?:/\S*)?").unwrap());

fn extract_title(lines: &[&str]) -> (String, Vec<String>) {
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        if let Some(rest) = stripped.strip_prefix("名称：") {
            let mut remaining = Vec::with_capacity(lines.len() - 1);
            remaining.extend(lines[..i].iter().map(|s| s.to_string()));
            remaining.extend(lines[i + 1..].iter().map(|s| s.to_string()));
            return (rest.trim().to_string(), remaining);
        }
    }
    for (i, line) in lines.iter().enumerate() {
        if !line.trim().is_empty() {
            let mut remaining = Vec::with_capacity(lines.len() - 1);
            remaining.extend(lines[..i].iter().map(|s| s.to_string()));
            remaining.extend(lines[i + 1..].iter().map(|s| s.to_string()));
            return (line.trim().to_string(), remaining);
        }
    }
    (String::new(), Vec::new())
}

/// Apply §4.3 Stage B's three fall-through label rules, in order, first
/// match wins — kept in this order to remain bit-for-bit compatible with
/// existing records (spec.md §9).
fn find_label(original_lines: &[&str], url: &str) -> Option<String> {
    for (i, line) in original_lines.iter().enumerate() {
        if !line.contains(url) {
            continue;
        }
        let stripped = line.trim();

        // Rule (a): prefix `^<token>[：:]`, longest-match wins.
        if let Some(colon_idx) = stripped.find(['：', ':']) {
            let candidate = &stripped[..colon_idx];
            if let Some(label) = longest_matching_label(candidate) {
                return Some(label);
            }
        }

        // Rule (b): the text immediately preceding the URL on the same line
        // ends with a vocabulary entry.
        if let Some(url_idx) = line.find(url) {
            if url_idx > 0 {
                let before = line[..url_idx].trim();
                if let Some(label) = VALID_LABELS.iter().find(|l| before.ends_with(**l)) {
                    return Some(label.to_string());
                }
            }
        }

        // Rule (c): previous non-empty line is short (<10 chars) and
        // contains a vocabulary entry.
        if i > 0 {
            let prev = original_lines[i - 1].trim();
            if prev.chars().count() < 10 {
                if let Some(label) = VALID_LABELS.iter().find(|l| prev.contains(**l)) {
                    return Some(label.to_string());
                }
            }
        }
    }
    None
}

fn longest_matching_label(candidate: &str) -> Option<String> {
    VALID_LABELS
        .iter()
        .filter(|l| candidate.contains(**l))
        .max_by_key(|l| l.chars().count())
        .map(|l| l.to_string())
}

fn strip_bullet_prefix(line: &str) -> String {
    let mut s = line;
    loop {
        let mut stripped_any = false;
        for prefix in BULLET_PREFIXES {
            if let Some(rest) = s.strip_prefix(prefix) {
                s = rest;
                stripped_any = true;
            }
        }
        if !stripped_any {
            break;
        }
    }
    s.trim().to_string()
}

fn match_skip_keyword(line: &str) -> Option<(Option<&'static str>, String)> {
    for (keyword, field) in SKIP_KEYWORDS {
        if let Some(rest) = line.strip_prefix(keyword) {
            let value = rest.trim_start_matches(['：', ':']).trim().to_string();
            return Some((*field, value));
        }
    }
    None
}

fn contains_size_unit(remainder: &str) -> bool {
    let has_digit = remainder.chars().any(|c| c.is_ascii_digit());
    has_digit && SIZE_UNIT_TOKENS.iter().any(|unit| remainder.to_ascii_uppercase().contains(&unit.to_ascii_uppercase()))
}

fn is_ad_line(line: &str) -> bool {
    AD_PATTERN_FRAGMENTS.iter().any(|fragments| fragments.iter().all(|f| line.contains(f)))
}

fn finalize_description(lines: Vec<String>) -> String {
    let joined = lines.join("\n");
    let mut cleaned = joined;
    for name in PROVIDER_SHORT_NAMES {
        cleaned = cleaned.replace(name, "");
    }
    cleaned = TRAILING_COLON_RE.replace_all(&cleaned, "").to_string();
    cleaned
        .split('\n')
        .filter(|l| !l.trim().is_empty() && !PUNCT_ONLY_RE.is_match(l.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
