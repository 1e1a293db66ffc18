//! Text normalization and pattern matching.
//!
//! Predictors never match against raw DIR text: whitespace placement is an
//! artifact of the upstream parser, and Chinese filings mix fullwidth and
//! halfwidth punctuation freely. All matching goes through [`clean_txt`],
//! and positions found in cleaned text are mapped back to raw char indices
//! with [`index_in_space_string`].
//!
//! Patterns used by the syllabus reader are either regexes or literal
//! strings; literals match by similarity ratio (>= 0.6) against the cleaned
//! title. Pattern bundles are configuration data, compiled once at load.

use crate::error::{Error, Result};
use regex::Regex;

/// Minimum similarity ratio for a literal pattern to count as a match.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

fn unify_char(ch: char) -> char {
    match ch {
        '：' => ':',
        '；' => ';',
        '，' => ',',
        '（' => '(',
        '）' => ')',
        '！' => '!',
        '？' => '?',
        '％' => '%',
        '０'..='９' => char::from(b'0' + (ch as u32 - '０' as u32) as u8),
        _ => ch,
    }
}

/// Remove all whitespace and unify fullwidth punctuation/digits.
///
/// The unification is one-to-one per char, so cleaned indices can be mapped
/// back to raw indices purely by counting skipped whitespace.
///
/// # Examples
///
/// ```
/// use dir_insight::text::clean_txt;
///
/// assert_eq!(clean_txt("证券代码： 300091"), "证券代码:300091");
/// assert_eq!(clean_txt("  a\tb\nc "), "abc");
/// ```
pub fn clean_txt(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(unify_char)
        .collect()
}

/// Map a `(start, end)` char range in cleaned text back to char indices in
/// the raw string.
///
/// Used to slice an element's `chars` list after matching against the
/// cleaned text.
///
/// # Examples
///
/// ```
/// use dir_insight::text::index_in_space_string;
///
/// // "a b c" cleaned is "abc"; range 1..2 covers 'b' at raw index 2.
/// assert_eq!(index_in_space_string("a b c", 1, 2), (2, 3));
/// ```
pub fn index_in_space_string(raw: &str, start: usize, end: usize) -> (usize, usize) {
    let total = raw.chars().count();
    let mut seen = 0usize;
    let mut raw_start = None;
    let mut raw_end = total;
    for (i, ch) in raw.chars().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        if seen == start && raw_start.is_none() {
            raw_start = Some(i);
        }
        seen += 1;
        if seen == end {
            raw_end = i + 1;
            break;
        }
    }
    let raw_start = raw_start.unwrap_or(raw_end);
    if start >= end {
        (raw_start, raw_start)
    } else {
        (raw_start, raw_end)
    }
}

/// Strip section-numbering prefixes and trailing colons from a syllabus
/// title. Whitespace is removed first; stripping runs to a fixed point, so
/// the function is idempotent.
///
/// # Examples
///
/// ```
/// use dir_insight::text::clear_syl_title;
///
/// assert_eq!(clear_syl_title("第一节 发行人基本情况"), "发行人基本情况");
/// assert_eq!(clear_syl_title("（二）主营业务："), "主营业务");
/// assert_eq!(clear_syl_title("1.2.3 概况"), "概况");
/// ```
pub fn clear_syl_title(title: &str) -> String {
    lazy_static::lazy_static! {
        static ref P_PREFIXES: Vec<Regex> = vec![
            Regex::new(r"^第[0-9一二三四五六七八九十百千]+[章节篇卷部条]").unwrap(),
            Regex::new(r"^\(?[0-9一二三四五六七八九十]+\)").unwrap(),
            Regex::new(r"^[0-9一二三四五六七八九十]+[、.:]").unwrap(),
            Regex::new(r"^[0-9]+(\.[0-9]+)+").unwrap(),
        ];
        static ref P_TRAILING: Regex = Regex::new(r"[:、]+$").unwrap();
    }
    let mut text = clean_txt(title);
    loop {
        let mut next = text.clone();
        for pattern in P_PREFIXES.iter() {
            next = pattern.replace(&next, "").into_owned();
        }
        next = P_TRAILING.replace(&next, "").into_owned();
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Similarity ratio between two strings in `[0, 1]`.
///
/// `2 * matches / (len_a + len_b)` where `matches` is the total length of
/// the longest-matching-block decomposition (the classic sequence-matcher
/// ratio). Identical strings score 1.0, disjoint strings 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matches = matching_total(&a, &b);
    2.0 * matches as f64 / (a.len() + b.len()) as f64
}

fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    // lengths[j] = length of the match ending at a[i-1], b[j-1]
    let mut best = (0usize, 0usize, 0usize);
    let mut lengths = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut prev = 0usize;
        for (j, cb) in b.iter().enumerate() {
            let cur = lengths[j + 1];
            if ca == cb {
                let len = prev + 1;
                lengths[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            } else {
                lengths[j + 1] = 0;
            }
            prev = cur;
        }
    }
    best
}

fn matching_total(a: &[char], b: &[char]) -> usize {
    let (ai, bj, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_total(&a[..ai], &b[..bj]) + matching_total(&a[ai + len..], &b[bj + len..])
}

/// A single syllabus-matching pattern: a regex searched against the cleaned
/// title, or a literal matched by similarity ratio.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Regex searched anywhere in the cleaned text.
    Regex(Regex),
    /// Literal string; matches when `similarity >= 0.6`.
    Literal(String),
}

impl Pattern {
    /// Compile a regex pattern.
    pub fn regex(pattern: &str) -> Result<Pattern> {
        let compiled = Regex::new(pattern).map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Pattern::Regex(compiled))
    }

    /// Build a literal (similarity) pattern.
    pub fn literal(text: &str) -> Pattern {
        Pattern::Literal(clean_txt(text))
    }

    /// Whether the pattern matches a cleaned text.
    pub fn matches(&self, cleaned: &str) -> bool {
        match self {
            Pattern::Regex(re) => re.is_match(cleaned),
            Pattern::Literal(lit) => similarity(lit, cleaned) >= SIMILARITY_THRESHOLD,
        }
    }
}

/// An ordered bundle of regexes compiled from configuration data.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile every pattern in the bundle. Fails fast on the first invalid
    /// pattern so configuration errors surface at load time.
    pub fn compile(patterns: &[String]) -> Result<PatternSet> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            compiled.push(Regex::new(pattern).map_err(|source| Error::Pattern {
                pattern: pattern.clone(),
                source,
            })?);
        }
        Ok(PatternSet { patterns: compiled })
    }

    /// True when the bundle holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when any pattern matches the text.
    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    /// First capture over all patterns, in bundle order.
    pub fn captures<'t>(&self, text: &'t str) -> Option<regex::Captures<'t>> {
        self.patterns.iter().find_map(|p| p.captures(text))
    }

    /// All non-overlapping captures of every pattern, in bundle order.
    pub fn captures_iter<'a, 't>(
        &'a self,
        text: &'t str,
    ) -> impl Iterator<Item = regex::Captures<'t>> + 'a
    where
        't: 'a,
    {
        self.patterns.iter().flat_map(move |p| p.captures_iter(text))
    }
}

/// Char range (in cleaned-text coordinates) selected by a match: the `dst`
/// capture group when present, else the whole match.
pub fn dst_span(caps: &regex::Captures<'_>, cleaned: &str) -> (usize, usize) {
    let m = match caps.name("dst").or_else(|| caps.get(0)) {
        Some(m) => m,
        None => return (0, 0),
    };
    // regex spans are byte offsets; convert to char offsets
    let start = cleaned[..m.start()].chars().count();
    let end = start + cleaned[m.start()..m.end()].chars().count();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_txt_removes_whitespace() {
        assert_eq!(clean_txt(" 甲方 ： 北京 公司 "), "甲方:北京公司");
    }

    #[test]
    fn test_clean_txt_unifies_fullwidth_digits() {
        assert_eq!(clean_txt("３００"), "300");
    }

    #[test]
    fn test_index_round_trip() {
        let raw = "证券代码： 300091 证券简称：金通灵";
        let cleaned = clean_txt(raw);
        let byte = cleaned.find("300091").unwrap();
        let start = cleaned[..byte].chars().count();
        let (rs, re) = index_in_space_string(raw, start, start + 6);
        let sliced: String = raw.chars().skip(rs).take(re - rs).collect();
        assert_eq!(sliced, "300091");
    }

    #[test]
    fn test_index_empty_range() {
        let (rs, re) = index_in_space_string("a b", 1, 1);
        assert_eq!(rs, re);
    }

    #[test]
    fn test_clear_syl_title_idempotent() {
        for title in ["第一节 发行人基本情况", "（二）主营业务：", "1.2.3 概况", "三、风险因素"] {
            let once = clear_syl_title(title);
            assert_eq!(clear_syl_title(&once), once);
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("主营业务", "主营业务"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        let partial = similarity("主营业务情况", "主营业务");
        assert!(partial > 0.6 && partial < 1.0);
    }

    #[test]
    fn test_pattern_literal_fuzzy_match() {
        let pattern = Pattern::literal("发行人基本情况");
        assert!(pattern.matches("发行人基本情况介绍"));
        assert!(!pattern.matches("财务会计信息"));
    }

    #[test]
    fn test_pattern_set_rejects_bad_regex() {
        assert!(PatternSet::compile(&["(".to_string()]).is_err());
    }

    #[test]
    fn test_dst_span_prefers_named_group() {
        let set = PatternSet::compile(&[r"证券代码[:：](?P<dst>\S+)".to_string()]).unwrap();
        let cleaned = clean_txt("证券代码： 300091");
        let caps = set.captures(&cleaned).unwrap();
        let (start, end) = dst_span(&caps, &cleaned);
        let text: String = cleaned.chars().skip(start).take(end - start).collect();
        assert_eq!(text, "300091");
    }
}
