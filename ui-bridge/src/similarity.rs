//! Normalized text similarity used by the match scorer
//!
//! The formula is fixed so that thresholds such as 0.6 or 0.7 mean the same
//! thing everywhere:
//!
//! 1. either side empty after normalization: `0.0`
//! 2. equal: `1.0`
//! 3. one occurs in the other on word boundaries: `0.6 + 0.35 * shorter / longer`
//! 4. fuzzy enabled: `max(1 - levenshtein / max_len, word_jaccard)`, zeroed
//!    below the fuzzy threshold and capped at `0.95`
//! 5. otherwise `0.0`
//!
//! Lengths are counted in chars after normalization (lowercase, trimmed,
//! internal whitespace collapsed).

/// Base score for a word-boundary containment match.
pub const PARTIAL_BASE: f64 = 0.6;
/// Span added on top of [`PARTIAL_BASE`] in proportion to the length ratio.
pub const PARTIAL_SPAN: f64 = 0.35;
/// Upper bound for an approximate match, so it never ties with an exact one.
pub const FUZZY_CAP: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Partial,
    Fuzzy,
}

impl MatchKind {
    pub fn label(&self) -> &'static str {
        match self {
            MatchKind::Exact => "match",
            MatchKind::Partial => "partial match",
            MatchKind::Fuzzy => "fuzzy match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub score: f64,
    pub kind: MatchKind,
}

pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Score `candidate` against `query`. `None` means no match at all.
pub fn similarity(
    query: &str,
    candidate: &str,
    fuzzy: bool,
    fuzzy_threshold: f64,
) -> Option<Similarity> {
    let q = normalize(query);
    let c = normalize(candidate);
    if q.is_empty() || c.is_empty() {
        return None;
    }

    if q == c {
        return Some(Similarity {
            score: 1.0,
            kind: MatchKind::Exact,
        });
    }

    let q_len = q.chars().count();
    let c_len = c.chars().count();
    let (shorter, longer) = if q_len <= c_len { (&q, &c) } else { (&c, &q) };
    if contains_on_word_boundary(longer, shorter) {
        let ratio = q_len.min(c_len) as f64 / q_len.max(c_len) as f64;
        return Some(Similarity {
            score: PARTIAL_BASE + PARTIAL_SPAN * ratio,
            kind: MatchKind::Partial,
        });
    }

    if !fuzzy {
        return None;
    }

    let edit = 1.0 - levenshtein(&q, &c) as f64 / q_len.max(c_len) as f64;
    let score = edit.max(word_jaccard(&q, &c));
    if score < fuzzy_threshold || score <= 0.0 {
        return None;
    }
    Some(Similarity {
        score: score.min(FUZZY_CAP),
        kind: MatchKind::Fuzzy,
    })
}

/// Case-insensitive substring test used by `textContains`.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let needle = normalize(needle);
    !needle.is_empty() && normalize(haystack).contains(&needle)
}

fn contains_on_word_boundary(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| !ch.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |ch| !ch.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Word-set Jaccard index over whitespace tokens.
pub fn word_jaccard(a: &str, b: &str) -> f64 {
    let mut words_a: Vec<&str> = a.split_whitespace().collect();
    let mut words_b: Vec<&str> = b.split_whitespace().collect();
    words_a.sort_unstable();
    words_a.dedup();
    words_b.sort_unstable();
    words_b.dedup();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let common = words_a.iter().filter(|w| words_b.contains(w)).count();
    let union = words_a.len() + words_b.len() - common;
    common as f64 / union as f64
}

/// Classic Levenshtein distance over chars, two-row table.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_is_case_and_space_insensitive() {
        let s = similarity("Start  Extraction", "start extraction", false, 0.7).unwrap();
        assert_eq!(s.kind, MatchKind::Exact);
        assert_eq!(s.score, 1.0);
    }

    #[test]
    fn test_partial_scales_with_length_ratio() {
        let short = similarity("Submit", "Submit order now please", false, 0.7).unwrap();
        let long = similarity("Submit order", "Submit order now", false, 0.7).unwrap();
        assert_eq!(short.kind, MatchKind::Partial);
        assert!(short.score > PARTIAL_BASE && short.score < long.score);
        assert!(long.score <= PARTIAL_BASE + PARTIAL_SPAN);
    }

    #[test]
    fn test_partial_requires_word_boundary() {
        // "on" sits inside "Button" but is not a word of it
        assert!(similarity("on", "Button", false, 0.7).is_none());
        assert!(similarity("Save", "Save draft", false, 0.7).is_some());
    }

    #[test]
    fn test_fuzzy_typo_clears_threshold() {
        let s = similarity("Sbumit", "Submit", true, 0.6).unwrap();
        assert_eq!(s.kind, MatchKind::Fuzzy);
        // two substitutions over six chars
        assert!((s.score - (1.0 - 2.0 / 6.0)).abs() < 1e-9);
        assert!(similarity("Sbumit", "Submit", true, 0.7).is_none());
        assert!(similarity("Sbumit", "Submit", false, 0.0).is_none());
    }

    #[test]
    fn test_fuzzy_is_capped_below_exact() {
        let s = similarity("start extractio", "start extraction!", true, 0.5).unwrap();
        assert!(s.score <= FUZZY_CAP);
    }

    #[test]
    fn test_levenshtein_and_jaccard() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(word_jaccard("save the file", "save file"), 2.0 / 3.0);
        assert_eq!(word_jaccard("", "x"), 0.0);
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Welcome back, Ada", "BACK"));
        assert!(!contains_ignore_case("Welcome", ""));
    }
}
