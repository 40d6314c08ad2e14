//! Query complexity scoring for model routing.
//!
//! Estimates how demanding a query is on a 1-10 scale using lightweight
//! text heuristics. The score drives the primary-vs-fallback decision in
//! [`crate::router`]: a request to "synthesize" or "prove" something earns
//! the big model, a one-liner does not.

use std::sync::OnceLock;

use regex::Regex;

/// Reasoning keywords that each add one point, matched as whole words.
const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "compare",
    "evaluate",
    "synthesize",
    "critique",
    "explain",
    "derive",
    "prove",
    "optimize",
    "debug",
];

fn keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = REASONING_KEYWORDS.join("|");
        Regex::new(&format!(r"\b({alternation})\b")).expect("static keyword pattern")
    })
}

/// Score the complexity of `query` on a 1-10 scale.
///
/// Starts from a base of 5, adds 2 for very long queries (over 1000 chars),
/// subtracts 1 for short ones (under 100 chars), and adds 1 for each
/// distinct reasoning keyword present. The result is clamped to `1..=10`.
pub fn score_complexity(query: &str) -> u8 {
    let mut score: i32 = 5;

    if query.len() > 1000 {
        score += 2;
    } else if query.len() < 100 {
        score -= 1;
    }

    let lower = query.to_lowercase();
    let mut seen: Vec<&str> = Vec::new();
    for m in keyword_regex().find_iter(&lower) {
        let kw = m.as_str();
        if !seen.contains(&kw) {
            seen.push(kw);
            score += 1;
        }
    }

    score.clamp(1, 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_query_scores_below_base() {
        assert_eq!(score_complexity("What time is it?"), 4);
    }

    #[test]
    fn medium_query_scores_base() {
        let query = "a".repeat(500);
        assert_eq!(score_complexity(&query), 5);
    }

    #[test]
    fn long_query_gains_two() {
        let query = "a ".repeat(600);
        assert_eq!(score_complexity(&query), 7);
    }

    #[test]
    fn reasoning_keywords_add_points() {
        // Short (-1) plus two distinct keywords (+2).
        assert_eq!(score_complexity("analyze and compare these"), 6);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        assert_eq!(
            score_complexity("analyze this, then analyze that"),
            score_complexity("analyze this and that thing x")
        );
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "comparetively" must not match "compare".
        let with_substring = score_complexity("comparatively speaking, hello");
        let without = score_complexity("generally speaking, hello byee");
        assert_eq!(with_substring, without);
    }

    #[test]
    fn score_is_clamped_to_ten() {
        let mut query = String::with_capacity(1200);
        for kw in REASONING_KEYWORDS {
            query.push_str(kw);
            query.push(' ');
        }
        query.push_str(&"padding ".repeat(150));
        assert_eq!(score_complexity(&query), 10);
    }

    #[test]
    fn score_never_below_one() {
        assert!(score_complexity("") >= 1);
        assert!(score_complexity("hi") >= 1);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            score_complexity("EXPLAIN this to me please now"),
            score_complexity("explain this to me please now")
        );
    }
}
