//! Close-match suggestions for "unknown name" errors.
//!
//! Candidates are scored by normalized Levenshtein similarity
//! (`1 - distance / longest`). Matches below [`CUTOFF`] are discarded and at
//! most [`MAX_SUGGESTIONS`] names are returned, best first.

use crate::error::Suggestions;

/// Minimum similarity for a candidate to be suggested.
pub const CUTOFF: f64 = 0.6;

/// Maximum number of suggestions returned.
pub const MAX_SUGGESTIONS: usize = 3;

/// Find the known names closest to `word`.
pub fn close_matches<'a, I>(word: &str, candidates: I) -> Suggestions
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .filter(|c| *c != word)
        .map(|c| (similarity(word, c), c))
        .filter(|(score, _)| *score >= CUTOFF)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);

    Suggestions(
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, name)| name.to_string())
            .collect(),
    )
}

/// Normalized similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Classic two-row Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("clor", "color"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_close_matches_typo() {
        let found = close_matches("clor", ["color", "value", "width"]);
        assert_eq!(found.0, vec!["color".to_string()]);
    }

    #[test]
    fn test_close_matches_ordering_and_limit() {
        let found = close_matches("value", ["values", "valve", "vale", "valued", "label"]);
        assert_eq!(found.0.len(), MAX_SUGGESTIONS);
        // one edit away ranks before two edits away
        assert!(found.0.iter().all(|n| n != "label"));
    }

    #[test]
    fn test_close_matches_none() {
        assert!(close_matches("zzz", ["color", "value"]).is_empty());
    }
}
