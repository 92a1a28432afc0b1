// Description canonicalization and similarity scoring.
// All matcher description logic goes through normalize_description so the
// intelligent (first-two-tokens) and fuzzy paths compare the same form.

/// Canonicalize a raw description: lower-case, drop apostrophes, strip
/// leading/trailing punctuation, collapse internal whitespace.
///
/// "Trader Joe's #123  " becomes "trader joes #123".
pub fn normalize_description(raw: &str) -> String {
    let lower = raw.to_lowercase().replace(['\'', '\u{2019}'], "");
    let trimmed = lower.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First two whitespace-delimited tokens, joined by a space. Descriptions
/// with fewer than two tokens never qualify for an intelligent match, so
/// this returns None for them.
pub fn first_two_tokens(text: &str) -> Option<String> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?;
    let second = tokens.next()?;
    Some(format!("{} {}", first, second))
}

/// Token-based similarity in [0.0, 1.0]: both sides are reduced to
/// lowercase alphanumeric tokens, then compared by Levenshtein ratio.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let a = tokenize(a);
    let b = tokenize(b);

    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - (levenshtein(&a, &b) as f64 / max_len as f64)
}

fn tokenize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classic two-row Levenshtein edit distance over chars.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
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
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
