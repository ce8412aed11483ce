//! Text normalization and similarity scoring used by every text comparison.

/// Trim and collapse runs of whitespace to single spaces, optionally lowercasing.
pub fn normalize(text: &str, case_sensitive: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if case_sensitive {
        out
    } else {
        out.to_lowercase()
    }
}

/// Similarity ratio in `[0.0, 1.0]`: twice the number of matched characters
/// over the total length, where matches are found by repeatedly taking the
/// longest common block and recursing on both sides of it.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Cheap upper bound on [`similarity_ratio`], from lengths alone.
pub fn ratio_upper_bound(a: &str, b: &str) -> f64 {
    let la = a.chars().count();
    let lb = b.chars().count();
    if la + lb == 0 {
        return 1.0;
    }
    2.0 * la.min(lb) as f64 / (la + lb) as f64
}

/// Whether `candidate` is at least `threshold` similar to `wanted`.
/// A threshold of 1.0 or more means plain equality.
pub fn fuzzy_matches(wanted: &str, candidate: &str, threshold: f64) -> bool {
    if threshold >= 1.0 {
        return wanted == candidate;
    }
    if ratio_upper_bound(wanted, candidate) < threshold {
        return false;
    }
    similarity_ratio(wanted, candidate) >= threshold
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    // (a_lo, a_hi, b_lo, b_hi) ranges still to be scanned
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`, earliest on ties.
fn longest_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let k = j - blo + 1;
            cur[k] = if a[i] == b[j] { prev[k - 1] + 1 } else { 0 };
            if cur[k] > best_size {
                best_size = cur[k];
                best_i = i + 1 - best_size;
                best_j = j + 1 - best_size;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
        cur.iter_mut().for_each(|c| *c = 0);
    }
    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello \n\t  world  ", true), "Hello world");
        assert_eq!(normalize("   ", true), "");
    }

    #[test]
    fn test_normalize_case_folding() {
        assert_eq!(normalize(" Price:  9.99 ", false), "price: 9.99");
        assert_eq!(normalize("ÄBC", false), "äbc");
    }

    #[test]
    fn test_ratio_identical_and_disjoint() {
        assert!((similarity_ratio("abc", "abc") - 1.0).abs() < 1e-9);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_ratio_typo() {
        // "Pric" + ": 9.99" match, 10 of 10 and 11 chars
        let r = similarity_ratio("Pric: 9.99", "Price: 9.99");
        assert!((r - 20.0 / 21.0).abs() < 1e-9);

        let r = similarity_ratio("Test", "Tst");
        assert!((r - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_multibyte() {
        let r = similarity_ratio("Hello 世界", "Hello 世");
        assert!((r - 14.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_upper_bound_never_below_ratio() {
        let pairs = [("kitten", "sitting"), ("a", "abcdef"), ("Item 1", "Item 12")];
        for (a, b) in pairs {
            assert!(ratio_upper_bound(a, b) >= similarity_ratio(a, b));
        }
    }

    #[test]
    fn test_fuzzy_matches_threshold() {
        assert!(fuzzy_matches("Pric: 9.99", "Price: 9.99", 0.8));
        assert!(!fuzzy_matches("Pric: 9.99", "Price: 9.99", 1.0));
        assert!(fuzzy_matches("same", "same", 1.0));
        assert!(!fuzzy_matches("short", "a much longer piece of text", 0.6));
    }
}
