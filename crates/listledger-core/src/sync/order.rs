//! Ordering of post ids.
//!
//! Post ids are decimal numerals that can exceed 64-bit integer range, so
//! they are compared as numerals: strip leading zeros, then order by
//! length and finally lexicographically.

use std::cmp::Ordering;

/// Compares two post ids as decimal numerals.
#[must_use]
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Whether `candidate` is strictly newer (numerically greater) than `anchor`.
#[must_use]
pub fn is_newer(candidate: &str, anchor: &str) -> bool {
    compare_ids(candidate, anchor) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longer_numeral_is_greater() {
        assert!(is_newer("100", "99"));
        assert!(!is_newer("99", "100"));
    }

    #[test]
    fn test_same_length_compares_lexicographically() {
        assert!(is_newer("125", "124"));
        assert!(!is_newer("124", "125"));
        assert!(!is_newer("124", "124"));
    }

    #[test]
    fn test_leading_zeros_are_ignored() {
        assert!(is_newer("0100", "99"));
        assert!(!is_newer("099", "100"));
        assert_eq!(compare_ids("007", "7"), Ordering::Equal);
    }

    #[test]
    fn test_ids_beyond_integer_range() {
        assert!(is_newer("19000000000000000000000002", "19000000000000000000000001"));
    }
}
