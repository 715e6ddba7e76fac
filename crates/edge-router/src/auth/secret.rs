//! Shared-secret comparison.

use subtle::ConstantTimeEq;

/// Whether the presented header value equals the configured secret.
///
/// The bytes are compared in constant time. Only the length of the presented
/// value can be observed, and the secret's length is not confidential.
pub fn constant_time_compare(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_secrets() {
        assert!(constant_time_compare("2b7c9f", "2b7c9f"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_different_secrets() {
        assert!(!constant_time_compare("2b7c9f", "2b7c9e"));
        assert!(!constant_time_compare("2b7c9", "2b7c9f"));
        assert!(!constant_time_compare("2b7c9f", ""));
        assert!(!constant_time_compare("", "x"));
    }

    #[test]
    fn test_case_and_padding_matter() {
        assert!(!constant_time_compare("2B7C9F", "2b7c9f"));
        assert!(!constant_time_compare("2b7c9f ", "2b7c9f"));
        assert!(!constant_time_compare("2b7c9f\0", "2b7c9f"));
    }
}
