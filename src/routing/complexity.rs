//! Request complexity heuristic
//!
//! Total transcript length is used as a proxy for "needs a more capable model".

use crate::types::CanonicalMessage;

/// Classification produced by [`ComplexityEstimator::estimate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

#[derive(Debug, Clone, Copy)]
pub struct ComplexityEstimator {
    threshold: usize,
}

impl ComplexityEstimator {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Total character count over all message contents
    pub fn total_chars(messages: &[CanonicalMessage]) -> usize {
        messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// `Complex` iff the total strictly exceeds the threshold
    pub fn estimate(&self, messages: &[CanonicalMessage]) -> Complexity {
        if Self::total_chars(messages) > self.threshold {
            Complexity::Complex
        } else {
            Complexity::Simple
        }
    }
}

impl Default for ComplexityEstimator {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_simple() {
        let estimator = ComplexityEstimator::default();
        assert_eq!(estimator.estimate(&[]), Complexity::Simple);
        assert_eq!(
            estimator.estimate(&[CanonicalMessage::user(""), CanonicalMessage::system("")]),
            Complexity::Simple
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        let estimator = ComplexityEstimator::default();
        let at = vec![CanonicalMessage::system("a".repeat(200)), CanonicalMessage::user("b".repeat(300))];
        assert_eq!(ComplexityEstimator::total_chars(&at), 500);
        assert_eq!(estimator.estimate(&at), Complexity::Simple);

        let over = vec![CanonicalMessage::system("a".repeat(200)), CanonicalMessage::user("b".repeat(301))];
        assert_eq!(estimator.estimate(&over), Complexity::Complex);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let estimator = ComplexityEstimator::new(4);
        // 4 characters, 8 bytes
        assert_eq!(estimator.estimate(&[CanonicalMessage::user("ñáéí")]), Complexity::Simple);
    }

    #[test]
    fn test_idempotent() {
        let estimator = ComplexityEstimator::new(10);
        let messages = vec![CanonicalMessage::user("hello world!")];
        assert_eq!(estimator.estimate(&messages), estimator.estimate(&messages));
        assert_eq!(estimator.estimate(&messages), Complexity::Complex);
    }
}
