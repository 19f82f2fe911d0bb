//! Optimistic concurrency primitive shared by every guarded write path.

use serde::{Deserialize, Serialize};

/// Version expectation for a compare-and-swap write.
///
/// Every stream and catalog entity carries a monotonically increasing
/// version; a writer states the version it read, and the store rejects the
/// write if someone else committed in between. This is what serializes
/// concurrent proposals against one product without cross-product contention.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Skip version checking (migrations, repair tooling).
    Any,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(17));
    }

    #[test]
    fn exact_matches_only_itself() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
    }
}
