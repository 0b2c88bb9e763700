//! Write-back queue counters

use crate::division::{Division, PerDivision};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pending write-back tasks per division (queued plus in flight)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    pub pending: PerDivision<usize>,
}

impl QueueCounters {
    pub const fn new(academy: usize, college: usize) -> Self {
        Self {
            pending: PerDivision::new(academy, college),
        }
    }

    pub fn pending(&self, division: Division) -> usize {
        self.pending[division]
    }

    pub fn total(&self) -> usize {
        self.pending.academy + self.pending.college
    }

    pub fn is_idle(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for QueueCounters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{{}:{},{}:{}}}",
            Division::Academy.id(),
            self.pending.academy,
            Division::College.id(),
            self.pending.college
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_display_by_division_id() {
        let counters = QueueCounters::new(2, 1);
        assert_eq!(counters.to_string(), "{74:2,458:1}");
        assert_eq!(counters.total(), 3);
        assert!(!counters.is_idle());
        assert!(QueueCounters::default().is_idle());
    }
}
