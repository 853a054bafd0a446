use std::fmt::{self, Display};

use fanout_lib::ResultRecord;
use serde::Serialize;

/// Counts of a finished batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Summary {
    pub(crate) total: usize,
    pub(crate) ok: usize,
    pub(crate) failed: usize,
    /// Submitted but never finalized, because the transport failed
    pub(crate) unfinished: usize,
}

impl Summary {
    pub(crate) fn new<M>(submitted: usize, records: &[ResultRecord<M>]) -> Self {
        let mut summary = Self {
            total: submitted,
            unfinished: submitted,
            ..Self::default()
        };
        for record in records {
            summary.add(record.is_success());
        }
        summary
    }

    fn add(&mut self, success: bool) {
        if success {
            self.ok += 1;
        } else {
            self.failed += 1;
        }
        self.unfinished = self.unfinished.saturating_sub(1);
    }

    /// Returns `true` if every submitted request ended with a 2xx code
    pub(crate) const fn is_success(&self) -> bool {
        self.failed == 0 && self.unfinished == 0
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} ok, {} failed",
            self.total, self.ok, self.failed
        )?;
        if self.unfinished > 0 {
            write!(f, ", {} unfinished", self.unfinished)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Summary;

    fn summary(submitted: usize, outcomes: &[bool]) -> Summary {
        let mut summary = Summary {
            total: submitted,
            unfinished: submitted,
            ..Summary::default()
        };
        for &success in outcomes {
            summary.add(success);
        }
        summary
    }

    #[test]
    fn test_all_ok() {
        let summary = summary(3, &[true, true, true]);
        assert!(summary.is_success());
        assert_eq!(summary.to_string(), "3 total, 3 ok, 0 failed");
    }

    #[test]
    fn test_failures() {
        let summary = summary(3, &[true, false, true]);
        assert!(!summary.is_success());
        assert_eq!(summary.to_string(), "3 total, 2 ok, 1 failed");
    }

    #[test]
    fn test_unfinished() {
        let summary = summary(4, &[true]);
        assert!(!summary.is_success());
        assert_eq!(summary.to_string(), "4 total, 1 ok, 0 failed, 3 unfinished");
    }

    #[test]
    fn test_empty_batch() {
        let summary = Summary::new::<()>(0, &[]);
        assert!(summary.is_success());
        assert_eq!(summary.to_string(), "0 total, 0 ok, 0 failed");
    }
}
