//! Explicit per-step results.
//!
//! Every pipeline step reports what happened as a value: it either fully succeeded,
//! produced a usable value through a fallback path, or failed. The batch driver does
//! its processed/skipped/failed accounting from these values.

/// Result of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The primary path worked.
    Success(T),
    /// A fallback path produced a usable value.
    Degraded { value: T, reason: String },
    /// No usable value; the experiment cannot continue.
    Failed { reason: String },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// The usable value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) | Self::Degraded { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Convert into a `Result`, keeping degraded values.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Success(value) | Self::Degraded { value, .. } => Ok(value),
            Self::Failed { reason } => Err(reason),
        }
    }
}

/// Final state of one experiment in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentStatus {
    Processed,
    Skipped,
    Failed,
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processed => write!(f, "processed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Counts reported at the end of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, status: ExperimentStatus) {
        match status {
            ExperimentStatus::Processed => self.processed += 1,
            ExperimentStatus::Skipped => self.skipped += 1,
            ExperimentStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_value() {
        assert_eq!(Outcome::Success(3).value(), Some(&3));
        assert_eq!(Outcome::degraded(4, "fallback").value(), Some(&4));
        assert_eq!(Outcome::<i32>::failed("boom").value(), None);
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(Outcome::degraded("x", "why").into_result(), Ok("x"));
        assert_eq!(
            Outcome::<&str>::failed("timed out").into_result(),
            Err("timed out".to_string())
        );
    }

    #[test]
    fn test_outcome_is_degraded() {
        assert!(Outcome::degraded((), "r").is_degraded());
        assert!(!Outcome::Success(()).is_degraded());
    }

    #[test]
    fn test_experiment_status_display() {
        assert_eq!(ExperimentStatus::Processed.to_string(), "processed");
        assert_eq!(ExperimentStatus::Skipped.to_string(), "skipped");
        assert_eq!(ExperimentStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_batch_summary_record() {
        let mut summary = BatchSummary::default();
        summary.record(ExperimentStatus::Processed);
        summary.record(ExperimentStatus::Processed);
        summary.record(ExperimentStatus::Skipped);
        summary.record(ExperimentStatus::Failed);

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 4);
    }
}
