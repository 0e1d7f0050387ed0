// ============================================================
// Convergence / Stopping Policy
// ============================================================
// Decides, after each decoder pass, whether an example halts.
// The iteration budget is not a cancellation: hitting it is an
// alternate terminal transition that still yields a hypothesis.

use crate::domain::hypothesis::DecodeOutcome;
use crate::error::{NatError, NatResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The candidate equals the previous hypothesis.
    FixedPoint,
    /// No masked positions remain.
    AllCommitted,
    /// The iteration budget is spent.
    BudgetReached,
}

impl StopReason {
    pub fn outcome(self) -> DecodeOutcome {
        match self {
            StopReason::FixedPoint    => DecodeOutcome::Converged,
            StopReason::AllCommitted  => DecodeOutcome::Completed,
            StopReason::BudgetReached => DecodeOutcome::BudgetExhausted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppingPolicy {
    budget: usize,
}

impl StoppingPolicy {
    pub fn new(budget: usize) -> NatResult<Self> {
        if budget == 0 {
            return Err(NatError::Config("iteration budget must be > 0".into()));
        }
        Ok(Self { budget })
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Refine-NAT: `changed` says whether the candidate differed from the
    /// previous hypothesis, `adopted` is the counter after adopting it.
    pub fn after_refinement(&self, changed: bool, adopted: usize) -> Option<StopReason> {
        if !changed {
            Some(StopReason::FixedPoint)
        } else if adopted >= self.budget {
            Some(StopReason::BudgetReached)
        } else {
            None
        }
    }

    /// Mask-predict: called after re-masking at `iteration` (1-indexed).
    pub fn after_remask(&self, still_masked: usize, iteration: usize) -> Option<StopReason> {
        if still_masked == 0 {
            Some(StopReason::AllCommitted)
        } else if iteration >= self.budget {
            Some(StopReason::BudgetReached)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_rejected() {
        assert!(StoppingPolicy::new(0).is_err());
    }

    #[test]
    fn test_fixed_point_wins_over_budget() {
        let p = StoppingPolicy::new(2).unwrap();
        assert_eq!(p.after_refinement(false, 2), Some(StopReason::FixedPoint));
        assert_eq!(p.after_refinement(true, 2), Some(StopReason::BudgetReached));
        assert_eq!(p.after_refinement(true, 1), None);
    }

    #[test]
    fn test_zero_masked_wins_over_budget() {
        let p = StoppingPolicy::new(3).unwrap();
        assert_eq!(p.after_remask(0, 3), Some(StopReason::AllCommitted));
        assert_eq!(p.after_remask(1, 3), Some(StopReason::BudgetReached));
        assert_eq!(p.after_remask(1, 2), None);
        assert_eq!(StopReason::BudgetReached.outcome(), DecodeOutcome::BudgetExhausted);
    }
}
