//! Split/remainder state machine.
//!
//! | state            | trigger          | action                     |
//! |------------------|------------------|----------------------------|
//! | `Normal`         | new input batch  | run over `[0, rows)`       |
//! | `Remainder(off)` | pull             | run over `[off, rows)`     |
//!
//! Either way the result goes through [`outcome`].

use vproj_core::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Normal,
    /// Rows `[offset, rows)` of the current input batch are still owed.
    Remainder { offset: usize },
}

impl ExecState {
    pub fn has_remainder(&self) -> bool {
        matches!(self, ExecState::Remainder { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every row of the range was written; release the input batch.
    Complete { emitted: usize },
    /// Output ran out of room at `offset`; keep the input batch.
    Pending { emitted: usize, offset: usize },
}

impl PassOutcome {
    pub fn emitted(&self) -> usize {
        match self {
            PassOutcome::Complete { emitted } | PassOutcome::Pending { emitted, .. } => *emitted,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PassOutcome::Pending { .. })
    }

    pub fn next_state(&self) -> ExecState {
        match self {
            PassOutcome::Complete { .. } => ExecState::Normal,
            PassOutcome::Pending { offset, .. } => ExecState::Remainder { offset: *offset },
        }
    }
}

/// Apply the outcome rule to a pass over `[start, end)` that wrote up to
/// (but excluding) row `written`.
pub fn outcome(start: usize, end: usize, written: usize) -> Result<PassOutcome, Error> {
    if written < start || written > end {
        return Err(Error::Invariant(format!(
            "routine reported row {written} outside [{start}, {end}]"
        )));
    }
    if written == end {
        Ok(PassOutcome::Complete {
            emitted: end - start,
        })
    } else {
        Ok(PassOutcome::Pending {
            emitted: written - start,
            offset: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_pass() {
        let o = outcome(0, 1000, 1000).unwrap();
        assert_eq!(o, PassOutcome::Complete { emitted: 1000 });
        assert_eq!(o.next_state(), ExecState::Normal);
    }

    #[test]
    fn partial_then_resumed() {
        let first = outcome(0, 1000, 400).unwrap();
        assert_eq!(first.emitted(), 400);
        assert_eq!(first.next_state(), ExecState::Remainder { offset: 400 });

        let second = outcome(400, 1000, 1000).unwrap();
        assert_eq!(second, PassOutcome::Complete { emitted: 600 });
    }

    #[test]
    fn zero_progress_is_pending() {
        // nothing fit; the same offset is retried on the next pull
        let o = outcome(400, 1000, 400).unwrap();
        assert_eq!(o, PassOutcome::Pending { emitted: 0, offset: 400 });
    }

    #[test]
    fn out_of_range_result_rejected() {
        assert!(outcome(10, 20, 5).is_err());
        assert!(outcome(10, 20, 21).is_err());
    }
}
