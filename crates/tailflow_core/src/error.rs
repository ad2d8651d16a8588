use crate::interval::Interval;
use std::fmt;
use thiserror::Error;

/// Why a self-consistent (isolating) bound could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SelfConsistencyFailure {
    /// The lower bound of a dissipative mode overtook the upper bound.
    InvertedRange { mode: usize },
    /// The first tail mode is not dissipative, so no tail constant can isolate it.
    TailNotDissipative { mode: usize },
    IterationLimit { iterations: usize },
}

impl fmt::Display for SelfConsistencyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvertedRange { mode } => {
                write!(f, "inequality for mode {mode} cannot be solved")
            }
            Self::TailNotDissipative { mode } => {
                write!(f, "tail mode {mode} is not dissipative")
            }
            Self::IterationLimit { iterations } => {
                write!(f, "loop limit of {iterations} iterations exceeded")
            }
        }
    }
}

/// Where an empty intersection of two rigorous enclosures was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnclosureStage {
    SeriesSummation,
    TailUpdate,
    InitialSet,
    AffineUpdate,
    FinalizeMove,
}

impl fmt::Display for EnclosureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SeriesSummation => "series summation",
            Self::TailUpdate => "tail update",
            Self::InitialSet => "initial set",
            Self::AffineUpdate => "affine update",
            Self::FinalizeMove => "move finalization",
        };
        f.write_str(name)
    }
}

fn describe_time(time: &Option<Interval>) -> String {
    match time {
        Some(t) => format!(" at t = {t}"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PdeError {
    #[error(
        "invalid tail envelope: constant {constant} must be non-negative and decay {decay} must exceed 1"
    )]
    InvalidEnvelope { constant: f64, decay: f64 },

    #[error("cannot make self-consistent bound: {reason}")]
    SelfConsistency { reason: SelfConsistencyFailure },

    #[error("cannot find an enclosure after {attempts} attempts (last step {step:e})")]
    EnclosureNotFound { attempts: usize, step: f64 },

    #[error("inconsistent enclosure in {stage} at mode {mode}{}", describe_time(.time))]
    InconsistentEnclosure {
        stage: EnclosureStage,
        mode: usize,
        time: Option<Interval>,
    },

    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("order of the Taylor method must be at least 1")]
    InvalidOrder,

    #[error("matrix is singular or too ill-conditioned to invert rigorously")]
    SingularMatrix,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl PdeError {
    pub(crate) fn inconsistent(stage: EnclosureStage, mode: usize) -> Self {
        Self::InconsistentEnclosure {
            stage,
            mode,
            time: None,
        }
    }

    /// Attaches the time of failure to an `InconsistentEnclosure`.
    pub fn at_time(self, t: Interval) -> Self {
        match self {
            Self::InconsistentEnclosure { stage, mode, .. } => Self::InconsistentEnclosure {
                stage,
                mode,
                time: Some(t),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PdeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_enclosure_reports_mode_and_time() {
        let err = PdeError::inconsistent(EnclosureStage::TailUpdate, 7);
        assert_eq!(
            err.to_string(),
            "inconsistent enclosure in tail update at mode 7"
        );
        let timed = err.at_time(Interval::new(0.5, 0.5));
        assert!(timed.to_string().contains("at t = [5e-1, 5e-1]"));
    }

    #[test]
    fn at_time_leaves_other_errors_untouched() {
        let err = PdeError::InvalidOrder.at_time(Interval::ONE);
        assert_eq!(err, PdeError::InvalidOrder);
    }
}
