use crate::error::{PdeError, Result};
use crate::geometric_bound::GeometricBound;
use serde::{Deserialize, Serialize};

/// How the solver picks the length of the next step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StepControl {
    /// Always try `step`; the enclosure loop may not shrink it.
    Fixed { step: f64 },
    /// Choose the step from the size of the last `terms` Taylor coefficients.
    LastTerms { terms: usize, min_step: f64 },
}

impl Default for StepControl {
    fn default() -> Self {
        StepControl::LastTerms {
            terms: 1,
            min_step: 1e-12,
        }
    }
}

/// Bits of mantissa kept in adaptive steps, so that step sums stay exact
/// for many steps.
const STEP_MANTISSA_BITS: u32 = 5;

fn clear_mantissa_bits(x: f64, keep: u32) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let mask = (1u64 << (52 - keep)) - 1;
    f64::from_bits(x.to_bits() & !mask)
}

fn coefficient_norm(level: &GeometricBound) -> f64 {
    level.explicit().iter().fold(0.0f64, |m, x| m.max(x.mag()))
}

impl StepControl {
    pub fn is_adaptive(&self) -> bool {
        matches!(self, StepControl::LastTerms { .. })
    }

    /// Step suggested by the Taylor coefficients `jet[0..=order]`.
    pub fn next_step(&self, jet: &[GeometricBound], order: usize, settings: &SolverSettings) -> f64 {
        match *self {
            StepControl::Fixed { step } => step.min(settings.max_step),
            StepControl::LastTerms { terms, min_step } => {
                let eps = settings
                    .absolute_tolerance
                    .max(settings.relative_tolerance * coefficient_norm(&jet[0]));
                let first = order + 1 - terms.clamp(1, order);
                let step = (first..=order)
                    .filter_map(|r| {
                        let norm = coefficient_norm(&jet[r]);
                        (norm > 0.0).then(|| (eps / norm).powf(1.0 / r as f64))
                    })
                    .fold(settings.max_step, f64::min);
                clear_mantissa_bits(step.max(min_step), STEP_MANTISSA_BITS)
            }
        }
    }
}

/// Settings of [`PdeSolver`](crate::solver::PdeSolver).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Order of the Taylor method.
    pub order: usize,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub max_step: f64,
    #[serde(default)]
    pub step_control: StepControl,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            order: 10,
            absolute_tolerance: 1e-18,
            relative_tolerance: 1e-18,
            max_step: 0.1,
            step_control: StepControl::default(),
        }
    }
}

impl SolverSettings {
    pub fn with_fixed_step(order: usize, step: f64) -> Self {
        Self {
            order,
            step_control: StepControl::Fixed { step },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.order < 1 {
            return Err(PdeError::InvalidOrder);
        }
        if !(self.absolute_tolerance > 0.0) || !(self.relative_tolerance >= 0.0) {
            return Err(PdeError::InvalidSettings(format!(
                "tolerances must be positive, got absolute {} and relative {}",
                self.absolute_tolerance, self.relative_tolerance
            )));
        }
        if !(self.max_step > 0.0) {
            return Err(PdeError::InvalidSettings(format!(
                "max_step must be positive, got {}",
                self.max_step
            )));
        }
        match self.step_control {
            StepControl::Fixed { step } if !(step > 0.0) => Err(PdeError::InvalidSettings(
                format!("fixed step must be positive, got {step}"),
            )),
            StepControl::LastTerms { terms, .. } if terms == 0 || terms > self.order => {
                Err(PdeError::InvalidSettings(format!(
                    "step control needs 1..={} last terms, got {terms}",
                    self.order
                )))
            }
            StepControl::LastTerms { min_step, .. } if !(min_step > 0.0) => Err(
                PdeError::InvalidSettings(format!("min_step must be positive, got {min_step}")),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::jet::new_jet;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut settings = SolverSettings::default();
        settings.order = 0;
        assert_eq!(settings.validate(), Err(PdeError::InvalidOrder));

        let settings = SolverSettings::with_fixed_step(4, 0.0);
        assert_err_contains(settings.validate(), "fixed step must be positive");

        let mut settings = SolverSettings::default();
        settings.step_control = StepControl::LastTerms {
            terms: 11,
            min_step: 1e-9,
        };
        assert_err_contains(settings.validate(), "last terms");
        assert!(SolverSettings::default().validate().is_ok());
    }

    #[test]
    fn last_terms_step_matches_the_tolerance() {
        let settings = SolverSettings {
            order: 2,
            absolute_tolerance: 1e-8,
            relative_tolerance: 0.0,
            max_step: 1.0,
            step_control: StepControl::LastTerms {
                terms: 1,
                min_step: 1e-12,
            },
        };
        let mut jet = new_jet(1, 3);
        jet[0][0] = Interval::ONE;
        jet[2][0] = Interval::point(100.0);
        let step = settings.step_control.next_step(&jet, 2, &settings);
        // sqrt(1e-8 / 100) = 1e-5, rounded down to five mantissa bits
        assert!(step <= 1e-5 && step > 0.9e-5, "step {step}");
        assert_eq!(clear_mantissa_bits(step, STEP_MANTISSA_BITS), step);
    }

    #[test]
    fn vanishing_coefficients_fall_back_to_the_max_step() {
        let settings = SolverSettings::default();
        let jet = new_jet(2, settings.order + 2);
        let step = settings.step_control.next_step(&jet, settings.order, &settings);
        assert!(step <= settings.max_step && step > 0.09);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let json = r#"{"order":6,"absolute_tolerance":1e-12,"relative_tolerance":0.0,"max_step":0.01,"step_control":{"type":"Fixed","step":0.001}}"#;
        let settings: SolverSettings = serde_json::from_str(json).expect("valid json");
        assert_eq!(settings.step_control, StepControl::Fixed { step: 0.001 });
        assert!(!settings.step_control.is_adaptive());
    }
}
