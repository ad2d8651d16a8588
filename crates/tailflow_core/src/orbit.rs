//! Batch driver moving an enclosure set along the Kuramoto-Sivashinsky flow.

use crate::dynset::{
    C0DoubletonSetGeometricTail, C1DoubletonSetGeometricTail, EnclosureSet,
    ReorganizationSettings,
};
use crate::error::{PdeError, Result};
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::kuramoto_sivashinsky::{KsParameters, KsSineVectorField};
use crate::solver::PdeSolver;
use crate::step_control::SolverSettings;
use crate::traits::DissipativeVectorField;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything needed to start an orbit of the KS equation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitSettings {
    pub parameters: KsParameters,
    pub solver: SolverSettings,
    pub reorganization: ReorganizationSettings,
    /// Modes kept in the doubleton; all explicit modes when absent.
    pub leading_modes: Option<usize>,
    /// Midpoints of the first explicit modes; the rest start at zero.
    pub initial: Vec<f64>,
    /// Half-width of the initial box on the leading modes.
    pub radius: f64,
    pub tail_constant: f64,
    pub tail_decay: f64,
    pub steps: usize,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            parameters: KsParameters::default(),
            solver: SolverSettings::default(),
            reorganization: ReorganizationSettings::default(),
            leading_modes: None,
            initial: vec![0.1, 0.05, 0.01],
            radius: 0.0,
            tail_constant: 0.0,
            tail_decay: 2.0,
            steps: 100,
        }
    }
}

impl OrbitSettings {
    pub fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        if self.initial.len() > self.parameters.dimension {
            return Err(PdeError::InvalidSettings(format!(
                "{} initial coefficients for {} explicit modes",
                self.initial.len(),
                self.parameters.dimension
            )));
        }
        if !(self.radius >= 0.0) {
            return Err(PdeError::InvalidSettings(format!(
                "radius must be non-negative, got {}",
                self.radius
            )));
        }
        if self.steps == 0 {
            return Err(PdeError::InvalidSettings(
                "an orbit needs at least one step".to_string(),
            ));
        }
        Ok(())
    }

    pub fn leading_modes(&self) -> usize {
        self.leading_modes.unwrap_or(self.parameters.dimension)
    }

    pub fn initial_series(&self) -> Result<GeometricBound> {
        let dim = self.parameters.dimension;
        let mut x = GeometricBound::with_tail(dim, self.tail_constant, self.tail_decay)?;
        let radius = Interval::symmetric(self.radius);
        let leading = self.leading_modes().min(dim);
        for i in 0..dim {
            let center = Interval::point(self.initial.get(i).copied().unwrap_or(0.0));
            x[i] = if i < leading { center + radius } else { center };
        }
        Ok(x)
    }

    pub fn build_solver(&self) -> Result<PdeSolver<KsSineVectorField>> {
        self.validate()?;
        let field = KsSineVectorField::from_parameters(&self.parameters)?;
        PdeSolver::new(field, self.solver)
    }

    pub fn c0_set(&self) -> Result<C0DoubletonSetGeometricTail> {
        Ok(
            C0DoubletonSetGeometricTail::new(self.initial_series()?, self.leading_modes())?
                .with_reorganization(self.reorganization),
        )
    }

    pub fn c1_set(&self) -> Result<C1DoubletonSetGeometricTail> {
        Ok(
            C1DoubletonSetGeometricTail::new(self.initial_series()?, self.leading_modes())?
                .with_reorganization(self.reorganization),
        )
    }
}

/// State of an orbit after one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitSample {
    pub step: usize,
    /// Bounds of the time enclosure.
    pub time: [f64; 2],
    pub step_size: f64,
    /// Largest width among the explicit modes.
    pub max_width: f64,
    pub tail_constant: f64,
    pub tail_decay: f64,
}

impl OrbitSample {
    pub fn of(set: &impl EnclosureSet, step: usize, step_size: f64) -> Self {
        let series = set.current_series();
        let time = set.current_time();
        Self {
            step,
            time: [time.inf(), time.sup()],
            step_size,
            max_width: series.explicit().iter().fold(0.0f64, |m, x| m.max(x.width())),
            tail_constant: series.constant(),
            tail_decay: series.decay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrbitProgress {
    pub done: bool,
    pub current_step: usize,
    pub max_steps: usize,
}

fn move_with_context<S: EnclosureSet, V: DissipativeVectorField>(
    set: &mut S,
    solver: &mut PdeSolver<V>,
    step: usize,
) -> anyhow::Result<()> {
    let time = set.current_time();
    set.move_by(solver)
        .with_context(|| format!("step {step} from t = {time} failed"))
}

/// Moves `set` by `steps` steps and samples it after each one.
pub fn integrate<S: EnclosureSet, V: DissipativeVectorField>(
    set: &mut S,
    solver: &mut PdeSolver<V>,
    steps: usize,
) -> anyhow::Result<Vec<OrbitSample>> {
    let mut samples = Vec::with_capacity(steps);
    for step in 1..=steps {
        move_with_context(set, solver, step)?;
        samples.push(OrbitSample::of(set, step, solver.step()));
    }
    Ok(samples)
}

/// Runs an orbit in batches, keeping one sample per step.
pub struct OrbitRunner<S: EnclosureSet, V: DissipativeVectorField> {
    solver: PdeSolver<V>,
    set: S,
    steps_done: usize,
    max_steps: usize,
    samples: Vec<OrbitSample>,
}

impl<S: EnclosureSet, V: DissipativeVectorField> OrbitRunner<S, V> {
    pub fn new(solver: PdeSolver<V>, set: S, max_steps: usize) -> Self {
        let samples = vec![OrbitSample::of(&set, 0, 0.0)];
        Self {
            solver,
            set,
            steps_done: 0,
            max_steps,
            samples,
        }
    }

    pub fn is_done(&self) -> bool {
        self.steps_done >= self.max_steps
    }

    pub fn progress(&self) -> OrbitProgress {
        OrbitProgress {
            done: self.is_done(),
            current_step: self.steps_done,
            max_steps: self.max_steps,
        }
    }

    pub fn set(&self) -> &S {
        &self.set
    }

    pub fn solver(&self) -> &PdeSolver<V> {
        &self.solver
    }

    /// Initial sample first, then one per step.
    pub fn samples(&self) -> &[OrbitSample] {
        &self.samples
    }

    pub fn run_steps(&mut self, batch_size: usize) -> anyhow::Result<OrbitProgress> {
        for _ in 0..batch_size {
            if self.is_done() {
                break;
            }
            let step = self.steps_done + 1;
            move_with_context(&mut self.set, &mut self.solver, step)?;
            self.steps_done = step;
            self.samples
                .push(OrbitSample::of(&self.set, step, self.solver.step()));
        }
        let progress = self.progress();
        info!(
            step = progress.current_step,
            max_steps = progress.max_steps,
            time = %self.set.current_time(),
            "orbit batch finished"
        );
        Ok(progress)
    }
}

impl OrbitRunner<C0DoubletonSetGeometricTail, KsSineVectorField> {
    pub fn c0_from_settings(settings: &OrbitSettings) -> anyhow::Result<Self> {
        let solver = settings.build_solver().context("invalid orbit settings")?;
        let set = settings.c0_set().context("invalid initial set")?;
        Ok(Self::new(solver, set, settings.steps))
    }
}

impl OrbitRunner<C1DoubletonSetGeometricTail, KsSineVectorField> {
    pub fn c1_from_settings(settings: &OrbitSettings) -> anyhow::Result<Self> {
        let solver = settings.build_solver().context("invalid orbit settings")?;
        let set = settings.c1_set().context("invalid initial set")?;
        Ok(Self::new(solver, set, settings.steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::KsGalerkin;

    fn assert_err_contains<T: std::fmt::Debug>(result: anyhow::Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn ks_settings() -> OrbitSettings {
        OrbitSettings {
            parameters: KsParameters {
                nu: 0.1,
                dimension: 16,
                first_dissipative_index: None,
            },
            radius: 1e-12,
            ..OrbitSettings::default()
        }
    }

    #[test]
    fn settings_validation_reports_the_problem() {
        let mut settings = ks_settings();
        settings.initial = vec![0.0; 17];
        assert!(matches!(
            settings.validate(),
            Err(PdeError::InvalidSettings(message)) if message.contains("17 initial coefficients")
        ));
        let mut settings = ks_settings();
        settings.steps = 0;
        assert!(settings.validate().is_err());
        assert!(ks_settings().validate().is_ok());
    }

    #[test]
    fn initial_series_widens_only_the_leading_modes() {
        let mut settings = ks_settings();
        settings.leading_modes = Some(2);
        let x = settings.initial_series().expect("valid series");
        assert!(x[0].contains(0.1) && x[0].width() > 0.0);
        assert!(x[1].width() > 0.0);
        assert_eq!(x[2], Interval::point(0.01));
        assert_eq!(x[5], Interval::ZERO);
        assert_eq!(x.constant(), 0.0);
    }

    #[test]
    fn one_step_contains_the_galerkin_reference() {
        let settings = ks_settings();
        let mut solver = settings.build_solver().expect("solver");
        let mut set = settings.c0_set().expect("set");
        set.move_by(&mut solver).expect("one step");

        let h = set.current_time().mid();
        assert!(h > 0.0);
        let galerkin = KsGalerkin::new(0.1, 16);
        let mut reference = vec![0.0; 16];
        reference[..3].copy_from_slice(&settings.initial);
        galerkin.integrate(&mut reference, h, h / 100.0);

        let series = set.current_series();
        for (i, value) in reference.iter().enumerate() {
            assert!(
                Interval::point(*value).subset_interior(series[i]),
                "mode {}: {} not inside {}",
                i + 1,
                value,
                series[i]
            );
        }
        assert!(series.constant().is_finite() && series.constant() >= 0.0);
    }

    #[test]
    fn hundred_steps_stay_narrow() {
        let settings = ks_settings();
        let mut solver = settings.build_solver().expect("solver");
        let mut set = settings.c0_set().expect("set");
        let samples = integrate(&mut set, &mut solver, 100).expect("orbit");
        assert_eq!(samples.len(), 100);
        assert!(samples.windows(2).all(|w| w[1].time[0] >= w[0].time[0]));
        for sample in &samples {
            assert!(sample.max_width < 1e-6, "step {}: {}", sample.step, sample.max_width);
            assert!(sample.tail_constant.is_finite());
            assert!(sample.tail_decay > 1.0);
        }
    }

    #[test]
    fn runner_reports_progress_in_batches() {
        let mut settings = ks_settings();
        settings.steps = 5;
        let mut runner = OrbitRunner::c0_from_settings(&settings).expect("runner");
        let progress = runner.run_steps(3).expect("batch");
        assert_eq!(
            progress,
            OrbitProgress {
                done: false,
                current_step: 3,
                max_steps: 5
            }
        );
        let progress = runner.run_steps(10).expect("batch");
        assert!(progress.done);
        assert_eq!(runner.samples().len(), 6);
        assert_eq!(runner.samples()[0].step, 0);
        let json = serde_json::to_string(&runner.samples()[5]).expect("serializable");
        assert!(json.contains("\"step\":5"));
    }

    #[test]
    fn c1_orbit_runs_a_few_steps() {
        let settings = OrbitSettings {
            parameters: KsParameters {
                nu: 0.1,
                dimension: 8,
                first_dissipative_index: Some(4),
            },
            solver: SolverSettings::with_fixed_step(5, 1e-6),
            leading_modes: Some(4),
            radius: 1e-10,
            steps: 3,
            ..OrbitSettings::default()
        };
        let mut runner = OrbitRunner::c1_from_settings(&settings).expect("runner");
        runner.run_steps(3).expect("C1 steps");
        assert!(runner.is_done());
        let set = runner.set();
        assert!(set.current_time().contains(3e-6));
        assert!(set.dxx_norm().sup() >= 1.0);
    }

    #[test]
    fn non_dissipative_tail_fails_with_context() {
        let settings = OrbitSettings {
            parameters: KsParameters {
                nu: 0.001,
                dimension: 8,
                first_dissipative_index: Some(4),
            },
            solver: SolverSettings::with_fixed_step(4, 1e-6),
            steps: 1,
            ..OrbitSettings::default()
        };
        let mut runner = OrbitRunner::c0_from_settings(&settings).expect("runner");
        let result = runner.run_steps(1);
        assert_err_contains(result, "step 1 from t = ");
        let mut runner = OrbitRunner::c0_from_settings(&settings).expect("runner");
        assert_err_contains(runner.run_steps(1), "tail mode 9 is not dissipative");
    }
}
