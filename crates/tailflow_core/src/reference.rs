//! Non-rigorous Galerkin projection of the Kuramoto-Sivashinsky equation.
//!
//! Used as a floating point reference for the validated integrator. The
//! quadratic term is computed as a convolution of the odd extension of
//! the sine coefficients, evaluated with an FFT of length at least
//! `3G + 1` so that no aliasing reaches the modes `1..=G`.

use crate::solvers::RK4;
use crate::traits::{DynamicalSystem, Steppable};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub struct KsGalerkin {
    nu: f64,
    modes: usize,
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl KsGalerkin {
    pub fn new(nu: f64, modes: usize) -> Self {
        let len = (3 * modes + 1).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            nu,
            modes,
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// `N_k = 2 sum a_n a_{n+k} - sum_{n<k} a_n a_{k-n}` for `k = 1..=G`.
    pub fn nonlinear(&self, a: &[f64], out: &mut [f64]) {
        let mut buffer = vec![Complex::new(0.0, 0.0); self.len];
        for (j, &value) in a.iter().enumerate().take(self.modes) {
            buffer[j + 1] = Complex::new(value, 0.0);
            buffer[self.len - j - 1] = Complex::new(-value, 0.0);
        }
        self.forward.process(&mut buffer);
        for z in buffer.iter_mut() {
            *z = *z * *z;
        }
        self.inverse.process(&mut buffer);
        let scale = 1.0 / self.len as f64;
        for (k, value) in out.iter_mut().enumerate().take(self.modes) {
            // the self-convolution of the odd extension is -N_k
            *value = -buffer[k + 1].re * scale;
        }
    }

    /// Integrates `state` over `time` with RK4 steps no longer than `dt`.
    pub fn integrate(&self, state: &mut [f64], time: f64, dt: f64) {
        if time <= 0.0 {
            return;
        }
        let steps = (time / dt).ceil().max(1.0) as usize;
        let h = time / steps as f64;
        let mut solver = RK4::new(self.modes);
        for _ in 0..steps {
            solver.step(self, state, h);
        }
    }
}

impl DynamicalSystem for KsGalerkin {
    fn dimension(&self) -> usize {
        self.modes
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        self.nonlinear(x, out);
        for (i, value) in out.iter_mut().enumerate().take(self.modes) {
            let k = (i + 1) as f64;
            let lambda = k * k * (1.0 - self.nu * k * k);
            *value = lambda * x[i] + k * *value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric_bound::GeometricBound;
    use crate::interval::Interval;
    use crate::kuramoto_sivashinsky::KsSineVectorField;
    use crate::traits::DissipativeVectorField;

    fn direct_nonlinear(a: &[f64]) -> Vec<f64> {
        let n = a.len();
        let coeff = |k: usize| if (1..=n).contains(&k) { a[k - 1] } else { 0.0 };
        (1..=n)
            .map(|k| {
                let mut sum = 0.0;
                for m in 1..=n {
                    sum += 2.0 * coeff(m) * coeff(m + k);
                }
                for m in 1..k {
                    sum -= coeff(m) * coeff(k - m);
                }
                sum
            })
            .collect()
    }

    #[test]
    fn fft_convolution_matches_the_direct_sum() {
        let a = [0.3, -0.2, 0.1, 0.05, -0.01, 0.002, 0.0];
        let galerkin = KsGalerkin::new(0.1, a.len());
        let mut out = vec![0.0; a.len()];
        galerkin.nonlinear(&a, &mut out);
        for (fft, direct) in out.iter().zip(direct_nonlinear(&a)) {
            assert!((fft - direct).abs() < 1e-14, "{fft} vs {direct}");
        }
    }

    #[test]
    fn galerkin_field_agrees_with_the_interval_field() {
        let values = [0.2, -0.1, 0.05, 0.01, 0.0, 0.0];
        let galerkin = KsGalerkin::new(0.1, values.len());
        let mut out = vec![0.0; values.len()];
        galerkin.apply(&values, &mut out);

        let mut field = KsSineVectorField::new(0.1, values.len(), 4).expect("valid field");
        let mut x = GeometricBound::new(values.len());
        for (i, &v) in values.iter().enumerate() {
            x[i] = Interval::point(v);
        }
        let f = field.evaluate(&x).expect("evaluation");
        for (i, value) in out.iter().enumerate() {
            assert!((f[i].mid() - value).abs() < 1e-12, "mode {}", i + 1);
        }
    }

    #[test]
    fn small_data_decays_towards_zero_in_stable_regime() {
        // nu > 1: every mode is linearly damped
        let galerkin = KsGalerkin::new(1.5, 4);
        let mut state = [1e-3, 5e-4, 0.0, 0.0];
        galerkin.integrate(&mut state, 1.0, 1e-3);
        assert!(state[0] > 0.0 && state[0] < 7e-4, "mode 1: {}", state[0]);
        assert!(state[1..].iter().all(|v| v.abs() < 1e-6));
    }
}
