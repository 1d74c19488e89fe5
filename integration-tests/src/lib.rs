//! Shared systems for the cross-crate scenario tests.

use std::convert::Infallible;

use worldline_core::System;

/// Underdamped oscillator, `x' = v`, `v' = -2 xi v - omega0^2 x`.
#[derive(Debug, Clone, Copy)]
pub struct DampedOscillator {
    pub omega0: f64,
    pub xi: f64,
}

impl DampedOscillator {
    /// The oscillator used throughout the scenarios.
    pub const SCENARIO: Self = Self {
        omega0: 1.5,
        xi: 1.0,
    };

    /// Initial state `[x0, v0]` of the scenarios.
    pub const START: [f64; 2] = [0.5, 1.5];

    /// Damped angular frequency.
    #[must_use]
    pub fn omega(&self) -> f64 {
        (self.omega0 * self.omega0 - self.xi * self.xi).sqrt()
    }

    /// Closed-form state at `t` for the initial state `[x0, v0]` at `t = 0`.
    #[must_use]
    pub fn exact(&self, [x0, v0]: [f64; 2], t: f64) -> [f64; 2] {
        let omega = self.omega();
        let a = (v0 + self.xi * x0) / omega;
        let b = x0;

        let decay = (-self.xi * t).exp();
        let (sin, cos) = (omega * t).sin_cos();

        let x = decay * (a * sin + b * cos);
        let v = decay * (omega * (a * cos - b * sin)) - self.xi * x;
        [x, v]
    }
}

impl System for DampedOscillator {
    type Error = Infallible;

    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
        dydt[0] = y[1];
        dydt[1] = -2.0 * self.xi * y[1] - self.omega0 * self.omega0 * y[0];
        Ok(())
    }
}
