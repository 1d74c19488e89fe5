use worldline_core::System;

use super::{StepInput, Stepper};

/// Scratch for the step-doubling error estimate.
///
/// The estimate compares one step of size `h` with two steps of size `h / 2`
/// from the same start. Their difference is the error of the full step, so
/// it scales as `h^(p + 1)` for a stepper of order `p`.
///
/// The full step runs last, so `y_out` and any retained dense output belong
/// to the single step of size `h`.
#[derive(Debug, Clone, Default)]
pub struct Doubling {
    y_mid: Vec<f64>,
    dydt_mid: Vec<f64>,
    y_halves: Vec<f64>,
}

impl Doubling {
    /// Creates scratch for states of length `n`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            y_mid: vec![0.0; n],
            dydt_mid: vec![0.0; n],
            y_halves: vec![0.0; n],
        }
    }

    /// Returns the state dimension this scratch is sized for.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.y_mid.len()
    }

    /// Runs the full step and both half steps, writing `|y_full - y_halves|`.
    ///
    /// # Errors
    ///
    /// Returns the system's error unchanged if any evaluation fails.
    pub fn step_err<T: Stepper, S: System>(
        &mut self,
        stepper: &mut T,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        err: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        let half = 0.5 * input.h;

        let first = StepInput {
            h: half,
            dense: false,
            ..input
        };
        stepper.step(system, first, &mut self.y_mid, Some(&mut self.dydt_mid))?;

        let second = StepInput::new(input.t + half, half, &self.y_mid).with_dydt(&self.dydt_mid);
        stepper.step(system, second, &mut self.y_halves, None)?;

        stepper.step(system, input, y_out, dydt_out)?;

        for ((e, full), halves) in err.iter_mut().zip(y_out.iter()).zip(&self.y_halves) {
            *e = (full - halves).abs();
        }

        Ok(())
    }
}
