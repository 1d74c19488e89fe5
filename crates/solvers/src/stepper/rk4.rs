use std::mem;

use worldline_core::{DenseOutput, System};

use super::{DenseState, Doubling, StepInput, Stepper};

/// The classic four-stage, fourth-order Runge–Kutta method.
///
/// Dense output is the cubic Hermite interpolant through the step's endpoint
/// states and derivatives. Error estimates use step doubling.
#[derive(Debug, Clone, Default)]
pub struct Rk4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    y_tmp: Vec<f64>,
    y0: Vec<f64>,
    y1: Vec<f64>,
    f1: Vec<f64>,
    has_f1: bool,
    dense: DenseState,
    doubling: Doubling,
    evaluations: usize,
}

impl Rk4 {
    /// Creates an RK4 stepper bound to states of length `n`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        let mut rk4 = Self::default();
        rk4.bind(n);
        rk4
    }
}

impl Stepper for Rk4 {
    fn bind(&mut self, n: usize) {
        if self.k1.len() == n {
            return;
        }
        for buffer in [
            &mut self.k1,
            &mut self.k2,
            &mut self.k3,
            &mut self.k4,
            &mut self.y_tmp,
            &mut self.y0,
            &mut self.y1,
            &mut self.f1,
        ] {
            *buffer = vec![0.0; n];
        }
        self.doubling = Doubling::new(n);
        self.dense = DenseState::Empty;
    }

    fn dimension(&self) -> usize {
        self.k1.len()
    }

    fn order(&self) -> u32 {
        4
    }

    fn error_order(&self) -> u32 {
        5
    }

    fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn step<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        let StepInput { t, h, y, dydt, .. } = input;
        let half = 0.5 * h;

        match dydt {
            Some(dydt) => self.k1.copy_from_slice(dydt),
            None => {
                system.derivative(t, y, &mut self.k1)?;
                self.evaluations += 1;
            }
        }

        for ((tmp, y), k) in self.y_tmp.iter_mut().zip(y).zip(&self.k1) {
            *tmp = y + half * k;
        }
        system.derivative(t + half, &self.y_tmp, &mut self.k2)?;

        for ((tmp, y), k) in self.y_tmp.iter_mut().zip(y).zip(&self.k2) {
            *tmp = y + half * k;
        }
        system.derivative(t + half, &self.y_tmp, &mut self.k3)?;

        for ((tmp, y), k) in self.y_tmp.iter_mut().zip(y).zip(&self.k3) {
            *tmp = y + h * k;
        }
        system.derivative(t + h, &self.y_tmp, &mut self.k4)?;
        self.evaluations += 3;

        for (i, out) in y_out.iter_mut().enumerate() {
            *out = y[i] + h / 6.0 * (self.k1[i] + 2.0 * (self.k2[i] + self.k3[i]) + self.k4[i]);
        }

        self.has_f1 = false;
        if let Some(dydt_out) = dydt_out {
            system.derivative(t + h, y_out, dydt_out)?;
            self.evaluations += 1;
            if input.dense {
                self.f1.copy_from_slice(dydt_out);
                self.has_f1 = true;
            }
        }

        if input.dense {
            self.y0.copy_from_slice(y);
            self.y1.copy_from_slice(y_out);
            self.dense = DenseState::Retained { t, h };
        } else {
            self.dense = DenseState::Empty;
        }

        Ok(())
    }

    fn step_err<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        err: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        let mut doubling = mem::take(&mut self.doubling);
        let result = doubling.step_err(self, system, input, y_out, err, dydt_out);
        self.doubling = doubling;
        result
    }

    fn prepare_dense<S: System>(&mut self, system: &S) -> Result<(), S::Error> {
        let DenseState::Retained { t, h } = self.dense else {
            return Ok(());
        };

        if !self.has_f1 {
            system.derivative(t + h, &self.y1, &mut self.f1)?;
            self.evaluations += 1;
            self.has_f1 = true;
        }

        // k1 still holds the derivative at the start of the retained step.
        self.dense = DenseState::Ready { t, h };
        Ok(())
    }
}

impl DenseOutput for Rk4 {
    fn dense_out(&self, i: usize, t: f64) -> Option<f64> {
        if i >= self.dimension() {
            return None;
        }
        let (s, h) = self.dense.fraction(t)?;

        let (y0, y1) = (self.y0[i], self.y1[i]);
        let (f0, f1) = (self.k1[i], self.f1[i]);

        let hermite = (1.0 - 2.0 * s) * (y1 - y0) + (s - 1.0) * h * f0 + s * h * f1;
        Some((1.0 - s) * y0 + s * y1 + s * (s - 1.0) * hermite)
    }

    fn dense_span(&self) -> Option<[f64; 2]> {
        self.dense.span()
    }
}
