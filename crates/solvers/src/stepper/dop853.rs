mod tableau;

use worldline_core::{DenseOutput, System};

use super::{DenseState, StepInput, Stepper};

use tableau::{A, B, C, D, E3, E5, STAGES};

/// The Dormand–Prince 8(5,3) embedded Runge–Kutta method.
///
/// Twelve stages produce an eighth-order solution. The same stages feed a
/// fifth-order and a third-order estimator, which are blended into one
/// per-coordinate error estimate at no extra cost.
///
/// Dense output is a degree-7 polynomial. It reuses the derivative at the end
/// of the step and needs three more stages, evaluated only by
/// [`Stepper::prepare_dense`].
#[derive(Debug, Clone, Default)]
pub struct Dop853 {
    k: [Vec<f64>; 16],
    y_tmp: Vec<f64>,
    y0: Vec<f64>,
    y1: Vec<f64>,
    has_end_derivative: bool,
    cont: [Vec<f64>; 8],
    dense: DenseState,
    evaluations: usize,
}

impl Dop853 {
    /// Creates a DOP853 stepper bound to states of length `n`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        let mut dop = Self::default();
        dop.bind(n);
        dop
    }

    /// Evaluates the solution stages and writes the eighth-order solution.
    fn advance<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        let StepInput { t, h, y, dydt, .. } = input;

        match dydt {
            Some(dydt) => self.k[0].copy_from_slice(dydt),
            None => {
                system.derivative(t, y, &mut self.k[0])?;
                self.evaluations += 1;
            }
        }

        for stage in 1..STAGES {
            self.evaluate_stage(system, stage, t, h, y)?;
        }

        combine(y_out, y, h, &B, &self.k);

        self.has_end_derivative = false;
        if let Some(dydt_out) = dydt_out {
            system.derivative(t + h, y_out, dydt_out)?;
            self.evaluations += 1;
            if input.dense {
                self.k[STAGES].copy_from_slice(dydt_out);
                self.has_end_derivative = true;
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

    /// Fills `k[stage]` from the stages before it.
    fn evaluate_stage<S: System>(
        &mut self,
        system: &S,
        stage: usize,
        t: f64,
        h: f64,
        y: &[f64],
    ) -> Result<(), S::Error> {
        let (done, rest) = self.k.split_at_mut(stage);
        combine(&mut self.y_tmp, y, h, A[stage], done);
        system.derivative(t + C[stage] * h, &self.y_tmp, &mut rest[0])?;
        self.evaluations += 1;
        Ok(())
    }
}

/// Writes `y + h * sum_j(weights[j] * k[j])` into `out`.
fn combine(out: &mut [f64], y: &[f64], h: f64, weights: &[f64], k: &[Vec<f64>]) {
    out.copy_from_slice(y);
    for (weight, stage) in weights.iter().zip(k) {
        if *weight == 0.0 {
            continue;
        }
        let scaled = h * weight;
        for (o, ki) in out.iter_mut().zip(stage) {
            *o += scaled * ki;
        }
    }
}

impl Stepper for Dop853 {
    fn bind(&mut self, n: usize) {
        if self.y_tmp.len() == n {
            return;
        }
        for buffer in self.k.iter_mut().chain(self.cont.iter_mut()) {
            *buffer = vec![0.0; n];
        }
        self.y_tmp = vec![0.0; n];
        self.y0 = vec![0.0; n];
        self.y1 = vec![0.0; n];
        self.dense = DenseState::Empty;
    }

    fn dimension(&self) -> usize {
        self.y_tmp.len()
    }

    fn order(&self) -> u32 {
        8
    }

    fn error_order(&self) -> u32 {
        9
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
        self.advance(system, input, y_out, dydt_out)
    }

    fn step_err<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        err: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        self.advance(system, input, y_out, dydt_out)?;

        let h = input.h.abs();
        for (i, e) in err.iter_mut().enumerate() {
            let (mut e5, mut e3) = (0.0, 0.0);
            for (j, stage) in self.k[..STAGES].iter().enumerate() {
                e5 += E5[j] * stage[i];
                e3 += E3[j] * stage[i];
            }
            let denominator = (e5 * e5 + 0.01 * e3 * e3).sqrt();
            *e = if denominator > 0.0 {
                h * e5 * e5 / denominator
            } else {
                0.0
            };
        }

        Ok(())
    }

    fn prepare_dense<S: System>(&mut self, system: &S) -> Result<(), S::Error> {
        let DenseState::Retained { t, h } = self.dense else {
            return Ok(());
        };

        if !self.has_end_derivative {
            system.derivative(t + h, &self.y1, &mut self.k[STAGES])?;
            self.evaluations += 1;
            self.has_end_derivative = true;
        }

        let y0 = std::mem::take(&mut self.y0);
        for stage in STAGES + 1..16 {
            self.evaluate_stage(system, stage, t, h, &y0)?;
        }
        self.y0 = y0;

        for i in 0..self.dimension() {
            let y0 = self.y0[i];
            let delta = self.y1[i] - y0;
            let slope0 = h * self.k[0][i] - delta;

            self.cont[0][i] = y0;
            self.cont[1][i] = delta;
            self.cont[2][i] = slope0;
            self.cont[3][i] = delta - h * self.k[STAGES][i] - slope0;

            for (row, weights) in D.iter().enumerate() {
                let sum: f64 = weights
                    .iter()
                    .zip(&self.k)
                    .map(|(d, stage)| d * stage[i])
                    .sum();
                self.cont[4 + row][i] = h * sum;
            }
        }

        self.dense = DenseState::Ready { t, h };
        Ok(())
    }
}

impl DenseOutput for Dop853 {
    fn dense_out(&self, i: usize, t: f64) -> Option<f64> {
        if i >= self.dimension() {
            return None;
        }
        let (s, _) = self.dense.fraction(t)?;
        let s1 = 1.0 - s;
        let c = |r: usize| self.cont[r][i];

        let inner = c(4) + s * (c(5) + s1 * (c(6) + s * c(7)));
        Some(c(0) + s * (c(1) + s1 * (c(2) + s * (c(3) + s1 * inner))))
    }

    fn dense_span(&self) -> Option<[f64; 2]> {
        self.dense.span()
    }
}
