use tracing::warn;
use worldline_core::{DenseOutput, Effect, Event, EventKind, Point};

use crate::{Sample, select};

/// Relative slack for grid times at the end of a step.
const GRID_SLACK: f64 = 1e-12;

/// Records the state on the uniform time grid `t0 + k * dt`, `k = 0, 1, ...`.
///
/// Grid times inside each committed step are evaluated from the stepper's
/// dense output, so the samples do not depend on where the steps fall. A
/// grid time at a step end is sampled before any event changes the state
/// there.
///
/// A run that starts before the last sampled point restarts the grid, so one
/// sampler can serve repeated runs. Samples from every run accumulate.
#[derive(Debug, Clone)]
pub struct Sampler {
    t0: f64,
    dt: f64,
    coordinates: Option<Vec<usize>>,
    next: u64,
    started: bool,
    last_t: f64,
    samples: Vec<Sample>,
}

impl Sampler {
    /// Creates a sampler on the grid starting at `t0` with spacing `dt`.
    ///
    /// A non-positive or non-finite `dt` samples nothing.
    #[must_use]
    pub fn new(t0: f64, dt: f64) -> Self {
        Self {
            t0,
            dt,
            coordinates: None,
            next: 0,
            started: false,
            last_t: f64::NEG_INFINITY,
            samples: Vec::new(),
        }
    }

    /// Records only the given coordinates, in the given order.
    #[must_use]
    pub fn with_coordinates(self, coordinates: impl IntoIterator<Item = usize>) -> Self {
        Self {
            coordinates: Some(coordinates.into_iter().collect()),
            ..self
        }
    }

    /// Returns the recorded samples.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consumes the sampler and returns its samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    #[allow(clippy::cast_precision_loss)]
    fn grid_time(&self) -> f64 {
        self.t0 + self.next as f64 * self.dt
    }

    /// Advances past grid times before `t`, sampling `y` at a grid time equal
    /// to `t`.
    fn sample_initial(&mut self, t: f64, y: &[f64]) {
        let slack = GRID_SLACK * t.abs().max(1.0);
        while self.grid_time() < t - slack {
            self.next += 1;
        }
        if self.grid_time() <= t + slack {
            self.samples.push(Sample {
                t: self.grid_time(),
                y: select(self.coordinates.as_deref(), y),
            });
            self.next += 1;
        }
    }

    /// Samples every pending grid time inside `[start, end]`.
    fn sample_step(&mut self, dense: &dyn DenseOutput, [start, end]: [f64; 2], n: usize) {
        let slack = GRID_SLACK * end.abs().max(1.0);
        while self.grid_time() < start - slack {
            self.next += 1;
        }

        while self.grid_time() <= end + slack {
            let t = self.grid_time().min(end);
            let state: Option<Vec<f64>> = (0..n).map(|i| dense.dense_out(i, t)).collect();
            let Some(state) = state else {
                warn!(t, "dense output unavailable, sample skipped");
                return;
            };

            self.samples.push(Sample {
                t: self.grid_time(),
                y: select(self.coordinates.as_deref(), &state),
            });
            self.next += 1;
        }
    }
}

impl Event for Sampler {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn needs_dense_output(&self) -> bool {
        true
    }

    fn value(&mut self, _t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        0.0
    }

    fn apply(&mut self, dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Effect::Unchanged;
        }

        if self.started && point.t < self.last_t {
            self.started = false;
            self.next = 0;
        }
        self.last_t = point.t;

        if !self.started {
            self.started = true;
            self.sample_initial(point.t, point.y);
        } else if let Some(span) = dense.dense_span() {
            self.sample_step(dense, span, point.y.len());
        }
        Effect::Unchanged
    }
}
