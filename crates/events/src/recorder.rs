use worldline_core::{DenseOutput, Effect, Event, EventKind, Point};

use crate::{Sample, select};

/// Records the committed state after every step, starting with the initial
/// state.
#[derive(Debug, Clone)]
pub struct Recorder {
    stride: usize,
    coordinates: Option<Vec<usize>>,
    seen: usize,
    samples: Vec<Sample>,
}

impl Recorder {
    /// Creates a recorder of every committed step and every coordinate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stride: 1,
            coordinates: None,
            seen: 0,
            samples: Vec::new(),
        }
    }

    /// Records only every `stride`-th committed point, counting the initial
    /// state as the first.
    ///
    /// A stride of zero is treated as one.
    #[must_use]
    pub fn with_stride(self, stride: usize) -> Self {
        Self {
            stride: stride.max(1),
            ..self
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

    /// Consumes the recorder and returns its samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Event for Recorder {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn value(&mut self, _t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        0.0
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        if self.seen % self.stride == 0 {
            self.samples.push(Sample {
                t: point.t,
                y: select(self.coordinates.as_deref(), point.y),
            });
        }
        self.seen += 1;
        Effect::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;
    use worldline_core::System;
    use worldline_solvers::Integrator;

    /// `x' = -x`, `v' = 1`.
    struct Decay;

    impl System for Decay {
        type Error = Infallible;

        fn dimension(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
            dydt[0] = -y[0];
            dydt[1] = 1.0;
            Ok(())
        }
    }

    fn record(recorder: &mut Recorder) {
        let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
        integrator.add_event(recorder);
        integrator.integrate(&[1.0, 0.0], 0.0, 1.0, 0.25).unwrap();
    }

    #[test]
    fn records_initial_state_and_every_step() {
        let mut recorder = Recorder::new();
        record(&mut recorder);

        let times: Vec<f64> = recorder.samples().iter().map(|s| s.t).collect();
        assert_eq!(times, [0.0, 0.25, 0.5, 0.75, 1.0]);

        let first = &recorder.samples()[0];
        assert_eq!(first.y, [1.0, 0.0]);

        let last = &recorder.samples()[4];
        assert_relative_eq!(last.y[0], (-1.0_f64).exp(), max_relative = 1e-4);
        assert_relative_eq!(last.y[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn stride_skips_steps() {
        let mut recorder = Recorder::new().with_stride(2);
        record(&mut recorder);

        let times: Vec<f64> = recorder.samples().iter().map(|s| s.t).collect();
        assert_eq!(times, [0.0, 0.5, 1.0]);
    }

    #[test]
    fn selected_coordinates_in_order() {
        let mut recorder = Recorder::new().with_coordinates([1, 0, 5]);
        record(&mut recorder);

        let first = &recorder.into_samples()[0];
        assert_eq!(first.y[..2], [0.0, 1.0]);
        assert!(first.y[2].is_nan());
    }

    #[test]
    fn zero_stride_records_everything() {
        let mut recorder = Recorder::default().with_stride(0);
        record(&mut recorder);
        assert_eq!(recorder.samples().len(), 5);
    }
}
