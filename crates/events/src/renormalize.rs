use std::ops::Range;

use thiserror::Error;
use tracing::debug;
use worldline_core::{Composite, DenseOutput, Effect, Event, EventKind, Point};

/// Errors that can occur when configuring a [`Renormalize`] event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenormalizeError {
    #[error("expected a reference and a companion part, found {found} parts")]
    Parts { found: usize },

    #[error("reference has {reference} coordinates but companion has {companion}")]
    Mismatch { reference: usize, companion: usize },

    #[error("reference and companion ranges overlap")]
    Overlap,

    #[error("initial separation must be positive and finite: {0}")]
    Separation(f64),

    #[error("threshold must be finite and greater than the initial separation: {0}")]
    Threshold(f64),
}

/// Keeps a companion trajectory close to a reference trajectory.
///
/// The event triggers when the Euclidean distance between the two crosses
/// `threshold`. It then pulls the companion back along the separation to
/// distance `d0` and adds `ln(d / d0)` to the accumulated growth. Dividing
/// the growth by the elapsed time estimates the largest Lyapunov exponent.
#[derive(Debug, Clone)]
pub struct Renormalize {
    reference: Range<usize>,
    companion: Range<usize>,
    d0: f64,
    threshold: f64,
    growth: f64,
    count: usize,
}

impl Renormalize {
    /// Creates the event for the given coordinate ranges of the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the ranges differ in length or overlap, if `d0`
    /// is not positive, or if `threshold` does not exceed `d0`.
    pub fn new(
        reference: Range<usize>,
        companion: Range<usize>,
        d0: f64,
        threshold: f64,
    ) -> Result<Self, RenormalizeError> {
        if reference.len() != companion.len() {
            return Err(RenormalizeError::Mismatch {
                reference: reference.len(),
                companion: companion.len(),
            });
        }
        if reference.start < companion.end && companion.start < reference.end {
            return Err(RenormalizeError::Overlap);
        }
        if !(d0.is_finite() && d0 > 0.0) {
            return Err(RenormalizeError::Separation(d0));
        }
        if !(threshold.is_finite() && threshold > d0) {
            return Err(RenormalizeError::Threshold(threshold));
        }

        Ok(Self {
            reference,
            companion,
            d0,
            threshold,
            growth: 0.0,
            count: 0,
        })
    }

    /// Creates the event for a composite whose first part is the reference
    /// and whose second part is the companion.
    ///
    /// # Errors
    ///
    /// Returns an error if the composite does not have exactly two parts of
    /// equal dimension, or if the distances are invalid.
    pub fn for_composite<E>(
        composite: &Composite<E>,
        d0: f64,
        threshold: f64,
    ) -> Result<Self, RenormalizeError>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if composite.len() != 2 {
            return Err(RenormalizeError::Parts {
                found: composite.len(),
            });
        }
        Self::new(composite.range(0), composite.range(1), d0, threshold)
    }

    /// Returns the distance between reference and companion in `y`.
    ///
    /// Returns NaN if either range lies outside `y`, so the event never
    /// triggers on a state too short for it.
    #[must_use]
    pub fn separation(&self, y: &[f64]) -> f64 {
        let (Some(reference), Some(companion)) = (
            y.get(self.reference.clone()),
            y.get(self.companion.clone()),
        ) else {
            return f64::NAN;
        };

        reference
            .iter()
            .zip(companion)
            .map(|(r, c)| (c - r).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Returns the accumulated `ln(d / d0)` over all renormalizations.
    #[must_use]
    pub fn growth(&self) -> f64 {
        self.growth
    }

    /// Returns the number of renormalizations applied.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the growth rate over `elapsed` time units, including the
    /// growth of the current separation in `y` since the last renormalization.
    #[must_use]
    pub fn exponent(&self, elapsed: f64, y: &[f64]) -> f64 {
        (self.growth + (self.separation(y) / self.d0).ln()) / elapsed
    }
}

impl Event for Renormalize {
    fn kind(&self) -> EventKind {
        EventKind::Modifying
    }

    fn value(&mut self, _t: f64, _dt: f64, y: &[f64], _dydt: &[f64]) -> f64 {
        self.separation(y) - self.threshold
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        let d = self.separation(point.y);
        if !(d.is_finite() && d > 0.0) {
            return Effect::Unchanged;
        }

        let scale = self.d0 / d;
        for (r, c) in self.reference.clone().zip(self.companion.clone()) {
            point.y[c] = point.y[r] + (point.y[c] - point.y[r]) * scale;
        }
        self.growth += (d / self.d0).ln();
        self.count += 1;

        debug!(t = point.t, d, growth = self.growth, "renormalized");
        Effect::StateChanged
    }
}
