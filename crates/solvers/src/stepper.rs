//! Runge–Kutta steppers.
//!
//! A [`Stepper`] advances a state by one step of a given size. Steppers own
//! their per-step scratch buffers, sized by [`Stepper::bind`], and retain the
//! stage values of the most recent step so that [`Stepper::prepare_dense`]
//! can build a continuous interpolant over it.

mod any;
mod dop853;
mod doubling;
mod rk4;

pub use any::{AnyStepper, StepperKind, UnknownStepper};
pub use dop853::Dop853;
pub use doubling::Doubling;
pub use rk4::Rk4;

use worldline_core::{DenseOutput, System};

/// The starting point of one step.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Start time.
    pub t: f64,

    /// Step size, may be negative.
    pub h: f64,

    /// State at `t`.
    pub y: &'a [f64],

    /// Derivative at `(t, y)`, if the caller already has it.
    pub dydt: Option<&'a [f64]>,

    /// Whether to retain stage values for [`Stepper::prepare_dense`].
    pub dense: bool,
}

impl<'a> StepInput<'a> {
    /// Creates a step input without a known derivative or dense output.
    #[must_use]
    pub fn new(t: f64, h: f64, y: &'a [f64]) -> Self {
        Self {
            t,
            h,
            y,
            dydt: None,
            dense: false,
        }
    }

    /// Reuses a derivative already evaluated at `(t, y)`.
    #[must_use]
    pub fn with_dydt(self, dydt: &'a [f64]) -> Self {
        Self {
            dydt: Some(dydt),
            ..self
        }
    }

    /// Retains stage values so dense output can be prepared for this step.
    #[must_use]
    pub fn with_dense(self, dense: bool) -> Self {
        Self { dense, ..self }
    }
}

/// A fixed-tableau one-step method.
///
/// All slices passed to a stepper have length [`Stepper::dimension`].
pub trait Stepper: DenseOutput {
    /// Sizes scratch buffers for states of length `n`.
    ///
    /// Rebinding to the current dimension keeps existing buffers. Any other
    /// dimension reallocates them and discards retained dense output.
    fn bind(&mut self, n: usize);

    /// Returns the bound state dimension.
    fn dimension(&self) -> usize;

    /// Returns the convergence order of the solution.
    fn order(&self) -> u32;

    /// Returns the order of the local error estimate.
    fn error_order(&self) -> u32;

    /// Returns the number of system evaluations made since construction.
    fn evaluations(&self) -> usize;

    /// Advances `input.y` by `input.h` into `y_out`.
    ///
    /// Writes the derivative at the end of the step into `dydt_out` when
    /// given, which lets the caller chain it into the next step.
    ///
    /// # Errors
    ///
    /// Returns the system's error unchanged if any evaluation fails.
    fn step<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error>;

    /// Advances like [`Stepper::step`] and writes an absolute local error
    /// estimate for each coordinate into `err`.
    ///
    /// The provided implementation is the step-doubling fallback: one full
    /// step compared against two half steps. It triples the cost of a step
    /// and is only meant for steppers without an embedded pair.
    ///
    /// # Errors
    ///
    /// Returns the system's error unchanged if any evaluation fails.
    fn step_err<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        err: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error>
    where
        Self: Sized,
    {
        let mut scratch = Doubling::new(self.dimension());
        scratch.step_err(self, system, input, y_out, err, dydt_out)
    }

    /// Builds the dense interpolant for the most recent step.
    ///
    /// Does nothing unless that step retained its stage values. High-order
    /// interpolants may evaluate the system a few extra times.
    ///
    /// # Errors
    ///
    /// Returns the system's error unchanged if any evaluation fails.
    fn prepare_dense<S: System>(&mut self, system: &S) -> Result<(), S::Error>;
}

/// Tracks whether the most recent step can serve dense output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) enum DenseState {
    /// No step retained.
    #[default]
    Empty,

    /// The step over `[t, t + h]` retained its stage values.
    Retained { t: f64, h: f64 },

    /// The interpolant over `[t, t + h]` is ready.
    Ready { t: f64, h: f64 },
}

impl DenseState {
    /// Returns the normalized step fraction of `t` when the interpolant is ready.
    pub(crate) fn fraction(self, t: f64) -> Option<(f64, f64)> {
        match self {
            Self::Ready { t: t0, h } => Some(((t - t0) / h, h)),
            _ => None,
        }
    }

    pub(crate) fn span(self) -> Option<[f64; 2]> {
        match self {
            Self::Ready { t, h } => Some([t, t + h]),
            _ => None,
        }
    }
}
