//! The adaptive integration loop.
//!
//! An [`Integrator`] binds a [`System`] to a stepper and either a fixed step
//! size or a step controller, and runs trajectories while applying the
//! registered [`Event`]s.
//!
//! # Example
//!
//! ```
//! use std::convert::Infallible;
//!
//! use worldline_core::System;
//! use worldline_solvers::integrator::{Integrator, Status};
//!
//! struct Decay;
//!
//! impl System for Decay {
//!     type Error = Infallible;
//!
//!     fn dimension(&self) -> usize {
//!         1
//!     }
//!
//!     fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
//!         dydt[0] = -y[0];
//!         Ok(())
//!     }
//! }
//!
//! let mut integrator = Integrator::adaptive(Decay, "dop853", 1e-10, 1e-10)?;
//! let solution = integrator.integrate(&[1.0], 0.0, 2.0, 0.1)?;
//!
//! assert_eq!(solution.status, Status::Completed);
//! assert_eq!(solution.t, 2.0);
//! assert!((solution.y[0] - (-2.0_f64).exp()).abs() < 1e-9);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod error;
mod localize;
mod run;
mod solution;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};
pub use error::{Error, InputError};
pub use solution::{Solution, Stats, Status};

use tracing::warn;
use worldline_core::{Event, System};

use crate::{
    control::{ComponentRatio, Controller},
    stepper::{AnyStepper, Stepper, StepperKind},
};

use run::Run;

/// Integrates a system with a stepper, a step-size policy and events.
///
/// Events are borrowed for `'e`, so `&mut E` can be registered and inspected
/// once the integrator is dropped. Register `Rc<RefCell<E>>` to inspect
/// results while the integrator is still alive.
pub struct Integrator<'e, S: System> {
    system: S,
    stepper: AnyStepper,
    controller: Option<Controller>,
    config: Config,
    events: Vec<Box<dyn Event + 'e>>,
}

impl<'e, S: System> Integrator<'e, S> {
    /// Creates a fixed-step integrator using the named stepper.
    ///
    /// # Errors
    ///
    /// Returns an error if the stepper name is not recognized.
    pub fn fixed(system: S, stepper: &str) -> Result<Self, ConfigError> {
        let kind: StepperKind = stepper.parse()?;
        let stepper = kind.build(system.dimension());
        Ok(Self {
            system,
            stepper,
            controller: None,
            config: Config::default(),
            events: Vec::new(),
        })
    }

    /// Creates an adaptive integrator using the named stepper.
    ///
    /// The step size is controlled by a [`ComponentRatio`] controller with
    /// absolute tolerance `atol` and relative tolerance `rtol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stepper name is not recognized or the
    /// tolerances are invalid.
    pub fn adaptive(system: S, stepper: &str, atol: f64, rtol: f64) -> Result<Self, ConfigError> {
        let integrator = Self::fixed(system, stepper)?;
        let controller = ComponentRatio::new(atol, rtol, integrator.stepper.error_order())?;
        Ok(integrator.with_controller(controller))
    }

    /// Replaces the loop configuration.
    #[must_use]
    pub fn with_config(self, config: Config) -> Self {
        Self { config, ..self }
    }

    /// Switches to adaptive stepping with the given controller.
    ///
    /// The controller's exponent is taken from the stepper's error order.
    #[must_use]
    pub fn with_controller(self, controller: impl Into<Controller>) -> Self {
        let controller = controller
            .into()
            .for_error_order(self.stepper.error_order());
        Self {
            controller: Some(controller),
            ..self
        }
    }

    /// Registers an event, applied in registration order.
    pub fn add_event(&mut self, event: impl Event + 'e) {
        self.events.push(Box::new(event));
    }

    /// Returns the number of registered events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Returns true if a controller adjusts the step size.
    #[must_use]
    pub fn is_adaptive(&self) -> bool {
        self.controller.is_some()
    }

    /// Returns the system being integrated.
    #[must_use]
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Returns the stepper, whose dense output covers the last committed step.
    #[must_use]
    pub fn stepper(&self) -> &AnyStepper {
        &self.stepper
    }

    /// Returns the loop configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Integrates from `(t_start, y_start)` to `t_end`.
    ///
    /// # Algorithm
    ///
    /// 1. Offer the initial state to data events.
    /// 2. While `t < t_end`:
    ///    - Take a trial step of size `h`, clipped to end at `t_end`.
    ///    - For each modifying event whose value changes sign across the
    ///      trial, locate the crossing and shorten the trial to end there.
    ///    - In adaptive mode, let the controller judge the trial. Retry
    ///      rejected steps from the committed state at the proposed size,
    ///      re-checking any pending event against the shorter trial.
    ///    - Commit the trial and prepare dense output if needed.
    ///    - Apply the pending modifying event, then every data event whose
    ///      value is exactly zero.
    ///    - Stop if any applied event is terminal.
    ///
    /// Steps always advance from the last committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs are invalid, if no step size is
    /// accepted within the retry bound, if a step does not advance `t`, if
    /// an event crossing cannot be located, if the state becomes non-finite,
    /// or if the system fails.
    pub fn integrate(
        &mut self,
        y_start: &[f64],
        t_start: f64,
        t_end: f64,
        h_start: f64,
    ) -> Result<Solution, Error> {
        let n = self.validate(y_start, t_start, t_end, h_start)?;
        self.stepper.bind(n);

        let dense = self.config.dense_output() || self.events.iter().any(|e| e.needs_dense_output());

        let run = Run::new(
            &self.system,
            &mut self.stepper,
            self.controller.as_mut(),
            &self.config,
            &mut self.events,
            dense,
        );

        run.execute(y_start, t_start, t_end, h_start)
            .inspect_err(|error| warn!(%error, t_start, t_end, "integration aborted"))
    }

    /// Checks the arguments of `integrate` and returns the state dimension.
    fn validate(
        &self,
        y_start: &[f64],
        t_start: f64,
        t_end: f64,
        h_start: f64,
    ) -> Result<usize, InputError> {
        let n = self.system.dimension();
        if n == 0 {
            return Err(InputError::EmptySystem);
        }
        if y_start.len() != n {
            return Err(InputError::Dimension {
                expected: n,
                found: y_start.len(),
            });
        }
        if !y_start.iter().all(|y| y.is_finite()) {
            return Err(InputError::State);
        }
        if !t_start.is_finite() || !t_end.is_finite() {
            return Err(InputError::Time);
        }
        if t_end < t_start {
            return Err(InputError::Span);
        }
        if !h_start.is_finite() || h_start <= 0.0 {
            return Err(InputError::StepSize);
        }
        Ok(n)
    }
}
