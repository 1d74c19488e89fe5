//! Steppers, step controllers and the event-driven integrator for Worldline.
//!
//! - [`stepper`]: single-step Runge-Kutta methods with dense output
//! - [`control`]: step-size controllers for adaptive stepping
//! - [`integrator`]: the loop that advances a trajectory and applies events

pub mod control;
pub mod integrator;
pub mod stepper;

pub use integrator::{Integrator, Solution, Status};
pub use stepper::StepperKind;
