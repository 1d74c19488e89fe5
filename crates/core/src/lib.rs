//! Core traits and types for the Worldline integrator.
//!
//! This crate defines the contracts that steppers, events, and the integrator
//! build on:
//!
//! - [`System`]: a pure map from `(t, y)` to `dy/dt` with a fixed dimension
//! - [`Composite`] and [`Augmented`]: systems assembled from other systems
//! - [`Event`]: a trigger function plus an action applied to the trajectory
//! - [`DenseOutput`]: continuous output within the last committed step, the
//!   only stepper capability exposed back to events

mod dense;
mod event;
mod system;

pub use dense::DenseOutput;
pub use event::{Effect, Event, EventKind, Point};
pub use system::{Augmented, Composite, CompositeError, System};
