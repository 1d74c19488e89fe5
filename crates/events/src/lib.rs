//! Reusable events for the Worldline integrator.
//!
//! Each type implements [`worldline_core::Event`] and keeps the results it
//! gathers. Register an event through `&mut` to read those results after the
//! integrator is dropped, or through `Rc<RefCell<_>>` to read them while it
//! is still alive.
//!
//! - [`Recorder`]: records the committed state after every step
//! - [`Sampler`]: records the dense-output state on a uniform time grid
//! - [`Halt`]: stops the run when a predicate on the state holds
//! - [`Reflect`]: reverses selected coordinates when a level is crossed
//! - [`Renormalize`]: keeps a companion trajectory close to its reference and
//!   accumulates the growth of their separation

mod halt;
mod recorder;
mod reflect;
mod renormalize;
mod sampler;

pub use halt::Halt;
pub use recorder::Recorder;
pub use reflect::Reflect;
pub use renormalize::{Renormalize, RenormalizeError};
pub use sampler::Sampler;

/// A recorded point of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub t: f64,

    /// The recorded coordinates, in selection order.
    pub y: Vec<f64>,
}

/// Copies the selected coordinates of `y`, or all of them if none are selected.
///
/// Coordinates beyond the end of `y` are recorded as NaN.
fn select(coordinates: Option<&[usize]>, y: &[f64]) -> Vec<f64> {
    match coordinates {
        Some(indices) => indices
            .iter()
            .map(|&i| y.get(i).copied().unwrap_or(f64::NAN))
            .collect(),
        None => y.to_vec(),
    }
}
