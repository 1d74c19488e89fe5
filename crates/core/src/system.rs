mod augmented;
mod composite;

pub use augmented::Augmented;
pub use composite::{Composite, CompositeError};

use std::rc::Rc;

/// A derivative system: the right-hand side of `dy/dt = f(t, y)`.
///
/// Implementations must be pure. Repeating a call with the same `(t, y)` must
/// write the same derivative, because the integrator retries rejected steps
/// and re-steps during event localization from identical inputs.
///
/// The dimension is fixed for the lifetime of the system.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
///
/// use worldline_core::System;
///
/// struct Decay {
///     rate: f64,
/// }
///
/// impl System for Decay {
///     type Error = Infallible;
///
///     fn dimension(&self) -> usize {
///         1
///     }
///
///     fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
///         dydt[0] = -self.rate * y[0];
///         Ok(())
///     }
/// }
///
/// let mut dydt = [0.0];
/// Decay { rate: 2.0 }.derivative(0.0, &[3.0], &mut dydt).unwrap();
/// assert_eq!(dydt, [-6.0]);
/// ```
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the length of the state vector.
    fn dimension(&self) -> usize;

    /// Writes the time derivative of `y` at `t` into `dydt`.
    ///
    /// Both slices have length [`System::dimension`].
    ///
    /// # Errors
    ///
    /// Each system defines its own `Error` type for domain failures, such as
    /// evaluating a coordinate singularity. The integrator propagates these
    /// unchanged.
    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Self::Error>;
}

impl<S: System + ?Sized> System for &S {
    type Error = S::Error;

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Self::Error> {
        (**self).derivative(t, y, dydt)
    }
}

impl<S: System + ?Sized> System for Box<S> {
    type Error = S::Error;

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Self::Error> {
        (**self).derivative(t, y, dydt)
    }
}

impl<S: System + ?Sized> System for Rc<S> {
    type Error = S::Error;

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Self::Error> {
        (**self).derivative(t, y, dydt)
    }
}
