use std::{cell::RefCell, rc::Rc};

use crate::DenseOutput;

/// How the integrator treats an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// Checked once per committed step and applied at the committed time.
    ///
    /// A data event triggers when its value is exactly zero.
    Data,

    /// Checked against every trial step before it is committed.
    ///
    /// A modifying event triggers when its value changes sign relative to the
    /// last committed state. The integrator then locates the crossing time
    /// and commits the step ending exactly there before applying the event.
    Modifying,
}

/// Reports what an event's `apply` did to the committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The state vector was left as it was.
    Unchanged,

    /// The state vector was modified.
    ///
    /// The integrator re-evaluates the derivative at the new state before the
    /// next step.
    StateChanged,
}

/// The committed point handed to [`Event::apply`].
///
/// `t`, `h` and `y` may be modified in place. The derivative is read-only;
/// return [`Effect::StateChanged`] after editing `y` so it is refreshed.
#[derive(Debug)]
pub struct Point<'a> {
    /// Committed time.
    pub t: f64,

    /// Step size the integrator will try next.
    pub h: f64,

    /// Committed state.
    pub y: &'a mut [f64],

    /// Derivative at the committed state, before any change to `y`.
    pub dydt: &'a [f64],
}

/// A trajectory-dependent condition and the action taken when it holds.
///
/// The integrator calls [`Event::value`] to detect the condition and
/// [`Event::apply`] to act on it. Events keep whatever results they
/// accumulate; register them through `&mut E` or `Rc<RefCell<E>>` to inspect
/// those results after a run.
pub trait Event {
    /// Returns how the integrator should detect and apply this event.
    fn kind(&self) -> EventKind;

    /// Returns true if applying this event ends the run.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Returns true if `apply` queries [`DenseOutput::dense_out`].
    ///
    /// The integrator prepares dense output for every committed step when any
    /// registered event needs it.
    fn needs_dense_output(&self) -> bool {
        false
    }

    /// Evaluates the trigger function at `(t, y)`.
    ///
    /// `dt` is the step that reached `t`. Modifying events are evaluated at
    /// provisional states during localization, so implementations must not
    /// record results here.
    fn value(&mut self, t: f64, dt: f64, y: &[f64], dydt: &[f64]) -> f64;

    /// Acts on the committed point.
    fn apply(&mut self, dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect;
}

impl<E: Event + ?Sized> Event for &mut E {
    fn kind(&self) -> EventKind {
        (**self).kind()
    }

    fn is_terminal(&self) -> bool {
        (**self).is_terminal()
    }

    fn needs_dense_output(&self) -> bool {
        (**self).needs_dense_output()
    }

    fn value(&mut self, t: f64, dt: f64, y: &[f64], dydt: &[f64]) -> f64 {
        (**self).value(t, dt, y, dydt)
    }

    fn apply(&mut self, dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        (**self).apply(dense, point)
    }
}

impl<E: Event + ?Sized> Event for Box<E> {
    fn kind(&self) -> EventKind {
        (**self).kind()
    }

    fn is_terminal(&self) -> bool {
        (**self).is_terminal()
    }

    fn needs_dense_output(&self) -> bool {
        (**self).needs_dense_output()
    }

    fn value(&mut self, t: f64, dt: f64, y: &[f64], dydt: &[f64]) -> f64 {
        (**self).value(t, dt, y, dydt)
    }

    fn apply(&mut self, dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        (**self).apply(dense, point)
    }
}

/// Shared events stay inspectable by their other holders.
///
/// The integrator borrows the cell only while it calls into the event, so
/// holders must not keep a borrow open across `integrate`.
impl<E: Event + ?Sized> Event for Rc<RefCell<E>> {
    fn kind(&self) -> EventKind {
        self.borrow().kind()
    }

    fn is_terminal(&self) -> bool {
        self.borrow().is_terminal()
    }

    fn needs_dense_output(&self) -> bool {
        self.borrow().needs_dense_output()
    }

    fn value(&mut self, t: f64, dt: f64, y: &[f64], dydt: &[f64]) -> f64 {
        self.borrow_mut().value(t, dt, y, dydt)
    }

    fn apply(&mut self, dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        self.borrow_mut().apply(dense, point)
    }
}
