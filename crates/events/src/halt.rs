use worldline_core::{DenseOutput, Effect, Event, EventKind, Point};

/// Stops the run at the first committed point where a predicate holds.
///
/// The predicate is checked at the initial state and after every committed
/// step. It is not localized; use a modifying event to stop at an exact
/// crossing.
pub struct Halt<F> {
    predicate: F,
    halted_at: Option<f64>,
}

impl<F> Halt<F>
where
    F: FnMut(f64, &[f64]) -> bool,
{
    /// Creates an event that halts when `predicate(t, y)` returns true.
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            halted_at: None,
        }
    }

    /// Returns the time at which the run was halted, if it was.
    #[must_use]
    pub fn halted_at(&self) -> Option<f64> {
        self.halted_at
    }
}

impl<F> Event for Halt<F>
where
    F: FnMut(f64, &[f64]) -> bool,
{
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn value(&mut self, t: f64, _dt: f64, y: &[f64], _dydt: &[f64]) -> f64 {
        if (self.predicate)(t, y) { 0.0 } else { 1.0 }
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        self.halted_at = Some(point.t);
        Effect::Unchanged
    }
}
