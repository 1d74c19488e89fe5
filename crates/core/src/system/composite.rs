use std::{ops::Range, rc::Rc};

use thiserror::Error;

use super::System;

/// Errors that can occur when assembling a [`Composite`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CompositeError {
    #[error("a composite system needs at least one part")]
    Empty,

    #[error("part {index} has zero dimension")]
    ZeroDimension { index: usize },
}

/// Several systems advanced together over one concatenated state.
///
/// Each part sees only its own slice of the state and writes only its own
/// slice of the derivative, so the parts evaluate independently. A typical
/// use is a reference trajectory and a nearby companion trajectory advanced
/// side by side.
///
/// Parts are held by reference count, so the same system can be shared with
/// other combinators and events for as long as any holder needs it.
pub struct Composite<E> {
    parts: Vec<Rc<dyn System<Error = E>>>,
    offsets: Vec<usize>,
}

impl<E> Composite<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Creates a composite from its parts, in state order.
    ///
    /// # Errors
    ///
    /// Returns an error if `parts` is empty or any part has zero dimension.
    pub fn new(parts: Vec<Rc<dyn System<Error = E>>>) -> Result<Self, CompositeError> {
        if parts.is_empty() {
            return Err(CompositeError::Empty);
        }

        let mut offsets = Vec::with_capacity(parts.len() + 1);
        let mut offset = 0;
        offsets.push(offset);
        for (index, part) in parts.iter().enumerate() {
            let n = part.dimension();
            if n == 0 {
                return Err(CompositeError::ZeroDimension { index });
            }
            offset += n;
            offsets.push(offset);
        }

        Ok(Self { parts, offsets })
    }

    /// Returns the number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false; a composite has at least one part.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the range of the concatenated state owned by part `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn range(&self, index: usize) -> Range<usize> {
        self.offsets[index]..self.offsets[index + 1]
    }

    /// Returns part `index` as a shared handle.
    #[must_use]
    pub fn part(&self, index: usize) -> Option<Rc<dyn System<Error = E>>> {
        self.parts.get(index).map(Rc::clone)
    }
}

impl<E> System for Composite<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn dimension(&self) -> usize {
        self.offsets[self.parts.len()]
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), E> {
        for (index, part) in self.parts.iter().enumerate() {
            let range = self.range(index);
            part.derivative(t, &y[range.clone()], &mut dydt[range])?;
        }
        Ok(())
    }
}
