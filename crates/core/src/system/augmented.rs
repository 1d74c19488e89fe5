use super::System;

/// A system extended by one auxiliary integrated quantity.
///
/// The state grows from `n` to `n + 1`. The first `n` slots follow the inner
/// system; the last slot integrates `integrand(t, y, dydt)`, evaluated on the
/// inner state and its derivative. Typical quantities are arc length or an
/// affine parameter accumulated along the trajectory.
pub struct Augmented<S, F> {
    inner: S,
    integrand: F,
}

impl<S, F> Augmented<S, F>
where
    S: System,
    F: Fn(f64, &[f64], &[f64]) -> f64,
{
    /// Wraps `inner` with an auxiliary quantity driven by `integrand`.
    pub fn new(inner: S, integrand: F) -> Self {
        Self { inner, integrand }
    }

    /// Returns the wrapped system.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the index of the auxiliary slot.
    pub fn auxiliary_index(&self) -> usize {
        self.inner.dimension()
    }
}

impl<S, F> System for Augmented<S, F>
where
    S: System,
    F: Fn(f64, &[f64], &[f64]) -> f64,
{
    type Error = S::Error;

    fn dimension(&self) -> usize {
        self.inner.dimension() + 1
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Self::Error> {
        let n = self.inner.dimension();
        let (inner_dydt, extra) = dydt.split_at_mut(n);
        self.inner.derivative(t, &y[..n], inner_dydt)?;
        extra[0] = (self.integrand)(t, &y[..n], inner_dydt);
        Ok(())
    }
}
