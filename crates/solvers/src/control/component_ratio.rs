use super::{ControllerError, StepControl, Verdict, check_error_order, check_safety, check_tolerances};

/// Ratios above this reject the step.
const SHRINK_ABOVE: f64 = 1.1;

/// Ratios below this grow the step.
const GROW_BELOW: f64 = 0.5;

/// Largest factor a single adjustment may shrink or grow the step by.
const MAX_FACTOR: f64 = 5.0;

/// Controls the worst per-coordinate ratio of error to desired error.
///
/// The desired error of coordinate `i` is
///
/// ```text
/// D_i = eps_abs + eps_rel * (a_y * |y_i| + a_dydt * |dydt_i|)
/// ```
///
/// and the controlled quantity is `R = max_i err_i / D_i`. With `S` the
/// safety factor and `k` the error order:
///
/// - `R > 1.1` rejects the step and shrinks it to `h * S * R^(-1/k)`, but not
///   below `h / 5`.
/// - `R < 0.5` accepts the step and grows it to `h * S * R^(-1/(k+1))`, but
///   not beyond `5 * h` and never below `h`.
/// - Otherwise the step is accepted unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "raw::ComponentRatio")
)]
pub struct ComponentRatio {
    eps_abs: f64,
    eps_rel: f64,
    a_y: f64,
    a_dydt: f64,
    safety: f64,
    error_order: u32,
}

impl ComponentRatio {
    /// Creates a controller scaled by `|y|` only, with safety factor `0.95`.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite, if both are
    /// zero, or if `error_order` is zero.
    pub fn new(eps_abs: f64, eps_rel: f64, error_order: u32) -> Result<Self, ControllerError> {
        check_tolerances(eps_abs, eps_rel)?;
        check_error_order(error_order)?;
        Ok(Self {
            eps_abs,
            eps_rel,
            a_y: 1.0,
            a_dydt: 0.0,
            safety: 0.95,
            error_order,
        })
    }

    /// Sets the weights of `|y|` and `|dydt|` in the desired error.
    ///
    /// # Errors
    ///
    /// Returns an error if either weight is negative or non-finite.
    pub fn with_scaling(self, a_y: f64, a_dydt: f64) -> Result<Self, ControllerError> {
        let valid = |a: f64| a.is_finite() && a >= 0.0;
        if !valid(a_y) || !valid(a_dydt) {
            return Err(ControllerError::Scaling);
        }
        Ok(Self {
            a_y,
            a_dydt,
            ..self
        })
    }

    /// Sets the safety factor.
    ///
    /// # Errors
    ///
    /// Returns an error unless `0 < safety <= 1`.
    pub fn with_safety(self, safety: f64) -> Result<Self, ControllerError> {
        check_safety(safety)?;
        Ok(Self { safety, ..self })
    }

    pub(crate) fn with_error_order(self, error_order: u32) -> Self {
        Self {
            error_order: error_order.max(1),
            ..self
        }
    }

    /// Returns the worst ratio of estimated to desired error.
    #[must_use]
    pub fn ratio(&self, y: &[f64], err: &[f64], dydt: &[f64]) -> f64 {
        y.iter()
            .zip(err)
            .zip(dydt)
            .map(|((y, err), dydt)| {
                let desired =
                    self.eps_abs + self.eps_rel * (self.a_y * y.abs() + self.a_dydt * dydt.abs());
                err / desired
            })
            .fold(0.0, f64::max)
    }

    /// Returns the absolute tolerance.
    #[must_use]
    pub fn eps_abs(&self) -> f64 {
        self.eps_abs
    }

    /// Returns the relative tolerance.
    #[must_use]
    pub fn eps_rel(&self) -> f64 {
        self.eps_rel
    }

    /// Returns the safety factor.
    #[must_use]
    pub fn safety(&self) -> f64 {
        self.safety
    }
}

impl StepControl for ComponentRatio {
    fn error_order(&self) -> u32 {
        self.error_order
    }

    fn adjust(&mut self, y: &[f64], err: &[f64], dydt: &[f64], h: &mut f64) -> Verdict {
        let ratio = self.ratio(y, err, dydt);
        let k = f64::from(self.error_order);

        if ratio > SHRINK_ABOVE {
            let factor = (self.safety * ratio.powf(-1.0 / k)).max(1.0 / MAX_FACTOR);
            *h *= factor;
            return Verdict::Reject;
        }

        if ratio < GROW_BELOW {
            let factor = if ratio > 0.0 {
                (self.safety * ratio.powf(-1.0 / (k + 1.0))).clamp(1.0, MAX_FACTOR)
            } else {
                MAX_FACTOR
            };
            *h *= factor;
        }

        Verdict::Accept
    }
}

#[cfg(feature = "serde")]
mod raw {
    use crate::control::ControllerError;

    /// Unvalidated mirror of [`super::ComponentRatio`].
    #[derive(serde::Deserialize)]
    pub(super) struct ComponentRatio {
        eps_abs: f64,
        eps_rel: f64,
        a_y: f64,
        a_dydt: f64,
        safety: f64,
        error_order: u32,
    }

    impl TryFrom<ComponentRatio> for super::ComponentRatio {
        type Error = ControllerError;

        fn try_from(raw: ComponentRatio) -> Result<Self, Self::Error> {
            super::ComponentRatio::new(raw.eps_abs, raw.eps_rel, raw.error_order)?
                .with_scaling(raw.a_y, raw.a_dydt)?
                .with_safety(raw.safety)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn controller() -> ComponentRatio {
        ComponentRatio::new(1e-6, 0.0, 4).unwrap()
    }

    #[test]
    fn rejects_and_shrinks_large_errors() {
        let mut c = controller();
        let mut h = 1.0;

        let verdict = c.adjust(&[1.0], &[16e-6], &[0.0], &mut h);

        assert_eq!(verdict, Verdict::Reject);
        assert_relative_eq!(h, 0.95 * 0.5);
    }

    #[test]
    fn shrink_is_limited_to_a_fifth() {
        let mut c = controller();
        let mut h = 1.0;

        c.adjust(&[1.0], &[1.0], &[0.0], &mut h);

        assert_relative_eq!(h, 0.2);
    }

    #[test]
    fn accepts_moderate_errors_unchanged() {
        let mut c = controller();
        let mut h = 0.3;

        let verdict = c.adjust(&[1.0], &[0.8e-6], &[0.0], &mut h);

        assert_eq!(verdict, Verdict::Accept);
        assert_eq!(h, 0.3);
    }

    #[test]
    fn grows_small_errors_within_bounds() {
        let mut c = controller();

        let mut h = 1.0;
        assert_eq!(c.adjust(&[1.0], &[1e-6 / 32.0], &[0.0], &mut h), Verdict::Accept);
        assert_relative_eq!(h, 0.95 * 2.0);

        let mut h = 1.0;
        c.adjust(&[1.0], &[1e-20], &[0.0], &mut h);
        assert_relative_eq!(h, 5.0);

        let mut h = 1.0;
        c.adjust(&[1.0], &[0.0], &[0.0], &mut h);
        assert_relative_eq!(h, 5.0);
    }

    #[test]
    fn acceptance_never_shrinks() {
        let mut c = controller().with_safety(0.5).unwrap();
        let mut h = 1.0;

        let verdict = c.adjust(&[1.0], &[0.45e-6], &[0.0], &mut h);

        assert_eq!(verdict, Verdict::Accept);
        assert_relative_eq!(h, 1.0);
    }

    #[test]
    fn desired_error_uses_worst_component() {
        let c = ComponentRatio::new(1e-6, 1e-3, 4)
            .unwrap()
            .with_scaling(1.0, 2.0)
            .unwrap();

        // D = [1e-6 + 1e-3 * (10 + 0), 1e-6 + 1e-3 * (0 + 2 * 0.5)]
        let ratio = c.ratio(&[10.0, 0.0], &[1.0001e-2, 2.002e-3], &[0.0, 0.5]);
        assert_relative_eq!(ratio, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(ComponentRatio::new(0.0, 0.0, 4), Err(ControllerError::ZeroTolerances));
        assert_eq!(ComponentRatio::new(1e-6, 1e-6, 0), Err(ControllerError::ErrorOrder));
        assert_eq!(controller().with_safety(1.5), Err(ControllerError::Safety));
        assert_eq!(controller().with_scaling(-1.0, 0.0), Err(ControllerError::Scaling));
    }
}
