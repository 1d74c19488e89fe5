use super::{ControllerError, StepControl, Verdict, check_error_order, check_safety, check_tolerances};

/// Controls the root-mean-square of the scaled error.
///
/// With `scale_i = atol + rtol * |y_i|` the controlled quantity is
///
/// ```text
/// E = sqrt(mean_i((err_i / scale_i)^2))
/// ```
///
/// The step is accepted when `E <= 1`. Either way the next step size is
/// `h * S * E^(-1/k)`, clamped to `[h * factor_decrease, h * factor_grow]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "raw::RmsNorm")
)]
pub struct RmsNorm {
    atol: f64,
    rtol: f64,
    safety: f64,
    factor_decrease: f64,
    factor_grow: f64,
    error_order: u32,
}

impl RmsNorm {
    /// Creates a controller with safety `0.9` and step factors `[0.2, 10]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite, if both are
    /// zero, or if `error_order` is zero.
    pub fn new(atol: f64, rtol: f64, error_order: u32) -> Result<Self, ControllerError> {
        check_tolerances(atol, rtol)?;
        check_error_order(error_order)?;
        Ok(Self {
            atol,
            rtol,
            safety: 0.9,
            factor_decrease: 0.2,
            factor_grow: 10.0,
            error_order,
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

    /// Sets the bounds on how far one adjustment may move the step size.
    ///
    /// # Errors
    ///
    /// Returns an error unless `0 < decrease < 1 < grow` and both are finite.
    pub fn with_factors(self, decrease: f64, grow: f64) -> Result<Self, ControllerError> {
        if !(decrease > 0.0 && decrease < 1.0 && grow > 1.0 && grow.is_finite()) {
            return Err(ControllerError::Factors);
        }
        Ok(Self {
            factor_decrease: decrease,
            factor_grow: grow,
            ..self
        })
    }

    pub(crate) fn with_error_order(self, error_order: u32) -> Self {
        Self {
            error_order: error_order.max(1),
            ..self
        }
    }

    /// Returns the scaled RMS error of a trial step.
    #[must_use]
    pub fn norm(&self, y: &[f64], err: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let sum: f64 = y
            .iter()
            .zip(err)
            .map(|(y, err)| (err / (self.atol + self.rtol * y.abs())).powi(2))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let n = y.len() as f64;
        (sum / n).sqrt()
    }

    /// Returns the absolute tolerance.
    #[must_use]
    pub fn atol(&self) -> f64 {
        self.atol
    }

    /// Returns the relative tolerance.
    #[must_use]
    pub fn rtol(&self) -> f64 {
        self.rtol
    }
}

impl StepControl for RmsNorm {
    fn error_order(&self) -> u32 {
        self.error_order
    }

    fn adjust(&mut self, y: &[f64], err: &[f64], _dydt: &[f64], h: &mut f64) -> Verdict {
        let norm = self.norm(y, err);
        let k = f64::from(self.error_order);

        let factor = if norm > 0.0 {
            (self.safety * norm.powf(-1.0 / k)).clamp(self.factor_decrease, self.factor_grow)
        } else {
            self.factor_grow
        };
        *h *= factor;

        if norm <= 1.0 {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

#[cfg(feature = "serde")]
mod raw {
    use crate::control::ControllerError;

    /// Unvalidated mirror of [`super::RmsNorm`].
    #[derive(serde::Deserialize)]
    pub(super) struct RmsNorm {
        atol: f64,
        rtol: f64,
        safety: f64,
        factor_decrease: f64,
        factor_grow: f64,
        error_order: u32,
    }

    impl TryFrom<RmsNorm> for super::RmsNorm {
        type Error = ControllerError;

        fn try_from(raw: RmsNorm) -> Result<Self, Self::Error> {
            super::RmsNorm::new(raw.atol, raw.rtol, raw.error_order)?
                .with_safety(raw.safety)?
                .with_factors(raw.factor_decrease, raw.factor_grow)
        }
    }
}
