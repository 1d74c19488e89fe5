//! Step-size controllers.
//!
//! A controller inspects the local error estimate of a trial step, decides
//! whether to keep it, and proposes the next step size.

mod component_ratio;
mod rms_norm;

pub use component_ratio::ComponentRatio;
pub use rms_norm::RmsNorm;

use thiserror::Error;

/// Whether a trial step is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

/// Errors from validating controller parameters.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    #[error("absolute tolerance must be finite and non-negative")]
    AbsoluteTolerance,

    #[error("relative tolerance must be finite and non-negative")]
    RelativeTolerance,

    #[error("at least one tolerance must be positive")]
    ZeroTolerances,

    #[error("scaling factors must be finite and non-negative")]
    Scaling,

    #[error("safety factor must be in (0, 1]")]
    Safety,

    #[error("step factors must satisfy 0 < decrease < 1 < grow")]
    Factors,

    #[error("error order must be at least 1")]
    ErrorOrder,
}

/// Adjusts the step size from a local error estimate.
pub trait StepControl {
    /// Returns the error order used as the controller's exponent.
    fn error_order(&self) -> u32;

    /// Judges a trial step and writes the proposed step size into `h`.
    ///
    /// `y` is the trial state, `err` its per-coordinate absolute error
    /// estimate and `dydt` the derivative at the trial state.
    fn adjust(&mut self, y: &[f64], err: &[f64], dydt: &[f64], h: &mut f64) -> Verdict;
}

/// One of the built-in controllers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Controller {
    ComponentRatio(ComponentRatio),
    RmsNorm(RmsNorm),
}

impl Controller {
    /// Returns a copy that uses `error_order` as its exponent.
    #[must_use]
    pub(crate) fn for_error_order(self, error_order: u32) -> Self {
        match self {
            Self::ComponentRatio(c) => Self::ComponentRatio(c.with_error_order(error_order)),
            Self::RmsNorm(c) => Self::RmsNorm(c.with_error_order(error_order)),
        }
    }
}

impl From<ComponentRatio> for Controller {
    fn from(controller: ComponentRatio) -> Self {
        Self::ComponentRatio(controller)
    }
}

impl From<RmsNorm> for Controller {
    fn from(controller: RmsNorm) -> Self {
        Self::RmsNorm(controller)
    }
}

impl StepControl for Controller {
    fn error_order(&self) -> u32 {
        match self {
            Self::ComponentRatio(c) => c.error_order(),
            Self::RmsNorm(c) => c.error_order(),
        }
    }

    fn adjust(&mut self, y: &[f64], err: &[f64], dydt: &[f64], h: &mut f64) -> Verdict {
        match self {
            Self::ComponentRatio(c) => c.adjust(y, err, dydt, h),
            Self::RmsNorm(c) => c.adjust(y, err, dydt, h),
        }
    }
}

/// Validates an `(atol, rtol)` pair.
fn check_tolerances(atol: f64, rtol: f64) -> Result<(), ControllerError> {
    if !atol.is_finite() || atol < 0.0 {
        return Err(ControllerError::AbsoluteTolerance);
    }
    if !rtol.is_finite() || rtol < 0.0 {
        return Err(ControllerError::RelativeTolerance);
    }
    if atol == 0.0 && rtol == 0.0 {
        return Err(ControllerError::ZeroTolerances);
    }
    Ok(())
}

fn check_safety(safety: f64) -> Result<(), ControllerError> {
    if safety > 0.0 && safety <= 1.0 {
        Ok(())
    } else {
        Err(ControllerError::Safety)
    }
}

fn check_error_order(error_order: u32) -> Result<(), ControllerError> {
    if error_order == 0 {
        Err(ControllerError::ErrorOrder)
    } else {
        Ok(())
    }
}
