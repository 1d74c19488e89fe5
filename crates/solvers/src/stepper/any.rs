use std::{fmt, str::FromStr};

use thiserror::Error;
use worldline_core::{DenseOutput, System};

use super::{Dop853, Rk4, StepInput, Stepper};

/// Names the available steppers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StepperKind {
    Rk4,
    Dop853,
}

/// Returned when a stepper name is not recognized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown stepper `{0}`, expected `rk4` or `dop853`")]
pub struct UnknownStepper(pub String);

impl StepperKind {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Rk4 => "rk4",
            Self::Dop853 => "dop853",
        }
    }

    /// Builds a stepper of this kind bound to states of length `n`.
    #[must_use]
    pub fn build(self, n: usize) -> AnyStepper {
        match self {
            Self::Rk4 => AnyStepper::Rk4(Rk4::new(n)),
            Self::Dop853 => AnyStepper::Dop853(Dop853::new(n)),
        }
    }
}

impl FromStr for StepperKind {
    type Err = UnknownStepper;

    /// Parses a stepper name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rk4" => Ok(Self::Rk4),
            "dop853" => Ok(Self::Dop853),
            _ => Err(UnknownStepper(s.to_owned())),
        }
    }
}

impl fmt::Display for StepperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the built-in steppers, selected at runtime.
#[derive(Debug, Clone)]
pub enum AnyStepper {
    Rk4(Rk4),
    Dop853(Dop853),
}

impl AnyStepper {
    /// Returns which stepper this is.
    #[must_use]
    pub fn kind(&self) -> StepperKind {
        match self {
            Self::Rk4(_) => StepperKind::Rk4,
            Self::Dop853(_) => StepperKind::Dop853,
        }
    }
}

impl From<Rk4> for AnyStepper {
    fn from(stepper: Rk4) -> Self {
        Self::Rk4(stepper)
    }
}

impl From<Dop853> for AnyStepper {
    fn from(stepper: Dop853) -> Self {
        Self::Dop853(stepper)
    }
}

macro_rules! dispatch {
    ($self:ident, $stepper:ident => $body:expr) => {
        match $self {
            AnyStepper::Rk4($stepper) => $body,
            AnyStepper::Dop853($stepper) => $body,
        }
    };
}

impl Stepper for AnyStepper {
    fn bind(&mut self, n: usize) {
        dispatch!(self, s => s.bind(n));
    }

    fn dimension(&self) -> usize {
        dispatch!(self, s => s.dimension())
    }

    fn order(&self) -> u32 {
        dispatch!(self, s => s.order())
    }

    fn error_order(&self) -> u32 {
        dispatch!(self, s => s.error_order())
    }

    fn evaluations(&self) -> usize {
        dispatch!(self, s => s.evaluations())
    }

    fn step<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        dispatch!(self, s => s.step(system, input, y_out, dydt_out))
    }

    fn step_err<S: System>(
        &mut self,
        system: &S,
        input: StepInput<'_>,
        y_out: &mut [f64],
        err: &mut [f64],
        dydt_out: Option<&mut [f64]>,
    ) -> Result<(), S::Error> {
        dispatch!(self, s => s.step_err(system, input, y_out, err, dydt_out))
    }

    fn prepare_dense<S: System>(&mut self, system: &S) -> Result<(), S::Error> {
        dispatch!(self, s => s.prepare_dense(system))
    }
}

impl DenseOutput for AnyStepper {
    fn dense_out(&self, i: usize, t: f64) -> Option<f64> {
        dispatch!(self, s => s.dense_out(i, t))
    }

    fn dense_span(&self) -> Option<[f64; 2]> {
        dispatch!(self, s => s.dense_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_loosely() {
        assert_eq!("rk4".parse::<StepperKind>(), Ok(StepperKind::Rk4));
        assert_eq!("  DOP853\n".parse::<StepperKind>(), Ok(StepperKind::Dop853));
        assert_eq!("Dop853".parse::<StepperKind>().map(StepperKind::name), Ok("dop853"));
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "rk45".parse::<StepperKind>().unwrap_err();
        assert_eq!(err, UnknownStepper("rk45".into()));
        assert_eq!(err.to_string(), "unknown stepper `rk45`, expected `rk4` or `dop853`");
    }

    #[test]
    fn builds_bound_steppers() {
        let stepper = StepperKind::Dop853.build(5);
        assert_eq!(stepper.kind(), StepperKind::Dop853);
        assert_eq!(stepper.dimension(), 5);
        assert_eq!(stepper.order(), 8);

        let stepper = StepperKind::Rk4.build(2);
        assert_eq!(stepper.error_order(), 5);
        assert_eq!(stepper.kind().to_string(), "rk4");
    }
}
