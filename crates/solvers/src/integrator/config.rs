use thiserror::Error;

use crate::{control::ControllerError, stepper::UnknownStepper};

/// Tuning of the integration loop and event localization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "raw::Config")
)]
pub struct Config {
    max_retries: usize,
    max_secant_iters: usize,
    event_precision: f64,
    event_time_tol: f64,
    secant_bias: f64,
    dense_output: bool,
}

/// Errors from configuring an integrator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_retries must be at least 1")]
    MaxRetries,

    #[error("max_secant_iters must be at least 1")]
    MaxSecantIters,

    #[error("event_precision must be finite and positive")]
    EventPrecision,

    #[error("event_time_tol must be finite and positive")]
    EventTimeTol,

    #[error("secant_bias must be in [0, 1]")]
    SecantBias,

    #[error(transparent)]
    Stepper(#[from] UnknownStepper),

    #[error("invalid controller: {0}")]
    Controller(#[from] ControllerError),
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(100, 100, 1e-12, 1e-13).unwrap()
    }
}

impl Config {
    /// Creates a config with a secant bias of `0.8` and dense output off.
    ///
    /// - `max_retries` bounds the step rejections allowed within one step.
    /// - `max_secant_iters` bounds the iterations of one event localization.
    /// - `event_precision` is the absolute event value treated as zero.
    /// - `event_time_tol` is the bracket width, relative to `max(|t|, h)`,
    ///   at which localization stops.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound is zero or a tolerance is not finite and
    /// positive.
    pub fn new(
        max_retries: usize,
        max_secant_iters: usize,
        event_precision: f64,
        event_time_tol: f64,
    ) -> Result<Self, ConfigError> {
        if max_retries == 0 {
            return Err(ConfigError::MaxRetries);
        }
        if max_secant_iters == 0 {
            return Err(ConfigError::MaxSecantIters);
        }
        if !event_precision.is_finite() || event_precision <= 0.0 {
            return Err(ConfigError::EventPrecision);
        }
        if !event_time_tol.is_finite() || event_time_tol <= 0.0 {
            return Err(ConfigError::EventTimeTol);
        }

        Ok(Self {
            max_retries,
            max_secant_iters,
            event_precision,
            event_time_tol,
            secant_bias: 0.8,
            dense_output: false,
        })
    }

    /// Sets the weight of the secant estimate against the bracket midpoint.
    ///
    /// A bias of `1` is plain regula falsi and `0` is bisection.
    ///
    /// # Errors
    ///
    /// Returns an error unless `0 <= bias <= 1`.
    pub fn with_secant_bias(self, bias: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&bias) {
            return Err(ConfigError::SecantBias);
        }
        Ok(Self {
            secant_bias: bias,
            ..self
        })
    }

    /// Prepares dense output after every committed step.
    ///
    /// Dense output is also prepared whenever a registered event asks for it.
    #[must_use]
    pub fn with_dense_output(self, dense_output: bool) -> Self {
        Self {
            dense_output,
            ..self
        }
    }

    /// Returns the maximum number of rejections within one step.
    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Returns the maximum number of secant iterations per localization.
    #[must_use]
    pub fn max_secant_iters(&self) -> usize {
        self.max_secant_iters
    }

    /// Returns the absolute event value treated as zero.
    #[must_use]
    pub fn event_precision(&self) -> f64 {
        self.event_precision
    }

    /// Returns the relative bracket width at which localization stops.
    #[must_use]
    pub fn event_time_tol(&self) -> f64 {
        self.event_time_tol
    }

    /// Returns the weight of the secant estimate in each localization step.
    #[must_use]
    pub fn secant_bias(&self) -> f64 {
        self.secant_bias
    }

    /// Returns true if dense output is prepared for every step.
    #[must_use]
    pub fn dense_output(&self) -> bool {
        self.dense_output
    }
}

#[cfg(feature = "serde")]
mod raw {
    /// Unvalidated mirror of [`super::Config`].
    #[derive(serde::Deserialize)]
    pub(super) struct Config {
        max_retries: usize,
        max_secant_iters: usize,
        event_precision: f64,
        event_time_tol: f64,
        secant_bias: f64,
        dense_output: bool,
    }

    impl TryFrom<Config> for super::Config {
        type Error = super::ConfigError;

        fn try_from(raw: Config) -> Result<Self, Self::Error> {
            Ok(Self::new(
                raw.max_retries,
                raw.max_secant_iters,
                raw.event_precision,
                raw.event_time_tol,
            )?
            .with_secant_bias(raw.secant_bias)?
            .with_dense_output(raw.dense_output))
        }
    }
}
