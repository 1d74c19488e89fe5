use std::error::Error as StdError;

use thiserror::Error;

/// Errors that abort an integration run.
///
/// Every error is terminal for the call. State the caller needs from the
/// partial run must be captured by events before the failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("no acceptable step size at t = {t} after {retries} rejections (last h = {h})")]
    StepSizeExhausted { t: f64, h: f64, retries: usize },

    #[error("step size {h} does not advance t = {t}")]
    StepUnderflow { t: f64, h: f64 },

    #[error("precise time of event could not be found after t = {t} ({iters} iterations)")]
    EventNotLocalized { t: f64, iters: usize },

    #[error("state became non-finite at t = {t}")]
    NonFiniteState { t: f64 },

    #[error("an event set invalid time {t} or step size {h}")]
    InvalidEventUpdate { t: f64, h: f64 },

    #[error("system error: {0}")]
    System(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn system<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::System(Box::new(err))
    }
}

/// Invalid arguments to `integrate`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    #[error("the system has dimension zero")]
    EmptySystem,

    #[error("expected a state of length {expected}, got {found}")]
    Dimension { expected: usize, found: usize },

    #[error("initial state must be finite")]
    State,

    #[error("start and end times must be finite")]
    Time,

    #[error("end time precedes start time")]
    Span,

    #[error("initial step size must be finite and positive")]
    StepSize,
}
