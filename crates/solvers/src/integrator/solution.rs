/// The result of a completed or terminated integration run.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: Status,

    /// Time of the last committed state.
    pub t: f64,

    /// Last committed state, after any event updates.
    pub y: Vec<f64>,

    /// Step size the integrator would have tried next.
    pub h: f64,

    pub stats: Stats,
}

/// How an integration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The run reached the end time.
    Completed,

    /// A terminal event stopped the run.
    Terminated,
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Committed steps.
    pub steps: usize,

    /// Trial steps rejected by the controller.
    pub rejected: usize,

    /// Event crossings located by root finding.
    pub localizations: usize,

    /// System evaluations, including those made for dense output.
    pub evaluations: usize,
}
