/// Continuous output within the most recently committed step.
///
/// Steppers implement this trait; it is the only stepper capability handed to
/// events. Values are evaluated from an interpolating polynomial in the
/// normalized fraction `s = (t - t_start) / h` and reproduce the step's
/// endpoint states exactly at `s = 0` and `s = 1`.
pub trait DenseOutput {
    /// Returns coordinate `i` of the interpolated state at time `t`.
    ///
    /// Returns `None` when no dense output has been prepared for the current
    /// step, or when `i` is out of range. Times outside the step are
    /// extrapolated and should not be relied on.
    fn dense_out(&self, i: usize, t: f64) -> Option<f64>;

    /// Returns the `[t_start, t_end]` span of the prepared step, if any.
    fn dense_span(&self) -> Option<[f64; 2]>;
}
