use tracing::trace;
use worldline_core::System;

use super::{Error, run::Run};

impl<S: System> Run<'_, '_, S> {
    /// Shortens the trial step so it ends at the crossing of event `index`.
    ///
    /// The crossing is bracketed by the committed point, where the event has
    /// its cached value, and the trial endpoint, where it has `value`. Each
    /// iteration steps from the committed point to a candidate between the
    /// secant root and the bracket midpoint, weighted by the secant bias, and
    /// keeps the half of the bracket that still changes sign.
    ///
    /// Stops at a candidate whose value is within the event precision, or
    /// when the bracket is narrower than the time tolerance. In the latter
    /// case the trial ends on the far side of the crossing.
    pub(super) fn localize(&mut self, index: usize, value: f64) -> Result<(), Error> {
        self.stats.localizations += 1;

        let precision = self.config.event_precision();
        let bias = self.config.secant_bias();
        let width_tol = self.config.event_time_tol() * self.t.abs().max(self.trial.h);
        let max_iters = self.config.max_secant_iters();

        let (mut lo, mut value_lo) = (0.0, self.values[index]);
        let (mut hi, mut value_hi) = (self.trial.h, value);

        // True when the stepper's last step is not the trial step.
        let mut stale = false;

        for iter in 1..=max_iters {
            if hi - lo <= width_tol {
                if stale {
                    self.step_trial(hi)?;
                }
                trace!(index, iter, h = hi, "crossing bracketed");
                return Ok(());
            }

            let secant = lo + (hi - lo) * value_lo / (value_lo - value_hi);
            let candidate = bias * secant + (1.0 - bias) * 0.5 * (lo + hi);

            self.step_probe(candidate)?;
            let value = self.events[index].value(
                self.t + candidate,
                candidate,
                &self.probe.y,
                &self.probe.dydt,
            );

            if value.abs() < precision {
                self.accept_probe();
                trace!(index, iter, h = candidate, value, "crossing found");
                return Ok(());
            }

            if value.signum() == value_lo.signum() {
                lo = candidate;
                value_lo = value;
                stale = true;
            } else {
                hi = candidate;
                value_hi = value;
                self.accept_probe();
                stale = false;
            }
        }

        Err(Error::EventNotLocalized {
            t: self.t,
            iters: max_iters,
        })
    }
}
