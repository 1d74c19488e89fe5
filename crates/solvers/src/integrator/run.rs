use std::mem;

use tracing::{debug, trace};
use worldline_core::{Effect, Event, EventKind, Point, System};

use crate::{
    control::{Controller, StepControl, Verdict},
    stepper::{AnyStepper, StepInput, Stepper},
};

use super::{Config, Error, Solution, Stats, Status};

/// A step leaving less than this fraction of the remaining span is stretched
/// to end exactly at `t_end`.
const END_SNAP: f64 = 1e-10;

/// Fraction of the next step used to find the direction in which an event
/// value leaves zero.
const DEPARTURE: f64 = 1e-3;

/// A provisional step from the committed state.
#[derive(Debug)]
pub(super) struct Trial {
    pub(super) h: f64,
    pub(super) y: Vec<f64>,
    pub(super) dydt: Vec<f64>,
    pub(super) err: Vec<f64>,
}

impl Trial {
    fn new(n: usize) -> Self {
        Self {
            h: 0.0,
            y: vec![0.0; n],
            dydt: vec![0.0; n],
            err: vec![0.0; n],
        }
    }

    fn advance<S: System>(
        &mut self,
        system: &S,
        stepper: &mut AnyStepper,
        input: StepInput<'_>,
        with_err: bool,
    ) -> Result<(), Error> {
        let result = if with_err {
            stepper.step_err(system, input, &mut self.y, &mut self.err, Some(&mut self.dydt))
        } else {
            stepper.step(system, input, &mut self.y, Some(&mut self.dydt))
        };
        result.map_err(Error::system)?;
        self.h = input.h;

        let finite = self
            .y
            .iter()
            .chain(&self.dydt)
            .chain(&self.err)
            .all(|v| v.is_finite());
        if finite {
            Ok(())
        } else {
            Err(Error::NonFiniteState {
                t: input.t + input.h,
            })
        }
    }
}

/// The state of one `integrate` call.
///
/// `y`, `dydt`, `t` and `dt` always describe the last committed point.
/// `trial` holds the step being considered and `probe` the candidates of an
/// event localization.
pub(super) struct Run<'r, 'e, S: System> {
    system: &'r S,
    stepper: &'r mut AnyStepper,
    controller: Option<&'r mut Controller>,
    pub(super) config: &'r Config,
    pub(super) events: &'r mut [Box<dyn Event + 'e>],
    kinds: Vec<EventKind>,
    /// Event values at the committed point.
    pub(super) values: Vec<f64>,
    dense: bool,
    pub(super) t: f64,
    t_end: f64,
    h: f64,
    dt: f64,
    y: Vec<f64>,
    dydt: Vec<f64>,
    pub(super) trial: Trial,
    pub(super) probe: Trial,
    pub(super) stats: Stats,
    evaluations_at_start: usize,
}

impl<'r, 'e, S: System> Run<'r, 'e, S> {
    pub(super) fn new(
        system: &'r S,
        stepper: &'r mut AnyStepper,
        controller: Option<&'r mut Controller>,
        config: &'r Config,
        events: &'r mut [Box<dyn Event + 'e>],
        dense: bool,
    ) -> Self {
        let n = system.dimension();
        let kinds = events.iter().map(|event| event.kind()).collect();
        let evaluations_at_start = stepper.evaluations();

        Self {
            system,
            stepper,
            controller,
            config,
            kinds,
            values: vec![f64::NAN; events.len()],
            events,
            dense,
            t: 0.0,
            t_end: 0.0,
            h: 0.0,
            dt: 0.0,
            y: vec![0.0; n],
            dydt: vec![0.0; n],
            trial: Trial::new(n),
            probe: Trial::new(n),
            stats: Stats::default(),
            evaluations_at_start,
        }
    }

    pub(super) fn execute(
        mut self,
        y_start: &[f64],
        t_start: f64,
        t_end: f64,
        h_start: f64,
    ) -> Result<Solution, Error> {
        self.t = t_start;
        self.t_end = t_end;
        self.h = h_start;
        self.y.copy_from_slice(y_start);
        self.evaluate_derivative()?;

        // Step 0 is the initial state.
        if self.apply_data_events()? {
            debug!(t = self.t, "terminated at initial state");
            return Ok(self.finish(Status::Terminated));
        }
        self.refresh_values();

        while self.t < self.t_end {
            let remaining = self.t_end - self.t;
            let h_try = if self.h >= remaining * (1.0 - END_SNAP) {
                remaining
            } else {
                self.h
            };
            if self.time_after(h_try) <= self.t {
                return Err(Error::StepUnderflow {
                    t: self.t,
                    h: h_try,
                });
            }
            self.step_trial(h_try)?;

            let mut pending = self.scan_modifying()?;
            let h_next = self.control(&mut pending)?;
            self.commit(h_next)?;

            let mut terminal = false;
            if let Some(index) = pending {
                terminal |= self.apply_event(index)?;
            }
            terminal |= self.apply_data_events()?;

            if terminal {
                debug!(t = self.t, steps = self.stats.steps, "terminated by event");
                return Ok(self.finish(Status::Terminated));
            }
            self.refresh_values();
        }

        Ok(self.finish(Status::Completed))
    }

    /// Returns the time reached by a step of size `h` from the committed point.
    ///
    /// A step reaching the end of the span lands on `t_end` exactly.
    pub(super) fn time_after(&self, h: f64) -> f64 {
        if h >= self.t_end - self.t {
            self.t_end
        } else {
            self.t + h
        }
    }

    pub(super) fn step_trial(&mut self, h: f64) -> Result<(), Error> {
        let input = StepInput::new(self.t, h, &self.y)
            .with_dydt(&self.dydt)
            .with_dense(self.dense);
        let with_err = self.controller.is_some();
        self.trial
            .advance(self.system, self.stepper, input, with_err)
    }

    pub(super) fn step_probe(&mut self, h: f64) -> Result<(), Error> {
        let input = StepInput::new(self.t, h, &self.y)
            .with_dydt(&self.dydt)
            .with_dense(self.dense);
        let with_err = self.controller.is_some();
        self.probe
            .advance(self.system, self.stepper, input, with_err)
    }

    /// Makes the latest probe the trial step.
    pub(super) fn accept_probe(&mut self) {
        mem::swap(&mut self.trial, &mut self.probe);
    }

    /// Returns true if `value` at a trial endpoint triggers event `index`.
    ///
    /// An event whose cached value is still within precision of zero, even
    /// a short way past the committed point, cannot trigger.
    fn triggers(&self, index: usize, value: f64) -> bool {
        let precision = self.config.event_precision();
        let committed = self.values[index];

        if value.is_nan() || committed.is_nan() || committed.abs() < precision {
            return false;
        }
        value.abs() < precision || value.signum() != committed.signum()
    }

    /// Checks every modifying event against the trial step.
    ///
    /// Each triggered event shortens the trial to its crossing, so later
    /// events are checked against the shortened step and the event returned
    /// is the one crossing earliest among those tested.
    fn scan_modifying(&mut self) -> Result<Option<usize>, Error> {
        let mut pending = None;

        for index in 0..self.events.len() {
            if self.kinds[index] != EventKind::Modifying {
                continue;
            }

            let t2 = self.time_after(self.trial.h);
            let value = self.events[index].value(t2, self.trial.h, &self.trial.y, &self.trial.dydt);
            if !self.triggers(index, value) {
                continue;
            }

            if value.abs() >= self.config.event_precision() {
                self.localize(index, value)?;
            }
            debug!(
                index,
                t = self.time_after(self.trial.h),
                h = self.trial.h,
                "modifying event crossing"
            );
            pending = Some(index);
        }

        Ok(pending)
    }

    /// Runs the controller on the trial step until it is accepted.
    ///
    /// Returns the step size to try after this one.
    fn control(&mut self, pending: &mut Option<usize>) -> Result<f64, Error> {
        let mut retries = 0;

        loop {
            let mut h_next = self.trial.h;
            let verdict = match self.controller.as_deref_mut() {
                Some(controller) => controller.adjust(
                    &self.trial.y,
                    &self.trial.err,
                    &self.trial.dydt,
                    &mut h_next,
                ),
                None => return Ok(self.h),
            };

            if verdict == Verdict::Accept {
                return Ok(h_next);
            }

            retries += 1;
            self.stats.rejected += 1;
            debug!(t = self.t, h = self.trial.h, h_next, retries, "step rejected");

            if retries > self.config.max_retries() || self.t + h_next <= self.t {
                return Err(Error::StepSizeExhausted {
                    t: self.t,
                    h: h_next,
                    retries,
                });
            }

            self.step_trial(h_next)?;

            // The shorter trial may no longer reach the pending crossing.
            let previous = pending.take();
            *pending = self.scan_modifying()?;
            if previous.is_some() && pending.is_none() {
                debug!(t = self.t, "pending event dropped after rejection");
            }
        }
    }

    fn commit(&mut self, h_next: f64) -> Result<(), Error> {
        self.dt = self.trial.h;
        self.t = self.time_after(self.dt);
        self.h = h_next;
        mem::swap(&mut self.y, &mut self.trial.y);
        mem::swap(&mut self.dydt, &mut self.trial.dydt);
        self.stats.steps += 1;

        if self.dense {
            self.stepper
                .prepare_dense(self.system)
                .map_err(Error::system)?;
        }

        trace!(t = self.t, dt = self.dt, h = self.h, "step committed");
        Ok(())
    }

    /// Applies event `index` at the committed point.
    ///
    /// Returns true if the event is terminal.
    fn apply_event(&mut self, index: usize) -> Result<bool, Error> {
        let event = &mut self.events[index];
        let mut point = Point {
            t: self.t,
            h: self.h,
            y: &mut self.y,
            dydt: &self.dydt,
        };
        let effect = event.apply(&*self.stepper, &mut point);
        let (t, h) = (point.t, point.h);
        let terminal = event.is_terminal();

        if !(t.is_finite() && h.is_finite() && h > 0.0) {
            return Err(Error::InvalidEventUpdate { t, h });
        }
        self.t = t;
        self.h = h;

        if effect == Effect::StateChanged {
            self.evaluate_derivative()?;
        }

        debug!(index, t, ?effect, terminal, "event applied");
        Ok(terminal)
    }

    /// Applies every data event whose value is exactly zero.
    #[allow(clippy::float_cmp)]
    fn apply_data_events(&mut self) -> Result<bool, Error> {
        let mut terminal = false;

        for index in 0..self.events.len() {
            if self.kinds[index] != EventKind::Data {
                continue;
            }
            let value = self.events[index].value(self.t, self.dt, &self.y, &self.dydt);
            if value == 0.0 {
                terminal |= self.apply_event(index)?;
            }
        }

        Ok(terminal)
    }

    /// Caches modifying event values at the committed point.
    ///
    /// A value within precision of zero, as left by an event that just acted
    /// at its boundary, is replaced by the value a short way along the
    /// derivative, so the cached sign is the one the trajectory leaves with.
    fn refresh_values(&mut self) {
        let precision = self.config.event_precision();
        let delta = DEPARTURE * self.h;

        for index in 0..self.events.len() {
            if self.kinds[index] != EventKind::Modifying {
                continue;
            }

            let mut value = self.events[index].value(self.t, self.dt, &self.y, &self.dydt);
            if value.abs() < precision {
                for ((probe, y), dydt) in self.probe.y.iter_mut().zip(&self.y).zip(&self.dydt) {
                    *probe = y + delta * dydt;
                }
                value = self.events[index].value(self.t + delta, delta, &self.probe.y, &self.dydt);
            }
            self.values[index] = value;
        }
    }

    fn evaluate_derivative(&mut self) -> Result<(), Error> {
        self.system
            .derivative(self.t, &self.y, &mut self.dydt)
            .map_err(Error::system)?;
        self.stats.evaluations += 1;
        Ok(())
    }

    fn finish(self, status: Status) -> Solution {
        let stats = Stats {
            evaluations: self.stats.evaluations + self.stepper.evaluations()
                - self.evaluations_at_start,
            ..self.stats
        };
        Solution {
            status,
            t: self.t,
            y: self.y,
            h: self.h,
            stats,
        }
    }
}
