use super::*;

use std::{cell::RefCell, convert::Infallible, f64::consts::LN_2, rc::Rc};

use approx::assert_relative_eq;
use worldline_core::{DenseOutput, Effect, EventKind, Point};

use crate::{
    control::{ControllerError, RmsNorm},
    stepper::UnknownStepper,
};

/// `y' = -y`.
struct Decay;

impl System for Decay {
    type Error = Infallible;

    fn dimension(&self) -> usize {
        1
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
        dydt[0] = -y[0];
        Ok(())
    }
}

/// `x'' = -x`.
struct Harmonic;

impl System for Harmonic {
    type Error = Infallible;

    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
        dydt[0] = y[1];
        dydt[1] = -y[0];
        Ok(())
    }
}

/// Uniform motion `x' = v`, `v' = 0`.
struct Drift;

impl System for Drift {
    type Error = Infallible;

    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
        dydt[0] = y[1];
        dydt[1] = 0.0;
        Ok(())
    }
}

/// Records every committed point.
#[derive(Default)]
struct Log {
    points: Vec<(f64, Vec<f64>)>,
}

impl Event for Log {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn value(&mut self, _t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        0.0
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        self.points.push((point.t, point.y.to_vec()));
        Effect::Unchanged
    }
}

/// Ends the run once `t` reaches `at`.
struct StopAt {
    at: f64,
    fired: usize,
}

impl Event for StopAt {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn value(&mut self, t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        if t >= self.at { 0.0 } else { 1.0 }
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, _point: &mut Point<'_>) -> Effect {
        self.fired += 1;
        Effect::Unchanged
    }
}

/// Records where `y[0]` crosses `level`.
struct Level {
    level: f64,
    hits: Rc<RefCell<Vec<(f64, f64, f64)>>>,
}

impl Event for Level {
    fn kind(&self) -> EventKind {
        EventKind::Modifying
    }

    fn value(&mut self, _t: f64, _dt: f64, y: &[f64], _dydt: &[f64]) -> f64 {
        y[0] - self.level
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        self.hits.borrow_mut().push((self.level, point.t, point.y[0]));
        Effect::Unchanged
    }
}

/// Reverses the velocity when the position reaches zero.
#[derive(Default)]
struct Wall {
    hits: Vec<f64>,
}

impl Event for Wall {
    fn kind(&self) -> EventKind {
        EventKind::Modifying
    }

    fn value(&mut self, _t: f64, _dt: f64, y: &[f64], _dydt: &[f64]) -> f64 {
        y[0]
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        self.hits.push(point.t);
        point.y[1] = -point.y[1];
        Effect::StateChanged
    }
}

/// Samples the dense output at the middle of each committed step.
#[derive(Default)]
struct Midpoints {
    samples: Vec<(f64, f64)>,
}

impl Event for Midpoints {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn needs_dense_output(&self) -> bool {
        true
    }

    fn value(&mut self, _t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        0.0
    }

    fn apply(&mut self, dense: &dyn DenseOutput, _point: &mut Point<'_>) -> Effect {
        if let Some([a, b]) = dense.dense_span() {
            let t = 0.5 * (a + b);
            if let Some(x) = dense.dense_out(0, t) {
                self.samples.push((t, x));
            }
        }
        Effect::Unchanged
    }
}

#[test]
fn fixed_rk4_reaches_end_time_exactly() {
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    let solution = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap();

    assert_eq!(solution.status, Status::Completed);
    assert_eq!(solution.t, 1.0);
    assert_eq!(solution.stats.steps, 10);
    assert_eq!(solution.stats.rejected, 0);
    assert_relative_eq!(solution.y[0], (-1.0_f64).exp(), epsilon = 1e-6);

    // One initial evaluation, then three stages and the end derivative per step.
    assert_eq!(solution.stats.evaluations, 41);
}

#[test]
fn fixed_step_size_survives_clipping() {
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    let solution = integrator.integrate(&[1.0], 0.0, 0.25, 0.1).unwrap();

    assert_eq!(solution.stats.steps, 3);
    assert_eq!(solution.t, 0.25);
    assert_relative_eq!(solution.h, 0.1);
}

#[test]
fn adaptive_dop853_meets_tolerance() {
    let mut integrator = Integrator::adaptive(Harmonic, "dop853", 1e-10, 1e-10).unwrap();
    let solution = integrator.integrate(&[1.0, 0.0], 0.0, 10.0, 0.01).unwrap();

    assert_eq!(solution.status, Status::Completed);
    assert_eq!(solution.t, 10.0);
    assert_relative_eq!(solution.y[0], 10.0_f64.cos(), epsilon = 1e-8);
    assert_relative_eq!(solution.y[1], -(10.0_f64.sin()), epsilon = 1e-8);
    assert!(solution.stats.steps < 100);
}

#[test]
fn oversized_first_step_is_rejected_and_recovers() {
    let mut integrator = Integrator::adaptive(Harmonic, "dop853", 1e-10, 1e-10).unwrap();
    let solution = integrator.integrate(&[1.0, 0.0], 0.0, 10.0, 50.0).unwrap();

    assert!(solution.stats.rejected > 0);
    assert_relative_eq!(solution.y[0], 10.0_f64.cos(), epsilon = 1e-8);
}

#[test]
fn rms_norm_controller_can_replace_default() {
    let controller = RmsNorm::new(1e-10, 1e-10, 1).unwrap();
    let mut integrator = Integrator::fixed(Decay, "dop853")
        .unwrap()
        .with_controller(controller);
    assert!(integrator.is_adaptive());

    let solution = integrator.integrate(&[1.0], 0.0, 3.0, 0.1).unwrap();
    assert_relative_eq!(solution.y[0], (-3.0_f64).exp(), epsilon = 1e-9);
}

#[test]
fn data_events_see_initial_state_and_every_step() {
    let mut log = Log::default();
    {
        let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
        integrator.add_event(&mut log);
        integrator.integrate(&[2.0], 0.0, 0.5, 0.1).unwrap();
    }

    assert_eq!(log.points.len(), 6);
    assert_eq!(log.points[0], (0.0, vec![2.0]));
    assert_eq!(log.points[5].0, 0.5);
}

#[test]
fn terminal_data_event_stops_at_first_trigger() {
    let mut stop = StopAt { at: 0.35, fired: 0 };
    let mut log = Log::default();

    let solution = {
        let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
        integrator.add_event(&mut stop);
        integrator.add_event(&mut log);
        integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap()
    };

    assert_eq!(solution.status, Status::Terminated);
    assert_eq!(solution.stats.steps, 4);
    assert_relative_eq!(solution.t, 0.4);
    assert_eq!(stop.fired, 1);
    assert_eq!(log.points.len(), 5, "the terminating step is still recorded");
}

#[test]
fn terminal_event_at_initial_state_takes_no_steps() {
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    integrator.add_event(StopAt { at: 0.0, fired: 0 });

    let solution = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap();

    assert_eq!(solution.status, Status::Terminated);
    assert_eq!(solution.stats.steps, 0);
    assert_eq!(solution.y, vec![1.0]);
}

#[test]
fn modifying_event_commits_exact_crossing() {
    let hits = Rc::new(RefCell::new(Vec::new()));
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    integrator.add_event(Level {
        level: 0.5,
        hits: Rc::clone(&hits),
    });

    let solution = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap();

    let hits = hits.borrow();
    assert_eq!(hits.len(), 1);
    let (_, t, y) = hits[0];
    assert!((y - 0.5).abs() < 1e-12, "y = {y}");
    assert_relative_eq!(t, LN_2, epsilon = 1e-6);
    assert_eq!(solution.stats.localizations, 1);
    assert_eq!(solution.t, 1.0);
}

#[test]
fn crossing_at_trial_endpoint_needs_no_root_finding() {
    let hits = Rc::new(RefCell::new(Vec::new()));
    let mut integrator = Integrator::fixed(Drift, "rk4").unwrap();
    integrator.add_event(Level {
        level: 0.5,
        hits: Rc::clone(&hits),
    });

    let solution = integrator.integrate(&[0.0, 1.0], 0.0, 1.0, 0.25).unwrap();

    assert_eq!(solution.stats.localizations, 0);
    assert_eq!(*hits.borrow(), vec![(0.5, 0.5, 0.5)]);
}

#[test]
fn reflected_trajectory_does_not_retrigger() {
    let mut wall = Wall::default();
    let solution = {
        let mut integrator = Integrator::fixed(Drift, "rk4").unwrap();
        integrator.add_event(&mut wall);
        integrator.integrate(&[1.0, -1.0], 0.0, 3.0, 0.3).unwrap()
    };

    assert_eq!(wall.hits.len(), 1);
    assert_relative_eq!(wall.hits[0], 1.0, epsilon = 1e-10);
    assert_relative_eq!(solution.y[0], 2.0, epsilon = 1e-10);
    assert_relative_eq!(solution.y[1], 1.0);
}

#[test]
fn events_in_one_step_fire_in_time_order() {
    for levels in [[0.5, 0.6], [0.6, 0.5]] {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
        for level in levels {
            integrator.add_event(Level {
                level,
                hits: Rc::clone(&hits),
            });
        }

        integrator.integrate(&[1.0], 0.0, 2.0, 1.0).unwrap();

        let hits = hits.borrow();
        let order: Vec<f64> = hits.iter().map(|&(level, _, _)| level).collect();
        assert_eq!(order, vec![0.6, 0.5]);
        for &(level, _, y) in hits.iter() {
            assert!((y - level).abs() < 1e-12);
        }
    }
}

#[test]
fn shared_events_stay_inspectable() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    integrator.add_event(Rc::clone(&log));

    integrator.integrate(&[1.0], 0.0, 0.2, 0.1).unwrap();
    assert_eq!(log.borrow().points.len(), 3);

    integrator.integrate(&[1.0], 0.0, 0.2, 0.1).unwrap();
    assert_eq!(log.borrow().points.len(), 6);
    assert_eq!(integrator.event_count(), 1);
}

#[test]
fn events_can_request_dense_output() {
    let mut midpoints = Midpoints::default();
    {
        let mut integrator = Integrator::fixed(Harmonic, "dop853").unwrap();
        integrator.add_event(&mut midpoints);
        integrator.integrate(&[1.0, 0.0], 0.0, 5.0, 0.5).unwrap();
    }

    assert_eq!(midpoints.samples.len(), 10);
    for &(t, x) in &midpoints.samples {
        assert_relative_eq!(x, t.cos(), epsilon = 1e-7);
    }
}

#[test]
fn dense_output_adds_three_evaluations_per_dop853_step() {
    let run = |dense: bool| {
        let config = Config::default().with_dense_output(dense);
        let mut integrator = Integrator::fixed(Decay, "dop853")
            .unwrap()
            .with_config(config);
        let solution = integrator.integrate(&[1.0], 0.0, 1.0, 0.25).unwrap();
        (solution.stats.evaluations, integrator.stepper().dense_span())
    };

    assert_eq!(run(false), (49, None));
    assert_eq!(run(true), (61, Some([0.75, 1.0])));
}

#[test]
fn stepper_orders_do_not_depend_on_history() {
    for (name, order, error_order) in [("rk4", 4, 5), ("dop853", 8, 9)] {
        let mut integrator = Integrator::adaptive(Harmonic, name, 1e-8, 1e-8).unwrap();
        integrator.integrate(&[1.0, 0.0], 0.0, 3.0, 0.1).unwrap();
        integrator.integrate(&[0.0, 1.0], 3.0, 4.0, 0.5).unwrap();

        let stepper = integrator.stepper();
        assert_eq!(stepper.order(), order, "{name}");
        assert_eq!(stepper.error_order(), error_order, "{name}");

        let mut rebound = name.parse::<StepperKind>().unwrap().build(2);
        rebound.bind(7);
        assert_eq!(rebound.dimension(), 7);
        assert_eq!(rebound.order(), order, "{name}");
        assert_eq!(rebound.error_order(), error_order, "{name}");
    }
}

#[test]
fn step_size_exhaustion_is_fatal() {
    let config = Config::new(1, 100, 1e-12, 1e-13).unwrap();
    let mut integrator = Integrator::adaptive(Harmonic, "dop853", 1e-12, 1e-12)
        .unwrap()
        .with_config(config);

    let err = integrator.integrate(&[1.0, 0.0], 0.0, 100.0, 20.0).unwrap_err();

    assert!(matches!(
        err,
        Error::StepSizeExhausted { retries: 2, .. }
    ));
}

#[test]
fn step_below_time_resolution_is_fatal() {
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();

    let err = integrator.integrate(&[1.0], 1e17, 1e17 + 1000.0, 1.0).unwrap_err();

    assert!(matches!(err, Error::StepUnderflow { t, h } if t == 1e17 && h == 1.0));
}

/// Shrinks the step size below the time resolution once `t` passes 0.2.
struct Vanish;

impl Event for Vanish {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn value(&mut self, t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        if t > 0.2 { 0.0 } else { 1.0 }
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        point.h = 1e-300;
        Effect::Unchanged
    }
}

#[test]
fn event_step_below_time_resolution_is_fatal() {
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    integrator.add_event(Vanish);

    let err = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap_err();

    assert!(matches!(err, Error::StepUnderflow { t, .. } if t > 0.2 && t < 0.4));
}

#[test]
fn unlocalized_event_is_fatal() {
    let config = Config::new(100, 1, 1e-12, 1e-13).unwrap();
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap().with_config(config);
    integrator.add_event(Level {
        level: 0.5,
        hits: Rc::default(),
    });

    let err = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap_err();

    assert!(matches!(err, Error::EventNotLocalized { iters: 1, .. }));
    assert!(err.to_string().contains("precise time of event could not be found"));
}

#[derive(Debug, thiserror::Error)]
#[error("state fell below {0}")]
struct Floor(f64);

/// Decay that refuses to evaluate below a floor.
struct Guarded;

impl System for Guarded {
    type Error = Floor;

    fn dimension(&self) -> usize {
        1
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Floor> {
        if y[0] < 0.5 {
            return Err(Floor(0.5));
        }
        dydt[0] = -y[0];
        Ok(())
    }
}

#[test]
fn system_errors_propagate_unchanged() {
    let mut integrator = Integrator::fixed(Guarded, "rk4").unwrap();
    let err = integrator.integrate(&[1.0], 0.0, 2.0, 0.1).unwrap_err();

    match err {
        Error::System(source) => {
            assert_eq!(source.to_string(), "state fell below 0.5");
            assert!(source.downcast_ref::<Floor>().is_some());
        }
        other => panic!("expected a system error, got {other:?}"),
    }
}

/// Decay whose derivative turns into NaN after `t = 0.5`.
struct Poisoned;

impl System for Poisoned {
    type Error = Infallible;

    fn dimension(&self) -> usize {
        1
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Infallible> {
        dydt[0] = if t > 0.5 { f64::NAN } else { -y[0] };
        Ok(())
    }
}

#[test]
fn non_finite_state_is_fatal() {
    let mut integrator = Integrator::adaptive(Poisoned, "rk4", 1e-6, 1e-6).unwrap();
    let err = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap_err();

    assert!(matches!(err, Error::NonFiniteState { t } if t > 0.5));
}

/// Sets an invalid step size once `t` passes 0.2.
struct ZeroStep;

impl Event for ZeroStep {
    fn kind(&self) -> EventKind {
        EventKind::Data
    }

    fn value(&mut self, t: f64, _dt: f64, _y: &[f64], _dydt: &[f64]) -> f64 {
        if t > 0.2 { 0.0 } else { 1.0 }
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        point.h = 0.0;
        Effect::Unchanged
    }
}

#[test]
fn invalid_event_update_is_fatal() {
    let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
    integrator.add_event(ZeroStep);

    let err = integrator.integrate(&[1.0], 0.0, 1.0, 0.1).unwrap_err();
    assert!(matches!(err, Error::InvalidEventUpdate { h, .. } if h == 0.0));
}

#[test]
fn invalid_inputs_are_rejected() {
    let mut integrator = Integrator::fixed(Harmonic, "rk4").unwrap();

    let cases = [
        (vec![1.0], 0.0, 1.0, 0.1, InputError::Dimension { expected: 2, found: 1 }),
        (vec![1.0, f64::NAN], 0.0, 1.0, 0.1, InputError::State),
        (vec![1.0, 0.0], 0.0, f64::INFINITY, 0.1, InputError::Time),
        (vec![1.0, 0.0], 1.0, 0.0, 0.1, InputError::Span),
        (vec![1.0, 0.0], 0.0, 1.0, 0.0, InputError::StepSize),
        (vec![1.0, 0.0], 0.0, 1.0, -0.1, InputError::StepSize),
    ];

    for (y, t_start, t_end, h, expected) in cases {
        let err = integrator.integrate(&y, t_start, t_end, h).unwrap_err();
        assert!(
            matches!(err, Error::InvalidInput(found) if found == expected),
            "expected {expected:?}, got {err:?}"
        );
    }
}

#[test]
fn empty_span_only_visits_initial_state() {
    let mut log = Log::default();
    let solution = {
        let mut integrator = Integrator::fixed(Decay, "rk4").unwrap();
        integrator.add_event(&mut log);
        integrator.integrate(&[1.0], 2.0, 2.0, 0.1).unwrap()
    };

    assert_eq!(solution.status, Status::Completed);
    assert_eq!(solution.stats.steps, 0);
    assert_eq!(log.points.len(), 1);
}

#[test]
fn configuration_errors_surface_at_construction() {
    let err = Integrator::fixed(Decay, "euler").err();
    assert_eq!(err, Some(ConfigError::Stepper(UnknownStepper("euler".into()))));

    let err = Integrator::adaptive(Decay, "dop853", -1.0, 1e-6).err();
    assert_eq!(
        err,
        Some(ConfigError::Controller(ControllerError::AbsoluteTolerance))
    );
}
