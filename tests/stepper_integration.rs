mod common;

use common::{
    CLOCK, HEATER_INPUT, HEATER_POWER, NATIVE_HEAT_W, ScriptedUnit, ZONE_TEMPERATURE, scripted_testbed,
    scripted_testbed_with,
};
use testbed_sim::error::TestbedError;
use testbed_sim::sim::{AdvanceOutcome, OverridePolicy, OverrideRequest, Phase};

fn idle() -> OverrideRequest {
    OverrideRequest::new()
}

#[test]
fn quarter_hour_steps_after_warmup_record_native_control() {
    let tb = scripted_testbed();
    let snap = tb.initialize(0.0, 3600.0).unwrap();
    assert_eq!(snap[CLOCK], 0.0);
    tb.set_step(900.0).unwrap();

    for _ in 0..4 {
        assert!(!tb.advance(&idle()).unwrap().is_completed());
    }

    let cols = tb
        .results(&[HEATER_INPUT, HEATER_POWER, CLOCK], f64::NEG_INFINITY, f64::INFINITY)
        .unwrap();
    assert_eq!(cols.time, vec![900.0, 1800.0, 2700.0, 3600.0]);
    assert_eq!(cols.points[CLOCK], cols.time);
    assert!(cols.points[HEATER_INPUT].iter().all(|&v| v == NATIVE_HEAT_W));
    assert!(cols.points[HEATER_POWER].iter().all(|&v| v == NATIVE_HEAT_W));
    assert_eq!(tb.time(), 3600.0);
}

#[test]
fn initialize_resets_time_results_and_kpis() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    tb.advance(&idle()).unwrap();
    tb.advance(&idle()).unwrap();
    assert!(tb.kpis().ener_tot > 0.0);

    tb.initialize(86_400.0, 7200.0).unwrap();
    assert_eq!(tb.time(), 86_400.0);
    assert_eq!(tb.phase(), Phase::Initialized);
    assert_eq!(tb.with_results(|r| r.len()), 0);
    let kpis = tb.kpis();
    assert_eq!(kpis.ener_tot, 0.0);
    assert_eq!(kpis.time_rat, None);
}

#[test]
fn warmup_results_are_discarded() {
    let tb = scripted_testbed();
    let snap = tb.initialize(3600.0, 7200.0).unwrap();
    // Two hours of native heating during warmup.
    assert!((snap[ZONE_TEMPERATURE] - (common::START_TEMPERATURE_K + 2.0)).abs() < 1e-9);
    assert!(tb.with_results(|r| r.is_empty()));
}

#[test]
fn override_replaces_native_control_for_one_step() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    tb.advance(&idle().activate(HEATER_INPUT, 2500.0)).unwrap();
    let outcome = tb.advance(&idle()).unwrap();
    let snap = outcome.snapshot().unwrap();
    assert_eq!(snap[HEATER_INPUT], NATIVE_HEAT_W);

    let cols = tb.results(&[HEATER_INPUT], 0.0, 3600.0).unwrap();
    assert_eq!(cols.points[HEATER_INPUT], vec![2500.0]);
}

#[test]
fn inactive_override_passes_through() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    let outcome = tb.advance(&idle().inactive(HEATER_INPUT, 4000.0)).unwrap();
    assert_eq!(outcome.snapshot().unwrap()[HEATER_INPUT], NATIVE_HEAT_W);
}

#[test]
fn clamp_policy_saturates_to_bounds() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    let outcome = tb.advance(&idle().activate(HEATER_INPUT, 9000.0)).unwrap();
    assert_eq!(outcome.snapshot().unwrap()[HEATER_INPUT], 5000.0);
}

#[test]
fn reject_policy_fails_without_advancing() {
    let tb = scripted_testbed_with(ScriptedUnit::new(), OverridePolicy::Reject);
    tb.initialize(0.0, 0.0).unwrap();
    let err = tb.advance(&idle().activate(HEATER_INPUT, -1.0)).unwrap_err();
    assert!(matches!(err, TestbedError::InvalidParameters { .. }));
    assert_eq!(tb.time(), 0.0);
    assert!(tb.with_results(|r| r.is_empty()));
}

#[test]
fn unknown_override_point_is_rejected() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    let err = tb.advance(&idle().activate("oveNope_u", 1.0)).unwrap_err();
    assert_eq!(
        err,
        TestbedError::UnknownPoint {
            name: "oveNope_u".to_string()
        }
    );
    assert_eq!(tb.time(), 0.0);
}

#[test]
fn advance_before_initialize_fails() {
    let tb = scripted_testbed();
    assert_eq!(tb.advance(&idle()), Err(TestbedError::NotInitialized));
    assert_eq!(tb.phase(), Phase::Uninitialized);
}

#[test]
fn divergence_freezes_the_run_until_reinitialized() {
    let tb = scripted_testbed_with(ScriptedUnit::new().diverging_after(7200.0), OverridePolicy::Clamp);
    tb.initialize(0.0, 0.0).unwrap();
    tb.advance(&idle()).unwrap();
    tb.advance(&idle()).unwrap();

    let err = tb.advance(&idle()).unwrap_err();
    assert!(matches!(err, TestbedError::SimulationDiverged { .. }));
    assert!(!err.is_recoverable());
    assert_eq!(tb.phase(), Phase::Diverged);
    assert_eq!(tb.time(), 7200.0);
    assert_eq!(tb.with_results(|r| r.len()), 2);

    assert_eq!(tb.advance(&idle()), Err(TestbedError::NotInitialized));

    tb.initialize(0.0, 0.0).unwrap();
    assert_eq!(tb.phase(), Phase::Initialized);
    assert!(matches!(tb.advance(&idle()), Ok(AdvanceOutcome::Stepped(_))));
}

#[test]
fn invalid_step_leaves_step_unchanged() {
    let tb = scripted_testbed();
    for bad in [0.0, -900.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(tb.set_step(bad), Err(TestbedError::InvalidStep { .. })));
    }
    assert_eq!(tb.step(), 3600.0);
}

#[test]
fn results_query_validates_points_and_range() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    tb.advance(&idle()).unwrap();
    assert!(matches!(
        tb.results(&["nope"], 0.0, 1.0),
        Err(TestbedError::UnknownPoint { .. })
    ));
    assert!(matches!(
        tb.results(&[CLOCK], 10.0, 1.0),
        Err(TestbedError::InvalidParameters { .. })
    ));
    assert!(tb.results(&[CLOCK], 1e5, 1e6).unwrap().time.is_empty());
}

#[test]
fn reset_returns_to_uninitialized() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    tb.advance(&idle()).unwrap();
    tb.reset();
    assert_eq!(tb.phase(), Phase::Uninitialized);
    assert!(tb.with_results(|r| r.is_empty()));
    assert_eq!(tb.advance(&idle()), Err(TestbedError::NotInitialized));
}
