mod common;

use common::scripted_testbed;
use testbed_sim::boundary::OUTDOOR_TEMPERATURE;
use testbed_sim::error::TestbedError;
use testbed_sim::forecast::ACTIVE_PRICE_SERIES;
use testbed_sim::scenario::{ElectricityPrice, ScenarioSpec};
use testbed_sim::sim::OverrideRequest;

#[test]
fn window_follows_simulated_time() {
    let tb = scripted_testbed();
    tb.initialize(86_400.0, 0.0).unwrap();
    tb.advance(&OverrideRequest::new()).unwrap();

    let window = tb.forecast(Some(6.0 * 3600.0), Some(1800.0)).unwrap();
    assert_eq!(window.start(), 86_400.0 + 3600.0);
    assert_eq!(window.iter().len(), 13);

    let times: Vec<f64> = window.iter().map(|s| s.time).collect();
    assert_eq!(times.first(), Some(&90_000.0));
    assert_eq!(times.last(), Some(&(90_000.0 + 6.0 * 3600.0)));
    assert!(window.iter().all(|s| s.values.contains_key(OUTDOOR_TEMPERATURE)));
}

#[test]
fn window_can_be_iterated_twice() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    let window = tb.forecast(None, None).unwrap();
    let first: Vec<_> = window.iter().collect();
    let second: Vec<_> = (&window).into_iter().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 25);
}

#[test]
fn active_price_follows_scenario() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();

    for price in ElectricityPrice::ALL {
        tb.set_scenario(&ScenarioSpec::default().with_price(price)).unwrap();
        let columns = tb.forecast(Some(86_400.0), Some(3600.0)).unwrap().to_columns();
        assert_eq!(columns.series[ACTIVE_PRICE_SERIES], columns.series[price.series_name()]);
    }
}

#[test]
fn default_parameters_are_used_and_updatable() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();

    let params = tb.set_forecast_parameters(7200.0, 900.0).unwrap();
    assert_eq!(tb.forecast_parameters(), params);
    assert_eq!(tb.forecast(None, None).unwrap().iter().len(), 9);

    assert!(matches!(
        tb.set_forecast_parameters(-1.0, 900.0),
        Err(TestbedError::InvalidParameters { .. })
    ));
    assert!(matches!(
        tb.set_forecast_parameters(3600.0, 0.0),
        Err(TestbedError::InvalidParameters { .. })
    ));
    assert_eq!(tb.forecast_parameters(), params);
}

#[test]
fn window_past_the_data_is_out_of_range() {
    let tb = scripted_testbed();
    tb.initialize(29.5 * 86_400.0, 0.0).unwrap();
    let err = tb.forecast(Some(86_400.0), Some(3600.0)).unwrap_err();
    assert!(matches!(err, TestbedError::ForecastOutOfRange { .. }));
    assert!(tb.forecast(Some(3600.0), Some(3600.0)).is_ok());
}

#[test]
fn window_before_the_data_is_out_of_range() {
    let tb = scripted_testbed();
    tb.initialize(-3600.0, 0.0).unwrap();
    assert!(matches!(
        tb.forecast(Some(3600.0), Some(900.0)),
        Err(TestbedError::ForecastOutOfRange { .. })
    ));
}

#[test]
fn zero_horizon_yields_one_sample() {
    let tb = scripted_testbed();
    tb.initialize(0.0, 0.0).unwrap();
    let window = tb.forecast(Some(0.0), Some(3600.0)).unwrap();
    assert_eq!(window.iter().len(), 1);
}
