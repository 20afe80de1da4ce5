//! Testbed entry point: CLI wiring, baseline runs and the optional API server.

mod cli;

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use testbed_sim::config::TestbedConfig;
use testbed_sim::io::export::export_csv;
use testbed_sim::scenario::ScenarioSpec;
use testbed_sim::sim::{AdvanceOutcome, OverrideRequest};
use testbed_sim::telemetry::init_tracing;
use testbed_sim::testbed::Testbed;

use cli::Args;

fn load_config(args: &Args) -> Result<TestbedConfig, Box<dyn Error>> {
    // --config takes priority, then --preset, then the single_zone default
    let mut cfg = if let Some(path) = &args.config {
        TestbedConfig::from_toml_file(path)?
    } else if let Some(name) = &args.preset {
        TestbedConfig::from_preset(name)?
    } else {
        TestbedConfig::single_zone()
    };
    if let Some(path) = &args.boundary {
        cfg.boundary.csv = Some(path.clone());
    }
    if let Some(step) = args.step {
        cfg.testcase.step = step;
    }
    Ok(cfg)
}

/// Runs the selected time period under native control only.
fn run_baseline(testbed: &Testbed, args: &Args) -> Result<(), Box<dyn Error>> {
    let spec = ScenarioSpec::default()
        .with_price(args.electricity_price)
        .with_time_period(&args.time_period);
    testbed.set_scenario(&spec)?;

    let idle = OverrideRequest::new();
    let mut steps = 0usize;
    while let AdvanceOutcome::Stepped(_) = testbed.advance(&idle)? {
        steps += 1;
    }
    info!(steps, time_period = %args.time_period, "baseline run complete");

    println!("{}", testbed.kpis());

    if let Some(path) = &args.results_out {
        testbed.with_results(|store| export_csv(store.records(), path))?;
        info!(path = %path.display(), "results written");
    }
    Ok(())
}

#[cfg(feature = "api")]
fn serve(testbed: Testbed, port: u16) -> Result<(), Box<dyn Error>> {
    use std::net::SocketAddr;

    let state = testbed_sim::api::AppState::new(testbed);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(testbed_sim::api::serve(state, addr))?;
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(args)?;
    let testbed = cfg.build()?;
    info!(name = %testbed.name(), step = testbed.step(), "testbed ready");

    #[cfg(feature = "api")]
    if args.serve {
        return serve(testbed, args.port);
    }

    run_baseline(&testbed, args)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
