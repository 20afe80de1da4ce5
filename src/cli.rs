use std::path::PathBuf;

use clap::Parser;

use testbed_sim::scenario::ElectricityPrice;

/// Building-energy simulation testbed: baseline runs and an HTTP control interface.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Load the configuration from a TOML file.
    #[clap(long, env = "TESTBED_CONFIG", conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Use a built-in preset (single_zone, heavy_mass).
    #[clap(long)]
    pub preset: Option<String>,

    /// Boundary data CSV, replacing the synthetic weather and schedules.
    #[clap(long)]
    pub boundary: Option<PathBuf>,

    /// Time period scenario for the baseline run.
    #[clap(long = "time-period", default_value = "peak_heat_day")]
    pub time_period: String,

    /// Electricity price scenario used for the cost KPI.
    #[clap(long = "electricity-price", default_value = "constant", value_parser = parse_price)]
    pub electricity_price: ElectricityPrice,

    /// Communication step in seconds.
    #[clap(long)]
    pub step: Option<f64>,

    /// Export the recorded results to CSV.
    #[clap(long = "results-out")]
    pub results_out: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[clap(long = "log-json", env = "TESTBED_LOG_JSON")]
    pub log_json: bool,

    /// Serve the HTTP interface instead of running a baseline test.
    #[cfg(feature = "api")]
    #[clap(long)]
    pub serve: bool,

    /// HTTP port.
    #[cfg(feature = "api")]
    #[clap(long, default_value = "5000", env = "TESTBED_PORT")]
    pub port: u16,
}

fn parse_price(s: &str) -> Result<ElectricityPrice, String> {
    s.parse().map_err(|e: testbed_sim::error::TestbedError| e.to_string())
}
