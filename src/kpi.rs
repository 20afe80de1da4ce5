//! Incremental KPI computation over completed steps.
//!
//! Each record contributes one [`KpiAccumulator`] delta that is merged
//! into the running total, so a report costs the same no matter how long
//! the run is. Merging is plain summation, which makes the running total
//! independent of how the history was chunked.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::boundary::{
    BoundaryData, ELECTRICITY_EMISSIONS, lower_setpoint_series, upper_co2_series,
    upper_setpoint_series,
};
use crate::points::{KpiTag, PointCatalog, PointKind};
use crate::results::ResultRecord;
use crate::scenario::ElectricityPrice;

const SECONDS_PER_HOUR: f64 = 3600.0;
const W_PER_KW: f64 = 1000.0;

/// Normalization constants and fixed prices used by the KPIs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KpiSettings {
    /// Conditioned floor area used to normalize energy, cost and emissions (m2).
    pub floor_area_m2: f64,
    /// Fallback electricity emission factor when boundary data lacks one (kgCO2/kWh).
    pub electricity_emission_factor: f64,
    /// Natural gas price (per kWh).
    pub gas_price_per_kwh: f64,
    /// Natural gas emission factor (kgCO2/kWh).
    pub gas_emission_factor: f64,
    /// District heating price (per kWh).
    pub district_heating_price_per_kwh: f64,
    /// District heating emission factor (kgCO2/kWh).
    pub district_heating_emission_factor: f64,
}

impl Default for KpiSettings {
    fn default() -> Self {
        Self {
            floor_area_m2: 48.0,
            electricity_emission_factor: 0.1105,
            gas_price_per_kwh: 0.0491,
            gas_emission_factor: 0.2,
            district_heating_price_per_kwh: 0.0806,
            district_heating_emission_factor: 0.1,
        }
    }
}

/// Running sums for every indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiAccumulator {
    pub energy_kwh: f64,
    /// Electricity cost under each price scenario, indexed by
    /// [`ElectricityPrice::index`].
    pub electricity_cost: [f64; ElectricityPrice::ALL.len()],
    /// Cost of non-electric energy sources.
    pub fixed_cost: f64,
    pub emissions_kg: f64,
    /// Thermal discomfort per zone (K.h).
    pub thermal_discomfort: BTreeMap<String, f64>,
    /// Air quality discomfort per zone (ppm.h).
    pub air_quality_discomfort: BTreeMap<String, f64>,
    /// Sum over steps of wall-clock seconds divided by step seconds.
    pub time_ratio_sum: f64,
    pub steps: u64,
}

impl KpiAccumulator {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.energy_kwh += other.energy_kwh;
        for (mine, theirs) in self.electricity_cost.iter_mut().zip(other.electricity_cost) {
            *mine += theirs;
        }
        self.fixed_cost += other.fixed_cost;
        self.emissions_kg += other.emissions_kg;
        for (zone, v) in &other.thermal_discomfort {
            *self.thermal_discomfort.entry(zone.clone()).or_default() += v;
        }
        for (zone, v) in &other.air_quality_discomfort {
            *self.air_quality_discomfort.entry(zone.clone()).or_default() += v;
        }
        self.time_ratio_sum += other.time_ratio_sum;
        self.steps += other.steps;
    }
}

/// Point-in-time KPI values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    /// Total energy use (kWh/m2).
    pub ener_tot: f64,
    /// Operational cost (per m2) under the active price scenario.
    pub cost_tot: f64,
    /// CO2 emissions (kgCO2/m2).
    pub emis_tot: f64,
    /// Thermal discomfort averaged over zones (K.h/zone).
    pub tdis_tot: f64,
    /// Indoor air quality discomfort averaged over zones (ppm.h/zone).
    pub idis_tot: f64,
    /// Mean wall-clock to simulated time ratio per step; `None` before the
    /// first step.
    pub time_rat: Option<f64>,
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Energy use:            {:.4} kWh/m2", self.ener_tot)?;
        writeln!(f, "Operational cost:      {:.4} /m2", self.cost_tot)?;
        writeln!(f, "Emissions:             {:.4} kgCO2/m2", self.emis_tot)?;
        writeln!(f, "Thermal discomfort:    {:.4} Kh/zone", self.tdis_tot)?;
        writeln!(f, "IAQ discomfort:        {:.4} ppmh/zone", self.idis_tot)?;
        match self.time_rat {
            Some(r) => write!(f, "Computational ratio:   {r:.3e}"),
            None => write!(f, "Computational ratio:   n/a"),
        }
    }
}

/// Converts result records into KPI deltas and keeps the running total.
#[derive(Debug, Clone)]
pub struct KpiCalculator {
    tagged: Vec<(String, KpiTag)>,
    temperature_zones: BTreeSet<String>,
    co2_zones: BTreeSet<String>,
    boundary: Arc<BoundaryData>,
    settings: KpiSettings,
    total: KpiAccumulator,
}

impl KpiCalculator {
    pub fn new(catalog: &PointCatalog, boundary: Arc<BoundaryData>, settings: KpiSettings) -> Self {
        let tagged: Vec<(String, KpiTag)> = catalog
            .iter()
            .filter(|p| p.kind == PointKind::Measurement)
            .filter_map(|p| p.kpi.clone().map(|tag| (p.name.clone(), tag)))
            .collect();
        let temperature_zones = tagged
            .iter()
            .filter_map(|(_, tag)| match tag {
                KpiTag::ZoneTemperature { zone } => Some(zone.clone()),
                _ => None,
            })
            .collect();
        let co2_zones = tagged
            .iter()
            .filter_map(|(_, tag)| match tag {
                KpiTag::ZoneCo2 { zone } => Some(zone.clone()),
                _ => None,
            })
            .collect();
        Self {
            tagged,
            temperature_zones,
            co2_zones,
            boundary,
            settings,
            total: KpiAccumulator::default(),
        }
    }

    /// Drops all accumulated history.
    pub fn reset(&mut self) {
        self.total = KpiAccumulator::default();
    }

    /// Folds one completed step into the running total.
    pub fn record(&mut self, record: &ResultRecord, step: f64, wall_clock: Duration) {
        let delta = self.delta(record, step, wall_clock);
        self.total.merge(&delta);
    }

    /// Contribution of a single step covering `(record.time - step, record.time]`.
    ///
    /// Values in the record represent the whole step; boundary bounds and
    /// prices are sampled at the start of the step.
    pub fn delta(&self, record: &ResultRecord, step: f64, wall_clock: Duration) -> KpiAccumulator {
        let mut d = KpiAccumulator::default();
        let hours = step / SECONDS_PER_HOUR;
        let t0 = record.time - step;
        let s = &self.settings;

        for (name, tag) in &self.tagged {
            let Some(value) = record.get(name) else {
                continue;
            };
            match tag {
                KpiTag::ElectricPower => {
                    let kwh = value * hours / W_PER_KW;
                    d.energy_kwh += kwh;
                    for price in ElectricityPrice::ALL {
                        let unit = self.boundary.value_at(price.series_name(), t0).unwrap_or(0.0);
                        d.electricity_cost[price.index()] += kwh * unit;
                    }
                    let factor = self
                        .boundary
                        .value_at(ELECTRICITY_EMISSIONS, t0)
                        .unwrap_or(s.electricity_emission_factor);
                    d.emissions_kg += kwh * factor;
                }
                KpiTag::GasPower => {
                    let kwh = value * hours / W_PER_KW;
                    d.energy_kwh += kwh;
                    d.fixed_cost += kwh * s.gas_price_per_kwh;
                    d.emissions_kg += kwh * s.gas_emission_factor;
                }
                KpiTag::DistrictHeatingPower => {
                    let kwh = value * hours / W_PER_KW;
                    d.energy_kwh += kwh;
                    d.fixed_cost += kwh * s.district_heating_price_per_kwh;
                    d.emissions_kg += kwh * s.district_heating_emission_factor;
                }
                KpiTag::ZoneTemperature { zone } => {
                    let lo = self.boundary.value_at(&lower_setpoint_series(zone), t0);
                    let hi = self.boundary.value_at(&upper_setpoint_series(zone), t0);
                    let below = lo.map_or(0.0, |lo| (lo - value).max(0.0));
                    let above = hi.map_or(0.0, |hi| (value - hi).max(0.0));
                    *d.thermal_discomfort.entry(zone.clone()).or_default() += (below + above) * hours;
                }
                KpiTag::ZoneCo2 { zone } => {
                    let hi = self.boundary.value_at(&upper_co2_series(zone), t0);
                    let above = hi.map_or(0.0, |hi| (value - hi).max(0.0));
                    *d.air_quality_discomfort.entry(zone.clone()).or_default() += above * hours;
                }
            }
        }

        d.time_ratio_sum = wall_clock.as_secs_f64() / step;
        d.steps = 1;
        d
    }

    /// Running total since the last reset.
    pub fn accumulator(&self) -> &KpiAccumulator {
        &self.total
    }

    /// Normalized indicators, pricing electricity with `price`.
    pub fn report(&self, price: ElectricityPrice) -> KpiReport {
        self.report_from(&self.total, price)
    }

    /// Normalized indicators for an arbitrary accumulator.
    pub fn report_from(&self, acc: &KpiAccumulator, price: ElectricityPrice) -> KpiReport {
        let area = self.settings.floor_area_m2;
        let zone_mean = |sums: &BTreeMap<String, f64>, zones: &BTreeSet<String>| {
            if zones.is_empty() {
                0.0
            } else {
                zones.iter().map(|z| sums.get(z).copied().unwrap_or(0.0)).sum::<f64>() / zones.len() as f64
            }
        };
        KpiReport {
            ener_tot: acc.energy_kwh / area,
            cost_tot: (acc.electricity_cost[price.index()] + acc.fixed_cost) / area,
            emis_tot: acc.emissions_kg / area,
            tdis_tot: zone_mean(&acc.thermal_discomfort, &self.temperature_zones),
            idis_tot: zone_mean(&acc.air_quality_discomfort, &self.co2_zones),
            time_rat: (acc.steps > 0).then(|| acc.time_ratio_sum / acc.steps as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::boundary::Series;
    use crate::points::PointMeta;

    fn boundary() -> Arc<BoundaryData> {
        let times = vec![0.0, 3600.0, 7200.0, 10_800.0];
        let mut data = BoundaryData::new();
        let mut put = |name: &str, values: Vec<f64>| {
            data.insert(name, Series::new(name, times.clone(), values).unwrap());
        };
        put("PriceElectricPowerConstant", vec![0.2; 4]);
        put("PriceElectricPowerDynamic", vec![0.1, 0.3, 0.3, 0.1]);
        put("PriceElectricPowerHighlyDynamic", vec![0.5; 4]);
        put("EmissionsElectricPower", vec![0.1; 4]);
        put("LowerSetp[zon]", vec![293.15; 4]);
        put("UpperSetp[zon]", vec![297.15; 4]);
        put("UpperCO2[zon]", vec![900.0; 4]);
        Arc::new(data)
    }

    fn catalog() -> PointCatalog {
        PointCatalog::new(vec![
            PointMeta::measurement("P", "W", "").with_kpi(KpiTag::ElectricPower),
            PointMeta::measurement("T", "K", "").with_kpi(KpiTag::ZoneTemperature {
                zone: "zon".to_string(),
            }),
            PointMeta::measurement("C", "ppm", "").with_kpi(KpiTag::ZoneCo2 {
                zone: "zon".to_string(),
            }),
        ])
        .unwrap()
    }

    fn settings() -> KpiSettings {
        KpiSettings {
            floor_area_m2: 10.0,
            ..KpiSettings::default()
        }
    }

    fn record(time: f64, p: f64, t: f64, c: f64) -> ResultRecord {
        ResultRecord::new(
            time,
            BTreeMap::from([
                ("P".to_string(), p),
                ("T".to_string(), t),
                ("C".to_string(), c),
            ]),
        )
    }

    #[test]
    fn report_before_any_step_is_zero() {
        let calc = KpiCalculator::new(&catalog(), boundary(), settings());
        let r = calc.report(ElectricityPrice::Constant);
        assert_eq!(r.ener_tot, 0.0);
        assert_eq!(r.tdis_tot, 0.0);
        assert_eq!(r.time_rat, None);
    }

    #[test]
    fn energy_and_cost_integrate_power_times_price() {
        let mut calc = KpiCalculator::new(&catalog(), boundary(), settings());
        // 2 kW for one hour starting at t=3600 (dynamic price 0.3).
        calc.record(&record(7200.0, 2000.0, 295.0, 500.0), 3600.0, Duration::from_millis(36));
        let constant = calc.report(ElectricityPrice::Constant);
        assert!((constant.ener_tot - 0.2).abs() < 1e-12);
        assert!((constant.cost_tot - 0.04).abs() < 1e-12);
        assert!((constant.emis_tot - 0.02).abs() < 1e-12);
        let dynamic = calc.report(ElectricityPrice::Dynamic);
        assert!((dynamic.cost_tot - 0.06).abs() < 1e-12);
        assert!((constant.time_rat.unwrap() - 1e-5).abs() < 1e-12);
    }

    #[test]
    fn discomfort_counts_only_deviation_outside_band() {
        let mut calc = KpiCalculator::new(&catalog(), boundary(), settings());
        calc.record(&record(1800.0, 0.0, 291.15, 1000.0), 1800.0, Duration::ZERO);
        calc.record(&record(3600.0, 0.0, 295.0, 800.0), 1800.0, Duration::ZERO);
        let r = calc.report(ElectricityPrice::Constant);
        // 2 K below for half an hour, then inside the band.
        assert!((r.tdis_tot - 1.0).abs() < 1e-9);
        // 100 ppm above for half an hour.
        assert!((r.idis_tot - 50.0).abs() < 1e-9);
    }

    #[test]
    fn report_is_idempotent() {
        let mut calc = KpiCalculator::new(&catalog(), boundary(), settings());
        calc.record(&record(900.0, 1500.0, 290.0, 950.0), 900.0, Duration::from_millis(3));
        assert_eq!(
            calc.report(ElectricityPrice::HighlyDynamic),
            calc.report(ElectricityPrice::HighlyDynamic)
        );
    }

    #[test]
    fn reset_clears_history() {
        let mut calc = KpiCalculator::new(&catalog(), boundary(), settings());
        calc.record(&record(900.0, 1500.0, 290.0, 950.0), 900.0, Duration::ZERO);
        calc.reset();
        assert_eq!(calc.accumulator(), &KpiAccumulator::default());
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    proptest! {
        #[test]
        fn chunked_merge_matches_sequential_fold(
            samples in prop::collection::vec((0.0f64..5000.0, 285.0f64..305.0, 400.0f64..1500.0), 1..40),
            split in 0usize..40,
        ) {
            let calc = KpiCalculator::new(&catalog(), boundary(), settings());
            let deltas: Vec<KpiAccumulator> = samples
                .iter()
                .enumerate()
                .map(|(i, &(p, t, c))| {
                    let time = (i + 1) as f64 * 250.0;
                    calc.delta(&record(time, p, t, c), 250.0, Duration::from_micros(i as u64))
                })
                .collect();

            let mut sequential = KpiAccumulator::default();
            for d in &deltas {
                sequential.merge(d);
            }

            let k = split.min(deltas.len());
            let mut head = KpiAccumulator::default();
            for d in &deltas[..k] {
                head.merge(d);
            }
            let mut tail = KpiAccumulator::default();
            for d in &deltas[k..] {
                tail.merge(d);
            }
            head.merge(&tail);

            let a = calc.report_from(&sequential, ElectricityPrice::Dynamic);
            let b = calc.report_from(&head, ElectricityPrice::Dynamic);
            prop_assert_eq!(sequential.steps, head.steps);
            prop_assert!(close(a.ener_tot, b.ener_tot));
            prop_assert!(close(a.cost_tot, b.cost_tot));
            prop_assert!(close(a.emis_tot, b.emis_tot));
            prop_assert!(close(a.tdis_tot, b.tdis_tot));
            prop_assert!(close(a.idis_tot, b.idis_tot));
        }
    }
}
