use serde::Deserialize;

/// Embedded control of the reference zone: heating setpoint schedule,
/// proportional heater control and demand-controlled ventilation.
///
/// This is the "native" control that any input not overridden by the
/// caller falls back to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thermostat {
    /// Heating setpoint while occupied (K).
    pub occupied_setpoint_k: f64,
    /// Heating setpoint while unoccupied (K).
    pub unoccupied_setpoint_k: f64,
    /// Temperature error at which the heater reaches full power (K).
    pub proportional_band_k: f64,
    /// CO2 level below which the fan runs at minimum speed (ppm).
    pub co2_low_ppm: f64,
    /// CO2 level at which the fan reaches full speed (ppm).
    pub co2_high_ppm: f64,
    /// Minimum fan speed while occupied (fraction).
    pub min_fan_speed: f64,
}

impl Default for Thermostat {
    fn default() -> Self {
        Self {
            occupied_setpoint_k: 294.65,
            unoccupied_setpoint_k: 288.65,
            proportional_band_k: 1.0,
            co2_low_ppm: 600.0,
            co2_high_ppm: 1000.0,
            min_fan_speed: 0.2,
        }
    }
}

impl Thermostat {
    pub fn heating_setpoint(&self, occupied: bool) -> f64 {
        if occupied {
            self.occupied_setpoint_k
        } else {
            self.unoccupied_setpoint_k
        }
    }

    /// Heater thermal power for the given setpoint error, in `[0, max_w]`.
    pub fn heating_power(&self, setpoint_k: f64, zone_k: f64, max_w: f64) -> f64 {
        let fraction = (setpoint_k - zone_k) / self.proportional_band_k;
        (fraction * max_w).clamp(0.0, max_w)
    }

    /// Fan speed fraction in `[0, 1]`; the fan is off when unoccupied.
    pub fn fan_speed(&self, co2_ppm: f64, occupied: bool) -> f64 {
        if !occupied {
            return 0.0;
        }
        let ramp = (co2_ppm - self.co2_low_ppm) / (self.co2_high_ppm - self.co2_low_ppm);
        ramp.clamp(self.min_fan_speed, 1.0)
    }
}
