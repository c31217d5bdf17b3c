//! TOML-based run configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::privacy::{BackendSettings, HeParams};
use crate::solver::{MAX_DISCRETE_STATES, discrete_table_size};

/// Top-level run configuration parsed from TOML.
///
/// All fields have defaults matching the baseline preset. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon discretisation and global parameters.
    #[serde(default)]
    pub horizon: HorizonConfig,
    /// Convergence parameters of the round loop.
    #[serde(default)]
    pub steering: SteeringConfig,
    /// Target profile definition.
    #[serde(default)]
    pub target: TargetConfig,
    /// Privacy backend selection.
    #[serde(default)]
    pub privacy: PrivacyConfig,
    /// Electric vehicle fleet.
    #[serde(default)]
    pub ev: EvConfig,
    /// Heat pump fleet.
    #[serde(default)]
    pub heat_pump: HeatPumpConfig,
}

/// Horizon discretisation and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    /// Number of intervals per day (must be > 0).
    pub steps_per_day: usize,
    /// Number of days to plan (must be > 0).
    pub days: usize,
    /// Master random seed for fleet and base-load generation.
    pub seed: u64,
    /// Plan devices concurrently within a round.
    pub parallel_planning: bool,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            steps_per_day: 96,
            days: 1,
            seed: 42,
            parallel_planning: true,
        }
    }
}

/// Convergence parameters of the round loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SteeringConfig {
    /// Stop once the best improvement of a round is below this (W).
    pub min_improvement: f64,
    /// Upper bound on rounds.
    pub max_iterations: usize,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            min_improvement: 1.0,
            max_iterations: 200,
        }
    }
}

/// How the fleet target profile is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// All-zero target.
    Zero,
    /// Constant `level_w`.
    Flat,
    /// Fill the valleys of the forecast base load with the fleet's energy.
    ValleyFill,
}

/// Target profile definition and the base-load shape it is computed against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Target construction.
    pub kind: TargetKind,
    /// Level for the flat target (W).
    pub level_w: f64,
    /// Mean base load (W).
    pub base_w: f64,
    /// Daily base-load amplitude (W).
    pub amp_w: f64,
    /// Base-load phase offset (radians).
    pub phase_rad: f64,
    /// Base-load noise standard deviation (W).
    pub noise_std: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: TargetKind::ValleyFill,
            level_w: 0.0,
            base_w: 60_000.0,
            amp_w: 30_000.0,
            phase_rad: 4.0,
            noise_std: 1_500.0,
        }
    }
}

/// Privacy mechanism used for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Homomorphic,
    Differential,
}

/// Privacy backend selection and parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrivacyConfig {
    pub backend: BackendKind,
    /// Ring degree, i.e. slot capacity (power of two).
    pub poly_degree: usize,
    /// Bit size of the ciphertext modulus.
    pub modulus_bits: u32,
    /// Fixed-point scale as a power of two.
    pub scale_bits: u32,
    /// Revealed aggregates must stay below `2^magnitude_bits` watts.
    pub magnitude_bits: u32,
    /// Laplace scale for the differential backend (W).
    pub noise_scale: f64,
    /// Seed for key generation and noise; drawn from the OS when absent.
    pub seed: Option<u64>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        let he = HeParams::default();
        Self {
            backend: BackendKind::Homomorphic,
            poly_degree: he.poly_degree,
            modulus_bits: he.modulus_bits,
            scale_bits: he.scale_bits,
            magnitude_bits: he.magnitude_bits,
            noise_scale: 100.0,
            seed: None,
        }
    }
}

impl PrivacyConfig {
    /// Backend settings for [`BackendSettings::build`].
    pub fn settings(&self) -> BackendSettings {
        match self.backend {
            BackendKind::Homomorphic => BackendSettings::Homomorphic {
                params: self.he_params(),
                seed: self.seed,
            },
            BackendKind::Differential => BackendSettings::Differential {
                noise_scale: self.noise_scale,
                seed: self.seed,
            },
        }
    }

    fn he_params(&self) -> HeParams {
        HeParams {
            poly_degree: self.poly_degree,
            modulus_bits: self.modulus_bits,
            scale_bits: self.scale_bits,
            magnitude_bits: self.magnitude_bits,
        }
    }
}

/// Electric vehicle fleet parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvConfig {
    /// Number of vehicles.
    pub count: usize,
    /// Battery capacity (Wh).
    pub capacity_wh: f64,
    /// Supported charging powers (W).
    pub power_levels_w: Vec<f64>,
    /// Plan on the discrete level set instead of continuously.
    pub discrete: bool,
    /// Earliest arrival (hour of the first day).
    pub arrival_hr_min: f64,
    /// Latest arrival (hour of the first day).
    pub arrival_hr_max: f64,
    /// Earliest departure (hour of the first day).
    pub departure_hr_min: f64,
    /// Latest departure (hour of the first day).
    pub departure_hr_max: f64,
    /// Smallest charge request (Wh).
    pub request_wh_min: f64,
    /// Largest charge request (Wh).
    pub request_wh_max: f64,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            count: 10,
            capacity_wh: 40_000.0,
            power_levels_w: vec![0.0, 3000.0, 4000.0, 5000.0, 6000.0, 7000.0, 8000.0],
            discrete: false,
            arrival_hr_min: 7.0,
            arrival_hr_max: 12.0,
            departure_hr_min: 15.0,
            departure_hr_max: 22.0,
            request_wh_min: 4_000.0,
            request_wh_max: 22_000.0,
        }
    }
}

/// Heat pump fleet parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeatPumpConfig {
    /// Number of heat pumps.
    pub count: usize,
    /// Thermal buffer capacity in electrical equivalent (Wh).
    pub capacity_wh: f64,
    /// Minimum electrical power (W).
    pub min_w: f64,
    /// Maximum electrical power (W).
    pub max_w: f64,
    /// Initial and final buffer fill (0.0–1.0).
    pub initial_fill: f64,
    /// Heat demand per interval is uniform in `[0, demand_scale * max_w)`.
    pub demand_scale: f64,
}

impl Default for HeatPumpConfig {
    fn default() -> Self {
        Self {
            count: 5,
            capacity_wh: 14_000.0,
            min_w: 0.0,
            max_w: 5_000.0,
            initial_fill: 0.5,
            demand_scale: 1.5,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"horizon.steps_per_day"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        field: field.to_string(),
        message: message.into(),
    }
}

impl ScenarioConfig {
    /// Returns the baseline preset: homomorphic backend, continuous EVs, valley filling.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the discrete-EV preset: vehicles select from their level set.
    pub fn discrete_ev() -> Self {
        Self {
            ev: EvConfig {
                count: 12,
                discrete: true,
                power_levels_w: vec![0.0, 3000.0, 6000.0],
                ..EvConfig::default()
            },
            heat_pump: HeatPumpConfig {
                count: 0,
                ..HeatPumpConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the differential preset: Laplace-perturbed contributions.
    pub fn differential() -> Self {
        Self {
            privacy: PrivacyConfig {
                backend: BackendKind::Differential,
                noise_scale: 50.0,
                ..PrivacyConfig::default()
            },
            steering: SteeringConfig {
                min_improvement: 50.0,
                ..SteeringConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "discrete_ev", "differential"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "discrete_ev" => Ok(Self::discrete_ev()),
            "differential" => Ok(Self::differential()),
            _ => Err(err(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            err(
                "scenario",
                format!("cannot read \"{}\": {e}", path.display()),
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| err("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let h = &self.horizon;
        if h.steps_per_day == 0 {
            errors.push(err("horizon.steps_per_day", "must be > 0"));
        }
        if h.days == 0 {
            errors.push(err("horizon.days", "must be > 0"));
        }

        let s = &self.steering;
        if !s.min_improvement.is_finite() || s.min_improvement < 0.0 {
            errors.push(err("steering.min_improvement", "must be finite and >= 0"));
        }

        let p = &self.privacy;
        match p.backend {
            BackendKind::Homomorphic => {
                let params = p.he_params();
                if let Err(e) = params.validate() {
                    errors.push(err("privacy.poly_degree", e.to_string()));
                }
                let horizon = h.steps_per_day * h.days;
                if horizon > p.poly_degree {
                    errors.push(err(
                        "privacy.poly_degree",
                        format!("must be >= the horizon length {horizon}"),
                    ));
                }
                let peak = self.fleet_peak_w();
                if peak >= params.magnitude_limit() {
                    errors.push(err(
                        "privacy.magnitude_bits",
                        format!(
                            "fleet peak of {peak} W does not fit below 2^{}",
                            p.magnitude_bits
                        ),
                    ));
                }
            }
            BackendKind::Differential => {
                if !p.noise_scale.is_finite() || p.noise_scale < 0.0 {
                    errors.push(err("privacy.noise_scale", "must be finite and >= 0"));
                }
            }
        }

        let ev = &self.ev;
        if ev.count > 0 {
            if ev.capacity_wh <= 0.0 {
                errors.push(err("ev.capacity_wh", "must be > 0"));
            }
            if ev.power_levels_w.is_empty() {
                errors.push(err("ev.power_levels_w", "must not be empty"));
            }
            if ev.power_levels_w.iter().any(|l| !l.is_finite() || *l < 0.0) {
                errors.push(err("ev.power_levels_w", "must be finite and >= 0"));
            } else if ev.discrete {
                match discrete_table_size(&ev.power_levels_w, h.steps_per_day * h.days) {
                    None => errors.push(err(
                        "ev.power_levels_w",
                        "must be whole watts when ev.discrete is set",
                    )),
                    Some(size) if size > MAX_DISCRETE_STATES => errors.push(err(
                        "ev.power_levels_w",
                        format!(
                            "planning table of {size} states exceeds {MAX_DISCRETE_STATES}; \
                             use levels with a larger common divisor"
                        ),
                    )),
                    Some(_) => {}
                }
            }
            if ev.arrival_hr_min > ev.arrival_hr_max {
                errors.push(err("ev.arrival_hr_min", "must be <= ev.arrival_hr_max"));
            }
            if ev.departure_hr_min > ev.departure_hr_max {
                errors.push(err("ev.departure_hr_min", "must be <= ev.departure_hr_max"));
            }
            if ev.arrival_hr_max > ev.departure_hr_min {
                errors.push(err("ev.arrival_hr_max", "must be <= ev.departure_hr_min"));
            }
            if ev.arrival_hr_min < 0.0 {
                errors.push(err("ev.arrival_hr_min", "must be >= 0"));
            }
            if h.days > 0 && ev.departure_hr_max > 24.0 * h.days as f64 {
                errors.push(err("ev.departure_hr_max", "must lie within the horizon"));
            }
            if ev.request_wh_min < 0.0 || ev.request_wh_min > ev.request_wh_max {
                errors.push(err("ev.request_wh_min", "must be in [0, ev.request_wh_max]"));
            }
            if ev.request_wh_max > ev.capacity_wh {
                errors.push(err("ev.request_wh_max", "must be <= ev.capacity_wh"));
            }
        }

        let hp = &self.heat_pump;
        if hp.count > 0 {
            if hp.capacity_wh <= 0.0 {
                errors.push(err("heat_pump.capacity_wh", "must be > 0"));
            }
            if hp.min_w > hp.max_w {
                errors.push(err("heat_pump.min_w", "must be <= heat_pump.max_w"));
            }
            if !(0.0..=1.0).contains(&hp.initial_fill) {
                errors.push(err("heat_pump.initial_fill", "must be in [0.0, 1.0]"));
            }
            if hp.demand_scale < 0.0 {
                errors.push(err("heat_pump.demand_scale", "must be >= 0"));
            }
        }

        if ev.count + hp.count == 0 {
            errors.push(err("ev.count", "fleet must contain at least one device"));
        }

        errors
    }

    /// Largest aggregate magnitude the fleet can draw in one interval (W).
    fn fleet_peak_w(&self) -> f64 {
        let ev_peak = self
            .ev
            .power_levels_w
            .iter()
            .fold(0.0_f64, |m, l| m.max(l.abs()));
        let hp_peak = self.heat_pump.min_w.abs().max(self.heat_pump.max_w.abs());
        self.ev.count as f64 * ev_peak + self.heat_pump.count as f64 * hp_peak
    }
}
