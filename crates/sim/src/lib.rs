//! Simulation driver for the VANET protocol stack

pub mod scenarios;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use vanet_radio::mac::{EdcaConfig, EdcaMac};
use vanet_radio::{Environment, RadioError, StackConfig};

/// Vehicles per km used by the density presets.
pub const LIGHT_TRAFFIC_DENSITY: f64 = 10.0;
pub const HEAVY_TRAFFIC_DENSITY: f64 = 100.0;

/// Named operating conditions, selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Highway,
    Urban,
    Rural,
    #[value(alias = "light")]
    LightTraffic,
    #[value(alias = "heavy")]
    HeavyTraffic,
}

impl Preset {
    pub fn config(self) -> StackConfig {
        match self {
            Preset::Highway => SimulationPresets::highway(),
            Preset::Urban => SimulationPresets::urban(),
            Preset::Rural => SimulationPresets::rural(),
            Preset::LightTraffic => SimulationPresets::light_traffic(),
            Preset::HeavyTraffic => SimulationPresets::heavy_traffic(),
        }
    }
}

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn highway() -> StackConfig {
        StackConfig { environment: Environment::Highway, ..Default::default() }
    }

    pub fn urban() -> StackConfig {
        let mut config = StackConfig { environment: Environment::Urban, ..Default::default() };
        config.edca.initial_busy_ratio = 0.3;
        config
    }

    pub fn rural() -> StackConfig {
        let mut config = StackConfig { environment: Environment::Rural, ..Default::default() };
        // sparse cells: lower WiMAX shadowing spread
        config.wimax.shadowing_sigma_db = 6.0;
        config
    }

    pub fn light_traffic() -> StackConfig {
        Self::with_density(Self::highway(), LIGHT_TRAFFIC_DENSITY).unwrap_or_else(|_| Self::highway())
    }

    pub fn heavy_traffic() -> StackConfig {
        Self::with_density(Self::urban(), HEAVY_TRAFFIC_DENSITY).unwrap_or_else(|_| Self::urban())
    }

    /// Starts the EDCA carrier sense at the busy ratio `vehicle_density` implies.
    pub fn with_density(mut config: StackConfig, vehicle_density: f64) -> Result<StackConfig, RadioError> {
        let mut mac = EdcaMac::new(EdcaConfig::default())?;
        config.edca.initial_busy_ratio = mac.update_channel_conditions(vehicle_density)?;
        Ok(config)
    }

    pub fn all() -> Vec<(Preset, StackConfig)> {
        Preset::value_variants().iter().map(|&preset| (preset, preset.config())).collect()
    }
}

/// Reads a `StackConfig` from JSON; missing fields take their defaults.
pub fn load_stack_config(path: impl AsRef<Path>) -> Result<StackConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: StackConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate().with_context(|| format!("validating config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        let all = SimulationPresets::all();
        assert_eq!(all.len(), 5);
        for (preset, config) in all {
            assert!(config.validate().is_ok(), "{preset:?}");
        }
    }

    #[test]
    fn test_density_presets_follow_busy_ratio_curve() {
        let light = SimulationPresets::light_traffic();
        let heavy = SimulationPresets::heavy_traffic();
        assert!((light.edca.initial_busy_ratio - 0.17).abs() < 1e-9);
        assert!((heavy.edca.initial_busy_ratio - 0.8).abs() < 1e-9);
        assert!(SimulationPresets::with_density(SimulationPresets::urban(), -5.0).is_err());
    }

    #[test]
    fn test_preset_lookup() {
        let highway = Preset::from_str("Highway", true).unwrap();
        assert_eq!(highway.config().environment, Environment::Highway);
        assert_eq!(Preset::from_str("heavy", false).unwrap(), Preset::HeavyTraffic);
        assert_eq!(Preset::from_str("light-traffic", false).unwrap(), Preset::LightTraffic);
        assert!(Preset::from_str("suburban", true).is_err());
    }

    #[test]
    fn test_load_stack_config() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("vanet_sim_config_{}.json", std::process::id()));
        fs::write(&good, r#"{"environment":"highway","edca":{"max_retries":4}}"#).unwrap();
        let config = load_stack_config(&good).unwrap();
        assert_eq!(config.environment, Environment::Highway);
        assert_eq!(config.edca.max_retries, 4);

        fs::write(&good, r#"{"environment":"suburban"}"#).unwrap();
        assert!(load_stack_config(&good).is_err());
        fs::remove_file(&good).unwrap();

        assert!(load_stack_config(dir.join("vanet_sim_missing.json")).is_err());
    }
}
