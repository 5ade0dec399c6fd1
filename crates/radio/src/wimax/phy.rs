use rand::Rng;
use serde::{Deserialize, Serialize};
use vanet_core::types::{dbm_to_watts, watts_to_dbm};

use crate::phy::clipped_gaussian_db;
use crate::wimax::WimaxConfig;
use crate::RadioError;

const MIN_DISTANCE_M: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WimaxLink {
    pub distance_m: f64,
    pub rx_power_dbm: f64,
    pub snr_db: f64,
    pub capacity_bps: f64,
}

/// Distance-only link budget for the base station downlink.
pub struct WimaxPhy {
    config: WimaxConfig,
}

impl WimaxPhy {
    pub fn new(config: WimaxConfig) -> Result<Self, RadioError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WimaxConfig {
        &self.config
    }

    pub fn noise_floor_dbm(&self) -> f64 {
        self.config.thermal_noise_dbm_per_hz + 10.0 * self.config.bandwidth_hz.log10() + self.config.noise_figure_db
    }

    pub fn received_power_dbm(&self, distance_m: f64, shadowing_db: f64) -> f64 {
        let d = distance_m.max(MIN_DISTANCE_M);
        let rx_watts = dbm_to_watts(self.config.tx_power_dbm) * d.powf(-self.config.pathloss_exponent);
        watts_to_dbm(rx_watts) + shadowing_db
    }

    fn clamp_snr(&self, snr_db: f64) -> f64 {
        snr_db.clamp(self.config.min_snr_db, self.config.max_snr_db)
    }

    pub fn snr_db<R: Rng + ?Sized>(&self, distance_m: f64, rng: &mut R) -> f64 {
        let shadowing = clipped_gaussian_db(self.config.shadowing_sigma_db, rng);
        self.clamp_snr(self.received_power_dbm(distance_m, shadowing) - self.noise_floor_dbm())
    }

    /// Linear spectral-efficiency ramp through the 10 dB reference point.
    pub fn capacity_bps(&self, snr_db: f64) -> f64 {
        let efficiency = ((snr_db + 5.0) / 10.0 * self.config.spectral_efficiency_bps_per_hz_at_snr_10db).max(0.0);
        efficiency * self.config.bandwidth_hz
    }

    pub fn evaluate<R: Rng + ?Sized>(&self, distance_m: f64, rng: &mut R) -> Result<WimaxLink, RadioError> {
        if !(distance_m.is_finite() && distance_m >= 0.0) {
            return Err(RadioError::InvalidDistance(distance_m));
        }
        let shadowing = clipped_gaussian_db(self.config.shadowing_sigma_db, rng);
        let rx_power_dbm = self.received_power_dbm(distance_m, shadowing);
        let snr_db = self.clamp_snr(rx_power_dbm - self.noise_floor_dbm());
        Ok(WimaxLink {
            distance_m,
            rx_power_dbm,
            snr_db,
            capacity_bps: self.capacity_bps(snr_db),
        })
    }
}
