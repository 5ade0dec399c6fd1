//! WiMAX (802.16e) V2I stack: link model, frame scheduler and base station

pub mod mac;
pub mod node;
pub mod phy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vanet_core::types::THERMAL_NOISE_DBM_PER_HZ;
use vanet_core::SimTime;

use crate::RadioError;

pub use mac::{frame_budget_bytes, Delivery, FlowKpi, FrameReport, StationAllocation, WimaxMac};
pub use node::{BaseStation, BaseStationSnapshot, MobileStation, StationKpiSummary};
pub use phy::{WimaxLink, WimaxPhy};

/// QoS service flow classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceClass {
    #[serde(rename = "UGS")]
    Ugs,
    #[serde(rename = "rtPS")]
    RtPs,
    #[serde(rename = "nrtPS")]
    NrtPs,
    #[serde(rename = "BE")]
    Be,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLevel {
    pub latency: SimTime,
    pub jitter: SimTime,
}

impl ServiceClass {
    pub fn sla(&self) -> ServiceLevel {
        let (latency_ms, jitter_ms) = match self {
            ServiceClass::Ugs => (10, 2),
            ServiceClass::RtPs => (20, 5),
            ServiceClass::NrtPs => (50, 10),
            ServiceClass::Be => (100, 25),
        };
        ServiceLevel {
            latency: SimTime::from_millis(latency_ms),
            jitter: SimTime::from_millis(jitter_ms),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceClass::Ugs => "UGS",
            ServiceClass::RtPs => "rtPS",
            ServiceClass::NrtPs => "nrtPS",
            ServiceClass::Be => "BE",
        }
    }
}

impl FromStr for ServiceClass {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ugs" => Ok(ServiceClass::Ugs),
            "rtps" => Ok(ServiceClass::RtPs),
            "nrtps" => Ok(ServiceClass::NrtPs),
            "be" => Ok(ServiceClass::Be),
            _ => Err(RadioError::UnknownServiceClass(s.to_string())),
        }
    }
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WimaxConfig {
    pub bandwidth_hz: f64,
    pub tx_power_dbm: f64,
    pub pathloss_exponent: f64,
    pub shadowing_sigma_db: f64,
    pub noise_figure_db: f64,
    pub thermal_noise_dbm_per_hz: f64,
    pub min_snr_db: f64,
    pub max_snr_db: f64,
    pub spectral_efficiency_bps_per_hz_at_snr_10db: f64,
    pub rx_sensitivity_dbm: f64,
    pub frame_duration: SimTime,
    pub scheduling_granularity: SimTime,
    pub target_reliability: f64,
    pub beacon_interval: SimTime,
    pub beacon_bytes: u64,
    pub ack_bytes: u64,
    pub ack_range_m: f64,
    pub control_rate_bps: f64,
    pub packet_log_capacity: usize,
}

impl Default for WimaxConfig {
    fn default() -> Self {
        Self {
            bandwidth_hz: 10e6,
            tx_power_dbm: 43.0,
            pathloss_exponent: 3.5,
            shadowing_sigma_db: 8.0,
            noise_figure_db: 7.0,
            thermal_noise_dbm_per_hz: THERMAL_NOISE_DBM_PER_HZ,
            min_snr_db: -10.0,
            max_snr_db: 40.0,
            spectral_efficiency_bps_per_hz_at_snr_10db: 2.0,
            rx_sensitivity_dbm: -100.0,
            frame_duration: SimTime::from_millis(5),
            scheduling_granularity: SimTime::from_millis(20),
            target_reliability: 0.99,
            beacon_interval: SimTime::from_millis(1_000),
            beacon_bytes: 64,
            ack_bytes: 16,
            ack_range_m: 5_000.0,
            control_rate_bps: 1e6,
            packet_log_capacity: 1_024,
        }
    }
}

impl WimaxConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        let positive = [
            ("bandwidth_hz", self.bandwidth_hz),
            ("pathloss_exponent", self.pathloss_exponent),
            ("spectral_efficiency_bps_per_hz_at_snr_10db", self.spectral_efficiency_bps_per_hz_at_snr_10db),
            ("control_rate_bps", self.control_rate_bps),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(RadioError::InvalidConfig(format!("wimax.{name} must be positive, got {value}")));
            }
        }
        if !(self.shadowing_sigma_db.is_finite() && self.shadowing_sigma_db >= 0.0) {
            return Err(RadioError::InvalidConfig("wimax.shadowing_sigma_db must be non-negative".into()));
        }
        if !(self.min_snr_db <= self.max_snr_db) {
            return Err(RadioError::InvalidConfig("wimax.min_snr_db must not exceed max_snr_db".into()));
        }
        if !(0.0..=1.0).contains(&self.target_reliability) {
            return Err(RadioError::InvalidConfig(format!(
                "wimax.target_reliability must lie in [0, 1], got {}",
                self.target_reliability
            )));
        }
        if self.frame_duration == SimTime::ZERO {
            return Err(RadioError::InvalidConfig("wimax.frame_duration must be non-zero".into()));
        }
        if self.packet_log_capacity == 0 {
            return Err(RadioError::InvalidConfig("wimax.packet_log_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_class_parsing() {
        assert_eq!("UGS".parse::<ServiceClass>().unwrap(), ServiceClass::Ugs);
        assert_eq!("rtPS".parse::<ServiceClass>().unwrap(), ServiceClass::RtPs);
        assert_eq!("NRTPS".parse::<ServiceClass>().unwrap(), ServiceClass::NrtPs);
        assert_eq!("be".parse::<ServiceClass>().unwrap(), ServiceClass::Be);
        assert!(matches!("ertPS".parse::<ServiceClass>(), Err(RadioError::UnknownServiceClass(_))));
    }

    #[test]
    fn test_sla_latency_ordering() {
        let classes = [ServiceClass::Ugs, ServiceClass::RtPs, ServiceClass::NrtPs, ServiceClass::Be];
        for pair in classes.windows(2) {
            assert!(pair[0].sla().latency < pair[1].sla().latency);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WimaxConfig::default().validate().is_ok());
        let bad = WimaxConfig { target_reliability: 1.5, ..Default::default() };
        assert!(matches!(bad.validate(), Err(RadioError::InvalidConfig(_))));
    }
}
