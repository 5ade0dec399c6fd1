//! JSON run report

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use vanet_core::SimTime;

use crate::phy::{Environment, Modulation};
use crate::stack::{ProtocolStack, Stats, TransmissionResult};
use crate::RadioError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsrcSummary {
    pub standard: String,
    pub frequency_ghz: f64,
    pub bandwidth_mhz: f64,
    pub tx_power_dbm: f64,
    pub receiver_sensitivity_dbm: f64,
    pub channel_busy_ratio: f64,
    pub cch_interval_ms: f64,
    pub sch_interval_ms: f64,
    pub guard_interval_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WimaxSummary {
    pub standard: String,
    pub bandwidth_mhz: f64,
    pub tx_power_dbm: f64,
    pub frame_duration_ms: f64,
    pub scheduling_granularity_ms: f64,
    pub target_reliability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    pub dsrc: DsrcSummary,
    pub wimax: WimaxSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub environment: Environment,
    pub seed: Option<u64>,
    pub simulated_time_ms: f64,
    pub max_retries: u32,
    pub max_range_m: f64,
}

/// One row per V2V send; link fields are null when access was never granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionRecord {
    pub timestamp: SimTime,
    pub success: bool,
    pub delay_ms: f64,
    pub snr_db: Option<f64>,
    pub data_rate_mbps: Option<f64>,
    pub modulation: Option<Modulation>,
    pub per: Option<f64>,
    pub distance_m: f64,
    pub mac_retries: u32,
    pub channel: String,
    pub message_type: String,
}

impl From<&TransmissionResult> for TransmissionRecord {
    fn from(result: &TransmissionResult) -> Self {
        let phy = result.phy.as_ref();
        Self {
            timestamp: result.timestamp,
            success: result.success,
            delay_ms: result.end_to_end_delay_ms,
            snr_db: phy.map(|p| p.snr_db),
            data_rate_mbps: phy.map(|p| p.data_rate_mbps),
            modulation: phy.map(|p| p.modulation),
            per: phy.map(|p| p.per),
            distance_m: result.distance_m,
            mac_retries: result.mac.retransmission_count,
            channel: result.channel_used.to_string(),
            message_type: result.message_type.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub protocol_stack: StackSummary,
    pub simulation_parameters: SimulationParameters,
    pub performance_metrics: Stats,
    pub detailed_transmissions: Vec<TransmissionRecord>,
}

impl SimulationReport {
    pub fn from_stack(stack: &ProtocolStack, seed: Option<u64>) -> Self {
        let config = stack.config();
        let protocol_stack = StackSummary {
            dsrc: DsrcSummary {
                standard: "IEEE 802.11p / 1609.4".to_string(),
                frequency_ghz: config.dsrc.frequency_ghz,
                bandwidth_mhz: config.dsrc.bandwidth_hz / 1e6,
                tx_power_dbm: config.dsrc.tx_power_dbm,
                receiver_sensitivity_dbm: config.dsrc.receiver_sensitivity_dbm,
                channel_busy_ratio: stack.mac().channel_busy_ratio(),
                cch_interval_ms: config.wave.cch_interval.as_millis_f64(),
                sch_interval_ms: config.wave.sch_interval.as_millis_f64(),
                guard_interval_ms: config.wave.guard_interval.as_millis_f64(),
            },
            wimax: WimaxSummary {
                standard: "IEEE 802.16e".to_string(),
                bandwidth_mhz: config.wimax.bandwidth_hz / 1e6,
                tx_power_dbm: config.wimax.tx_power_dbm,
                frame_duration_ms: config.wimax.frame_duration.as_millis_f64(),
                scheduling_granularity_ms: config.wimax.scheduling_granularity.as_millis_f64(),
                target_reliability: config.wimax.target_reliability,
            },
        };
        let simulation_parameters = SimulationParameters {
            environment: config.environment,
            seed,
            simulated_time_ms: stack.now().as_millis_f64(),
            max_retries: config.edca.max_retries,
            max_range_m: stack.phy().max_range_m(config.environment),
        };
        Self {
            protocol_stack,
            simulation_parameters,
            performance_metrics: stack.statistics(),
            detailed_transmissions: stack.log().iter().map(TransmissionRecord::from).collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, RadioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), RadioError> {
        let path = path.as_ref();
        fs::write(path, self.to_json_pretty()?)?;
        info!(
            "Wrote report with {} transmissions to {}",
            self.detailed_transmissions.len(),
            path.display()
        );
        Ok(())
    }
}
