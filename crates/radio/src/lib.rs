//! Wireless protocol simulation engine for V2V (DSRC/WAVE) and V2I (WiMAX) links

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vanet_core::StationId;

pub mod mac;
pub mod phy;
pub mod report;
pub mod snapshot;
pub mod stack;
pub mod wave;
pub mod wimax;

pub use mac::{AccessCategory, EdcaConfig, EdcaMac, MacOutcome};
pub use phy::{DsrcConfig, DsrcPhy, Environment, Modulation, PhyLinkOutcome};
pub use report::SimulationReport;
pub use snapshot::{SnapshotCell, SnapshotReader};
pub use stack::{ProtocolStack, StackSnapshot, Stats, TransmissionLog, TransmissionResult, V2iOutcome};
pub use wave::{ChannelId, WaveConfig, WaveCoordinator};
pub use wimax::{BaseStation, MobileStation, ServiceClass, WimaxConfig};

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Unknown service class: {0}")]
    UnknownServiceClass(String),

    #[error("Unknown access category: {0}")]
    UnknownAccessCategory(String),

    #[error("Invalid distance: {0} m")]
    InvalidDistance(f64),

    #[error("Invalid vehicle density: {0}")]
    InvalidDensity(f64),

    #[error("Channel busy ratio must lie in [0, 1], got {0}")]
    InvalidBusyRatio(f64),

    #[error("No MCS entry for {0} Mbps")]
    UnsupportedRate(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Station {0} is not attached")]
    UnknownStation(StationId),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Report I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub environment: Environment,
    pub dsrc: DsrcConfig,
    pub edca: EdcaConfig,
    pub wave: WaveConfig,
    pub wimax: WimaxConfig,
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        self.dsrc.validate()?;
        self.edca.validate()?;
        self.wave.validate()?;
        self.wimax.validate()
    }
}
