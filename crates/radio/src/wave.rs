//! WAVE (1609.4) control/service channel time division

use std::fmt;

use serde::{Deserialize, Serialize};
use vanet_core::{MessageKind, SimTime};

use crate::RadioError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    Control,
    Service1,
    Service2,
    Service3,
    Service4,
    Service5,
    Service6,
}

impl ChannelId {
    pub fn channel_number(&self) -> u16 {
        match self {
            ChannelId::Control => 178,
            ChannelId::Service1 => 172,
            ChannelId::Service2 => 174,
            ChannelId::Service3 => 176,
            ChannelId::Service4 => 180,
            ChannelId::Service5 => 182,
            ChannelId::Service6 => 184,
        }
    }

    pub fn center_frequency_ghz(&self) -> f64 {
        5.0 + 0.005 * self.channel_number() as f64
    }

    pub fn is_control(&self) -> bool {
        matches!(self, ChannelId::Control)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_control() {
            write!(f, "CCH{}", self.channel_number())
        } else {
            write!(f, "SCH{}", self.channel_number())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub cch_interval: SimTime,
    pub sch_interval: SimTime,
    pub guard_interval: SimTime,
    pub sync_time: SimTime,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            cch_interval: SimTime::from_millis(50),
            sch_interval: SimTime::from_millis(50),
            guard_interval: SimTime::from_millis(4),
            sync_time: SimTime::ZERO,
        }
    }
}

impl WaveConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        if self.cch_interval == SimTime::ZERO || self.sch_interval == SimTime::ZERO {
            return Err(RadioError::InvalidConfig("wave intervals must be non-zero".into()));
        }
        Ok(())
    }
}

pub struct WaveCoordinator {
    config: WaveConfig,
}

impl WaveCoordinator {
    pub fn new(config: WaveConfig) -> Result<Self, RadioError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WaveConfig {
        &self.config
    }

    pub fn sync_interval(&self) -> SimTime {
        self.config.cch_interval + self.config.sch_interval
    }

    /// Offset of `now` inside the current sync interval.
    fn position(&self, now: SimTime) -> SimTime {
        let elapsed = now.saturating_sub(self.config.sync_time);
        SimTime::from_micros(elapsed.as_micros() % self.sync_interval().as_micros())
    }

    pub fn current_interval(&self, now: SimTime) -> ChannelId {
        if self.position(now) < self.config.cch_interval {
            ChannelId::Control
        } else {
            ChannelId::Service1
        }
    }

    /// Safety traffic always rides the control channel.
    pub fn select_channel(&self, message_kind: &MessageKind) -> ChannelId {
        match message_kind {
            MessageKind::Safety(_) => ChannelId::Control,
            MessageKind::NonSafety(_) => ChannelId::Service1,
        }
    }

    /// Wait until the interval the message needs next opens, guard included.
    pub fn queuing_delay(&self, message_kind: &MessageKind, now: SimTime) -> SimTime {
        let required = self.select_channel(message_kind);
        let current = self.current_interval(now);
        if required == current {
            return SimTime::ZERO;
        }
        let position = self.position(now);
        if current.is_control() {
            self.config.cch_interval - position + self.config.guard_interval
        } else {
            self.sync_interval() - position + self.config.guard_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanet_core::SafetyKind;

    fn coordinator() -> WaveCoordinator {
        WaveCoordinator::new(WaveConfig::default()).unwrap()
    }

    #[test]
    fn test_interval_alternates() {
        let wave = coordinator();
        assert_eq!(wave.current_interval(SimTime::ZERO), ChannelId::Control);
        assert_eq!(wave.current_interval(SimTime::from_millis(49)), ChannelId::Control);
        assert_eq!(wave.current_interval(SimTime::from_millis(50)), ChannelId::Service1);
        assert_eq!(wave.current_interval(SimTime::from_millis(99)), ChannelId::Service1);
        assert_eq!(wave.current_interval(SimTime::from_millis(100)), ChannelId::Control);
    }

    #[test]
    fn test_safety_kinds_always_on_control() {
        let wave = coordinator();
        let labels = ["CAM", "denm", "xBSMx", "Spat", "map_data", "Emergency", "SAFETY_alert"];
        for label in labels {
            let kind = MessageKind::classify(label);
            assert_eq!(wave.select_channel(&kind), ChannelId::Control, "{label}");
        }
        let kind = MessageKind::classify("video_stream");
        assert_eq!(wave.select_channel(&kind), ChannelId::Service1);
    }

    #[test]
    fn test_queuing_delay_zero_iff_interval_matches() {
        let wave = coordinator();
        let bound = wave.sync_interval() + wave.config().guard_interval;
        let kinds = [MessageKind::Safety(SafetyKind::Emergency), MessageKind::NonSafety("infotainment".into())];
        for ms in 0..300 {
            let now = SimTime::from_micros(ms * 1_000 + 333);
            for kind in &kinds {
                let delay = wave.queuing_delay(kind, now);
                let matches = wave.select_channel(kind) == wave.current_interval(now);
                assert_eq!(delay == SimTime::ZERO, matches, "at {now} for {kind}");
                assert!(delay <= bound);
            }
        }
    }

    #[test]
    fn test_queuing_delay_values() {
        let wave = coordinator();
        let service = MessageKind::NonSafety("toll".into());
        let safety = MessageKind::Safety(SafetyKind::Denm);
        // 10 ms into CCH: 40 ms left plus 4 ms guard
        assert_eq!(wave.queuing_delay(&service, SimTime::from_millis(10)), SimTime::from_millis(44));
        // 70 ms into the cycle: 30 ms to the next CCH plus guard
        assert_eq!(wave.queuing_delay(&safety, SimTime::from_millis(70)), SimTime::from_millis(34));
    }

    #[test]
    fn test_sync_epoch_offsets_schedule() {
        let wave = WaveCoordinator::new(WaveConfig {
            sync_time: SimTime::from_millis(25),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(wave.current_interval(SimTime::from_millis(60)), ChannelId::Control);
        assert_eq!(wave.current_interval(SimTime::from_millis(80)), ChannelId::Service1);
    }

    #[test]
    fn test_channel_numbers() {
        assert_eq!(ChannelId::Control.channel_number(), 178);
        assert!((ChannelId::Control.center_frequency_ghz() - 5.89).abs() < 1e-9);
        assert_eq!(ChannelId::Service1.to_string(), "SCH172");
    }
}
