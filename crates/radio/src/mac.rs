//! EDCA (802.11e/p) channel access arbitration
//!
//! Carrier sensing is a single Bernoulli draw against `channel_busy_ratio`;
//! contention with other vehicles is folded into that scalar rather than
//! modelled party by party.

use std::fmt;
use std::str::FromStr;

use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};
use vanet_core::SimTime;

use crate::RadioError;

pub const DEFAULT_MAX_RETRIES: u32 = 7;

/// The retry loop runs for retries `0..=max_retries`, so one attempt more
/// than the retry count.
pub const MAX_ATTEMPTS: u32 = DEFAULT_MAX_RETRIES + 1;

pub const MIN_BUSY_RATIO: f64 = 0.1;
pub const MAX_BUSY_RATIO: f64 = 0.8;

pub fn max_attempts(max_retries: u32) -> u32 {
    max_retries.saturating_add(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessCategory {
    #[serde(rename = "AC_VO")]
    Voice,
    #[serde(rename = "AC_VI")]
    Video,
    #[serde(rename = "AC_BE")]
    BestEffort,
    #[serde(rename = "AC_BK")]
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdcaParams {
    pub aifsn: u32,
    pub cw_min: u32,
    pub cw_max: u32,
    pub txop_limit: SimTime,
}

impl AccessCategory {
    /// Highest priority first.
    pub const ALL: [AccessCategory; 4] = [
        AccessCategory::Voice,
        AccessCategory::Video,
        AccessCategory::BestEffort,
        AccessCategory::Background,
    ];

    pub fn params(&self) -> EdcaParams {
        match self {
            AccessCategory::Voice => EdcaParams { aifsn: 2, cw_min: 3, cw_max: 7, txop_limit: SimTime::from_micros(1_504) },
            AccessCategory::Video => EdcaParams { aifsn: 2, cw_min: 7, cw_max: 15, txop_limit: SimTime::from_micros(3_008) },
            AccessCategory::BestEffort => EdcaParams { aifsn: 3, cw_min: 15, cw_max: 1023, txop_limit: SimTime::ZERO },
            AccessCategory::Background => EdcaParams { aifsn: 7, cw_min: 15, cw_max: 1023, txop_limit: SimTime::ZERO },
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            AccessCategory::Voice => "VO",
            AccessCategory::Video => "VI",
            AccessCategory::BestEffort => "BE",
            AccessCategory::Background => "BK",
        }
    }
}

impl FromStr for AccessCategory {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.trim_start_matches("AC_") {
            "VO" | "VOICE" => Ok(AccessCategory::Voice),
            "VI" | "VIDEO" => Ok(AccessCategory::Video),
            "BE" | "BEST_EFFORT" => Ok(AccessCategory::BestEffort),
            "BK" | "BACKGROUND" => Ok(AccessCategory::Background),
            _ => Err(RadioError::UnknownAccessCategory(s.to_string())),
        }
    }
}

impl fmt::Display for AccessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AC_{}", self.short_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdcaConfig {
    pub slot_time: SimTime,
    pub sifs_time: SimTime,
    pub max_retries: u32,
    pub initial_busy_ratio: f64,
}

impl Default for EdcaConfig {
    fn default() -> Self {
        Self {
            slot_time: SimTime::from_micros(13),
            sifs_time: SimTime::from_micros(32),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_busy_ratio: MIN_BUSY_RATIO,
        }
    }
}

impl EdcaConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        if self.slot_time == SimTime::ZERO {
            return Err(RadioError::InvalidConfig("edca.slot_time must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.initial_busy_ratio) {
            return Err(RadioError::InvalidConfig(format!(
                "edca.initial_busy_ratio must lie in [0, 1], got {}",
                self.initial_busy_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacState {
    Idle,
    WaitAifs,
    WaitBackoff,
    Granted,
    Collision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacOutcome {
    pub channel_access_delay_ms: f64,
    pub backoff_time_ms: f64,
    pub collision_count: u32,
    pub retransmission_count: u32,
    pub access_category: AccessCategory,
    pub contention_window: u32,
}

pub struct EdcaMac {
    config: EdcaConfig,
    channel_busy_ratio: f64,
}

impl EdcaMac {
    pub fn new(config: EdcaConfig) -> Result<Self, RadioError> {
        config.validate()?;
        let channel_busy_ratio = config.initial_busy_ratio;
        Ok(Self { config, channel_busy_ratio })
    }

    pub fn config(&self) -> &EdcaConfig {
        &self.config
    }

    pub fn channel_busy_ratio(&self) -> f64 {
        self.channel_busy_ratio
    }

    /// Forces the carrier-sense busy probability.
    pub fn set_channel_busy_ratio(&mut self, ratio: f64) -> Result<(), RadioError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(RadioError::InvalidBusyRatio(ratio));
        }
        self.channel_busy_ratio = ratio;
        Ok(())
    }

    /// Maps vehicle density (vehicles per km) onto a busy ratio in [0.1, 0.8].
    pub fn update_channel_conditions(&mut self, vehicle_density: f64) -> Result<f64, RadioError> {
        if !(vehicle_density.is_finite() && vehicle_density >= 0.0) {
            return Err(RadioError::InvalidDensity(vehicle_density));
        }
        self.channel_busy_ratio = MAX_BUSY_RATIO.min(MIN_BUSY_RATIO + (vehicle_density / 100.0) * 0.7);
        trace!("channel busy ratio {:.3} at density {:.1}", self.channel_busy_ratio, vehicle_density);
        Ok(self.channel_busy_ratio)
    }

    pub fn aifs(&self, access_category: AccessCategory) -> SimTime {
        self.config.sifs_time + self.config.slot_time.mul(access_category.params().aifsn as u64)
    }

    pub fn contention_window(access_category: AccessCategory, retry: u32) -> u32 {
        let params = access_category.params();
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        params.cw_min.saturating_mul(factor).min(params.cw_max)
    }

    /// Binary exponential backoff: uniform slot count in `[0, cw]`.
    pub fn backoff<R: Rng + ?Sized>(&self, access_category: AccessCategory, retry: u32, rng: &mut R) -> (SimTime, u32) {
        let cw = Self::contention_window(access_category, retry);
        let slots = rng.random_range(0..=cw);
        (self.config.slot_time.mul(slots as u64), cw)
    }

    pub fn channel_idle<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random::<f64>() >= self.channel_busy_ratio
    }

    /// Runs the access state machine until the channel is granted or every
    /// attempt (`max_retries + 1`) has collided.
    pub fn arbitrate<R: Rng + ?Sized>(
        &self,
        access_category: AccessCategory,
        max_retries: u32,
        rng: &mut R,
    ) -> (bool, MacOutcome) {
        let mut access_delay = SimTime::ZERO;
        let mut backoff_total = SimTime::ZERO;
        let mut collisions = 0u32;
        let mut contention_window = access_category.params().cw_min;
        let mut granted = false;
        let mut retry = 0u32;
        let mut state = MacState::Idle;

        while retry <= max_retries {
            state = match state {
                MacState::Idle => MacState::WaitAifs,
                MacState::WaitAifs => {
                    access_delay += self.aifs(access_category);
                    if self.channel_idle(rng) {
                        MacState::WaitBackoff
                    } else {
                        MacState::Collision
                    }
                }
                MacState::WaitBackoff => {
                    let (duration, cw) = self.backoff(access_category, retry, rng);
                    contention_window = cw;
                    access_delay += duration;
                    backoff_total += duration;
                    if self.channel_idle(rng) {
                        MacState::Granted
                    } else {
                        MacState::Collision
                    }
                }
                MacState::Collision => {
                    collisions += 1;
                    if retry == max_retries {
                        break;
                    }
                    retry += 1;
                    MacState::WaitAifs
                }
                MacState::Granted => {
                    granted = true;
                    break;
                }
            };
            trace!("{} retry {} -> {:?}", access_category, retry, state);
        }

        let outcome = MacOutcome {
            channel_access_delay_ms: access_delay.as_millis_f64(),
            backoff_time_ms: backoff_total.as_millis_f64(),
            collision_count: collisions,
            retransmission_count: retry,
            access_category,
            contention_window,
        };
        (granted, outcome)
    }
}
