//! DSRC (802.11p) physical layer link model
//!
//! Closed-form statistics only: two-ray ground reflection path loss,
//! log-normal shadowing, a fixed MCS table and per-modulation BER curves.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use vanet_core::types::{SPEED_OF_LIGHT_M_S, THERMAL_NOISE_DBM_PER_HZ};
use vanet_core::SimTime;

use crate::RadioError;

/// Shadowing draws are clipped to this many standard deviations.
pub const SHADOWING_CLIP_SIGMAS: f64 = 3.0;

const MIN_DISTANCE_M: f64 = 1.0;
const BER_FLOOR: f64 = 1e-8;
const BER_CEILING: f64 = 0.5;

/// OFDM timing for 10 MHz channels.
const PLCP_OVERHEAD_US: u64 = 40;
const SYMBOL_US: u64 = 8;
const SERVICE_AND_TAIL_BITS: f64 = 22.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Urban,
    Highway,
    Rural,
}

impl Environment {
    pub fn shadowing_sigma_db(&self) -> f64 {
        match self {
            Environment::Urban => 6.0,
            Environment::Highway => 4.0,
            Environment::Rural => 3.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Urban => "urban",
            Environment::Highway => "highway",
            Environment::Rural => "rural",
        }
    }
}

impl FromStr for Environment {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "urban" => Ok(Environment::Urban),
            "highway" => Ok(Environment::Highway),
            "rural" => Ok(Environment::Rural),
            _ => Err(RadioError::UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modulation {
    #[serde(rename = "BPSK")]
    Bpsk,
    #[serde(rename = "QPSK")]
    Qpsk,
    #[serde(rename = "16-QAM")]
    Qam16,
    #[serde(rename = "64-QAM")]
    Qam64,
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modulation::Bpsk => "BPSK",
            Modulation::Qpsk => "QPSK",
            Modulation::Qam16 => "16-QAM",
            Modulation::Qam64 => "64-QAM",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct McsEntry {
    pub rate_mbps: f64,
    pub modulation: Modulation,
    pub coding_rate: f64,
    pub snr_threshold_db: f64,
}

const fn mcs(rate_mbps: f64, modulation: Modulation, coding_rate: f64, snr_threshold_db: f64) -> McsEntry {
    McsEntry { rate_mbps, modulation, coding_rate, snr_threshold_db }
}

/// 802.11p rates for a 10 MHz channel, ascending.
pub const MCS_TABLE: [McsEntry; 8] = [
    mcs(3.0, Modulation::Bpsk, 0.5, 3.0),
    mcs(4.5, Modulation::Bpsk, 0.75, 5.0),
    mcs(6.0, Modulation::Qpsk, 0.5, 7.0),
    mcs(9.0, Modulation::Qpsk, 0.75, 9.0),
    mcs(12.0, Modulation::Qam16, 0.5, 12.0),
    mcs(18.0, Modulation::Qam16, 0.75, 16.0),
    mcs(24.0, Modulation::Qam64, 2.0 / 3.0, 20.0),
    mcs(27.0, Modulation::Qam64, 0.75, 22.0),
];

/// Zero-mean Gaussian draw in dB, clipped at `SHADOWING_CLIP_SIGMAS`.
pub(crate) fn clipped_gaussian_db<R: Rng + ?Sized>(sigma_db: f64, rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z.clamp(-SHADOWING_CLIP_SIGMAS, SHADOWING_CLIP_SIGMAS) * sigma_db
}

/// Looks up the MCS entry for an exact table rate.
pub fn mcs_for_rate(rate_mbps: f64) -> Result<&'static McsEntry, RadioError> {
    MCS_TABLE
        .iter()
        .find(|entry| (entry.rate_mbps - rate_mbps).abs() < 1e-9)
        .ok_or(RadioError::UnsupportedRate(rate_mbps))
}

/// Highest rate whose threshold the SNR meets, else the lowest rate.
pub fn select_data_rate(snr_db: f64) -> &'static McsEntry {
    MCS_TABLE
        .iter()
        .rev()
        .find(|entry| entry.snr_threshold_db <= snr_db)
        .unwrap_or(&MCS_TABLE[0])
}

pub fn bit_error_rate(snr_linear: f64, modulation: Modulation) -> f64 {
    let ber = match modulation {
        Modulation::Bpsk => 0.5 * (-snr_linear).exp(),
        Modulation::Qpsk => 0.5 * (-snr_linear / 2.0).exp(),
        Modulation::Qam16 => 0.375 * (-snr_linear / 10.0).exp(),
        Modulation::Qam64 => 0.333 * (-snr_linear / 42.0).exp(),
    };
    if ber.is_nan() {
        return BER_CEILING;
    }
    ber.clamp(BER_FLOOR, BER_CEILING)
}

fn per_for_entry(snr_db: f64, size_bytes: usize, entry: &McsEntry) -> f64 {
    let snr_linear = vanet_core::types::db_to_linear(snr_db);
    let coded_ber = bit_error_rate(snr_linear, entry.modulation) * (1.0 - entry.coding_rate);
    let bits = (size_bytes as f64) * 8.0;
    let per = 1.0 - (1.0 - coded_ber).powf(bits);
    per.clamp(0.0, 1.0)
}

/// Packet error rate for a frame sent at one of the table rates.
pub fn packet_error_rate(snr_db: f64, size_bytes: usize, rate_mbps: f64) -> Result<f64, RadioError> {
    let entry = mcs_for_rate(rate_mbps)?;
    Ok(per_for_entry(snr_db, size_bytes, entry))
}

/// Time on air for a frame at the given MCS.
pub fn airtime(size_bytes: usize, entry: &McsEntry) -> SimTime {
    let bits_per_symbol = entry.rate_mbps * SYMBOL_US as f64;
    let symbols = ((SERVICE_AND_TAIL_BITS + 8.0 * size_bytes as f64) / bits_per_symbol).ceil() as u64;
    SimTime::from_micros(PLCP_OVERHEAD_US + symbols * SYMBOL_US)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DsrcConfig {
    pub frequency_ghz: f64,
    pub bandwidth_hz: f64,
    pub tx_power_dbm: f64,
    pub tx_antenna_height_m: f64,
    pub rx_antenna_height_m: f64,
    pub noise_figure_db: f64,
    pub receiver_sensitivity_dbm: f64,
    pub thermal_noise_dbm_per_hz: f64,
}

impl Default for DsrcConfig {
    fn default() -> Self {
        Self {
            frequency_ghz: 5.9,
            bandwidth_hz: 10e6,
            tx_power_dbm: 23.0,
            tx_antenna_height_m: 1.5,
            rx_antenna_height_m: 1.5,
            noise_figure_db: 9.0,
            receiver_sensitivity_dbm: -85.0,
            thermal_noise_dbm_per_hz: THERMAL_NOISE_DBM_PER_HZ,
        }
    }
}

impl DsrcConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        let positive = [
            ("frequency_ghz", self.frequency_ghz),
            ("bandwidth_hz", self.bandwidth_hz),
            ("tx_antenna_height_m", self.tx_antenna_height_m),
            ("rx_antenna_height_m", self.rx_antenna_height_m),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(RadioError::InvalidConfig(format!("dsrc.{name} must be positive, got {value}")));
            }
        }
        let finite = [
            ("tx_power_dbm", self.tx_power_dbm),
            ("noise_figure_db", self.noise_figure_db),
            ("receiver_sensitivity_dbm", self.receiver_sensitivity_dbm),
            ("thermal_noise_dbm_per_hz", self.thermal_noise_dbm_per_hz),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(RadioError::InvalidConfig(format!("dsrc.{name} must be finite")));
            }
        }
        Ok(())
    }
}

/// Everything measured for one transmission attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhyLinkOutcome {
    pub snr_db: f64,
    pub rssi_dbm: f64,
    pub path_loss_db: f64,
    pub per: f64,
    pub data_rate_mbps: f64,
    pub distance_m: f64,
    pub modulation: Modulation,
    pub coding_rate: f64,
    pub frequency_ghz: f64,
}

pub struct DsrcPhy {
    config: DsrcConfig,
    wavelength_m: f64,
}

impl DsrcPhy {
    pub fn new(config: DsrcConfig) -> Result<Self, RadioError> {
        config.validate()?;
        let wavelength_m = SPEED_OF_LIGHT_M_S / (config.frequency_ghz * 1e9);
        Ok(Self { config, wavelength_m })
    }

    pub fn config(&self) -> &DsrcConfig {
        &self.config
    }

    /// Distance past which the ground-reflected ray dominates.
    pub fn crossover_distance_m(&self) -> f64 {
        4.0 * PI * self.config.tx_antenna_height_m * self.config.rx_antenna_height_m / self.wavelength_m
    }

    pub fn path_loss_db(&self, distance_m: f64) -> f64 {
        let d = distance_m.max(MIN_DISTANCE_M);
        if d < self.crossover_distance_m() {
            20.0 * (4.0 * PI * d / self.wavelength_m).log10()
        } else {
            let heights = self.config.tx_antenna_height_m * self.config.rx_antenna_height_m;
            40.0 * d.log10() - 10.0 * heights.log10()
        }
    }

    /// Zero-mean log-normal shadowing for the environment.
    pub fn shadowing_db<R: Rng + ?Sized>(&self, environment: Environment, rng: &mut R) -> f64 {
        clipped_gaussian_db(environment.shadowing_sigma_db(), rng)
    }

    pub fn noise_power_dbm(&self) -> f64 {
        self.config.thermal_noise_dbm_per_hz + 10.0 * self.config.bandwidth_hz.log10() + self.config.noise_figure_db
    }

    pub fn received_power_dbm(&self, distance_m: f64, shadowing_db: f64) -> f64 {
        self.config.tx_power_dbm - self.path_loss_db(distance_m) - shadowing_db
    }

    pub fn snr_db(&self, distance_m: f64, shadowing_db: f64) -> f64 {
        self.received_power_dbm(distance_m, shadowing_db) - self.noise_power_dbm()
    }

    /// Beyond this distance reception fails even under the most favourable
    /// clipped shadowing draw.
    pub fn max_range_m(&self, environment: Environment) -> f64 {
        let margin = SHADOWING_CLIP_SIGMAS * environment.shadowing_sigma_db();
        let max_loss = self.config.tx_power_dbm - self.config.receiver_sensitivity_dbm + margin;
        let crossover = self.crossover_distance_m();

        let free_space = self.wavelength_m / (4.0 * PI) * 10f64.powf(max_loss / 20.0);
        if free_space < crossover {
            return free_space.max(MIN_DISTANCE_M);
        }
        let heights = self.config.tx_antenna_height_m * self.config.rx_antenna_height_m;
        let two_ray = 10f64.powf((max_loss + 10.0 * heights.log10()) / 40.0);
        two_ray.max(crossover)
    }

    /// Success needs both a roll above the PER and power above sensitivity.
    pub fn reception_succeeds<R: Rng + ?Sized>(&self, per: f64, rx_power_dbm: f64, rng: &mut R) -> bool {
        // (0, 1]: PER 0 always passes the roll, PER 1 never does
        let roll = 1.0 - rng.random::<f64>();
        let decoded = roll > per;
        decoded && rx_power_dbm > self.config.receiver_sensitivity_dbm
    }

    pub fn transmit<R: Rng + ?Sized>(
        &self,
        distance_m: f64,
        size_bytes: usize,
        environment: Environment,
        rng: &mut R,
    ) -> Result<(bool, PhyLinkOutcome), RadioError> {
        if !(distance_m.is_finite() && distance_m >= 0.0) {
            return Err(RadioError::InvalidDistance(distance_m));
        }

        let shadowing = self.shadowing_db(environment, rng);
        let path_loss_db = self.path_loss_db(distance_m);
        let rssi_dbm = self.received_power_dbm(distance_m, shadowing);
        let snr_db = rssi_dbm - self.noise_power_dbm();
        let entry = select_data_rate(snr_db);
        let per = per_for_entry(snr_db, size_bytes, entry);
        let success = self.reception_succeeds(per, rssi_dbm, rng);

        let outcome = PhyLinkOutcome {
            snr_db,
            rssi_dbm,
            path_loss_db,
            per,
            data_rate_mbps: entry.rate_mbps,
            distance_m,
            modulation: entry.modulation,
            coding_rate: entry.coding_rate,
            frequency_ghz: self.config.frequency_ghz,
        };
        Ok((success, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn phy() -> DsrcPhy {
        DsrcPhy::new(DsrcConfig::default()).unwrap()
    }

    #[test]
    fn test_path_loss_non_decreasing() {
        let phy = phy();
        let mut previous = phy.path_loss_db(1.0);
        let mut d = 1.0;
        while d < 5_000.0 {
            d += 0.5;
            let loss = phy.path_loss_db(d);
            assert!(loss >= previous, "loss dropped at {d} m");
            previous = loss;
        }
    }

    #[test]
    fn test_path_loss_clamps_short_distances() {
        let phy = phy();
        assert_eq!(phy.path_loss_db(0.0), phy.path_loss_db(1.0));
        assert_eq!(phy.path_loss_db(0.3), phy.path_loss_db(1.0));
    }

    #[test]
    fn test_noise_floor() {
        // -174 dBm/Hz + 70 dB (10 MHz) + 9 dB
        assert!((phy().noise_power_dbm() - -95.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_selection_monotonic_and_bounded() {
        assert_eq!(select_data_rate(-20.0).rate_mbps, 3.0);
        assert_eq!(select_data_rate(2.99).rate_mbps, 3.0);
        assert_eq!(select_data_rate(22.0).rate_mbps, 27.0);
        assert_eq!(select_data_rate(60.0).rate_mbps, 27.0);

        let mut previous = 0.0;
        for step in 0..400 {
            let snr = -10.0 + step as f64 * 0.1;
            let rate = select_data_rate(snr).rate_mbps;
            assert!(rate >= previous);
            previous = rate;
        }
    }

    #[test]
    fn test_error_rates_stay_in_range() {
        let modulations = [Modulation::Bpsk, Modulation::Qpsk, Modulation::Qam16, Modulation::Qam64];
        for snr_db in [-30.0, -5.0, 0.0, 5.0, 12.0, 25.0, 60.0] {
            let linear = vanet_core::types::db_to_linear(snr_db);
            for modulation in modulations {
                let ber = bit_error_rate(linear, modulation);
                assert!((BER_FLOOR..=BER_CEILING).contains(&ber));
            }
            for entry in MCS_TABLE.iter() {
                for size in [0usize, 1, 100, 1500, 65_535] {
                    let per = packet_error_rate(snr_db, size, entry.rate_mbps).unwrap();
                    assert!((0.0..=1.0).contains(&per));
                }
            }
        }
    }

    #[test]
    fn test_unsupported_rate_rejected() {
        assert!(matches!(packet_error_rate(10.0, 100, 5.5), Err(RadioError::UnsupportedRate(_))));
        assert!(mcs_for_rate(24.0).is_ok());
    }

    #[test]
    fn test_unknown_environment_rejected() {
        assert_eq!("Highway".parse::<Environment>().unwrap(), Environment::Highway);
        assert!(matches!("suburban".parse::<Environment>(), Err(RadioError::UnknownEnvironment(_))));
    }

    #[test]
    fn test_negative_distance_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = phy().transmit(-3.0, 100, Environment::Urban, &mut rng);
        assert!(matches!(result, Err(RadioError::InvalidDistance(_))));
    }

    #[test]
    fn test_forced_per_decides_outcome() {
        let phy = phy();
        let strong = phy.config().receiver_sensitivity_dbm + 10.0;
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            assert!(phy.reception_succeeds(0.0, strong, &mut rng));
            assert!(!phy.reception_succeeds(1.0, strong, &mut rng));
        }
    }

    #[test]
    fn test_sensitivity_checked_independently_of_per() {
        let phy = phy();
        let weak = phy.config().receiver_sensitivity_dbm - 0.1;
        let at_floor = phy.config().receiver_sensitivity_dbm;
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        assert!(!phy.reception_succeeds(0.0, weak, &mut rng));
        assert!(!phy.reception_succeeds(0.0, at_floor, &mut rng));
    }

    #[test]
    fn test_shadowing_is_clipped() {
        let phy = phy();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for env in [Environment::Urban, Environment::Highway, Environment::Rural] {
            let bound = SHADOWING_CLIP_SIGMAS * env.shadowing_sigma_db();
            for _ in 0..2_000 {
                assert!(phy.shadowing_db(env, &mut rng).abs() <= bound);
            }
        }
    }

    #[test]
    fn test_beyond_max_range_always_fails() {
        let phy = phy();
        for env in [Environment::Urban, Environment::Highway, Environment::Rural] {
            let distance = phy.max_range_m(env) * 1.01;
            for seed in 0..100 {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let (success, outcome) = phy.transmit(distance, 200, env, &mut rng).unwrap();
                assert!(!success);
                assert!(outcome.rssi_dbm <= phy.config().receiver_sensitivity_dbm);
            }
        }
    }

    #[test]
    fn test_airtime_grows_with_size_and_shrinks_with_rate() {
        let slow = &MCS_TABLE[0];
        let fast = &MCS_TABLE[7];
        assert!(airtime(500, slow) > airtime(100, slow));
        assert!(airtime(500, fast) < airtime(500, slow));
        // 100 bytes at 3 Mbps: ceil(822 / 24) = 35 symbols
        assert_eq!(airtime(100, slow), SimTime::from_micros(40 + 35 * 8));
    }
}
