//! Protocol stack orchestrator
//!
//! V2V sends run WAVE channel selection, then EDCA arbitration, then the
//! DSRC link model. V2I sends evaluate the WiMAX link and drain the payload
//! through a single-station uplink scheduler. Every V2V delay advances a
//! virtual clock owned by the stack; nothing here sleeps.

use log::{debug, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use vanet_core::types::SPEED_OF_LIGHT_M_S;
use vanet_core::{MessageKind, Position, SimTime, StationId};

use crate::mac::{AccessCategory, EdcaMac, MacOutcome};
use crate::phy::{airtime, mcs_for_rate, DsrcPhy, Environment, PhyLinkOutcome};
use crate::snapshot::{SnapshotCell, SnapshotReader};
use crate::wave::{ChannelId, WaveCoordinator};
use crate::wimax::{ServiceClass, WimaxMac, WimaxPhy};
use crate::{RadioError, StackConfig};

/// Uplink scheduler key for the stack's own fog traffic.
pub const FOG_UPLINK_STATION: StationId = 0;

/// Bound on scheduling passes per V2I send.
pub const MAX_UPLINK_PASSES: u64 = 64;

/// Outcome of one V2V send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionResult {
    pub success: bool,
    pub end_to_end_delay_ms: f64,
    pub queuing_delay_ms: f64,
    pub distance_m: f64,
    /// `None` when channel access was never granted.
    pub phy: Option<PhyLinkOutcome>,
    pub mac: MacOutcome,
    pub channel_used: ChannelId,
    pub message_type: MessageKind,
    /// Virtual time the send was issued.
    pub timestamp: SimTime,
}

/// Outcome of one V2I send to a fog node over WiMAX.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct V2iOutcome {
    pub success: bool,
    pub service_class: ServiceClass,
    pub distance_km: f64,
    pub rx_power_dbm: f64,
    pub snr_db: f64,
    pub capacity_bps: f64,
    /// Scheduling passes spent on this payload.
    pub frames: u64,
    /// Wait for the first pass, behind earlier uplink traffic.
    pub queuing_delay_ms: f64,
    pub transmission_time_ms: f64,
    pub sla_latency_ms: f64,
    pub sla_jitter_ms: f64,
    pub total_latency_ms: f64,
    pub timestamp: SimTime,
}

/// Append-only record of V2V sends in call order.
#[derive(Debug, Clone, Default)]
pub struct TransmissionLog {
    entries: Vec<TransmissionResult>,
}

impl TransmissionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: TransmissionResult) {
        self.entries.push(result);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransmissionResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TransmissionResult> {
        self.entries.last()
    }

    pub fn drain(&mut self) -> Vec<TransmissionResult> {
        std::mem::take(&mut self.entries)
    }

    /// Drops the oldest entries so that at most `keep` remain.
    pub fn truncate(&mut self, keep: usize) -> usize {
        let excess = self.entries.len().saturating_sub(keep);
        self.entries.drain(..excess);
        excess
    }
}

/// Aggregates over the current transmission logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_transmissions: usize,
    pub successful_transmissions: usize,
    pub packet_delivery_ratio: f64,
    pub mean_delay_ms: f64,
    pub std_delay_ms: f64,
    pub mean_snr_db: f64,
    pub mean_per: f64,
    pub total_collisions: u64,
    pub mean_backoff_ms: f64,
    pub v2i_transmissions: usize,
    pub v2i_delivery_ratio: f64,
    pub mean_v2i_latency_ms: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSnapshot {
    pub now: SimTime,
    pub channel_busy_ratio: f64,
    pub stats: Stats,
}

pub struct ProtocolStack {
    config: StackConfig,
    phy: DsrcPhy,
    mac: EdcaMac,
    wave: WaveCoordinator,
    wimax: WimaxPhy,
    uplink: WimaxMac,
    now: SimTime,
    log: TransmissionLog,
    v2i_log: Vec<V2iOutcome>,
    snapshots: SnapshotCell<StackSnapshot>,
}

impl ProtocolStack {
    pub fn new(config: StackConfig) -> Result<Self, RadioError> {
        config.validate()?;
        let phy = DsrcPhy::new(config.dsrc.clone())?;
        let mac = EdcaMac::new(config.edca.clone())?;
        let wave = WaveCoordinator::new(config.wave.clone())?;
        let wimax = WimaxPhy::new(config.wimax.clone())?;
        let uplink = WimaxMac::new(&config.wimax);
        let snapshots = SnapshotCell::new(StackSnapshot {
            channel_busy_ratio: mac.channel_busy_ratio(),
            ..Default::default()
        });
        Ok(Self {
            config,
            phy,
            mac,
            wave,
            wimax,
            uplink,
            now: SimTime::ZERO,
            log: TransmissionLog::new(),
            v2i_log: Vec::new(),
            snapshots,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    pub fn phy(&self) -> &DsrcPhy {
        &self.phy
    }

    pub fn mac(&self) -> &EdcaMac {
        &self.mac
    }

    pub fn mac_mut(&mut self) -> &mut EdcaMac {
        &mut self.mac
    }

    pub fn wave(&self) -> &WaveCoordinator {
        &self.wave
    }

    pub fn wimax_phy(&self) -> &WimaxPhy {
        &self.wimax
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Moves the clock forward; earlier times are ignored.
    pub fn advance_to(&mut self, at: SimTime) {
        self.now = self.now.max(at);
    }

    pub fn set_channel_busy_ratio(&mut self, ratio: f64) -> Result<(), RadioError> {
        self.mac.set_channel_busy_ratio(ratio)
    }

    pub fn update_channel_conditions(&mut self, vehicle_density: f64) -> Result<f64, RadioError> {
        self.mac.update_channel_conditions(vehicle_density)
    }

    pub fn send_v2v_message<R: Rng + ?Sized>(
        &mut self,
        sender: impl Into<Position>,
        receiver: impl Into<Position>,
        payload_len: usize,
        message_kind: MessageKind,
        access_category: AccessCategory,
        rng: &mut R,
    ) -> Result<TransmissionResult, RadioError> {
        let distance_m = sender.into().distance_to(&receiver.into());
        if !distance_m.is_finite() {
            return Err(RadioError::InvalidDistance(distance_m));
        }

        let timestamp = self.now;
        let channel_used = self.wave.select_channel(&message_kind);
        debug_assert!(
            !message_kind.is_safety() || channel_used.is_control(),
            "safety message {message_kind} routed to {channel_used}"
        );
        let queuing = self.wave.queuing_delay(&message_kind, timestamp);
        trace!("{} waits {} for {}", message_kind, queuing, channel_used);

        let (granted, mac) = self.mac.arbitrate(access_category, self.mac.config().max_retries, rng);
        let mut elapsed = queuing + SimTime::from_millis_f64(mac.channel_access_delay_ms);

        let (success, phy) = if granted {
            let (decoded, outcome) = self.phy.transmit(distance_m, payload_len, self.config.environment, rng)?;
            let entry = mcs_for_rate(outcome.data_rate_mbps)?;
            elapsed += airtime(payload_len, entry) + SimTime::from_secs_f64(distance_m / SPEED_OF_LIGHT_M_S);
            (decoded, Some(outcome))
        } else {
            (false, None)
        };

        self.now = timestamp + elapsed;

        let result = TransmissionResult {
            success,
            end_to_end_delay_ms: elapsed.as_millis_f64(),
            queuing_delay_ms: queuing.as_millis_f64(),
            distance_m,
            phy,
            mac,
            channel_used,
            message_type: message_kind,
            timestamp,
        };
        debug!(
            "V2V {} {} over {:.1} m on {}: success={} delay={:.3}ms collisions={}",
            result.message_type,
            access_category,
            distance_m,
            channel_used,
            success,
            result.end_to_end_delay_ms,
            result.mac.collision_count
        );
        self.log.push(result.clone());
        Ok(result)
    }

    /// Uplinks `payload_len` bytes to a fog node `fog_distance_km` away.
    ///
    /// The bytes join the uplink scheduler's backlog and are drained one
    /// frame per scheduling pass, behind whatever earlier sends still hold
    /// the uplink. The service class adds its SLA latency on top.
    pub fn send_v2i_message<R: Rng + ?Sized>(
        &mut self,
        fog_distance_km: f64,
        payload_len: usize,
        service_class: ServiceClass,
        rng: &mut R,
    ) -> Result<V2iOutcome, RadioError> {
        if !(fog_distance_km.is_finite() && fog_distance_km >= 0.0) {
            return Err(RadioError::InvalidDistance(fog_distance_km * 1_000.0));
        }
        let distance_m = fog_distance_km * 1_000.0;
        let link = self.wimax.evaluate(distance_m, rng)?;
        let frame_duration = self.wimax.config().frame_duration;
        let reachable = link.rx_power_dbm > self.wimax.config().rx_sensitivity_dbm;

        let timestamp = self.now;
        let mut first_pass = None;
        let mut finished_at = timestamp;
        let mut frames = 0u64;
        if reachable {
            self.uplink.enqueue(FOG_UPLINK_STATION, payload_len as u64);
            let station = [(FOG_UPLINK_STATION, distance_m)];
            while self.uplink.backlog(FOG_UPLINK_STATION) > 0 && frames < MAX_UPLINK_PASSES {
                let at = self.uplink.next_schedule_at(timestamp);
                let Some(report) = self.uplink.schedule(&self.wimax, &station, at, rng) else {
                    break;
                };
                first_pass.get_or_insert(at);
                frames += 1;
                finished_at = at + frame_duration;
                if report.congested {
                    break;
                }
            }
        }
        let success = reachable && self.uplink.backlog(FOG_UPLINK_STATION) == 0;
        // leftovers of a failed send do not hold up the next one
        self.uplink.remove_station(FOG_UPLINK_STATION);
        self.uplink.take_delivered();

        let queuing = first_pass.map_or(SimTime::ZERO, |at| at.saturating_sub(timestamp));
        let transmission_time = first_pass.map_or(SimTime::ZERO, |at| finished_at.saturating_sub(at));
        let sla = service_class.sla();

        let outcome = V2iOutcome {
            success,
            service_class,
            distance_km: fog_distance_km,
            rx_power_dbm: link.rx_power_dbm,
            snr_db: link.snr_db,
            capacity_bps: link.capacity_bps,
            frames,
            queuing_delay_ms: queuing.as_millis_f64(),
            transmission_time_ms: transmission_time.as_millis_f64(),
            sla_latency_ms: sla.latency.as_millis_f64(),
            sla_jitter_ms: sla.jitter.as_millis_f64(),
            total_latency_ms: (queuing + transmission_time + sla.latency).as_millis_f64(),
            timestamp,
        };
        debug!(
            "V2I {} over {:.2} km: success={} rx={:.1}dBm frames={} queued={:.1}ms latency={:.3}ms",
            service_class, fog_distance_km, success, link.rx_power_dbm, frames, outcome.queuing_delay_ms, outcome.total_latency_ms
        );
        self.v2i_log.push(outcome.clone());
        Ok(outcome)
    }

    pub fn statistics(&self) -> Stats {
        let total = self.log.len();
        let successes: Vec<&TransmissionResult> = self.log.iter().filter(|r| r.success).collect();
        let delays: Vec<f64> = successes.iter().map(|r| r.end_to_end_delay_ms).collect();
        let links: Vec<&PhyLinkOutcome> = successes.iter().filter_map(|r| r.phy.as_ref()).collect();
        let snrs: Vec<f64> = links.iter().map(|p| p.snr_db).collect();
        let pers: Vec<f64> = links.iter().map(|p| p.per).collect();
        let backoffs: Vec<f64> = self.log.iter().map(|r| r.mac.backoff_time_ms).collect();

        let v2i_total = self.v2i_log.len();
        let v2i_delivered: Vec<f64> =
            self.v2i_log.iter().filter(|o| o.success).map(|o| o.total_latency_ms).collect();

        Stats {
            total_transmissions: total,
            successful_transmissions: successes.len(),
            packet_delivery_ratio: if total == 0 { 0.0 } else { successes.len() as f64 / total as f64 },
            mean_delay_ms: mean(&delays),
            std_delay_ms: std_dev(&delays),
            mean_snr_db: mean(&snrs),
            mean_per: mean(&pers),
            total_collisions: self.log.iter().map(|r| r.mac.collision_count as u64).sum(),
            mean_backoff_ms: mean(&backoffs),
            v2i_transmissions: v2i_total,
            v2i_delivery_ratio: if v2i_total == 0 { 0.0 } else { v2i_delivered.len() as f64 / v2i_total as f64 },
            mean_v2i_latency_ms: mean(&v2i_delivered),
        }
    }

    pub fn log(&self) -> &TransmissionLog {
        &self.log
    }

    pub fn v2i_log(&self) -> &[V2iOutcome] {
        &self.v2i_log
    }

    /// Hands the V2V and V2I logs to the caller and starts fresh ones.
    pub fn drain_log(&mut self) -> (Vec<TransmissionResult>, Vec<V2iOutcome>) {
        (self.log.drain(), std::mem::take(&mut self.v2i_log))
    }

    /// Keeps only the newest `keep` entries of each log.
    pub fn truncate_log(&mut self, keep: usize) {
        let dropped = self.log.truncate(keep);
        let excess = self.v2i_log.len().saturating_sub(keep);
        self.v2i_log.drain(..excess);
        trace!("rotated logs: dropped {} V2V and {} V2I entries", dropped, excess);
    }

    /// Publishes the current statistics for readers on other threads.
    pub fn publish_snapshot(&self) {
        self.snapshots.publish(StackSnapshot {
            now: self.now,
            channel_busy_ratio: self.mac.channel_busy_ratio(),
            stats: self.statistics(),
        });
    }

    pub fn snapshot(&self) -> SnapshotReader<StackSnapshot> {
        self.snapshots.reader()
    }
}
