//! Proportional-fair frame scheduler for one base station

use std::collections::BTreeMap;

use log::{debug, trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use vanet_core::{SimTime, StationId};

use crate::wimax::{WimaxConfig, WimaxPhy};

/// Aggregate capacity below this counts as no capacity at all.
pub const CAPACITY_EPSILON_BPS: f64 = 1.0;

/// Bytes one frame of `frame_duration` carries at the given aggregate capacity.
pub fn frame_budget_bytes(total_capacity_bps: f64, frame_duration: SimTime) -> u64 {
    (total_capacity_bps * frame_duration.as_secs_f64() / 8.0).floor() as u64
}

/// Per-station delivery counters, alive while the station is attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowKpi {
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
    pub latency_samples: Vec<SimTime>,
    last_service: SimTime,
}

impl FlowKpi {
    fn new(since: SimTime) -> Self {
        Self { last_service: since, ..Default::default() }
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.latency_samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self.latency_samples.iter().map(SimTime::as_millis_f64).sum();
        total / self.latency_samples.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationAllocation {
    pub station_id: StationId,
    pub capacity_bps: f64,
    pub allocated_bytes: u64,
    pub sent_bytes: u64,
    pub dropped_bytes: u64,
    pub backlog_bytes: u64,
}

/// What one scheduling pass did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub at: SimTime,
    pub total_capacity_bps: f64,
    pub frame_bytes: u64,
    pub congested: bool,
    pub allocations: Vec<StationAllocation>,
}

impl FrameReport {
    pub fn sent_bytes(&self) -> u64 {
        self.allocations.iter().map(|a| a.sent_bytes).sum()
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.allocations.iter().map(|a| a.dropped_bytes).sum()
    }

    pub fn allocation(&self, station_id: StationId) -> Option<&StationAllocation> {
        self.allocations.iter().find(|a| a.station_id == station_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub station_id: StationId,
    pub bytes: u64,
    pub delivered_at: SimTime,
    pub latency: SimTime,
}

/// Byte backlogs and KPIs keyed by station. Ordered maps keep the per-station
/// RNG draws in a stable order, so a seed reproduces a run exactly.
pub struct WimaxMac {
    frame_duration: SimTime,
    scheduling_granularity: SimTime,
    target_reliability: f64,
    buffers: BTreeMap<StationId, u64>,
    kpis: BTreeMap<StationId, FlowKpi>,
    delivered: Vec<Delivery>,
    last_schedule: Option<SimTime>,
    clock: SimTime,
    frames_scheduled: u64,
}

impl WimaxMac {
    pub fn new(config: &WimaxConfig) -> Self {
        Self {
            frame_duration: config.frame_duration,
            scheduling_granularity: config.scheduling_granularity,
            target_reliability: config.target_reliability,
            buffers: BTreeMap::new(),
            kpis: BTreeMap::new(),
            delivered: Vec::new(),
            last_schedule: None,
            clock: SimTime::ZERO,
            frames_scheduled: 0,
        }
    }

    pub fn enqueue(&mut self, station_id: StationId, bytes: u64) {
        *self.buffers.entry(station_id).or_insert(0) += bytes;
        let since = self.clock;
        self.kpis.entry(station_id).or_insert_with(|| FlowKpi::new(since));
        trace!("station {} backlog +{} bytes", station_id, bytes);
    }

    pub fn backlog(&self, station_id: StationId) -> u64 {
        self.buffers.get(&station_id).copied().unwrap_or(0)
    }

    pub fn total_backlog(&self) -> u64 {
        self.buffers.values().sum()
    }

    pub fn kpi(&self, station_id: StationId) -> Option<&FlowKpi> {
        self.kpis.get(&station_id)
    }

    pub fn kpis(&self) -> impl Iterator<Item = (&StationId, &FlowKpi)> {
        self.kpis.iter()
    }

    pub fn frames_scheduled(&self) -> u64 {
        self.frames_scheduled
    }

    /// Earliest time at or after `now` that `schedule` will run a pass.
    pub fn next_schedule_at(&self, now: SimTime) -> SimTime {
        match self.last_schedule {
            Some(last) => now.max(last + self.scheduling_granularity),
            None => now,
        }
    }

    /// Forgets a station's backlog and KPIs.
    pub fn remove_station(&mut self, station_id: StationId) -> Option<FlowKpi> {
        self.buffers.remove(&station_id);
        self.kpis.remove(&station_id)
    }

    pub fn take_delivered(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.delivered)
    }

    /// One scheduling pass, at most once per scheduling granularity.
    ///
    /// Each station gets `frame_bytes * capacity / total_capacity` of the
    /// frame. With no usable capacity anywhere, a `1 - target_reliability`
    /// fraction of every backlog is dropped instead.
    pub fn schedule<R: Rng + ?Sized>(
        &mut self,
        phy: &WimaxPhy,
        station_distances: &[(StationId, f64)],
        now: SimTime,
        rng: &mut R,
    ) -> Option<FrameReport> {
        if let Some(last) = self.last_schedule {
            if now.saturating_sub(last) < self.scheduling_granularity {
                return None;
            }
        }
        self.last_schedule = Some(now);
        self.clock = now;
        self.frames_scheduled += 1;

        let capacities: Vec<(StationId, f64)> = station_distances
            .iter()
            .map(|&(id, distance)| (id, phy.capacity_bps(phy.snr_db(distance, rng))))
            .collect();
        let total_capacity_bps: f64 = capacities.iter().map(|(_, c)| c).sum();

        let report = if total_capacity_bps < CAPACITY_EPSILON_BPS {
            self.drop_for_congestion(&capacities, now, total_capacity_bps)
        } else {
            self.allocate_frame(&capacities, now, total_capacity_bps)
        };

        debug!(
            "frame {} at {}: capacity {:.0} bps, budget {} bytes, sent {}, dropped {}",
            self.frames_scheduled,
            now,
            report.total_capacity_bps,
            report.frame_bytes,
            report.sent_bytes(),
            report.dropped_bytes()
        );
        Some(report)
    }

    fn drop_for_congestion(&mut self, capacities: &[(StationId, f64)], now: SimTime, total_capacity_bps: f64) -> FrameReport {
        let loss_fraction = 1.0 - self.target_reliability;
        let mut allocations = Vec::with_capacity(capacities.len());

        for &(station_id, capacity_bps) in capacities {
            let buffer = self.buffers.entry(station_id).or_insert(0);
            let dropped = (*buffer as f64 * loss_fraction).floor() as u64;
            *buffer -= dropped;
            if dropped > 0 {
                if let Some(kpi) = self.kpis.get_mut(&station_id) {
                    kpi.bytes_dropped += dropped;
                }
                warn!("no link capacity: dropped {} bytes for station {}", dropped, station_id);
            }
            allocations.push(StationAllocation {
                station_id,
                capacity_bps,
                allocated_bytes: 0,
                sent_bytes: 0,
                dropped_bytes: dropped,
                backlog_bytes: *buffer,
            });
        }

        FrameReport { at: now, total_capacity_bps, frame_bytes: 0, congested: true, allocations }
    }

    fn allocate_frame(&mut self, capacities: &[(StationId, f64)], now: SimTime, total_capacity_bps: f64) -> FrameReport {
        let frame_bytes = frame_budget_bytes(total_capacity_bps, self.frame_duration);
        let mut remaining = frame_bytes;
        let mut allocations = Vec::with_capacity(capacities.len());

        for &(station_id, capacity_bps) in capacities {
            let share = (frame_bytes as f64 * (capacity_bps / total_capacity_bps)).floor() as u64;
            let allocated_bytes = share.min(remaining);
            remaining -= allocated_bytes;

            let buffer = self.buffers.entry(station_id).or_insert(0);
            let sent_bytes = (*buffer).min(allocated_bytes);
            *buffer -= sent_bytes;
            let backlog_bytes = *buffer;

            if sent_bytes > 0 {
                if let Some(kpi) = self.kpis.get_mut(&station_id) {
                    let latency = now.saturating_sub(kpi.last_service);
                    kpi.bytes_sent += sent_bytes;
                    kpi.latency_samples.push(latency);
                    kpi.last_service = now;
                    self.delivered.push(Delivery { station_id, bytes: sent_bytes, delivered_at: now, latency });
                }
            }

            allocations.push(StationAllocation {
                station_id,
                capacity_bps,
                allocated_bytes,
                sent_bytes,
                dropped_bytes: 0,
                backlog_bytes,
            });
        }

        let report = FrameReport { at: now, total_capacity_bps, frame_bytes, congested: false, allocations };
        debug_assert!(report.sent_bytes() <= frame_bytes, "frame over budget");
        report
    }
}
