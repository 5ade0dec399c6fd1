//! Base station and mobile station lifecycle

use std::collections::{BTreeMap, VecDeque};

use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use vanet_core::{Position, SimTime, StationId};

use crate::snapshot::{SnapshotCell, SnapshotReader};
use crate::wimax::{Delivery, FlowKpi, FrameReport, WimaxConfig, WimaxMac, WimaxPhy};
use crate::RadioError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileStation {
    pub station_id: StationId,
    pub position: Position,
}

impl MobileStation {
    pub fn new(station_id: StationId, position: Position) -> Self {
        Self { station_id, position }
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

struct Attachment {
    station: MobileStation,
    last_beacon: Option<SimTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationKpiSummary {
    pub station_id: StationId,
    pub bytes_sent: u64,
    pub bytes_dropped: u64,
    pub mean_latency_ms: f64,
    pub backlog_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseStationSnapshot {
    pub base_station_id: StationId,
    pub updated_at: SimTime,
    pub attached_stations: usize,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub utilization: f64,
    pub frames_scheduled: u64,
    pub stations: Vec<StationKpiSummary>,
}

pub struct BaseStation {
    id: StationId,
    position: Position,
    config: WimaxConfig,
    phy: WimaxPhy,
    mac: WimaxMac,
    stations: BTreeMap<StationId, Attachment>,
    tx_bytes: u64,
    rx_bytes: u64,
    tx_busy: SimTime,
    rx_busy: SimTime,
    started_at: Option<SimTime>,
    utilization: f64,
    packet_log: VecDeque<Delivery>,
    snapshot: SnapshotCell<BaseStationSnapshot>,
}

impl BaseStation {
    pub fn new(id: StationId, position: Position, config: WimaxConfig) -> Result<Self, RadioError> {
        let mac = WimaxMac::new(&config);
        let phy = WimaxPhy::new(config.clone())?;
        let snapshot = SnapshotCell::new(BaseStationSnapshot { base_station_id: id, ..Default::default() });
        Ok(Self {
            id,
            position,
            config,
            phy,
            mac,
            stations: BTreeMap::new(),
            tx_bytes: 0,
            rx_bytes: 0,
            tx_busy: SimTime::ZERO,
            rx_busy: SimTime::ZERO,
            started_at: None,
            utilization: 0.0,
            packet_log: VecDeque::new(),
            snapshot,
        })
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn attach(&mut self, station: MobileStation) {
        info!("base station {} attached station {}", self.id, station.station_id);
        self.stations.insert(station.station_id, Attachment { station, last_beacon: None });
    }

    /// Removes the station along with its backlog and KPIs.
    pub fn detach(&mut self, station_id: StationId) -> Option<MobileStation> {
        let attachment = self.stations.remove(&station_id)?;
        self.mac.remove_station(station_id);
        info!("base station {} detached station {}", self.id, station_id);
        Some(attachment.station)
    }

    pub fn is_attached(&self, station_id: StationId) -> bool {
        self.stations.contains_key(&station_id)
    }

    pub fn attached_stations(&self) -> impl Iterator<Item = &MobileStation> {
        self.stations.values().map(|a| &a.station)
    }

    pub fn update_position(&mut self, station_id: StationId, position: Position) -> Result<(), RadioError> {
        let attachment = self.stations.get_mut(&station_id).ok_or(RadioError::UnknownStation(station_id))?;
        attachment.station.set_position(position);
        Ok(())
    }

    /// Queues downlink bytes for an attached station.
    pub fn enqueue(&mut self, station_id: StationId, bytes: u64) -> Result<(), RadioError> {
        if !self.is_attached(station_id) {
            return Err(RadioError::UnknownStation(station_id));
        }
        self.mac.enqueue(station_id, bytes);
        Ok(())
    }

    pub fn kpi(&self, station_id: StationId) -> Option<&FlowKpi> {
        self.mac.kpi(station_id)
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes
    }

    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    pub fn drain_packet_log(&mut self) -> Vec<Delivery> {
        self.packet_log.drain(..).collect()
    }

    pub fn snapshot(&self) -> SnapshotReader<BaseStationSnapshot> {
        self.snapshot.reader()
    }

    /// Advances the station by one simulation tick.
    pub fn step<R: Rng + ?Sized>(&mut self, now: SimTime, rng: &mut R) -> Option<FrameReport> {
        let started_at = *self.started_at.get_or_insert(now);
        self.send_beacons(now);

        let distances: Vec<(StationId, f64)> = self
            .stations
            .values()
            .map(|a| (a.station.station_id, self.position.distance_to(&a.station.position)))
            .collect();
        let report = self.mac.schedule(&self.phy, &distances, now, rng);

        if let Some(report) = &report {
            let sent = report.sent_bytes();
            self.tx_bytes += sent;
            if sent > 0 {
                self.tx_busy += SimTime::from_secs_f64(sent as f64 * 8.0 / report.total_capacity_bps);
            }
        }

        for delivery in self.mac.take_delivered() {
            if self.packet_log.len() == self.config.packet_log_capacity {
                if let Some(evicted) = self.packet_log.pop_front() {
                    warn!("packet log full, evicting delivery to station {}", evicted.station_id);
                }
            }
            self.packet_log.push_back(delivery);
        }

        let elapsed = now.saturating_sub(started_at);
        if elapsed > SimTime::ZERO {
            let busy = (self.tx_busy + self.rx_busy).as_secs_f64();
            self.utilization = (busy / elapsed.as_secs_f64()).clamp(0.0, 1.0);
        }

        self.publish_snapshot(now);
        report
    }

    fn send_beacons(&mut self, now: SimTime) {
        let ack_airtime = SimTime::from_secs_f64(self.config.ack_bytes as f64 * 8.0 / self.config.control_rate_bps);
        for attachment in self.stations.values_mut() {
            let due = match attachment.last_beacon {
                None => true,
                Some(last) => now.saturating_sub(last) > self.config.beacon_interval,
            };
            if !due {
                continue;
            }
            let station_id = attachment.station.station_id;
            self.mac.enqueue(station_id, self.config.beacon_bytes);
            attachment.last_beacon = Some(now);

            let distance = self.position.distance_to(&attachment.station.position);
            if distance <= self.config.ack_range_m {
                self.rx_bytes += self.config.ack_bytes;
                self.rx_busy += ack_airtime;
            } else {
                debug!("station {} out of ack range at {:.0} m", station_id, distance);
            }
        }
    }

    fn publish_snapshot(&self, now: SimTime) {
        let stations = self
            .mac
            .kpis()
            .map(|(&station_id, kpi)| StationKpiSummary {
                station_id,
                bytes_sent: kpi.bytes_sent,
                bytes_dropped: kpi.bytes_dropped,
                mean_latency_ms: kpi.mean_latency_ms(),
                backlog_bytes: self.mac.backlog(station_id),
            })
            .collect();
        self.snapshot.publish(BaseStationSnapshot {
            base_station_id: self.id,
            updated_at: now,
            attached_stations: self.stations.len(),
            tx_bytes: self.tx_bytes,
            rx_bytes: self.rx_bytes,
            utilization: self.utilization,
            frames_scheduled: self.mac.frames_scheduled(),
            stations,
        });
    }
}
