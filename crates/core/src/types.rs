use serde::{Deserialize, Serialize};

pub type StationId = u64;
pub type Meters = f64;

pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;
pub const THERMAL_NOISE_DBM_PER_HZ: f64 = -174.0;

/// Planar position in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: Meters,
    pub y: Meters,
}

impl Position {
    pub const fn new(x: Meters, y: Meters) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> Meters {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

pub fn dbm_to_watts(dbm: f64) -> f64 {
    10f64.powf((dbm - 30.0) / 10.0)
}

pub fn watts_to_dbm(watts: f64) -> f64 {
    10.0 * watts.log10() + 30.0
}

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}
