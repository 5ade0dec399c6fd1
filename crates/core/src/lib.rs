//! Core value types for the VANET protocol simulator

pub mod message;
pub mod time;
pub mod types;

pub use message::{MessageKind, SafetyKind};
pub use time::SimTime;
pub use types::{Meters, Position, StationId};
