//! Data models for charging-point data.
//!
//! - `Region`, `RegionSet`: the fixed set of cities with a data endpoint
//! - `ChargingPoint`, `ChargingPointsResponse`: records returned by the API

pub mod charging_point;
pub mod region;

pub use charging_point::{ChargingPoint, ChargingPointsResponse};
pub use region::{default_regions, Region, RegionSet};
