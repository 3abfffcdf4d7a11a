//! Billing-rate statistics for one region's charging points.
//!
//! This is the data the presentation layer draws: station count, how many
//! distinct billing rates there are, and a per-rate distribution whose
//! labels are cut to a fixed legend width.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::ChargingPoint;
use crate::utils::truncate_label;

/// Legend labels keep this many characters before the ellipsis.
pub const RATE_LABEL_MAX_CHARS: usize = 15;

/// One slice of the rate distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateShare {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateStats {
    pub total_stations: usize,
    pub distinct_rates: usize,
    /// Largest share first; ties in label order.
    pub distribution: Vec<RateShare>,
}

impl RateStats {
    /// Fraction of records carrying `share`, in `0.0..=1.0`.
    pub fn fraction(&self, share: &RateShare) -> f64 {
        let rated: usize = self.distribution.iter().map(|s| s.count).sum();
        if rated == 0 {
            0.0
        } else {
            share.count as f64 / rated as f64
        }
    }
}

/// Outcome of summarizing a region.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionSummary {
    /// No records at all.
    NoData,
    /// Records exist but none carries a station id, or none carries a rate.
    Unparseable,
    Stats(RateStats),
}

impl RegionSummary {
    pub fn from_records(records: &[ChargingPoint]) -> Self {
        if records.is_empty() {
            return RegionSummary::NoData;
        }
        let has_station = records.iter().any(|r| r.station_id.is_some());
        let has_rate = records.iter().any(|r| r.charging_rate.is_some());
        if !has_station || !has_rate {
            return RegionSummary::Unparseable;
        }

        let rates: Vec<&str> = records
            .iter()
            .filter_map(|r| r.charging_rate.as_deref())
            .collect();
        let distinct_rates = rates.iter().collect::<HashSet<_>>().len();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for rate in rates {
            *counts
                .entry(truncate_label(rate, RATE_LABEL_MAX_CHARS))
                .or_default() += 1;
        }
        let mut distribution: Vec<RateShare> = counts
            .into_iter()
            .map(|(label, count)| RateShare { label, count })
            .collect();
        distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

        RegionSummary::Stats(RateStats {
            total_stations: records.len(),
            distinct_rates,
            distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(station: Option<&str>, rate: Option<&str>) -> ChargingPoint {
        ChargingPoint {
            station_id: station.map(str::to_string),
            charging_rate: rate.map(str::to_string),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_empty_is_no_data() {
        assert_eq!(RegionSummary::from_records(&[]), RegionSummary::NoData);
    }

    #[test]
    fn test_missing_fields_is_unparseable() {
        let no_rates = [point(Some("S1"), None), point(Some("S2"), None)];
        assert_eq!(RegionSummary::from_records(&no_rates), RegionSummary::Unparseable);

        let no_stations = [point(None, Some("免費"))];
        assert_eq!(RegionSummary::from_records(&no_stations), RegionSummary::Unparseable);
    }

    #[test]
    fn test_rate_distribution() {
        let long_rate = "每度10元，停車費另計，超過兩小時加收";
        let records = [
            point(Some("S1"), Some("免費")),
            point(Some("S2"), Some(long_rate)),
            point(Some("S3"), Some("免費")),
            point(Some("S4"), None),
            point(Some("S5"), Some("每度8元")),
        ];

        let RegionSummary::Stats(stats) = RegionSummary::from_records(&records) else {
            panic!("expected stats");
        };
        assert_eq!(stats.total_stations, 5);
        assert_eq!(stats.distinct_rates, 3);
        assert_eq!(
            stats.distribution[0],
            RateShare { label: "免費".to_string(), count: 2 }
        );
        assert!(stats
            .distribution
            .iter()
            .any(|s| s.label == "每度10元，停車費另計，超過兩..."));
        assert!((stats.fraction(&stats.distribution[0]) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_serializes_with_status_tag() {
        let json = serde_json::to_value(RegionSummary::NoData).expect("serialize");
        assert_eq!(json, serde_json::json!({"status": "no_data"}));
    }
}
