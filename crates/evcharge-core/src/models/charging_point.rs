use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const STATION_ID: &str = "StationID";
const CHARGING_RATE: &str = "ChargingRate";
const CHARGING_POINTS: &str = "ChargingPoints";

/// One charging point as returned by the data endpoint.
///
/// Only the station identifier and billing-rate descriptor are read by this
/// crate. Every other field is kept verbatim in `extra`, in API order. A
/// known field holding something other than a string is left in `extra`
/// too, so one odd row never spoils the rest of the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct ChargingPoint {
    #[serde(rename = "StationID", skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(rename = "ChargingRate", skip_serializing_if = "Option::is_none")]
    pub charging_rate: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Take `key` out of `fields` only when it holds a string.
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(_)) => match fields.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

impl From<Map<String, Value>> for ChargingPoint {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            station_id: take_string(&mut fields, STATION_ID),
            charging_rate: take_string(&mut fields, CHARGING_RATE),
            extra: fields,
        }
    }
}

impl ChargingPoint {
    pub fn station_display(&self) -> &str {
        self.station_id.as_deref().unwrap_or("(unknown station)")
    }

    pub fn rate_display(&self) -> &str {
        self.charging_rate.as_deref().unwrap_or("(no rate)")
    }
}

/// Body of a region data response.
///
/// The body must be a JSON object. `ChargingPoints` is optional: a body
/// without the list (or with `null`) is valid and means "no data for this
/// region". Each row must itself be an object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ChargingPointsResponse {
    pub charging_points: Option<Vec<ChargingPoint>>,
}

impl TryFrom<Map<String, Value>> for ChargingPointsResponse {
    type Error = String;

    fn try_from(mut body: Map<String, Value>) -> Result<Self, Self::Error> {
        let rows = match body.remove(CHARGING_POINTS) {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                return Err(format!("{} is not a list: {}", CHARGING_POINTS, other));
            }
        };

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| match row {
                Value::Object(fields) => Ok(ChargingPoint::from(fields)),
                other => Err(format!("{} entry {} is not an object: {}", CHARGING_POINTS, i, other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            charging_points: Some(records),
        })
    }
}

impl ChargingPointsResponse {
    /// True when the body carried no `ChargingPoints` field at all.
    pub fn is_missing_list(&self) -> bool {
        self.charging_points.is_none()
    }

    pub fn into_records(self) -> Vec<ChargingPoint> {
        self.charging_points.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_charging_points_response() {
        let json = r#"{"UpdateTime":"2024-05-01T10:00:00+08:00","ChargingPoints":[{"StationID":"TPE001","ChargingRate":"每度10元","PointID":"P1","Power":{"kW":60}},{"StationID":"TPE002","ChargingRate":"免費"}]}"#;

        let resp: ChargingPointsResponse =
            serde_json::from_str(json).expect("Failed to parse charging points test JSON");
        assert!(!resp.is_missing_list());

        let records = resp.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].station_id.as_deref(), Some("TPE001"));
        assert_eq!(records[0].charging_rate.as_deref(), Some("每度10元"));
        assert_eq!(records[0].extra.get("PointID"), Some(&Value::from("P1")));
        assert!(records[0].extra.contains_key("Power"));
        assert!(records[1].extra.is_empty());
    }

    #[test]
    fn test_parse_response_without_list() {
        let resp: ChargingPointsResponse =
            serde_json::from_str(r#"{"UpdateTime":"2024-05-01T10:00:00+08:00"}"#)
                .expect("Failed to parse response without list");
        assert!(resp.is_missing_list());
        assert!(resp.into_records().is_empty());
    }

    #[test]
    fn test_record_missing_known_fields() {
        let point: ChargingPoint = serde_json::from_str(r#"{"PointID":"P9"}"#)
            .expect("Failed to parse sparse record");
        assert_eq!(point.station_display(), "(unknown station)");
        assert_eq!(point.rate_display(), "(no rate)");

        // Pass-through fields survive a round trip untouched
        let out = serde_json::to_value(&point).expect("Failed to serialize record");
        assert_eq!(out, serde_json::json!({"PointID": "P9"}));
    }

    #[test]
    fn test_non_string_known_field_kept_in_extra() {
        let json = r#"{"ChargingPoints":[{"StationID":"TPE001","ChargingRate":"免費"},{"StationID":1001,"ChargingRate":null,"PointID":"P2"}]}"#;
        let records = serde_json::from_str::<ChargingPointsResponse>(json)
            .expect("odd row should not fail the response")
            .into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].station_id.as_deref(), Some("TPE001"));

        let odd = &records[1];
        assert_eq!(odd.station_id, None);
        assert_eq!(odd.charging_rate, None);
        assert_eq!(odd.station_display(), "(unknown station)");
        assert_eq!(odd.extra.get("StationID"), Some(&Value::from(1001)));

        // The row serializes back the way it arrived
        let out = serde_json::to_value(odd).expect("Failed to serialize record");
        assert_eq!(
            out,
            serde_json::json!({"StationID": 1001, "ChargingRate": null, "PointID": "P2"})
        );
    }

    #[test]
    fn test_null_list_is_missing() {
        let resp: ChargingPointsResponse = serde_json::from_str(r#"{"ChargingPoints":null}"#)
            .expect("Failed to parse null list");
        assert!(resp.is_missing_list());
    }

    #[test]
    fn test_body_must_be_an_object() {
        assert!(serde_json::from_str::<ChargingPointsResponse>("[]").is_err());
        assert!(serde_json::from_str::<ChargingPointsResponse>(r#"[{"StationID":"S1"}]"#).is_err());
        assert!(serde_json::from_str::<ChargingPointsResponse>(r#"{"ChargingPoints":"none"}"#).is_err());
        assert!(serde_json::from_str::<ChargingPointsResponse>(r#"{"ChargingPoints":[1, 2]}"#).is_err());
    }
}
