//! Pure functions: quality scoring and the deterministic s2-cell fallback.
//!
//! Neither function touches IO; both are safe to call from `transform`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha1::{Digest, Sha1};

/// Closed source-trust lookup table; unknown sources fall back to 0.50.
fn source_trust(source: &str) -> f64 {
    match source.to_lowercase().as_str() {
        "opensky" => 0.95,
        "norad" => 0.99,
        "usgs" => 0.98,
        "noaa" => 0.97,
        "gbif" => 0.90,
        "inaturalist" => 0.85,
        "marinetraffic" => 0.92,
        "flightaware" => 0.93,
        "ais" => 0.90,
        "earth2" => 0.88,
        "prediction" => 0.75,
        "user_report" => 0.70,
        "crowd_source" => 0.65,
        _ => 0.50,
    }
}

fn required_fields(entity_type: &str) -> &'static [&'static str] {
    match entity_type {
        "aircraft" => &["lat", "lng", "callsign", "altitude"],
        "vessel" => &["lat", "lng", "mmsi", "ship_type"],
        "satellite" => &["lat", "lng", "norad_id", "altitude"],
        "earthquake" => &["lat", "lng", "magnitude", "depth"],
        "wildlife" => &["lat", "lng", "species"],
        "weather" => &["lat", "lng", "temperature"],
        _ => &["lat", "lng"],
    }
}

fn recency_score(timestamp: DateTime<Utc>, max_age_hours: f64) -> f64 {
    let age_hours = (Utc::now() - timestamp).num_milliseconds() as f64 / 3_600_000.0;
    if age_hours <= 0.0 {
        return 1.0;
    }
    if age_hours >= max_age_hours {
        return 0.1;
    }
    0.9 * 0.5f64.powf(age_hours / (max_age_hours / 4.0)) + 0.1
}

fn completeness_score(data: &Value, entity_type: &str) -> f64 {
    let required = required_fields(entity_type);
    if required.is_empty() {
        return 1.0;
    }
    let present = required
        .iter()
        .filter(|field| data.get(*field).is_some_and(|v| !v.is_null()))
        .count();
    present as f64 / required.len() as f64
}

/// Counts the fractional decimal digits of a float the way the original's
/// `str(x).split('.')[-1]` counts them, without a locale-dependent round-trip
/// through string formatting of the raw f64.
fn decimal_places(value: f64) -> usize {
    let s = format!("{value}");
    match s.split_once('.') {
        Some((_, frac)) => frac.len(),
        None => 0,
    }
}

fn precision_score(lat: Option<f64>, lng: Option<f64>) -> f64 {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return 0.5;
    };
    let avg_decimals = (decimal_places(lat) + decimal_places(lng)) as f64 / 2.0;
    if avg_decimals >= 6.0 {
        1.0
    } else if avg_decimals >= 4.0 {
        0.9
    } else if avg_decimals >= 2.0 {
        0.7
    } else {
        0.5
    }
}

/// Computes the overall quality score for one record: a weighted sum of
/// recency, completeness, source trust, precision, and consistency
/// (reserved at 1.0 pending historical comparison), rounded to 3 decimals.
pub fn quality_score(data: &Value, entity_type: &str, source: &str, timestamp: DateTime<Utc>) -> f64 {
    let recency = recency_score(timestamp, 24.0);
    let completeness = completeness_score(data, entity_type);
    let trust = source_trust(source);
    let lat = data.get("lat").and_then(Value::as_f64);
    let lng = data.get("lng").and_then(Value::as_f64);
    let precision = precision_score(lat, lng);
    let consistency = 1.0;

    let score = recency * 0.20 + completeness * 0.25 + trust * 0.25 + precision * 0.15 + consistency * 0.15;
    (score * 1000.0).round() / 1000.0
}

/// Deterministic 16-hex-char cell key used for spatial sharding and the
/// `entities:<cell>` channel family. This is NOT true S2 — it's a stable
/// hash of rounded coordinates, chosen for reproducibility over geometric
/// accuracy (spec.md §9's documented open question).
pub fn s2_cell(lat: f64, lng: f64, level: u32) -> String {
    let decimals = (level / 2).max(1) as usize;
    let precision_lat = round_to(lat, decimals);
    let precision_lng = round_to(lng, decimals);
    let input = format!("{precision_lat}:{precision_lng}:{level}");
    let digest = Sha1::digest(input.as_bytes());
    hex_prefix(&digest, 16)
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn quality_scoring_vector_from_scenario_six() {
        let data = json!({
            "lat": 37.123456,
            "lng": -122.654321,
            "callsign": "UAL1",
            "altitude": 10000,
        });
        let score = quality_score(&data, "aircraft", "opensky", Utc::now());
        assert_eq!(score, 0.988);
    }

    #[test]
    fn recency_is_one_at_age_zero_and_floor_at_max_age() {
        assert_eq!(recency_score(Utc::now(), 24.0), 1.0);
        let stale = Utc::now() - Duration::hours(24);
        assert_eq!(recency_score(stale, 24.0), 0.1);
    }

    #[test]
    fn precision_boundaries_match_decimal_place_table() {
        assert_eq!(precision_score(Some(1.123456), Some(2.123456)), 1.0);
        assert_eq!(precision_score(Some(1.1234), Some(2.1234)), 0.9);
        assert_eq!(precision_score(Some(1.12), Some(2.12)), 0.7);
        assert_eq!(precision_score(Some(1.0), Some(2.0)), 0.5);
        assert_eq!(precision_score(None, None), 0.5);
    }

    #[test]
    fn s2_cell_is_deterministic() {
        let a = s2_cell(37.5, -122.0, 14);
        let b = s2_cell(37.5, -122.0, 14);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn s2_cell_differs_for_different_coordinates() {
        let a = s2_cell(37.5, -122.0, 14);
        let b = s2_cell(38.5, -122.0, 14);
        assert_ne!(a, b);
    }
}
