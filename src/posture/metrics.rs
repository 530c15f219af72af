use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::keys;

/// Per-session posture summary, recomputed from the counter hash on every
/// posed frame. Field names on the wire are the ones the metrics router reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureMetrics {
    #[serde(rename = "porcentaje_correcta")]
    pub pct_good: f64,
    #[serde(rename = "porcentaje_incorrecta")]
    pub pct_bad: f64,
    #[serde(rename = "transiciones_malas")]
    pub transitions: u64,
    #[serde(rename = "tiempo_sentado")]
    pub seated_time: f64,
    #[serde(rename = "tiempo_parado")]
    pub standing_time: f64,
    #[serde(rename = "alertas_enviadas")]
    pub alerts_sent: u64,
}

fn int_field(counters: &HashMap<String, String>, field: &str) -> u64 {
    counters
        .get(field)
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0)
}

fn float_field(counters: &HashMap<String, String>, field: &str) -> f64 {
    counters
        .get(field)
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl PostureMetrics {
    /// Missing or unparsable fields count as zero.
    pub fn from_counters(counters: &HashMap<String, String>) -> Self {
        let good = int_field(counters, keys::GOOD_FRAMES);
        let bad = int_field(counters, keys::BAD_FRAMES);
        let total = (good + bad).max(1) as f64;

        Self {
            pct_good: round_to(good as f64 / total * 100.0, 1),
            pct_bad: round_to(bad as f64 / total * 100.0, 1),
            transitions: int_field(counters, keys::BAD_TRANSITIONS),
            seated_time: float_field(counters, keys::SEATED_TIME),
            standing_time: float_field(counters, keys::STANDING_TIME),
            alerts_sent: int_field(counters, keys::ALERT_COUNT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn percentages_round_to_one_decimal() {
        let metrics = PostureMetrics::from_counters(&counters(&[
            ("good_frames", "2"),
            ("bad_frames", "1"),
            ("transiciones_malas", "1"),
            ("alert_count", "0"),
            ("tiempo_sentado", "0.2"),
        ]));
        assert_eq!(metrics.pct_good, 66.7);
        assert_eq!(metrics.pct_bad, 33.3);
        assert_eq!(metrics.transitions, 1);
        assert_eq!(metrics.seated_time, 0.2);
        assert_eq!(metrics.standing_time, 0.0);
    }

    #[test]
    fn empty_counters_yield_zeroes() {
        let metrics = PostureMetrics::from_counters(&HashMap::new());
        assert_eq!(metrics.pct_good, 0.0);
        assert_eq!(metrics.pct_bad, 0.0);
        assert_eq!(metrics.alerts_sent, 0);
    }

    #[test]
    fn serializes_with_router_field_names() {
        let metrics = PostureMetrics::from_counters(&counters(&[("alert_count", "3")]));
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["alertas_enviadas"], 3);
        assert!(json.get("porcentaje_correcta").is_some());
        assert!(json.get("tiempo_parado").is_some());
    }
}
