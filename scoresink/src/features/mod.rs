//! Shapes one raw transaction record into the fixed-order feature vector
//! the scoring model consumes. Sits outside the commit path; the writer
//! only ever sees already-scored events.

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde_json::{Map, Value};
use tracing::warn;

pub const CAT_COLS: [&str; 6] = ["merch", "cat_id", "gender", "one_city", "us_state", "jobs"];

pub const NUM_COLS: [&str; 8] = [
    "amount",
    "lat",
    "lon",
    "population_city",
    "merchant_lat",
    "merchant_lon",
    "hour",
    "dayofweek",
];

pub const DROP_COLS: [&str; 5] = [
    "transaction_time",
    "name_1",
    "name_2",
    "street",
    "post_code",
];

pub const UNKNOWN_CATEGORY: &str = "unknown";

pub const FEATURES_PATH: &str = "FEATURES_PATH";

const DEFAULT_FEATURES_FILE: &str = "./models/features.txt";

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Categorical(String),
    Numeric(f64),
}

/// Applies a fixed feature ordering to arbitrarily-shaped input records.
///
/// The ordering comes from a features file (one column name per line) when
/// one is present, otherwise the built-in order. Input column order never
/// matters; unknown categorical fields collapse to the sentinel category
/// and unknown numeric fields to zero.
#[derive(Debug, Clone)]
pub struct FeatureShaper {
    order: Vec<String>,
}

impl Default for FeatureShaper {
    fn default() -> Self {
        Self {
            order: default_order(),
        }
    }
}

impl FeatureShaper {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resolves the features file from FEATURES_PATH, read once at
    /// construction. A missing file silently keeps the built-in order.
    pub fn from_env() -> Self {
        let path = std::env::var(FEATURES_PATH).unwrap_or_else(|_| DEFAULT_FEATURES_FILE.to_owned());

        if Path::new(&path).is_file() {
            Self::from_file(path)
        } else {
            Default::default()
        }
    }

    /// Loads the ordering from `path`, keeping only known columns. An
    /// unreadable or empty file falls back to the built-in order.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("features file '{}' unreadable ({}), using built-in order", path.display(), e);

                return Default::default();
            }
        };

        let known = default_order();

        let order: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| known.iter().any(|column| column == line))
            .map(str::to_owned)
            .collect();

        if order.is_empty() {
            warn!("features file '{}' holds no known columns, using built-in order", path.display());

            return Default::default();
        }

        Self { order }
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn shape(&self, record: &Map<String, Value>) -> Vec<FeatureValue> {
        let (hour, dayofweek) = record
            .get("transaction_time")
            .and_then(Value::as_str)
            .and_then(parse_transaction_time)
            .map_or((None, None), |(h, d)| (Some(h), Some(d)));

        self.order
            .iter()
            .map(|column| {
                if CAT_COLS.contains(&column.as_str()) {
                    FeatureValue::Categorical(categorical(record.get(column.as_str())))
                } else {
                    let derived = match column.as_str() {
                        "hour" => hour,
                        "dayofweek" => dayofweek,
                        _ => None,
                    };

                    FeatureValue::Numeric(
                        derived.unwrap_or_else(|| numeric(record.get(column.as_str()))),
                    )
                }
            })
            .collect()
    }
}

fn default_order() -> Vec<String> {
    CAT_COLS
        .iter()
        .chain(NUM_COLS.iter())
        .map(|&column| column.to_owned())
        .collect()
}

fn categorical(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => UNKNOWN_CATEGORY.to_owned(),
    }
}

fn numeric(raw: Option<&Value>) -> f64 {
    match raw {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

// Hour of day and Monday-based weekday, matching what the model was
// trained on.
fn parse_transaction_time(raw: &str) -> Option<(f64, f64)> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()?;

    Some((
        parsed.hour() as f64,
        parsed.weekday().num_days_from_monday() as f64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> Map<String, Value> {
        match serde_json::from_str(json).unwrap() {
            Value::Object(fields) => fields,
            _ => unreachable!(),
        }
    }

    #[test]
    fn missing_fields_fall_back_to_sentinels() {
        let shaper = FeatureShaper::new();

        let shaped = shaper.shape(&record("{}"));

        assert_eq!(shaped.len(), CAT_COLS.len() + NUM_COLS.len());
        assert_eq!(
            shaped[0],
            FeatureValue::Categorical(UNKNOWN_CATEGORY.to_owned())
        );
        assert_eq!(shaped[CAT_COLS.len()], FeatureValue::Numeric(0.0));
    }

    #[test]
    fn ordering_is_independent_of_input_order() {
        let shaper = FeatureShaper::new();

        let a = shaper.shape(&record(r#"{"amount":10.0,"merch":"acme"}"#));
        let b = shaper.shape(&record(r#"{"merch":"acme","amount":10.0}"#));

        assert_eq!(a, b);
        assert_eq!(a[0], FeatureValue::Categorical("acme".to_owned()));
    }

    #[test]
    fn hour_and_dayofweek_derive_from_transaction_time() {
        let shaper = FeatureShaper::new();

        // 2024-02-05 is a Monday.
        let shaped = shaper.shape(&record(
            r#"{"transaction_time":"2024-02-05 14:30:00","amount":"42.5"}"#,
        ));

        let hour_index = shaper
            .order()
            .iter()
            .position(|column| column == "hour")
            .unwrap();
        let dow_index = shaper
            .order()
            .iter()
            .position(|column| column == "dayofweek")
            .unwrap();
        let amount_index = shaper
            .order()
            .iter()
            .position(|column| column == "amount")
            .unwrap();

        assert_eq!(shaped[hour_index], FeatureValue::Numeric(14.0));
        assert_eq!(shaped[dow_index], FeatureValue::Numeric(0.0));
        assert_eq!(shaped[amount_index], FeatureValue::Numeric(42.5));
    }

    #[test]
    fn numeric_coercion_defaults_to_zero() {
        let shaper = FeatureShaper::new();

        let shaped = shaper.shape(&record(r#"{"amount":"not a number"}"#));

        let amount_index = shaper
            .order()
            .iter()
            .position(|column| column == "amount")
            .unwrap();

        assert_eq!(shaped[amount_index], FeatureValue::Numeric(0.0));
    }

    #[test]
    fn features_file_overrides_the_order() {
        let dir = std::env::temp_dir();
        let path = dir.join("scoresink_features_test.txt");
        std::fs::write(&path, "amount\nmerch\nnot_a_feature\n").unwrap();

        let shaper = FeatureShaper::from_file(&path);

        assert_eq!(shaper.order(), ["amount".to_owned(), "merch".to_owned()]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_features_file_falls_back() {
        let dir = std::env::temp_dir();
        let path = dir.join("scoresink_features_empty.txt");
        std::fs::write(&path, "\n\n").unwrap();

        let shaper = FeatureShaper::from_file(&path);
        assert_eq!(shaper.order().len(), CAT_COLS.len() + NUM_COLS.len());

        std::fs::remove_file(&path).ok();

        let shaper = FeatureShaper::from_file("/nonexistent/features.txt");
        assert_eq!(shaper.order().len(), CAT_COLS.len() + NUM_COLS.len());
    }
}
