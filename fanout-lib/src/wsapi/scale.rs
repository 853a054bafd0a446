//! Conversion of imperial response values into metric or Celsius.
//!
//! Values are matched by the name of the field holding them, at any depth of
//! the response. Numeric strings are converted too and become numbers.

use serde_json::{Map, Number, Value};

use super::{DistanceUnit, TemperatureUnit};

const INCH_FIELDS: &[&str] = &[
    "precip",
    "precipMax",
    "precipAvg",
    "precipMin",
    "snowfall",
    "snowfallMax",
    "snowfallAvg",
    "snowfallMin",
];

const MPH_FIELDS: &[&str] = &[
    "windSpd",
    "windSpdMax",
    "windSpdAvg",
    "windSpdMin",
    "prevailWindSpd",
];

const FAHRENHEIT_FIELDS: &[&str] = &[
    "temp",
    "tempMax",
    "tempAvg",
    "tempMin",
    "dewPt",
    "dewPtMax",
    "dewPtAvg",
    "dewPtMin",
    "feelsLike",
    "feelsLikeMax",
    "feelsLikeAvg",
    "feelsLikeMin",
    "wetBulb",
    "wetBulbMax",
    "wetBulbAvg",
    "wetBulbMin",
];

/// Units the converted response should be expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Units {
    /// Unit of precipitation, snowfall and wind speed fields
    pub distance: DistanceUnit,
    /// Unit of temperature fields
    pub temperature: TemperatureUnit,
}

impl Units {
    /// Returns `true` if responses are left as they are
    #[must_use]
    pub fn is_imperial(&self) -> bool {
        self.distance == DistanceUnit::Imperial && self.temperature == TemperatureUnit::Fahrenheit
    }

    fn convert(self, key: &str, value: f64) -> Option<f64> {
        if self.distance == DistanceUnit::Metric {
            if INCH_FIELDS.contains(&key) {
                return Some(inches_to_centimeters(value));
            }
            if MPH_FIELDS.contains(&key) {
                return Some(mph_to_kmph(value));
            }
        }
        if self.temperature == TemperatureUnit::Celsius && FAHRENHEIT_FIELDS.contains(&key) {
            return Some(fahrenheit_to_celsius(value));
        }
        None
    }
}

/// Convert all known fields of `response` in place
pub fn scale(response: &mut Value, units: Units) {
    if units.is_imperial() {
        return;
    }
    walk(response, units);
}

fn walk(value: &mut Value, units: Units) {
    match value {
        Value::Object(map) => scale_object(map, units),
        Value::Array(items) => {
            // Array elements have no field name, only nested objects can match
            for item in items {
                walk(item, units);
            }
        }
        _ => {}
    }
}

fn scale_object(map: &mut Map<String, Value>, units: Units) {
    for (key, value) in map.iter_mut() {
        if value.is_object() || value.is_array() {
            walk(value, units);
            continue;
        }

        let converted = numeric(value)
            .and_then(|n| units.convert(key, n))
            .and_then(Number::from_f64);
        if let Some(number) = converted {
            *value = Value::Number(number);
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

fn inches_to_centimeters(inches: f64) -> f64 {
    round(inches * 2.54, 2)
}

fn mph_to_kmph(mph: f64) -> f64 {
    round(mph * 1.60934, 1)
}

fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    round((fahrenheit - 32.0) * 5.0 / 9.0, 1)
}
