use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ErrorKind;

/// A city name, trimmed and known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CityQuery(String);

impl CityQuery {
    pub fn new(raw: &str) -> Result<Self, ErrorKind> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ErrorKind::InvalidInput);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latitude/longitude pair as delivered by a location provider.
///
/// Only non-finite values are rejected; the geodetic range is left to the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ErrorKind> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(ErrorKind::InvalidInput);
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

/// Current conditions for one location.
///
/// `temperature` is in whatever unit the request asked the provider for
/// (see [`Units`](crate::config::Units)). The full provider document is kept in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub location_name: String,
    pub temperature: f64,
    pub icon: String,
    pub description: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub raw: Value,
}

impl CurrentWeather {
    pub fn from_json(body: &str) -> Result<Self, ErrorKind> {
        let raw: Value = serde_json::from_str(body)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self, ErrorKind> {
        let parsed = OwCurrentResponse::deserialize(&raw)?;
        let condition = first_condition(parsed.weather)?;

        Ok(Self {
            location_name: parsed.name,
            temperature: parsed.main.temp,
            icon: condition.icon,
            description: condition.description,
            observed_at: parsed.dt.and_then(unix_to_utc),
            raw,
        })
    }
}

/// One time-stamped snapshot of a forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub icon: String,
    pub description: Option<String>,
    pub raw: Value,
}

impl ForecastEntry {
    fn from_value(raw: &Value) -> Result<Self, ErrorKind> {
        let parsed = OwForecastEntry::deserialize(raw)?;
        let time = unix_to_utc(parsed.dt).ok_or(ErrorKind::ParseError)?;
        let condition = first_condition(parsed.weather)?;

        Ok(Self {
            time,
            temperature: parsed.main.temp,
            icon: condition.icon,
            description: condition.description,
            raw: raw.clone(),
        })
    }
}

/// Forecast entries in the order the provider returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastList {
    pub location_name: String,
    pub entries: Vec<ForecastEntry>,
}

impl ForecastList {
    pub fn from_json(body: &str) -> Result<Self, ErrorKind> {
        let raw: Value = serde_json::from_str(body)?;
        Self::from_value(&raw)
    }

    pub fn from_value(raw: &Value) -> Result<Self, ErrorKind> {
        let city = raw
            .get("city")
            .map(OwCity::deserialize)
            .transpose()?
            .ok_or(ErrorKind::ParseError)?;

        let entries = raw
            .get("list")
            .and_then(Value::as_array)
            .ok_or(ErrorKind::ParseError)?
            .iter()
            .map(ForecastEntry::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { location_name: city.name, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwCondition {
    icon: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    dt: Option<i64>,
    main: OwMain,
    weather: Vec<OwCondition>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwCondition>,
}

fn first_condition(conditions: Vec<OwCondition>) -> Result<OwCondition, ErrorKind> {
    conditions.into_iter().next().ok_or(ErrorKind::ParseError)
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}
