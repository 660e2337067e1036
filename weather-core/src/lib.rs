//! Weather data access layer.
//!
//! This crate defines:
//! - Configuration (provider URL, API key, units, icon lookup, timeout)
//! - The [`WeatherClient`] abstraction and its OpenWeather implementation
//! - [`WeatherStateStore`], which exposes the latest result of each query as observable state
//! - Shared domain models and display helpers
//!
//! It is used by `weather-cli`, but any presentation layer can drive the store.

pub mod config;
pub mod error;
pub mod format;
pub mod location;
pub mod model;
pub mod provider;
pub mod store;

pub use config::{Config, Units};
pub use error::{ErrorKind, LocationError};
pub use format::{format_temperature, icon_url};
pub use location::{FixedLocation, LocationProvider};
pub use model::{CityQuery, Coordinates, CurrentWeather, ForecastEntry, ForecastList};
pub use provider::{OpenWeatherClient, WeatherClient};
pub use store::{QueryState, RequestFuture, Slot, Source, Subscription, WeatherStateStore};
