use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::ErrorKind,
    model::{CityQuery, Coordinates, CurrentWeather, ForecastList},
};

pub mod openweather;

pub use openweather::OpenWeatherClient;

/// The four queries the weather provider answers.
///
/// Implementations hold no per-query state: every call issues exactly one
/// request and never retries.
#[async_trait]
pub trait WeatherClient: Send + Sync + Debug {
    async fn fetch_current_by_city(&self, query: &CityQuery) -> Result<CurrentWeather, ErrorKind>;

    async fn fetch_forecast_by_city(&self, query: &CityQuery) -> Result<ForecastList, ErrorKind>;

    async fn fetch_current_by_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<CurrentWeather, ErrorKind>;

    async fn fetch_forecast_by_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<ForecastList, ErrorKind>;
}
