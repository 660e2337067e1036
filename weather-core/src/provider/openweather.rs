use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    config::{Config, Units},
    error::ErrorKind,
    model::{CityQuery, Coordinates, CurrentWeather, ForecastList},
};

use super::WeatherClient;

/// Client for OpenWeather-compatible `/weather` and `/forecast` endpoints.
#[derive(Clone)]
pub struct OpenWeatherClient {
    base_url: String,
    api_key: String,
    units: Units,
    http: Client,
}

impl fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Current,
    Forecast,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Current => "weather",
            Endpoint::Forecast => "forecast",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    City(&'a CityQuery),
    Position(Coordinates),
}

impl OpenWeatherClient {
    /// Build a client from configuration. A missing API key is not rejected
    /// here; the provider answers such requests with `Unauthorized`.
    pub fn new(config: &Config) -> Result<Self, ErrorKind> {
        let http = Client::builder().timeout(config.timeout()).build().map_err(|e| {
            warn!(error = %e, "Failed to build HTTP client");
            ErrorKind::Transport
        })?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            units: config.units,
            http,
        })
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    fn query_params(&self, target: Target<'_>) -> Vec<(&'static str, String)> {
        let mut params = match target {
            Target::City(query) => vec![("q", query.as_str().to_string())],
            Target::Position(coords) => vec![
                ("lat", coords.latitude().to_string()),
                ("lon", coords.longitude().to_string()),
            ],
        };
        params.push(("appid", self.api_key.clone()));
        params.push(("units", self.units.as_str().to_string()));
        params
    }

    /// Issue one GET and return the decoded JSON document.
    async fn get_json(&self, endpoint: Endpoint, target: Target<'_>) -> Result<Value, ErrorKind> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, ?target, "Sending weather request");

        let res = self
            .http
            .get(&url)
            .query(&self.query_params(target))
            .send()
            .await
            .map_err(|e| {
                let kind = ErrorKind::from_reqwest(&e);
                warn!(error = %redacted(e), ?kind, "Weather request failed");
                kind
            })?;

        let status = res.status();
        if !status.is_success() {
            // The status decides the outcome; the body is only kept for the log.
            let kind = ErrorKind::from_status(status);
            let body = res.text().await.unwrap_or_default();
            warn!(
                %status,
                ?kind,
                body = %truncate_body(&body),
                "Weather provider returned an error"
            );
            return Err(kind);
        }

        let body = res.text().await.map_err(|e| {
            let kind = ErrorKind::from_reqwest(&e);
            warn!(error = %redacted(e), ?kind, "Failed to read weather response body");
            kind
        })?;

        serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, body = %truncate_body(&body), "Weather response is not valid JSON");
            ErrorKind::ParseError
        })
    }

    async fn current(&self, target: Target<'_>) -> Result<CurrentWeather, ErrorKind> {
        let raw = self.get_json(Endpoint::Current, target).await?;
        CurrentWeather::from_value(raw).inspect_err(|_| {
            warn!("Current weather response is missing required fields");
        })
    }

    async fn forecast(&self, target: Target<'_>) -> Result<ForecastList, ErrorKind> {
        let raw = self.get_json(Endpoint::Forecast, target).await?;
        ForecastList::from_value(&raw).inspect_err(|_| {
            warn!("Forecast response is missing required fields");
        })
    }
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    #[instrument(skip(self), fields(city = %query))]
    async fn fetch_current_by_city(&self, query: &CityQuery) -> Result<CurrentWeather, ErrorKind> {
        self.current(Target::City(query)).await
    }

    #[instrument(skip(self), fields(city = %query))]
    async fn fetch_forecast_by_city(&self, query: &CityQuery) -> Result<ForecastList, ErrorKind> {
        self.forecast(Target::City(query)).await
    }

    #[instrument(skip(self), fields(coords = %coords))]
    async fn fetch_current_by_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<CurrentWeather, ErrorKind> {
        self.current(Target::Position(coords)).await
    }

    #[instrument(skip(self), fields(coords = %coords))]
    async fn fetch_forecast_by_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<ForecastList, ErrorKind> {
        self.forecast(Target::Position(coords)).await
    }
}

/// Render a transport error without its URL; the query string carries the API key.
fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
