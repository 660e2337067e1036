use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select};
use weather_core::{
    Config, Coordinates, ErrorKind, FixedLocation, OpenWeatherClient, QueryState, Source,
    Subscription, Units, WeatherStateStore,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the provider API key and preferred units.
    Configure,

    /// Show current weather and forecast for a city.
    Show {
        /// City name, e.g. "New York".
        #[arg(required = true, num_args = 1..)]
        city: Vec<String>,
    },

    /// Show current weather and forecast for a position.
    Here {
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city } => {
                let config = load_config()?;
                let store = build_store(&config)?;
                let _subs = render_slots(&store, Source::City, &config);

                store.search_city(&city.join(" ")).await;
                check_failures(&store, Source::City)
            }
            Command::Here { lat, lon } => {
                let config = load_config()?;
                let store = build_store(&config)?;
                let _subs = render_slots(&store, Source::Location, &config);

                let coords = match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(
                        Coordinates::new(lat, lon)
                            .context("Latitude and longitude must be finite")?,
                    ),
                    _ => None,
                };
                let coords = store
                    .refresh_from_location(&FixedLocation::new(coords))
                    .await
                    .context("Could not determine current location (pass --lat and --lon)")?;
                tracing::info!(%coords, "Queried weather for position");

                check_failures(&store, Source::Location)
            }
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("API key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    let units = Select::new("Units:", Units::all().to_vec())
        .prompt()
        .context("Failed to read units")?;

    config.api_key = Some(api_key.trim().to_string());
    config.units = units;
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env()?;
    config.require_api_key()?;
    Ok(config)
}

fn build_store(config: &Config) -> Result<WeatherStateStore> {
    let client = OpenWeatherClient::new(config).context("Failed to initialise HTTP client")?;
    Ok(WeatherStateStore::new(Arc::new(client)))
}

/// Print each successful result as soon as it lands. Failures are reported by
/// [`check_failures`] once all requests settled.
fn render_slots(store: &WeatherStateStore, source: Source, config: &Config) -> [Subscription; 2] {
    let current_config = config.clone();
    let current = store.subscribe_current(source, move |state| {
        if let QueryState::Success(weather) = state {
            for line in render::current_lines(weather, &current_config) {
                println!("{line}");
            }
        }
    });

    let units = config.units;
    let forecast = store.subscribe_forecast(source, move |state| {
        if let QueryState::Success(forecast) = state {
            for line in render::forecast_lines(forecast, units) {
                println!("{line}");
            }
        }
    });

    [current, forecast]
}

fn check_failures(store: &WeatherStateStore, source: Source) -> Result<()> {
    let failures: Vec<(&str, ErrorKind)> = [
        ("current weather", store.current_state(source).error()),
        ("forecast", store.forecast_state(source).error()),
    ]
    .into_iter()
    .filter_map(|(what, kind)| kind.map(|kind| (what, kind)))
    .collect();

    for (what, kind) in &failures {
        eprintln!("{}", render::failure_line(what, *kind));
    }

    match failures.first() {
        Some((_, kind)) => Err(anyhow!(*kind)),
        None => Ok(()),
    }
}
