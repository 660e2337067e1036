use chrono::Local;
use weather_core::{
    Config, CurrentWeather, ErrorKind, ForecastList, Units, format_temperature, icon_url,
};

pub fn current_lines(weather: &CurrentWeather, config: &Config) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {}",
        weather.location_name,
        format_temperature(weather.temperature, config.units)
    )];
    if let Some(description) = &weather.description {
        lines.push(format!("  {description}"));
    }
    lines.push(format!("  icon: {}", icon_url(config, &weather.icon)));
    lines
}

pub fn forecast_lines(forecast: &ForecastList, units: Units) -> Vec<String> {
    if forecast.is_empty() {
        return vec![format!("No forecast available for {}", forecast.location_name)];
    }

    let mut lines = vec![format!("Forecast for {}:", forecast.location_name)];
    lines.extend(forecast.entries.iter().map(|entry| {
        format!(
            "  {}  {:>6}  {}",
            entry.time.with_timezone(&Local).format("%a %d %H:%M"),
            format_temperature(entry.temperature, units),
            entry.icon,
        )
    }));
    lines
}

pub fn failure_line(what: &str, kind: ErrorKind) -> String {
    let hint = match kind {
        ErrorKind::InvalidInput => "enter a city name or valid coordinates",
        ErrorKind::NotFound => "check the spelling of the location",
        ErrorKind::Unauthorized => "run `weather configure` to update the API key",
        ErrorKind::RateLimited => "wait a moment before searching again",
        ErrorKind::Transport => "check your network connection",
        ErrorKind::ParseError => "the provider sent an unexpected response",
    };
    format!("Failed to load {what}: {kind} ({hint})")
}
