use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Kelvin.
    Standard,
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Value of the provider's `units` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Units::Standard => "K",
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Metric, Units::Imperial, Units::Standard]
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "standard" | "kelvin" => Ok(Units::Standard),
            "metric" | "celsius" => Ok(Units::Metric),
            "imperial" | "fahrenheit" => Ok(Units::Imperial),
            _ => Err(anyhow!(
                "Unknown units '{value}'. Supported units: metric, imperial, standard."
            )),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// units = "metric"
/// timeout_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the provider API; `/weather` and `/forecast` are appended.
    pub api_base_url: String,

    pub api_key: Option<String>,

    /// Prefix for condition icon images.
    pub icon_base_url: String,

    /// Suffix selecting the icon size, e.g. `@4x.png`.
    pub icon_size: String,

    pub units: Units,

    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            api_key: None,
            icon_base_url: "https://openweathermap.org/img/wn/".to_string(),
            icon_size: "@4x.png".to_string(),
            units: Units::Metric,
            timeout_secs: 10,
        }
    }
}

impl Config {
    pub const ENV_API_KEY: &'static str = "WEATHER_API_KEY";
    pub const ENV_API_URL: &'static str = "WEATHER_API_URL";
    pub const ENV_TIMEOUT_SECS: &'static str = "WEATHER_TIMEOUT_SECS";

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override file values with `WEATHER_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup(Self::ENV_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = lookup(Self::ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(secs) = lookup(Self::ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs.trim().parse().with_context(|| {
                format!(
                    "{} must be a whole number of seconds, got '{secs}'",
                    Self::ENV_TIMEOUT_SECS
                )
            })?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the API key or a hint on how to configure one.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
            anyhow!(
                "No API key configured.\n\
                 Hint: run `weather configure` or set {}.",
                Self::ENV_API_KEY
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.api_base_url, "https://api.openweathermap.org/data/2.5");
        assert_eq!(cfg.units, Units::Metric);
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn require_api_key_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.require_api_key().unwrap_err();

        assert!(err.to_string().contains("No API key configured"));
        assert!(err.to_string().contains("weather configure"));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = Config::from_toml("api_key = \"KEY\"\nunits = \"imperial\"\n")
            .expect("partial config should parse");

        assert_eq!(cfg.require_api_key().expect("key is set"), "KEY");
        assert_eq!(cfg.units, Units::Imperial);
        assert_eq!(cfg.icon_size, "@4x.png");
    }

    #[test]
    fn toml_roundtrip_keeps_values() {
        let cfg = Config {
            api_key: Some("KEY".into()),
            timeout_secs: 3,
            ..Config::default()
        };
        let text = toml::to_string_pretty(&cfg).expect("serializes");
        assert_eq!(Config::from_toml(&text).expect("parses"), cfg);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config { api_key: Some("FILE".into()), ..Config::default() };
        cfg.apply_overrides(env(&[
            ("WEATHER_API_KEY", "ENV"),
            ("WEATHER_API_URL", "http://localhost:9999"),
            ("WEATHER_TIMEOUT_SECS", "2"),
        ]))
        .expect("overrides are valid");

        assert_eq!(cfg.api_key.as_deref(), Some("ENV"));
        assert_eq!(cfg.api_base_url, "http://localhost:9999");
        assert_eq!(cfg.timeout_secs, 2);
    }

    #[test]
    fn blank_env_key_is_ignored() {
        let mut cfg = Config { api_key: Some("FILE".into()), ..Config::default() };
        cfg.apply_overrides(env(&[("WEATHER_API_KEY", "  ")])).expect("valid");
        assert_eq!(cfg.api_key.as_deref(), Some("FILE"));
    }

    #[test]
    fn bad_timeout_is_reported() {
        let mut cfg = Config::default();
        let err = cfg.apply_overrides(env(&[("WEATHER_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("WEATHER_TIMEOUT_SECS"));
    }

    #[test]
    fn units_parse_and_roundtrip() {
        for units in Units::all() {
            assert_eq!(Units::try_from(units.as_str()).expect("roundtrip"), *units);
        }
        assert_eq!(Units::try_from("Celsius").expect("alias"), Units::Metric);
        assert!(Units::try_from("parsecs").unwrap_err().to_string().contains("Unknown units"));
    }
}
