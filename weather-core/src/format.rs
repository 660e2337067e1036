//! Display helpers for the presentation layer.

use crate::config::{Config, Units};

/// Render a provider temperature rounded to whole degrees, e.g. `15°C`.
pub fn format_temperature(value: f64, units: Units) -> String {
    let rounded = value.round();
    // avoid printing "-0°C"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.0}{}", units.symbol())
}

/// URL of the condition icon image for the configured icon size.
pub fn icon_url(config: &Config, icon_id: &str) -> String {
    format!("{}{}{}", config.icon_base_url, icon_id, config.icon_size)
}
