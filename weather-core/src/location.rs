use async_trait::async_trait;

use crate::{error::LocationError, model::Coordinates};

/// Source of the device position, injected wherever location-based queries are made.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// One-shot best-known position.
    async fn last_known_location(&self) -> Result<Coordinates, LocationError>;
}

/// Provider that always answers with the same preset position, or with
/// [`LocationError::Unavailable`] when none was given.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation {
    coords: Option<Coordinates>,
}

impl FixedLocation {
    pub fn new(coords: Option<Coordinates>) -> Self {
        Self { coords }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn last_known_location(&self) -> Result<Coordinates, LocationError> {
        self.coords.ok_or(LocationError::Unavailable)
    }
}
