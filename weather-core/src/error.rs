use reqwest::StatusCode;
use thiserror::Error;

/// Classified cause of a failed weather query.
///
/// This is the only error that crosses the [`WeatherClient`](crate::WeatherClient)
/// and [`WeatherStateStore`](crate::WeatherStateStore) boundaries.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty city name or non-finite coordinates; no request was sent.
    #[error("invalid input")]
    InvalidInput,

    #[error("location not found")]
    NotFound,

    /// Missing or rejected API key.
    #[error("unauthorized: check the configured API key")]
    Unauthorized,

    #[error("rate limited by the weather provider")]
    RateLimited,

    /// Timeout, connectivity problem or unexpected server-side status.
    #[error("transport failure")]
    Transport,

    /// The response body did not have the expected shape.
    #[error("unexpected response format")]
    ParseError,
}

impl ErrorKind {
    /// Map a non-success HTTP status to an error kind.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ErrorKind::InvalidInput,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Unauthorized,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
            _ => ErrorKind::Transport,
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            ErrorKind::ParseError
        } else {
            ErrorKind::Transport
        }
    }
}

impl From<serde_json::Error> for ErrorKind {
    fn from(_: serde_json::Error) -> Self {
        ErrorKind::ParseError
    }
}

/// Failure to obtain a device position. Kept apart from [`ErrorKind`] so that it
/// never ends up in a query slot.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("no location fix available")]
    Unavailable,
}
