//! Error types for the map-service adapters.

/// Errors from geocoding and points-of-interest lookups.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("map service request failed: {0}")]
    Request(String),
    #[error("map service timed out")]
    Timeout,
    #[error("map service returned status {0}")]
    Status(u16),
    #[error("invalid map service response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LocationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LocationError::Timeout
        } else if err.is_decode() {
            LocationError::Decode(err.to_string())
        } else {
            LocationError::Request(err.to_string())
        }
    }
}
