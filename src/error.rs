use thiserror::Error;

/// Errors raised by the map engine.
///
/// Only [`MapError::DegenerateContainer`] is ever surfaced to callers of the
/// view; the rest are logged and turned into no-ops or skipped features.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("container has no drawable area: {width}x{height}")]
    DegenerateContainer { width: usize, height: usize },

    #[error("invalid gesture input: {what} = {value}")]
    InvalidGesture { what: &'static str, value: f64 },

    #[error("no region named {0:?} in the dataset")]
    SelectionMismatch(String),

    #[error("malformed geometry for {name:?}: {reason}")]
    Geometry { name: String, reason: String },

    #[error("invalid dataset: {0}")]
    Dataset(String),
}

pub type Result<T> = std::result::Result<T, MapError>;

/// Reject NaN and infinite gesture values before they reach viewport state.
#[inline]
pub(crate) fn finite(what: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MapError::InvalidGesture { what, value })
    }
}
