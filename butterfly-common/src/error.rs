//! Error types for the butterfly-osm tiled router
//!
//! Every failure the routing core can produce maps onto exactly one
//! [`ResultCode`]. The codes are what the route callback receives; the
//! richer [`Error`] values stay inside the library for logging and tests.

use serde::Serialize;
use thiserror::Error;

/// Outcome reported to a route callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResultCode {
    NoError,
    Cancelled,
    StartPointNotFound,
    EndPointNotFound,
    #[serde(rename = "PointsInDifferentMWM")]
    PointsInDifferentMwm,
    NeedMoreMaps,
    RouteNotFound,
    InconsistentTileData,
    InternalError,
}

impl ResultCode {
    /// True for outcomes that represent a failed computation.
    ///
    /// `Cancelled` is a terminal outcome of its own and is not a failure.
    pub fn is_failure(self) -> bool {
        !matches!(self, ResultCode::NoError | ResultCode::Cancelled)
    }
}

/// Main error type for routing operations
#[derive(Debug, Error)]
pub enum Error {
    /// Cooperative cancellation was observed
    #[error("route computation cancelled")]
    Cancelled,

    /// No graph edge close enough to the start point
    #[error("start point is not near any road of its tile")]
    StartPointNotFound,

    /// No graph edge close enough to the final point
    #[error("final point is not near any road of its tile")]
    EndPointNotFound,

    /// The point lies outside every known tile
    #[error("no tile covers point ({lat:.6}, {lon:.6})")]
    PointOutsideTiles { lat: f64, lon: f64 },

    /// Start and final tiles share no border adjacency
    #[error("tiles '{start}' and '{finish}' are not connected by any border")]
    PointsInDifferentTiles { start: String, finish: String },

    /// A tile required by the route could not be opened
    #[error("tile '{0}' is not available")]
    TileUnavailable(String),

    /// The graph reports no connectivity between the candidates
    #[error("no route between the requested points")]
    RouteNotFound,

    /// Graph data and feature data of a tile disagree
    #[error("inconsistent data in tile '{tile}': {detail}")]
    InconsistentTileData { tile: String, detail: String },

    /// Programming error inside the core
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shortcut for [`Error::InconsistentTileData`]
    pub fn inconsistent(tile: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::InconsistentTileData {
            tile: tile.into(),
            detail: detail.into(),
        }
    }

    /// The result code this error is reported as.
    pub fn code(&self) -> ResultCode {
        match self {
            Error::Cancelled => ResultCode::Cancelled,
            Error::StartPointNotFound => ResultCode::StartPointNotFound,
            Error::EndPointNotFound => ResultCode::EndPointNotFound,
            Error::PointOutsideTiles { .. } | Error::TileUnavailable(_) => {
                ResultCode::NeedMoreMaps
            }
            Error::PointsInDifferentTiles { .. } => ResultCode::PointsInDifferentMwm,
            Error::RouteNotFound => ResultCode::RouteNotFound,
            Error::InconsistentTileData { .. } => ResultCode::InconsistentTileData,
            Error::Internal(_) => ResultCode::InternalError,
        }
    }
}

/// Convenience result type for routing operations
pub type Result<T> = std::result::Result<T, Error>;
