//! Common types shared by the butterfly-osm tiled router

pub mod error;

pub use error::{Error, Result, ResultCode};
