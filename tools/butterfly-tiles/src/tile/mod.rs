//! Tile resources and the cache sharing them

pub mod cache;
pub mod resource;

pub use cache::TileCache;
pub use resource::{FacadePin, MapPin, TileResource};
