pub mod candidate;
pub mod config;
pub mod controller;
pub mod engine;
pub mod geo;
pub mod memory;
pub mod router;
pub mod stitch;
pub mod tile;
pub mod turns;

pub use butterfly_common::{Error, Result, ResultCode};
pub use candidate::{CandidateResolver, CandidateSet, Endpoint, GraphNodeCandidate};
pub use config::RouterConfig;
pub use controller::{AsyncRouteController, ControllerState, RouteCallback};
pub use engine::{CountryFn, TileId, TileProvider};
pub use geo::GeoPoint;
pub use router::Router;
pub use stitch::{EndpointCandidates, RawRoute, RouteStitcher, StitchedPath, TileLeg};
pub use tile::{TileCache, TileResource};
pub use turns::{Route, TurnDirection, TurnInstruction};
