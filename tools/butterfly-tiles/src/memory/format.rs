//! JSON tile documents and the tile manifest
//!
//! A tile file holds features (geometry + attributes), edge-based graph
//! nodes referencing feature segments, and the border crossings to
//! neighbouring tiles. The manifest lists tile extents and acts as the
//! point to tile lookup.

use serde::{Deserialize, Serialize};

use crate::engine::{BorderNode, FeatureId, FeatureInfo, FeatureSegment, NodeId, TileId};
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TileDocument {
    pub features: Vec<FeatureRecord>,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub borders: Vec<BorderNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: FeatureId,
    #[serde(flatten)]
    pub info: FeatureInfo,
    /// `[lon, lat]` pairs in digitization order
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub duration_ds: u32,
    pub segments: Vec<FeatureSegment>,
    #[serde(default)]
    pub successors: Vec<NodeId>,
}

/// Only the features of a tile document
#[derive(Debug, Deserialize)]
pub(crate) struct FeaturesSection {
    pub features: Vec<FeatureRecord>,
}

/// Only the node to segment mapping of a tile document
#[derive(Debug, Deserialize)]
pub(crate) struct MappingSection {
    pub nodes: Vec<MappingRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MappingRecord {
    pub id: NodeId,
    pub segments: Vec<FeatureSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileExtent {
    pub id: TileId,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl TileExtent {
    /// Half-open on the max edges so neighbouring extents never overlap
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lon >= self.min_lon && p.lon < self.max_lon && p.lat >= self.min_lat && p.lat < self.max_lat
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub tiles: Vec<TileExtent>,
}

impl Manifest {
    pub fn tile_for(&self, p: GeoPoint) -> Option<TileId> {
        self.tiles
            .iter()
            .find(|extent| extent.contains(p))
            .map(|extent| extent.id.clone())
    }
}
