//! Seams to the collaborators the routing core does not implement itself
//!
//! A tile is opened by a [`TileProvider`], which hands back its backing
//! [`TileContainer`], the search-ready [`SearchFacade`], the graph-node to
//! feature [`SegmentIndex`] and the tile's [`FeatureIndex`]. The core only
//! drives their lifecycle; it never interprets the container bytes.
//!
//! Graph nodes are edge-based: every node is one directed stretch of road
//! whose geometry is a sequence of feature segments. Two consecutive path
//! nodes meet at a junction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use butterfly_common::Result;

use crate::geo::GeoPoint;

/// Node of a tile's search graph
pub type NodeId = u32;

/// Feature (road/way) identifier inside one tile
pub type FeatureId = u32;

/// Opaque name of a tile's backing file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(Arc<str>);

impl TileId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TileId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Maps a geographic point to the tile covering it
pub type CountryFn = Arc<dyn Fn(GeoPoint) -> Option<TileId> + Send + Sync>;

/// A run of feature points traversed by a graph node.
///
/// Points `start..=end` of the feature, walked from `start` to `end`;
/// `start > end` means the feature is traversed against its digitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSegment {
    pub feature: FeatureId,
    pub start: u32,
    pub end: u32,
}

impl FeatureSegment {
    pub fn is_forward(&self) -> bool {
        self.end >= self.start
    }

    /// Number of feature points covered, both ends included
    pub fn point_count(&self) -> usize {
        self.start.abs_diff(self.end) as usize + 1
    }

    /// Feature point index of the `i`-th point along the traversal direction
    pub fn point_at(&self, i: usize) -> u32 {
        let i = i as u32;
        if self.is_forward() {
            self.start + i
        } else {
            self.start - i
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            feature: self.feature,
            start: self.end,
            end: self.start,
        }
    }
}

/// Attributes of a feature relevant to turn generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub oneway: bool,
    #[serde(default)]
    pub roundabout: bool,
}

/// Engine-specific graph entry point for an arbitrary query point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhantomNode {
    pub node: NodeId,
    /// Position along the node, 0 = node start, 1 = node end
    pub ratio: f64,
    /// Point the engine snapped to
    pub location: GeoPoint,
}

/// One traversed graph node of a path
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathStep {
    pub node: NodeId,
    /// Travel time spent on the traversed part of the node, in deciseconds
    pub duration_ds: u32,
}

/// Result of a single-tile search
#[derive(Debug, Clone, PartialEq)]
pub struct RawPath {
    pub steps: Vec<PathStep>,
    /// Total cost in deciseconds
    pub weight: u32,
    /// Index of the source candidate the path starts from
    pub source_index: usize,
    /// Index of the target candidate the path ends at
    pub target_index: usize,
}

/// Which side of a tile border a node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderKind {
    /// Node geometry ends at the border, leaving this tile
    Exit,
    /// Node geometry starts at the border, entering this tile
    Entry,
}

/// A graph node whose road crosses into a neighbouring tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderNode {
    pub node: NodeId,
    pub neighbor: TileId,
    pub kind: BorderKind,
    /// Crossing point, identical in both tiles
    pub point: GeoPoint,
}

/// Backing store of one tile
pub trait TileContainer: Send + Sync {
    /// Mapped tile bytes
    fn bytes(&self) -> &[u8];

    fn close(&mut self);
}

/// Search-ready structures of one tile
pub trait SearchFacade: Send + Sync {
    fn load(&mut self, container: &dyn TileContainer) -> Result<()>;

    fn clear(&mut self);

    fn is_loaded(&self) -> bool;

    /// Up to `max_count` nearest graph nodes, best first.
    ///
    /// `heading` is an optional travel direction in degrees (0 = North).
    fn nearest_edges(
        &self,
        point: GeoPoint,
        heading: Option<f64>,
        max_count: usize,
    ) -> Vec<PhantomNode>;

    /// Shortest path from any source to any target, `None` if disconnected.
    ///
    /// Among equal-cost paths the one using the earliest source, then the
    /// earliest target, is returned.
    fn shortest_path(&self, sources: &[PhantomNode], targets: &[PhantomNode]) -> Option<RawPath>;

    /// Nodes connecting this tile to its neighbours
    fn border_nodes(&self) -> Vec<BorderNode>;

    /// Nodes reachable from `node` through one junction
    fn successors(&self, node: NodeId) -> Vec<NodeId>;
}

/// Graph node to feature segment mapping of one tile
pub trait SegmentIndex: Send + Sync {
    fn map(&mut self, container: &dyn TileContainer) -> Result<()>;

    fn unmap(&mut self);

    fn is_mapped(&self) -> bool;

    /// Segments of `node` in traversal order, empty when unknown or unmapped
    fn segments(&self, node: NodeId) -> Vec<FeatureSegment>;
}

/// Feature geometry and attributes of one tile
pub trait FeatureIndex: Send + Sync {
    /// Points of `segment` in traversal order
    fn resolve_segment(&self, segment: &FeatureSegment) -> Option<Vec<GeoPoint>>;

    fn feature(&self, id: FeatureId) -> Option<FeatureInfo>;
}

/// Everything needed to build a tile resource
pub struct TileParts {
    pub container: Box<dyn TileContainer>,
    pub facade: Box<dyn SearchFacade>,
    pub mapping: Box<dyn SegmentIndex>,
    pub features: Arc<dyn FeatureIndex>,
}

/// Opens tiles by name
pub trait TileProvider: Send + Sync {
    /// Fails with `TileUnavailable` when the tile does not exist
    fn open(&self, tile: &TileId) -> Result<TileParts>;
}
