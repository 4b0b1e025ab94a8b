//! Resolves query points into graph entry candidates
//!
//! The facade snaps a point to its nearest graph nodes; each result is then
//! tied back to the feature sub-segment it cut and the exact projection of
//! the query point onto that sub-segment.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use butterfly_common::{Error, Result};

use crate::engine::{BorderKind, BorderNode, FeatureIndex, FeatureSegment, PhantomNode};
use crate::geo::{nearest_subsegment, GeoPoint};
use crate::tile::{MapPin, TileResource};

/// Which end of the route a point is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Final,
}

impl Endpoint {
    fn not_found(self) -> Error {
        match self {
            Endpoint::Start => Error::StartPointNotFound,
            Endpoint::Final => Error::EndPointNotFound,
        }
    }
}

/// Snapped graph entry point with the feature sub-segment it lies on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNodeCandidate {
    pub phantom: PhantomNode,
    /// Two adjacent feature points in traversal direction
    pub segment: FeatureSegment,
    /// Exact point on `segment` the query was projected to
    pub segment_point: GeoPoint,
}

/// Candidates for one route endpoint, best first
pub type CandidateSet = Vec<GraphNodeCandidate>;

/// Sub-segments and geometry of one graph node
pub(crate) fn node_geometry(
    tile: &TileResource,
    features: &dyn FeatureIndex,
    segments: &[FeatureSegment],
) -> Result<Vec<(FeatureSegment, Vec<GeoPoint>)>> {
    segments
        .iter()
        .map(|seg| {
            let points = features
                .resolve_segment(seg)
                .filter(|points| points.len() == seg.point_count())
                .ok_or_else(|| {
                    Error::inconsistent(
                        tile.id().as_str(),
                        format!(
                            "feature {} points {}..{} not in feature index",
                            seg.feature, seg.start, seg.end
                        ),
                    )
                })?;
            Ok((*seg, points))
        })
        .collect()
}

fn sub_segment(seg: &FeatureSegment, i: usize) -> FeatureSegment {
    FeatureSegment {
        feature: seg.feature,
        start: seg.point_at(i),
        end: seg.point_at(i + 1),
    }
}

impl GraphNodeCandidate {
    /// Candidate sitting exactly on a border crossing.
    ///
    /// Exit nodes are entered at their far end, entry nodes at their start.
    pub fn at_border(border: &BorderNode, map: &MapPin) -> Result<Self> {
        let tile = map.tile();
        let segments = map.segments(border.node);
        let inconsistent = || {
            Error::inconsistent(
                tile.id().as_str(),
                format!("border node {} has no usable segment", border.node),
            )
        };

        let (segment, ratio) = match border.kind {
            BorderKind::Exit => {
                let last = segments.last().ok_or_else(inconsistent)?;
                let n = last.point_count();
                if n < 2 {
                    return Err(inconsistent());
                }
                (sub_segment(last, n - 2), 1.0)
            }
            BorderKind::Entry => {
                let first = segments.first().ok_or_else(inconsistent)?;
                if first.point_count() < 2 {
                    return Err(inconsistent());
                }
                (sub_segment(first, 0), 0.0)
            }
        };

        Ok(Self {
            phantom: PhantomNode {
                node: border.node,
                ratio,
                location: border.point,
            },
            segment,
            segment_point: border.point,
        })
    }
}

/// Point to candidate resolution with lookup statistics
#[derive(Debug, Default)]
pub struct CandidateResolver {
    lookups: AtomicU64,
}

impl CandidateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_candidates` calls so far
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn find_candidates(
        &self,
        point: GeoPoint,
        heading: Option<f64>,
        tile: &Arc<TileResource>,
        max_count: usize,
        endpoint: Endpoint,
    ) -> Result<CandidateSet> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let facade_pin = tile.pin_facade()?;
        let map = tile.pin_map()?;
        let phantoms = facade_pin.facade().nearest_edges(point, heading, max_count);
        if phantoms.is_empty() {
            debug!(tile = %tile.id(), ?endpoint, "no graph edge near point");
            return Err(endpoint.not_found());
        }

        let features = tile.features();
        let mut candidates = Vec::with_capacity(phantoms.len().min(max_count));
        for phantom in phantoms.into_iter().take(max_count) {
            let segments = map.segments(phantom.node);
            if segments.is_empty() {
                return Err(Error::inconsistent(
                    tile.id().as_str(),
                    format!("graph node {} has no feature segment", phantom.node),
                ));
            }

            let geometry = node_geometry(tile, features.as_ref(), &segments)?;
            let best = geometry
                .iter()
                .filter_map(|(seg, points)| {
                    nearest_subsegment(points, point).map(|(i, projected)| {
                        let d = crate::geo::haversine_distance(point, projected);
                        (sub_segment(seg, i), projected, d)
                    })
                })
                .min_by(|a, b| a.2.total_cmp(&b.2));

            let Some((segment, segment_point, distance)) = best else {
                return Err(Error::inconsistent(
                    tile.id().as_str(),
                    format!("graph node {} has degenerate geometry", phantom.node),
                ));
            };
            trace!(node = phantom.node, distance, "candidate");
            candidates.push(GraphNodeCandidate {
                phantom,
                segment,
                segment_point,
            });
        }

        debug!(tile = %tile.id(), ?endpoint, count = candidates.len(), "resolved candidates");
        Ok(candidates)
    }
}
