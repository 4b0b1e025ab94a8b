//! Reference facade, segment mapping and feature index over JSON tiles
//!
//! The facade runs a plain multi-source Dijkstra on the edge-based graph.
//! Labels are `(cost, source index)` pairs so that equal-cost paths are
//! resolved in favour of the earliest source candidate, then the earliest
//! target candidate.

use priority_queue::PriorityQueue;
use rstar::primitives::{GeomWithData, Line};
use rstar::{PointDistance, RTree};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use butterfly_common::{Error, Result};

use crate::engine::{
    BorderNode, FeatureId, FeatureIndex, FeatureInfo, FeatureSegment, NodeId, PathStep,
    PhantomNode, RawPath, SearchFacade, SegmentIndex, TileContainer,
};
use crate::geo::{
    bearing, degree_span, haversine_distance, normalize_angle, project_on_segment, GeoPoint,
};

use super::format::{FeatureRecord, FeaturesSection, MappingSection, TileDocument};

fn decode<'a, T: serde::Deserialize<'a>>(tile: &str, bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::inconsistent(tile, e.to_string()))
}

/// Feature geometry and attributes, parsed when the tile is opened
pub struct MemoryFeatures {
    features: HashMap<FeatureId, (FeatureInfo, Vec<GeoPoint>)>,
}

impl MemoryFeatures {
    pub fn from_records(records: Vec<FeatureRecord>) -> Self {
        let features = records
            .into_iter()
            .map(|r| {
                let points = r.points.into_iter().map(GeoPoint::from).collect();
                (r.id, (r.info, points))
            })
            .collect();
        Self { features }
    }

    pub fn decode(tile: &str, bytes: &[u8]) -> Result<Self> {
        let section: FeaturesSection = decode(tile, bytes)?;
        Ok(Self::from_records(section.features))
    }
}

impl FeatureIndex for MemoryFeatures {
    fn resolve_segment(&self, segment: &FeatureSegment) -> Option<Vec<GeoPoint>> {
        let (_, points) = self.features.get(&segment.feature)?;
        if segment.start.max(segment.end) as usize >= points.len() {
            return None;
        }
        Some(
            (0..segment.point_count())
                .map(|i| points[segment.point_at(i) as usize])
                .collect(),
        )
    }

    fn feature(&self, id: FeatureId) -> Option<FeatureInfo> {
        self.features.get(&id).map(|(info, _)| info.clone())
    }
}

/// Node to feature segment mapping, present only while mapped
pub struct MemoryMapping {
    tile: String,
    segments: Option<HashMap<NodeId, Vec<FeatureSegment>>>,
}

impl MemoryMapping {
    pub fn new(tile: &str) -> Self {
        Self {
            tile: tile.to_string(),
            segments: None,
        }
    }
}

impl SegmentIndex for MemoryMapping {
    fn map(&mut self, container: &dyn TileContainer) -> Result<()> {
        let section: MappingSection = decode(&self.tile, container.bytes())?;
        self.segments = Some(
            section
                .nodes
                .into_iter()
                .map(|record| (record.id, record.segments))
                .collect(),
        );
        Ok(())
    }

    fn unmap(&mut self) {
        self.segments = None;
    }

    fn is_mapped(&self) -> bool {
        self.segments.is_some()
    }

    fn segments(&self, node: NodeId) -> Vec<FeatureSegment> {
        self.segments
            .as_ref()
            .and_then(|segments| segments.get(&node))
            .cloned()
            .unwrap_or_default()
    }
}

struct GraphNode {
    duration_ds: u32,
    successors: Vec<NodeId>,
    length_m: f64,
}

/// Piece of a node's geometry in the spatial index
#[derive(Debug, Clone, Copy, PartialEq)]
struct Piece {
    node: NodeId,
    /// Distance from the node start to the piece start
    offset_m: f64,
}

type IndexedPiece = GeomWithData<Line<[f64; 2]>, Piece>;

struct Graph {
    nodes: HashMap<NodeId, GraphNode>,
    borders: Vec<BorderNode>,
    tree: RTree<IndexedPiece>,
}

impl Graph {
    fn build(tile: &str, doc: TileDocument) -> Result<Self> {
        let features = MemoryFeatures::from_records(doc.features);
        let mut nodes = HashMap::with_capacity(doc.nodes.len());
        let mut pieces: Vec<IndexedPiece> = Vec::new();

        for record in doc.nodes {
            let against_oneway = record.segments.iter().any(|seg| {
                !seg.is_forward() && features.feature(seg.feature).is_some_and(|f| f.oneway)
            });
            if against_oneway {
                debug!(tile, node = record.id, "node runs against a oneway, not loaded");
                continue;
            }

            let mut geometry: Vec<GeoPoint> = Vec::new();
            for seg in &record.segments {
                let points = features.resolve_segment(seg).ok_or_else(|| {
                    Error::inconsistent(
                        tile,
                        format!("node {} references unknown feature {}", record.id, seg.feature),
                    )
                })?;
                let skip = usize::from(geometry.last() == points.first());
                geometry.extend(points.into_iter().skip(skip));
            }

            let mut offset_m = 0.0;
            for w in geometry.windows(2) {
                pieces.push(GeomWithData::new(
                    Line::new(w[0].into(), w[1].into()),
                    Piece {
                        node: record.id,
                        offset_m,
                    },
                ));
                offset_m += haversine_distance(w[0], w[1]);
            }

            nodes.insert(
                record.id,
                GraphNode {
                    duration_ds: record.duration_ds,
                    successors: record.successors,
                    length_m: offset_m,
                },
            );
        }

        let loaded: HashSet<NodeId> = nodes.keys().copied().collect();
        for node in nodes.values_mut() {
            node.successors.retain(|next| loaded.contains(next));
        }

        Ok(Self {
            nodes,
            borders: doc
                .borders
                .into_iter()
                .filter(|b| loaded.contains(&b.node))
                .collect(),
            tree: RTree::bulk_load(pieces),
        })
    }

    fn weight(&self, node: NodeId) -> u32 {
        self.nodes.get(&node).map_or(0, |n| n.duration_ds)
    }
}

/// Nodes snapped further than this beyond the closest one are not candidates
const SNAP_TOLERANCE_M: f64 = 5.0;

fn scaled(weight: u32, fraction: f64) -> u32 {
    (weight as f64 * fraction.clamp(0.0, 1.0)).round() as u32
}

/// Search facade built from a tile document on load
pub struct MemoryFacade {
    tile: String,
    snap_radius_m: f64,
    graph: Option<Graph>,
}

impl MemoryFacade {
    pub fn new(tile: &str, snap_radius_m: f64) -> Self {
        Self {
            tile: tile.to_string(),
            snap_radius_m,
            graph: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Answer {
    total: u32,
    source: usize,
    target: usize,
    /// Last fully traversed node before the target node
    via: Option<NodeId>,
}

impl Answer {
    fn key(&self) -> (u32, usize, usize) {
        (self.total, self.source, self.target)
    }
}

fn offer(best: &mut Option<Answer>, candidate: Answer) {
    if best.map_or(true, |b| candidate.key() < b.key()) {
        *best = Some(candidate);
    }
}

impl SearchFacade for MemoryFacade {
    fn load(&mut self, container: &dyn TileContainer) -> Result<()> {
        let doc: TileDocument = decode(&self.tile, container.bytes())?;
        self.graph = Some(Graph::build(&self.tile, doc)?);
        Ok(())
    }

    fn clear(&mut self) {
        self.graph = None;
    }

    fn is_loaded(&self) -> bool {
        self.graph.is_some()
    }

    fn nearest_edges(
        &self,
        point: GeoPoint,
        heading: Option<f64>,
        max_count: usize,
    ) -> Vec<PhantomNode> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };
        if max_count == 0 {
            return Vec::new();
        }

        // node -> (distance, phantom, piece bearing)
        let query: [f64; 2] = point.into();
        // The tree orders by planar degree distance: nothing within the
        // search radius lies beyond this
        let horizon = degree_span(point, 2.0 * self.snap_radius_m);
        let mut best: HashMap<NodeId, (f64, PhantomNode, f64)> = HashMap::new();
        for piece in graph.tree.nearest_neighbor_iter(&query) {
            let a = GeoPoint::from(piece.geom().from);
            let b = GeoPoint::from(piece.geom().to);
            let projected = project_on_segment(point, a, b);
            if piece.distance_2(&query).sqrt() > horizon {
                break;
            }
            let distance = haversine_distance(point, projected);
            if distance > self.snap_radius_m {
                continue;
            }

            let data = piece.data;
            let length = graph.nodes.get(&data.node).map_or(0.0, |n| n.length_m);
            let ratio = if length > 0.0 {
                (data.offset_m + haversine_distance(a, projected)) / length
            } else {
                0.0
            };
            let phantom = PhantomNode {
                node: data.node,
                ratio: ratio.clamp(0.0, 1.0),
                location: projected,
            };
            let entry = best
                .entry(data.node)
                .or_insert((distance, phantom, bearing(a, b)));
            if distance < entry.0 {
                *entry = (distance, phantom, bearing(a, b));
            }
            if best.len() >= max_count * 4 {
                break;
            }
        }

        let mut ranked: Vec<(f64, PhantomNode, f64)> = best.into_values().collect();
        ranked.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.node.cmp(&y.1.node)));
        if let Some(closest) = ranked.first().map(|(d, _, _)| *d) {
            ranked.retain(|(d, _, _)| *d <= closest + SNAP_TOLERANCE_M);
        }
        if let Some(heading) = heading {
            // Stable: distance order is kept inside each group
            ranked.sort_by_key(|(_, _, piece_bearing)| {
                normalize_angle(piece_bearing - heading).abs() > 90.0
            });
        }
        ranked
            .into_iter()
            .take(max_count)
            .map(|(_, phantom, _)| phantom)
            .collect()
    }

    fn shortest_path(&self, sources: &[PhantomNode], targets: &[PhantomNode]) -> Option<RawPath> {
        let graph = self.graph.as_ref()?;

        let mut targets_by_node: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (ti, t) in targets.iter().enumerate() {
            targets_by_node.entry(t.node).or_default().push(ti);
        }

        let mut answer: Option<Answer> = None;

        // Label = cost to the end of a node, with the source it came from
        let mut labels: HashMap<NodeId, (u32, usize)> = HashMap::new();
        let mut parents: HashMap<NodeId, Option<NodeId>> = HashMap::new();
        let mut queue: PriorityQueue<NodeId, Reverse<(u32, usize)>> = PriorityQueue::new();

        for (si, s) in sources.iter().enumerate() {
            let w = graph.weight(s.node);
            for &ti in targets_by_node.get(&s.node).into_iter().flatten() {
                let t = &targets[ti];
                if t.ratio >= s.ratio {
                    offer(
                        &mut answer,
                        Answer {
                            total: scaled(w, t.ratio - s.ratio),
                            source: si,
                            target: ti,
                            via: None,
                        },
                    );
                }
            }

            let label = (scaled(w, 1.0 - s.ratio), si);
            if labels.get(&s.node).map_or(true, |l| label < *l) {
                labels.insert(s.node, label);
                parents.insert(s.node, None);
                queue.push_increase(s.node, Reverse(label));
            }
        }

        let mut settled: HashSet<NodeId> = HashSet::new();
        while let Some((u, Reverse((cost, si)))) = queue.pop() {
            if answer.is_some_and(|a| cost > a.total) {
                break;
            }
            settled.insert(u);
            let Some(node) = graph.nodes.get(&u) else {
                continue;
            };

            for &v in &node.successors {
                let w = graph.weight(v);
                for &ti in targets_by_node.get(&v).into_iter().flatten() {
                    offer(
                        &mut answer,
                        Answer {
                            total: cost.saturating_add(scaled(w, targets[ti].ratio)),
                            source: si,
                            target: ti,
                            via: Some(u),
                        },
                    );
                }

                if settled.contains(&v) {
                    continue;
                }
                let label = (cost.saturating_add(w), si);
                if labels.get(&v).map_or(true, |l| label < *l) {
                    labels.insert(v, label);
                    parents.insert(v, Some(u));
                    queue.push_increase(v, Reverse(label));
                }
            }
        }

        let answer = answer?;
        let source = &sources[answer.source];
        let target = &targets[answer.target];

        let steps = match answer.via {
            None => vec![PathStep {
                node: source.node,
                duration_ds: answer.total,
            }],
            Some(via) => {
                let mut nodes = vec![target.node, via];
                let mut current = via;
                while let Some(Some(parent)) = parents.get(&current) {
                    nodes.push(*parent);
                    current = *parent;
                }
                nodes.reverse();

                let last = nodes.len() - 1;
                nodes
                    .iter()
                    .enumerate()
                    .map(|(i, &n)| {
                        let w = graph.weight(n);
                        let duration_ds = if i == 0 {
                            scaled(w, 1.0 - source.ratio)
                        } else if i == last {
                            scaled(w, target.ratio)
                        } else {
                            w
                        };
                        PathStep {
                            node: n,
                            duration_ds,
                        }
                    })
                    .collect()
            }
        };

        Some(RawPath {
            weight: steps
                .iter()
                .fold(0u32, |total, s| total.saturating_add(s.duration_ds)),
            steps,
            source_index: answer.source,
            target_index: answer.target,
        })
    }

    fn border_nodes(&self) -> Vec<BorderNode> {
        self.graph
            .as_ref()
            .map(|g| g.borders.clone())
            .unwrap_or_default()
    }

    fn successors(&self, node: NodeId) -> Vec<NodeId> {
        self.graph
            .as_ref()
            .and_then(|g| g.nodes.get(&node))
            .map(|n| n.successors.clone())
            .unwrap_or_default()
    }
}
