//! Route polyline, junction classification, times and turn geometry

use std::sync::Arc;
use tracing::{debug, trace, warn};

use butterfly_common::{Error, Result};

use crate::candidate::{node_geometry, GraphNodeCandidate};
use crate::config::RouterConfig;
use crate::engine::{FeatureIndex, FeatureSegment, NodeId, PathStep};
use crate::geo::{bearing, haversine_distance, polyline_length, turn_angle, GeoPoint};
use crate::stitch::StitchedPath;
use crate::tile::{FacadePin, MapPin, TileResource};

use super::classify::{
    intermediate_direction, most_left_direction, most_right_direction, roundabout_direction,
};
use super::fixup::fixup_turns;
use super::{Route, TimeMark, TurnDirection, TurnGeometry, TurnInstruction};

/// Consecutive route points closer than this (degrees) are the same point
const SAME_POINT_DEG: f64 = 1e-9;

/// Which end of a node's geometry touches the junction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// Outgoing roads start at the junction
    Start,
    /// The incoming road ends at the junction
    End,
}

impl SegmentEnd {
    pub fn junction(self, geometry: &[GeoPoint]) -> Option<GeoPoint> {
        match self {
            SegmentEnd::Start => geometry.first().copied(),
            SegmentEnd::End => geometry.last().copied(),
        }
    }

    /// Point a turn angle is measured against.
    ///
    /// Walks away from the junction along the geometry, at most `max_points`
    /// points, stopping at the first point whose distance along the line
    /// exceeds `max_distance_m`.
    pub fn probe_point(
        self,
        geometry: &[GeoPoint],
        max_points: usize,
        max_distance_m: f64,
    ) -> Option<GeoPoint> {
        match self {
            SegmentEnd::Start => walk(geometry.iter(), max_points, max_distance_m),
            SegmentEnd::End => walk(geometry.iter().rev(), max_points, max_distance_m),
        }
    }
}

fn walk<'p>(
    mut points: impl Iterator<Item = &'p GeoPoint>,
    max_points: usize,
    max_distance_m: f64,
) -> Option<GeoPoint> {
    let mut current = *points.next()?;
    let mut travelled = 0.0;
    let mut probe = None;
    for next in points.take(max_points) {
        travelled += haversine_distance(current, *next);
        probe = Some(*next);
        if travelled > max_distance_m {
            break;
        }
        current = *next;
    }
    probe
}

/// Flattened geometry of one graph node
struct NodeShape {
    node: NodeId,
    points: Vec<GeoPoint>,
    /// Each segment with the index of its first point in `points`
    segments: Vec<(FeatureSegment, usize)>,
}

impl NodeShape {
    fn build(tile: &TileResource, map: &MapPin, node: NodeId) -> Result<Self> {
        let segments = map.segments(node);
        if segments.is_empty() {
            return Err(Error::inconsistent(
                tile.id().as_str(),
                format!("graph node {node} has no feature segment"),
            ));
        }

        let mut points: Vec<GeoPoint> = Vec::new();
        let mut offsets = Vec::with_capacity(segments.len());
        for (seg, seg_points) in node_geometry(tile, tile.features().as_ref(), &segments)? {
            let joined = points.last() == seg_points.first();
            let offset = if joined { points.len() - 1 } else { points.len() };
            offsets.push((seg, offset));
            points.extend(seg_points.into_iter().skip(usize::from(joined)));
        }
        Ok(Self {
            node,
            points,
            segments: offsets,
        })
    }

    fn first_segment(&self) -> FeatureSegment {
        self.segments[0].0
    }

    fn last_segment(&self) -> FeatureSegment {
        self.segments[self.segments.len() - 1].0
    }

    /// Index in `points` of the first point of a two-point sub-segment
    fn locate(&self, sub: &FeatureSegment) -> Option<usize> {
        self.segments.iter().find_map(|(seg, offset)| {
            if seg.feature != sub.feature || seg.point_count() < 2 {
                return None;
            }
            let i = seg.start.abs_diff(sub.start) as usize;
            let inside = i + 1 < seg.point_count()
                && seg.point_at(i) == sub.start
                && seg.point_at(i + 1) == sub.end;
            inside.then_some(offset + i)
        })
    }

    /// Node geometry cut at the route's source and target candidates
    fn trimmed(
        &self,
        tile: &TileResource,
        from: Option<&GraphNodeCandidate>,
        to: Option<&GraphNodeCandidate>,
    ) -> Result<Vec<GeoPoint>> {
        let locate = |candidate: &GraphNodeCandidate| {
            self.locate(&candidate.segment).ok_or_else(|| {
                Error::inconsistent(
                    tile.id().as_str(),
                    format!(
                        "candidate segment {:?} is not part of node {}",
                        candidate.segment, self.node
                    ),
                )
            })
        };

        let mut out = Vec::with_capacity(self.points.len() + 2);
        let lo = match from {
            Some(candidate) => {
                out.push(candidate.segment_point);
                locate(candidate)? + 1
            }
            None => 0,
        };
        let hi = match to {
            Some(candidate) => locate(candidate)? + 1,
            None => self.points.len(),
        };
        if lo < hi {
            out.extend_from_slice(&self.points[lo..hi]);
        }
        if let Some(candidate) = to {
            out.push(candidate.segment_point);
        }
        Ok(out)
    }
}

/// Incoming sub-segment reversed: taking it means turning back
fn is_u_turn(incoming: &FeatureSegment, outgoing: &FeatureSegment) -> bool {
    let n = incoming.point_count();
    if n < 2 || outgoing.point_count() < 2 {
        return false;
    }
    incoming.feature == outgoing.feature
        && outgoing.start == incoming.end
        && outgoing.point_at(1) == incoming.point_at(n - 2)
}

/// Route under construction
#[derive(Default)]
struct RouteBuilder {
    points: Vec<GeoPoint>,
    turns: Vec<TurnInstruction>,
    /// `(point index, elapsed deciseconds)` at each step end
    marks: Vec<(usize, u64)>,
}

impl RouteBuilder {
    fn extend(&mut self, points: impl IntoIterator<Item = GeoPoint>) {
        for p in points {
            if self
                .points
                .last()
                .map_or(true, |last| !last.almost_eq(&p, SAME_POINT_DEG))
            {
                self.points.push(p);
            }
        }
    }

    fn last_index(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    fn mark(&mut self, elapsed_ds: u64) {
        let index = self.last_index();
        match self.marks.last_mut() {
            Some(last) if last.0 == index => last.1 = elapsed_ds,
            _ => self.marks.push((index, elapsed_ds)),
        }
    }

    fn push_turn(&mut self, turn: TurnInstruction) {
        if self.turns.last().is_some_and(|last| last.index >= turn.index) {
            trace!(index = turn.index, "dropping turn on an already announced junction");
            return;
        }
        self.turns.push(turn);
    }
}

/// Pinned structures and node shapes of one leg
struct LegShapes {
    map: MapPin,
    facade: FacadePin,
    shapes: Vec<NodeShape>,
}

impl LegShapes {
    fn build(tile: &Arc<TileResource>, steps: &[PathStep]) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::Internal(format!("empty leg in tile {}", tile.id())));
        }
        let map = tile.pin_map()?;
        let facade = tile.pin_facade()?;
        let shapes = steps
            .iter()
            .map(|step| NodeShape::build(tile, &map, step.node))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            map,
            facade,
            shapes,
        })
    }

    fn tile(&self) -> &Arc<TileResource> {
        self.map.tile()
    }
}

/// A node on one side of a junction, with the leg it belongs to
#[derive(Clone, Copy)]
struct Side<'s> {
    leg: &'s LegShapes,
    shape: &'s NodeShape,
}

/// Builds a [`Route`] from a stitched path
pub struct TurnAnnotator<'a> {
    config: &'a RouterConfig,
}

impl<'a> TurnAnnotator<'a> {
    pub fn new(config: &'a RouterConfig) -> Self {
        Self { config }
    }

    pub fn annotate(&self, path: &StitchedPath) -> Result<Route> {
        let mut builder = RouteBuilder::default();
        let mut elapsed_ds: u64 = 0;

        let legs = path
            .legs
            .iter()
            .map(|leg| LegShapes::build(&leg.tile, &leg.route.steps))
            .collect::<Result<Vec<_>>>()?;

        for (li, (leg, shaped)) in path.legs.iter().zip(&legs).enumerate() {
            let tile = &leg.tile;
            let steps = &leg.route.steps;
            let last = steps.len() - 1;
            for (i, step) in steps.iter().enumerate() {
                let from = (i == 0).then_some(&leg.route.source);
                let to = (i == last).then_some(&leg.route.target);
                builder.extend(shaped.shapes[i].trimmed(tile, from, to)?);
                elapsed_ds += u64::from(step.duration_ds);
                builder.mark(elapsed_ds);

                // The last node of a leg meets the first node of the next
                // leg at the border point
                let next = if i < last {
                    Some((shaped, &shaped.shapes[i + 1], false))
                } else {
                    legs.get(li + 1).map(|next| (next, &next.shapes[0], true))
                };
                let Some((next_leg, next_shape, border)) = next else {
                    continue;
                };
                let turn = self.junction_turn(
                    Side {
                        leg: shaped,
                        shape: &shaped.shapes[i],
                    },
                    Side {
                        leg: next_leg,
                        shape: next_shape,
                    },
                    border,
                    builder.last_index(),
                )?;
                if let Some(turn) = turn {
                    builder.push_turn(turn);
                }
            }
        }
        drop(legs);

        let RouteBuilder {
            points,
            turns,
            marks,
        } = builder;
        let turns = fixup_turns(turns, &points, self.config);

        let total_s = elapsed_ds as f64 / 10.0;
        let times = marks
            .into_iter()
            .map(|(point_index, elapsed)| {
                let elapsed_s = elapsed as f64 / 10.0;
                TimeMark {
                    point_index,
                    elapsed_s,
                    remaining_s: total_s - elapsed_s,
                }
            })
            .collect();

        let turn_geometry = turns
            .iter()
            .map(|turn| self.turn_geometry(&points, turn))
            .collect();

        let route = Route {
            length_m: polyline_length(&points),
            duration_s: total_s,
            tiles: path.tiles(),
            points,
            turns,
            times,
            turn_geometry,
        };
        debug!(
            points = route.points.len(),
            turns = route.turns.len(),
            length_m = route.length_m,
            duration_s = route.duration_s,
            "route annotated"
        );
        Ok(route)
    }

    /// Classify the move from `incoming` onto `outgoing`.
    ///
    /// Alternatives are the successors of the incoming node in its own
    /// tile. At a `border` the outgoing node lives in the next tile and is
    /// never one of them.
    fn junction_turn(
        &self,
        incoming: Side<'_>,
        outgoing: Side<'_>,
        border: bool,
        index: usize,
    ) -> Result<Option<TurnInstruction>> {
        let max_points = self.config.turn_probe_max_points;
        let max_distance = self.config.turn_probe_distance_m;
        let (Some(junction), Some(p_in), Some(p_out)) = (
            SegmentEnd::End.junction(&incoming.shape.points),
            SegmentEnd::End.probe_point(&incoming.shape.points, max_points, max_distance),
            SegmentEnd::Start.probe_point(&outgoing.shape.points, max_points, max_distance),
        ) else {
            return Ok(None);
        };
        let angle = turn_angle(p_in, junction, p_out);

        let tile = incoming.leg.tile();
        let features: &dyn FeatureIndex = tile.features().as_ref();
        let in_segment = incoming.shape.last_segment();
        let out_segment = outgoing.shape.first_segment();
        let taken = (!border).then_some(outgoing.shape.node);

        // Every road leaving the junction except the way back, flagged when
        // it is the one taken
        let mut meeting = usize::from(border);
        let mut legal: Vec<(bool, f64)> = Vec::new();
        if border {
            legal.push((true, angle));
        }
        let successors = incoming.leg.facade.facade().successors(incoming.shape.node);
        for node in successors {
            let shape = NodeShape::build(tile, &incoming.leg.map, node)?;
            let first = shape.first_segment();
            if is_u_turn(&in_segment, &first) {
                continue;
            }
            let Some(p) = SegmentEnd::Start.probe_point(&shape.points, max_points, max_distance)
            else {
                continue;
            };
            // Same road drawn on both sides of the border
            if border && p.almost_eq(&p_out, SAME_POINT_DEG) {
                continue;
            }
            meeting += 1;
            let is_taken = taken == Some(node);
            let oneway = features.feature(first.feature).is_some_and(|f| f.oneway);
            if oneway && !first.is_forward() {
                if is_taken {
                    warn!(tile = %tile.id(), node, "path enters a oneway against its direction");
                    return Ok(None);
                }
                continue;
            }
            legal.push((is_taken, turn_angle(p_in, junction, p)));
        }
        if !legal.iter().any(|(is_taken, _)| *is_taken) {
            legal.push((true, angle));
        }
        legal.sort_by(|a, b| a.1.total_cmp(&b.1));

        let in_info = features.feature(in_segment.feature).unwrap_or_default();
        let out_info = outgoing
            .leg
            .tile()
            .features()
            .feature(out_segment.feature)
            .unwrap_or_default();

        let direction = if let Some(direction) =
            roundabout_direction(in_info.roundabout, out_info.roundabout, legal.len() > 1)
        {
            direction
        } else if legal.len() == 1 {
            // Only way on: announce it only when other roads meet here
            let direction = intermediate_direction(angle);
            if meeting > 1 && !direction.is_straight_or_slight() {
                direction
            } else {
                TurnDirection::NoTurn
            }
        } else if legal.last().is_some_and(|(is_taken, _)| *is_taken) {
            most_right_direction(angle)
        } else if legal.first().is_some_and(|(is_taken, _)| *is_taken) {
            most_left_direction(angle)
        } else {
            intermediate_direction(angle)
        };

        trace!(
            tile = %tile.id(),
            index,
            border,
            angle,
            candidates = legal.len(),
            ?direction,
            "junction"
        );
        if direction == TurnDirection::NoTurn {
            return Ok(None);
        }

        Ok(Some(TurnInstruction {
            index,
            direction,
            roundabout: None,
            source_name: in_info.name,
            target_name: out_info.name,
            in_bearing: bearing(p_in, junction),
            out_bearing: bearing(junction, p_out),
            candidate_angles: legal.into_iter().map(|(_, a)| a).collect(),
        }))
    }

    fn turn_geometry(&self, points: &[GeoPoint], turn: &TurnInstruction) -> TurnGeometry {
        let lo = turn
            .index
            .saturating_sub(self.config.turn_geometry_points_before);
        let hi = (turn.index + self.config.turn_geometry_points_after + 1).min(points.len());
        TurnGeometry {
            index: turn.index,
            turn_point: points[turn.index],
            points: points[lo..hi].to_vec(),
            turn_offset: turn.index - lo,
            candidate_angles: turn.candidate_angles.clone(),
        }
    }
}
