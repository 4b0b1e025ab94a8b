//! Route search within one tile or stitched across tile borders
//!
//! When both endpoints share a tile a single search over all candidate
//! pairs answers the query. Otherwise the stitcher runs a best-first search
//! over `(tile, entry border)` states ordered by accumulated cost: each
//! expansion searches from the state's sources to every exit border of its
//! tile (in parallel, one task per border), and continues in the neighbour
//! from the matching entry node. A state in the final tile only tries to
//! reach the final candidates; the first completed state popped wins.

pub mod border;

pub use border::BorderTask;

use priority_queue::PriorityQueue;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use butterfly_common::{Error, Result};

use crate::candidate::{CandidateSet, GraphNodeCandidate};
use crate::config::RouterConfig;
use crate::engine::{NodeId, PathStep, PhantomNode, RawPath, SearchFacade, TileId};
use crate::tile::{TileCache, TileResource};

use border::{check_adjacency, TilePins};

/// Path through one tile with the candidates it actually used
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRoute {
    pub steps: Vec<PathStep>,
    /// Total cost in deciseconds
    pub weight: u32,
    pub source: GraphNodeCandidate,
    pub target: GraphNodeCandidate,
    pub source_index: usize,
    pub target_index: usize,
}

impl RawRoute {
    fn from_path(
        path: RawPath,
        sources: &[GraphNodeCandidate],
        targets: &[GraphNodeCandidate],
    ) -> Result<Self> {
        let source = sources.get(path.source_index);
        let target = targets.get(path.target_index);
        let (Some(source), Some(target)) = (source, target) else {
            return Err(Error::Internal(format!(
                "search returned candidate indices {}/{} out of range",
                path.source_index, path.target_index
            )));
        };
        Ok(Self {
            steps: path.steps,
            weight: path.weight,
            source: source.clone(),
            target: target.clone(),
            source_index: path.source_index,
            target_index: path.target_index,
        })
    }
}

/// One leg of a stitched path and the tile it runs in
#[derive(Clone)]
pub struct TileLeg {
    pub tile: Arc<TileResource>,
    pub route: RawRoute,
}

/// Legs in travel order; consecutive legs meet on a border point
#[derive(Clone, Default)]
pub struct StitchedPath {
    pub legs: Vec<TileLeg>,
}

impl StitchedPath {
    pub fn tiles(&self) -> Vec<TileId> {
        self.legs.iter().map(|leg| leg.tile.id().clone()).collect()
    }

    pub fn weight(&self) -> u32 {
        self.legs
            .iter()
            .fold(0u32, |total, leg| total.saturating_add(leg.route.weight))
    }
}

/// Resolved candidates of one route endpoint
#[derive(Clone)]
pub struct EndpointCandidates {
    pub tile: Arc<TileResource>,
    pub candidates: CandidateSet,
}

fn phantoms(candidates: &[GraphNodeCandidate]) -> Vec<PhantomNode> {
    candidates.iter().map(|c| c.phantom).collect()
}

fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Acquire) {
        debug!("route search cancelled");
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Consecutive legs must meet: target of leg `i` is the source of `i + 1`
pub(crate) fn check_continuity(legs: &[TileLeg], epsilon: f64) -> Result<()> {
    for (i, pair) in legs.windows(2).enumerate() {
        let end = pair[0].route.target.segment_point;
        let next = pair[1].route.source.segment_point;
        let joined = end.almost_eq(&next, epsilon);
        debug_assert!(joined, "legs {i} and {} do not meet", i + 1);
        if !joined {
            return Err(Error::Internal(format!(
                "legs {i} and {} do not meet: {end:?} vs {next:?}",
                i + 1
            )));
        }
    }
    Ok(())
}

/// Search node of the border traversal
struct Label {
    tile: TileId,
    sources: CandidateSet,
    cost: u32,
    parent: Option<usize>,
    /// Leg that led into this state, or the final leg when complete
    leg: Option<TileLeg>,
    complete: bool,
}

pub struct RouteStitcher<'a> {
    cache: &'a TileCache,
    config: &'a RouterConfig,
}

impl<'a> RouteStitcher<'a> {
    pub fn new(cache: &'a TileCache, config: &'a RouterConfig) -> Self {
        Self { cache, config }
    }

    pub fn route(
        &self,
        start: &EndpointCandidates,
        finish: &EndpointCandidates,
        cancel: &AtomicBool,
    ) -> Result<StitchedPath> {
        let path = if start.tile.id() == finish.tile.id() {
            self.route_in_tile(start, finish, cancel)?
        } else {
            self.route_across(start, finish, cancel)?
        };
        check_continuity(&path.legs, self.config.continuity_epsilon_deg)?;
        let tiles = path.tiles();
        info!(legs = path.legs.len(), ?tiles, weight_ds = path.weight(), "route stitched");
        Ok(path)
    }

    fn route_in_tile(
        &self,
        start: &EndpointCandidates,
        finish: &EndpointCandidates,
        cancel: &AtomicBool,
    ) -> Result<StitchedPath> {
        check_cancel(cancel)?;
        let pin = start.tile.pin_facade()?;
        let path = pin
            .facade()
            .shortest_path(&phantoms(&start.candidates), &phantoms(&finish.candidates))
            .ok_or(Error::RouteNotFound)?;
        let route = RawRoute::from_path(path, &start.candidates, &finish.candidates)?;
        Ok(StitchedPath {
            legs: vec![TileLeg {
                tile: Arc::clone(&start.tile),
                route,
            }],
        })
    }

    fn route_across(
        &self,
        start: &EndpointCandidates,
        finish: &EndpointCandidates,
        cancel: &AtomicBool,
    ) -> Result<StitchedPath> {
        let start_id = start.tile.id().clone();
        let finish_id = finish.tile.id().clone();
        let epsilon = self.config.continuity_epsilon_deg;

        let mut pins = TilePins::new(self.cache);
        pins.insert(&start.tile)?;
        pins.insert(&finish.tile)?;
        check_adjacency(&mut pins, &start_id, &finish_id, self.config.max_stitch_tiles)?;

        let finish_phantoms = phantoms(&finish.candidates);
        let mut labels: Vec<Label> = vec![Label {
            tile: start_id.clone(),
            sources: start.candidates.clone(),
            cost: 0,
            parent: None,
            leg: None,
            complete: false,
        }];
        let mut queue: PriorityQueue<usize, Reverse<(u32, usize)>> = PriorityQueue::new();
        queue.push(0, Reverse((0, 0)));

        let mut settled: HashSet<(TileId, Option<NodeId>)> = HashSet::new();
        let mut missing: Option<String> = None;

        while let Some((idx, Reverse((cost, _)))) = queue.pop() {
            if labels[idx].complete {
                return Ok(self.unwind(labels, idx));
            }

            let tile_id = labels[idx].tile.clone();
            let entry = labels[idx].parent.map(|_| labels[idx].sources[0].phantom.node);
            if !settled.insert((tile_id.clone(), entry)) {
                continue;
            }
            check_cancel(cancel)?;

            let pinned = pins.get(&tile_id)?;
            let tile = Arc::clone(pinned.tile());
            let sources = labels[idx].sources.clone();
            let source_phantoms = phantoms(&sources);

            if tile_id == finish_id {
                let found = pinned
                    .facade
                    .facade()
                    .shortest_path(&source_phantoms, &finish_phantoms);
                if let Some(path) = found {
                    trace!(tile = %tile_id, weight = path.weight, "final leg found");
                    let route = RawRoute::from_path(path, &sources, &finish.candidates)?;
                    let next = labels.len();
                    let total = cost.saturating_add(route.weight);
                    queue.push(next, Reverse((total, next)));
                    labels.push(Label {
                        tile: tile_id,
                        sources: Vec::new(),
                        cost: total,
                        parent: Some(idx),
                        leg: Some(TileLeg { tile, route }),
                        complete: true,
                    });
                }
                continue;
            }

            let tasks = pinned.border_tasks()?;
            let legs: Vec<(BorderTask, RawPath)> = {
                let facade = pinned.facade.facade();
                let facade: &dyn SearchFacade = &*facade;
                tasks
                    .into_par_iter()
                    .filter_map(|task| {
                        let path = facade.shortest_path(&source_phantoms, &phantoms(&task.batch))?;
                        trace!(tile = %task.tile, node = task.border.node, weight = path.weight, "border leg");
                        Some((task, path))
                    })
                    .collect()
            };
            debug!(tile = %tile_id, cost, reached = legs.len(), "expanded tile");

            for (task, path) in legs {
                let neighbor = &task.border.neighbor;
                let entry = match pins.get(neighbor) {
                    Ok(pinned) => pinned.entry_for(&tile_id, &task.border, epsilon)?,
                    Err(Error::TileUnavailable(name)) => {
                        missing.get_or_insert(name);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let Some(entry) = entry else {
                    warn!(
                        tile = %tile_id,
                        neighbor = %neighbor,
                        node = task.border.node,
                        "exit border has no matching entry in neighbour"
                    );
                    continue;
                };

                let route = RawRoute::from_path(path, &sources, &task.batch)?;
                let next = labels.len();
                let total = cost.saturating_add(route.weight);
                queue.push(next, Reverse((total, next)));
                labels.push(Label {
                    tile: neighbor.clone(),
                    sources: vec![entry],
                    cost: total,
                    parent: Some(idx),
                    leg: Some(TileLeg {
                        tile: Arc::clone(&tile),
                        route,
                    }),
                    complete: false,
                });
            }
        }

        match missing {
            Some(name) => Err(Error::TileUnavailable(name)),
            None => Err(Error::RouteNotFound),
        }
    }

    fn unwind(&self, mut labels: Vec<Label>, last: usize) -> StitchedPath {
        debug!(cost = labels[last].cost, "border traversal complete");
        let mut legs = Vec::new();
        let mut current = Some(last);
        while let Some(idx) = current {
            let label = &mut labels[idx];
            legs.extend(label.leg.take());
            current = label.parent;
        }
        legs.reverse();
        StitchedPath { legs }
    }
}
