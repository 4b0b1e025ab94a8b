//! Border crossings between tiles
//!
//! Every exit border node of a tile becomes one [`BorderTask`] whose batch
//! is the candidate sitting on the crossing. A task's leg ends exactly on
//! the border point; the matching entry node of the neighbour starts there.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use butterfly_common::{Error, Result};

use crate::candidate::{CandidateSet, GraphNodeCandidate};
use crate::engine::{BorderKind, BorderNode, TileId};
use crate::tile::{FacadePin, MapPin, TileCache, TileResource};

/// Candidates leading out of one tile through one border node
#[derive(Debug, Clone)]
pub struct BorderTask {
    pub tile: TileId,
    pub border: BorderNode,
    pub batch: CandidateSet,
}

/// A tile held loaded for the duration of one stitching run
pub(crate) struct PinnedTile {
    pub facade: FacadePin,
    pub map: MapPin,
    pub borders: Vec<BorderNode>,
}

impl PinnedTile {
    pub fn tile(&self) -> &Arc<TileResource> {
        self.map.tile()
    }

    fn pin(tile: &Arc<TileResource>) -> Result<Self> {
        let facade = tile.pin_facade()?;
        let map = tile.pin_map()?;
        let borders = facade.facade().border_nodes();
        Ok(Self {
            facade,
            map,
            borders,
        })
    }

    fn exits(&self) -> impl Iterator<Item = &BorderNode> {
        self.borders.iter().filter(|b| b.kind == BorderKind::Exit)
    }

    /// One task per exit border node, in border order
    pub fn border_tasks(&self) -> Result<Vec<BorderTask>> {
        self.exits()
            .map(|border| {
                Ok(BorderTask {
                    tile: self.tile().id().clone(),
                    border: border.clone(),
                    batch: vec![GraphNodeCandidate::at_border(border, &self.map)?],
                })
            })
            .collect()
    }

    /// Entry node of this tile continuing `exit` from tile `from`
    pub fn entry_for(
        &self,
        from: &TileId,
        exit: &BorderNode,
        epsilon: f64,
    ) -> Result<Option<GraphNodeCandidate>> {
        let entry = self.borders.iter().find(|b| {
            b.kind == BorderKind::Entry
                && &b.neighbor == from
                && b.point.almost_eq(&exit.point, epsilon)
        });
        entry
            .map(|b| GraphNodeCandidate::at_border(b, &self.map))
            .transpose()
    }
}

/// Tiles pinned so far, loaded at most once per stitching run
pub(crate) struct TilePins<'a> {
    cache: &'a TileCache,
    pinned: HashMap<TileId, PinnedTile>,
}

impl<'a> TilePins<'a> {
    pub fn new(cache: &'a TileCache) -> Self {
        Self {
            cache,
            pinned: HashMap::new(),
        }
    }

    pub fn insert(&mut self, tile: &Arc<TileResource>) -> Result<&PinnedTile> {
        let id = tile.id().clone();
        if !self.pinned.contains_key(&id) {
            self.pinned.insert(id.clone(), PinnedTile::pin(tile)?);
        }
        self.pinned
            .get(&id)
            .ok_or_else(|| Error::Internal(format!("tile {id} not pinned")))
    }

    pub fn get(&mut self, id: &TileId) -> Result<&PinnedTile> {
        if !self.pinned.contains_key(id) {
            let tile = self.cache.get(id)?;
            self.pinned.insert(id.clone(), PinnedTile::pin(&tile)?);
        }
        self.pinned
            .get(id)
            .ok_or_else(|| Error::Internal(format!("tile {id} not pinned")))
    }
}

/// Check that `finish` is reachable from `start` through exit borders.
///
/// Fails with `TileUnavailable` when the search ran into a tile that could
/// not be opened, `PointsInDifferentTiles` when no chain of borders exists
/// within `max_tiles` tiles.
pub(crate) fn check_adjacency(
    pins: &mut TilePins<'_>,
    start: &TileId,
    finish: &TileId,
    max_tiles: usize,
) -> Result<()> {
    let mut seen: HashSet<TileId> = HashSet::from([start.clone()]);
    let mut queue = VecDeque::from([start.clone()]);
    let mut missing: Option<TileId> = None;

    while let Some(id) = queue.pop_front() {
        let neighbors: Vec<TileId> = match pins.get(&id) {
            Ok(tile) => tile.exits().map(|b| b.neighbor.clone()).collect(),
            Err(Error::TileUnavailable(_)) => {
                missing.get_or_insert(id);
                continue;
            }
            Err(e) => return Err(e),
        };

        for neighbor in neighbors {
            if &neighbor == finish {
                debug!(%start, %finish, tiles = seen.len() + 1, "tiles connected");
                return Ok(());
            }
            if seen.len() >= max_tiles {
                warn!(%start, %finish, max_tiles, "tile adjacency search exhausted");
                break;
            }
            if seen.insert(neighbor.clone()) {
                queue.push_back(neighbor);
            }
        }
    }

    match missing {
        Some(tile) => Err(Error::TileUnavailable(tile.to_string())),
        None => Err(Error::PointsInDifferentTiles {
            start: start.to_string(),
            finish: finish.to_string(),
        }),
    }
}
