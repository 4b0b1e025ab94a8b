//! Construct-once, share-always cache of tile resources
//!
//! The shared map is a `DashMap`: the entry API holds the shard lock while a
//! missing tile is opened, so concurrent callers for one tile observe a
//! single construction while other tiles stay reachable.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use butterfly_common::{Error, Result};

use crate::engine::{CountryFn, TileId, TileProvider};
use crate::geo::GeoPoint;

use super::resource::TileResource;

pub struct TileCache {
    country_fn: CountryFn,
    provider: Arc<dyn TileProvider>,
    tiles: DashMap<TileId, Arc<TileResource>>,
}

impl TileCache {
    pub fn new(country_fn: CountryFn, provider: Arc<dyn TileProvider>) -> Self {
        Self {
            country_fn,
            provider,
            tiles: DashMap::new(),
        }
    }

    /// Tile identifier covering `point`
    pub fn tile_id_for(&self, point: GeoPoint) -> Result<TileId> {
        (self.country_fn)(point).ok_or(Error::PointOutsideTiles {
            lat: point.lat,
            lon: point.lon,
        })
    }

    /// Shared handle to the tile covering `point`
    pub fn resolve(&self, point: GeoPoint) -> Result<Arc<TileResource>> {
        let id = self.tile_id_for(point)?;
        self.get(&id)
    }

    /// Shared handle to a tile by name, opening it on first access
    pub fn get(&self, id: &TileId) -> Result<Arc<TileResource>> {
        if let Some(tile) = self.tiles.get(id) {
            return Ok(Arc::clone(tile.value()));
        }

        match self.tiles.entry(id.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                debug!(tile = %id, "opening tile");
                let parts = self.provider.open(id)?;
                let tile = Arc::new(TileResource::new(id.clone(), parts));
                entry.insert(Arc::clone(&tile));
                Ok(tile)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Drop every shared handle; tiles die with their last external holder
    pub fn clear(&self) {
        info!(tiles = self.tiles.len(), "clearing tile cache");
        self.tiles.clear();
    }
}
