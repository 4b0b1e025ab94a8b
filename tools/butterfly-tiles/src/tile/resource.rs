//! Per-tile graph data with separately refcounted mapping and facade
//!
//! Keeping a tile mapped is cheap, loading its search structures is not, so
//! the two are counted independently. A counter and the residency it drives
//! change together under the counter's mutex: the 0→1 acquire loads, the
//! 1→0 release unloads, and no caller ever sees a positive count with the
//! data absent.

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use std::sync::Arc;
use tracing::{debug, warn};

use butterfly_common::{Error, Result};

use crate::engine::{
    FeatureIndex, FeatureSegment, NodeId, SearchFacade, SegmentIndex, TileContainer, TileId,
    TileParts,
};

/// A refcounted, lazily loaded part of a tile
struct Counted<T: ?Sized> {
    count: Mutex<usize>,
    data: RwLock<Box<T>>,
}

impl<T: ?Sized> Counted<T> {
    fn new(data: Box<T>) -> Self {
        Self {
            count: Mutex::new(0),
            data: RwLock::new(data),
        }
    }

    fn count(&self) -> usize {
        *self.count.lock()
    }

    fn acquire(&self, load: impl FnOnce(&mut T) -> Result<()>) -> Result<usize> {
        let mut count = self.count.lock();
        if *count == 0 {
            load(&mut **self.data.write())?;
        }
        *count += 1;
        Ok(*count)
    }

    fn release(&self, unload: impl FnOnce(&mut T)) -> Result<usize> {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "reference count released below zero");
        if *count == 0 {
            return Err(Error::Internal(
                "reference count released below zero".to_string(),
            ));
        }
        *count -= 1;
        if *count == 0 {
            unload(&mut **self.data.write());
        }
        Ok(*count)
    }
}

/// Graph-search data, segment mapping and backing container of one tile
pub struct TileResource {
    id: TileId,
    facade: Counted<dyn SearchFacade>,
    mapping: Counted<dyn SegmentIndex>,
    features: Arc<dyn FeatureIndex>,
    container: RwLock<Box<dyn TileContainer>>,
}

impl TileResource {
    pub fn new(id: TileId, parts: TileParts) -> Self {
        Self {
            id,
            facade: Counted::new(parts.facade),
            mapping: Counted::new(parts.mapping),
            features: parts.features,
            container: RwLock::new(parts.container),
        }
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn features(&self) -> &Arc<dyn FeatureIndex> {
        &self.features
    }

    pub fn map_count(&self) -> usize {
        self.mapping.count()
    }

    pub fn facade_count(&self) -> usize {
        self.facade.count()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.data.read().is_mapped()
    }

    pub fn is_facade_loaded(&self) -> bool {
        self.facade.data.read().is_loaded()
    }

    pub fn acquire_map(&self) -> Result<()> {
        let count = self.mapping.acquire(|mapping| {
            debug!(tile = %self.id, "mapping segment index");
            mapping.map(&**self.container.read())
        })?;
        debug!(tile = %self.id, map_count = count, "acquire_map");
        Ok(())
    }

    pub fn release_map(&self) -> Result<()> {
        let count = self.mapping.release(|mapping| {
            debug!(tile = %self.id, "unmapping segment index");
            mapping.unmap();
        })?;
        debug!(tile = %self.id, map_count = count, "release_map");
        Ok(())
    }

    pub fn acquire_facade(&self) -> Result<()> {
        let count = self.facade.acquire(|facade| {
            debug!(tile = %self.id, "loading search facade");
            facade.load(&**self.container.read())
        })?;
        debug!(tile = %self.id, facade_count = count, "acquire_facade");
        Ok(())
    }

    pub fn release_facade(&self) -> Result<()> {
        let count = self.facade.release(|facade| {
            debug!(tile = %self.id, "clearing search facade");
            facade.clear();
        })?;
        debug!(tile = %self.id, facade_count = count, "release_facade");
        Ok(())
    }

    /// Keep the segment mapping resident while the pin lives
    pub fn pin_map(self: &Arc<Self>) -> Result<MapPin> {
        self.acquire_map()?;
        Ok(MapPin {
            tile: Arc::clone(self),
        })
    }

    /// Keep the search facade loaded while the pin lives
    pub fn pin_facade(self: &Arc<Self>) -> Result<FacadePin> {
        self.acquire_facade()?;
        Ok(FacadePin {
            tile: Arc::clone(self),
        })
    }
}

impl Drop for TileResource {
    fn drop(&mut self) {
        // Later-acquired structures may view into the container: release
        // them before closing it.
        self.facade.data.get_mut().clear();
        self.mapping.data.get_mut().unmap();
        self.container.get_mut().close();
        debug!(tile = %self.id, "tile resource released");
    }
}

/// Holds a tile's segment mapping resident
pub struct MapPin {
    tile: Arc<TileResource>,
}

impl MapPin {
    pub fn tile(&self) -> &Arc<TileResource> {
        &self.tile
    }

    pub fn segments(&self, node: NodeId) -> Vec<FeatureSegment> {
        self.tile.mapping.data.read().segments(node)
    }
}

impl Drop for MapPin {
    fn drop(&mut self) {
        if let Err(e) = self.tile.release_map() {
            warn!(tile = %self.tile.id, error = %e, "failed to release mapping pin");
        }
    }
}

/// Holds a tile's search facade loaded
pub struct FacadePin {
    tile: Arc<TileResource>,
}

impl FacadePin {
    pub fn facade(&self) -> MappedRwLockReadGuard<'_, dyn SearchFacade> {
        RwLockReadGuard::map(self.tile.facade.data.read(), |facade| &**facade)
    }
}

impl Drop for FacadePin {
    fn drop(&mut self) {
        if let Err(e) = self.tile.release_facade() {
            warn!(tile = %self.tile.id, error = %e, "failed to release facade pin");
        }
    }
}
