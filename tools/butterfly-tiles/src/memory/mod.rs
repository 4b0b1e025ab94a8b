//! Reference tile backend
//!
//! Tiles are JSON [`TileDocument`]s. [`JsonTileProvider`] memory-maps
//! `<dir>/<tile>.json` and takes the point to tile lookup from
//! `<dir>/manifest.json`; [`MemoryTileProvider`] serves documents kept in
//! memory and is what the tests build fixtures with.

pub mod format;
pub mod graph;

pub use format::{FeatureRecord, Manifest, NodeRecord, TileDocument, TileExtent};
pub use graph::{MemoryFacade, MemoryFeatures, MemoryMapping};

use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use butterfly_common::{Error, Result};

use crate::engine::{CountryFn, TileContainer, TileId, TileParts, TileProvider};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Read-only memory map of a tile file
pub struct MmapContainer {
    map: Option<Mmap>,
}

impl TileContainer for MmapContainer {
    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or_default()
    }

    fn close(&mut self) {
        self.map = None;
    }
}

/// Tile bytes owned in memory
pub struct BytesContainer {
    bytes: Arc<[u8]>,
    open: bool,
}

impl TileContainer for BytesContainer {
    fn bytes(&self) -> &[u8] {
        if self.open {
            &self.bytes
        } else {
            &[]
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

fn parts(tile: &TileId, container: Box<dyn TileContainer>, snap_radius_m: f64) -> Result<TileParts> {
    let features = MemoryFeatures::decode(tile.as_str(), container.bytes())?;
    Ok(TileParts {
        container,
        facade: Box::new(MemoryFacade::new(tile.as_str(), snap_radius_m)),
        mapping: Box::new(MemoryMapping::new(tile.as_str())),
        features: Arc::new(features),
    })
}

/// Opens memory-mapped JSON tiles from a directory
pub struct JsonTileProvider {
    dir: PathBuf,
    snap_radius_m: f64,
}

impl JsonTileProvider {
    pub fn new(dir: impl Into<PathBuf>, snap_radius_m: f64) -> Self {
        Self {
            dir: dir.into(),
            snap_radius_m,
        }
    }

    pub fn tile_path(&self, tile: &TileId) -> PathBuf {
        self.dir.join(format!("{tile}.json"))
    }
}

impl TileProvider for JsonTileProvider {
    fn open(&self, tile: &TileId) -> Result<TileParts> {
        let path = self.tile_path(tile);
        let file = File::open(&path).map_err(|e| {
            debug!(path = %path.display(), error = %e, "tile file not available");
            Error::TileUnavailable(tile.to_string())
        })?;
        // SAFETY: tile files are written once by the packaging step and
        // never modified while a router has them open.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| {
            Error::inconsistent(tile.as_str(), format!("failed to map {}: {e}", path.display()))
        })?;
        info!(tile = %tile, bytes = map.len(), "opened tile file");
        parts(tile, Box::new(MmapContainer { map: Some(map) }), self.snap_radius_m)
    }
}

/// Serves tile documents held in memory
#[derive(Default)]
pub struct MemoryTileProvider {
    tiles: HashMap<TileId, Arc<[u8]>>,
    snap_radius_m: f64,
}

impl MemoryTileProvider {
    pub fn new(snap_radius_m: f64) -> Self {
        Self {
            tiles: HashMap::new(),
            snap_radius_m,
        }
    }

    pub fn insert(&mut self, tile: impl Into<TileId>, doc: &TileDocument) -> Result<()> {
        let tile = tile.into();
        let bytes = serde_json::to_vec(doc)
            .map_err(|e| Error::inconsistent(tile.as_str(), e.to_string()))?;
        self.tiles.insert(tile, Arc::from(bytes));
        Ok(())
    }

    pub fn with_tile(mut self, tile: impl Into<TileId>, doc: &TileDocument) -> Result<Self> {
        self.insert(tile, doc)?;
        Ok(self)
    }
}

impl TileProvider for MemoryTileProvider {
    fn open(&self, tile: &TileId) -> Result<TileParts> {
        let bytes = self
            .tiles
            .get(tile)
            .ok_or_else(|| Error::TileUnavailable(tile.to_string()))?;
        let container = BytesContainer {
            bytes: Arc::clone(bytes),
            open: true,
        };
        parts(tile, Box::new(container), self.snap_radius_m)
    }
}

pub fn load_manifest(dir: &Path) -> anyhow::Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("invalid manifest {}: {e}", path.display()))?;
    info!(tiles = manifest.tiles.len(), "loaded tile manifest");
    Ok(manifest)
}

/// Point to tile lookup backed by the manifest extents
pub fn country_fn(manifest: Manifest) -> CountryFn {
    Arc::new(move |p| manifest.tile_for(p))
}
