//! The synchronous routing pipeline
//!
//! resolve candidates → stitch → annotate. [`crate::controller`] runs it on
//! a worker thread; the CLI calls it directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use butterfly_common::{Error, Result};

use crate::candidate::{CandidateResolver, Endpoint};
use crate::config::RouterConfig;
use crate::engine::{CountryFn, TileProvider};
use crate::geo::GeoPoint;
use crate::stitch::{EndpointCandidates, RouteStitcher};
use crate::tile::TileCache;
use crate::turns::{Route, TurnAnnotator};

pub struct Router {
    cache: TileCache,
    resolver: CandidateResolver,
    config: RouterConfig,
}

impl Router {
    pub fn new(country_fn: CountryFn, provider: Arc<dyn TileProvider>, config: RouterConfig) -> Self {
        Self {
            cache: TileCache::new(country_fn, provider),
            resolver: CandidateResolver::new(),
            config,
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn resolver(&self) -> &CandidateResolver {
        &self.resolver
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Tile and graph candidates for one route endpoint
    pub fn resolve_endpoint(
        &self,
        point: GeoPoint,
        heading: Option<f64>,
        endpoint: Endpoint,
    ) -> Result<EndpointCandidates> {
        let tile = self.cache.resolve(point)?;
        let candidates = self.resolver.find_candidates(
            point,
            heading,
            &tile,
            self.config.max_candidates,
            endpoint,
        )?;
        Ok(EndpointCandidates { tile, candidates })
    }

    /// Stitch and annotate a route between resolved endpoints
    pub fn route(
        &self,
        start: &EndpointCandidates,
        finish: &EndpointCandidates,
        cancel: &AtomicBool,
    ) -> Result<Route> {
        let started = Instant::now();
        let path = RouteStitcher::new(&self.cache, &self.config).route(start, finish, cancel)?;

        if cancel.load(Ordering::Acquire) {
            debug!("cancelled before turn annotation");
            return Err(Error::Cancelled);
        }
        let route = TurnAnnotator::new(&self.config).annotate(&path)?;

        info!(
            legs = path.legs.len(),
            turns = route.turns.len(),
            length_m = route.length_m,
            duration_s = route.duration_s,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "route computed"
        );
        Ok(route)
    }

    /// Whole pipeline for a one-off query
    pub fn calculate(
        &self,
        start: GeoPoint,
        heading: Option<f64>,
        finish: GeoPoint,
        cancel: &AtomicBool,
    ) -> Result<Route> {
        let start = self.resolve_endpoint(start, heading, Endpoint::Start)?;
        let finish = self.resolve_endpoint(finish, None, Endpoint::Final)?;
        self.route(&start, &finish, cancel)
    }

    /// Drop every cached tile
    pub fn clear(&self) {
        self.cache.clear();
    }
}
