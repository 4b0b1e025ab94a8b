//! Single-flight, cancellable route computation
//!
//! At most one worker thread runs the pipeline at a time; the `in_flight`
//! flag is the only thing deciding who may start one. A request arriving
//! while a computation runs waits in a one-slot queue and replaces any
//! request already waiting there, which is answered with `Cancelled`.
//!
//! The waiting request, the cancel flag of the running one and the
//! callbacks of displaced requests share one lock. A request leaves the
//! queue and becomes the running one in a single step, so `cancel()` always
//! finds it in one place or the other. Every callback, including the
//! `Cancelled` answer for a displaced request, runs on the worker thread.
//!
//! The worker drains the queue, clears `in_flight`, then checks the queue
//! again: a caller that queued in between saw the flag still set and left
//! the request for it.
//!
//! Each request carries its own cancel flag, so a `cancel()` aimed at one
//! request can never be wiped out by the start of another.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use butterfly_common::{Error, Result, ResultCode};

use crate::candidate::Endpoint;
use crate::geo::GeoPoint;
use crate::router::Router;
use crate::stitch::EndpointCandidates;
use crate::turns::Route;

/// Receives the outcome of one `calculate_route` call, exactly once
pub type RouteCallback = Box<dyn FnOnce(ResultCode, Option<Route>) + Send>;

const WORKER_NAME: &str = "route-worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerState {
    Idle = 0,
    Computing = 1,
    Ready = 2,
    Cancelled = 3,
    Failed = 4,
}

impl ControllerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ControllerState::Computing,
            2 => ControllerState::Ready,
            3 => ControllerState::Cancelled,
            4 => ControllerState::Failed,
            _ => ControllerState::Idle,
        }
    }
}

struct CachedFinal {
    point: GeoPoint,
    candidates: EndpointCandidates,
}

/// Query parameters, guarded by the params lock
#[derive(Default)]
struct QueryState {
    start: Option<GeoPoint>,
    heading: Option<f64>,
    finish: Option<GeoPoint>,
    cached_final: Option<CachedFinal>,
}

struct Request {
    start: GeoPoint,
    heading: Option<f64>,
    cancel: Arc<AtomicBool>,
    callback: RouteCallback,
}

/// Work handed to the worker
#[derive(Default)]
struct Slots {
    pending: Option<Request>,
    /// Cancel flag of the request being computed
    running: Option<Arc<AtomicBool>>,
    /// Callbacks still owed a `Cancelled` answer
    displaced: Vec<RouteCallback>,
}

impl Slots {
    fn has_work(&self) -> bool {
        self.pending.is_some() || !self.displaced.is_empty()
    }

    /// Move the waiting request, if any, to the displaced callbacks
    fn displace_pending(&mut self) {
        if let Some(request) = self.pending.take() {
            self.displaced.push(request.callback);
        }
    }
}

struct Shared {
    router: Arc<Router>,
    state: AtomicU8,
    in_flight: AtomicBool,
    slots: Mutex<Slots>,
    params: Mutex<QueryState>,
    route: Mutex<Option<Route>>,
    last_code: Mutex<Option<ResultCode>>,
}

impl Shared {
    fn set_state(&self, state: ControllerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Take the worker role when work waits and no worker runs
    fn claim(&self) -> bool {
        self.slots.lock().has_work()
            && self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Displaced callbacks to answer and the next request to run
    fn next_job(&self) -> (Vec<RouteCallback>, Option<Request>) {
        let mut slots = self.slots.lock();
        let displaced = std::mem::take(&mut slots.displaced);
        let next = slots.pending.take();
        slots.running = next.as_ref().map(|request| Arc::clone(&request.cancel));
        if next.is_some() {
            self.set_state(ControllerState::Computing);
        } else if displaced.is_empty() {
            self.set_state(ControllerState::Idle);
        }
        (displaced, next)
    }

    fn work(self: Arc<Self>) {
        loop {
            let (displaced, next) = self.next_job();
            if displaced.is_empty() && next.is_none() {
                self.in_flight.store(false, Ordering::Release);
                if !self.claim() {
                    break;
                }
                continue;
            }
            for callback in displaced {
                self.deliver(callback, ResultCode::Cancelled, None);
            }
            if let Some(request) = next {
                self.run(request);
            }
        }
        debug!("route worker idle");
    }

    fn deliver(&self, callback: RouteCallback, code: ResultCode, route: Option<Route>) {
        *self.last_code.lock() = Some(code);
        callback(code, route);
    }

    fn run(&self, request: Request) {
        let outcome = self.compute(request.start, request.heading, &request.cancel);
        let (state, code, route) = match outcome {
            Ok(route) => {
                *self.route.lock() = Some(route.clone());
                (ControllerState::Ready, ResultCode::NoError, Some(route))
            }
            Err(Error::Cancelled) => {
                info!("route computation cancelled");
                (ControllerState::Cancelled, ResultCode::Cancelled, None)
            }
            Err(e) => {
                warn!(error = %e, code = ?e.code(), "route computation failed");
                (ControllerState::Failed, e.code(), None)
            }
        };

        self.slots.lock().running = None;
        self.set_state(state);
        self.deliver(request.callback, code, route);
    }

    fn compute(&self, start: GeoPoint, heading: Option<f64>, cancel: &AtomicBool) -> Result<Route> {
        if cancel.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        let (finish, cached) = {
            let params = self.params.lock();
            let cached = params.cached_final.as_ref().and_then(|c| {
                (Some(c.point) == params.finish).then(|| c.candidates.clone())
            });
            (params.finish, cached)
        };
        let finish = finish.ok_or(Error::EndPointNotFound)?;

        let start_candidates = self
            .router
            .resolve_endpoint(start, heading, Endpoint::Start)?;
        let final_candidates = match cached {
            Some(candidates) => {
                debug!("reusing cached final candidates");
                candidates
            }
            None => {
                let candidates = self.router.resolve_endpoint(finish, None, Endpoint::Final)?;
                let mut params = self.params.lock();
                // The caller may have moved the final point meanwhile
                if params.finish == Some(finish) {
                    params.cached_final = Some(CachedFinal {
                        point: finish,
                        candidates: candidates.clone(),
                    });
                }
                candidates
            }
        };

        self.router
            .route(&start_candidates, &final_candidates, cancel)
    }
}

/// Runs route computations for a caller on a worker thread
pub struct AsyncRouteController {
    shared: Arc<Shared>,
}

impl AsyncRouteController {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            shared: Arc::new(Shared {
                router,
                state: AtomicU8::new(ControllerState::Idle as u8),
                in_flight: AtomicBool::new(false),
                slots: Mutex::new(Slots::default()),
                params: Mutex::new(QueryState::default()),
                route: Mutex::new(None),
                last_code: Mutex::new(None),
            }),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.shared.router
    }

    pub fn state(&self) -> ControllerState {
        ControllerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// True while a worker owns the computation slot
    pub fn is_computing(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Code delivered to the most recent callback
    pub fn last_result(&self) -> Option<ResultCode> {
        *self.shared.last_code.lock()
    }

    /// Last successfully computed route
    pub fn last_route(&self) -> Option<Route> {
        self.shared.route.lock().clone()
    }

    pub fn start_point(&self) -> Option<(GeoPoint, Option<f64>)> {
        let params = self.shared.params.lock();
        params.start.map(|start| (start, params.heading))
    }

    pub fn final_point(&self) -> Option<GeoPoint> {
        self.shared.params.lock().finish
    }

    /// Set the destination; cached final candidates survive only if unchanged
    pub fn set_final_point(&self, point: GeoPoint) {
        let mut params = self.shared.params.lock();
        if params.finish != Some(point) {
            params.finish = Some(point);
            params.cached_final = None;
            debug!(lat = point.lat, lon = point.lon, "final point changed");
        }
    }

    pub fn calculate_route(
        &self,
        start: GeoPoint,
        heading: Option<f64>,
        callback: impl FnOnce(ResultCode, Option<Route>) + Send + 'static,
    ) {
        {
            let mut params = self.shared.params.lock();
            params.start = Some(start);
            params.heading = heading;
        }

        {
            let mut slots = self.shared.slots.lock();
            if slots.pending.is_some() {
                debug!("queued request replaced by a newer one");
                slots.displace_pending();
            }
            slots.pending = Some(Request {
                start,
                heading,
                cancel: Arc::new(AtomicBool::new(false)),
                callback: Box::new(callback),
            });
            self.shared.set_state(ControllerState::Computing);
        }

        if !self.shared.claim() {
            debug!("computation in flight, request queued");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || shared.work());
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start route worker");
            let (stranded, displaced) = {
                let mut slots = self.shared.slots.lock();
                (slots.pending.take(), std::mem::take(&mut slots.displaced))
            };
            self.shared.in_flight.store(false, Ordering::Release);
            self.shared.set_state(ControllerState::Failed);
            for callback in displaced {
                self.shared.deliver(callback, ResultCode::Cancelled, None);
            }
            if let Some(request) = stranded {
                self.shared
                    .deliver(request.callback, ResultCode::InternalError, None);
            }
        }
    }

    /// Stop the running computation and drop any queued request
    pub fn cancel(&self) {
        let mut slots = self.shared.slots.lock();
        slots.displace_pending();
        if let Some(running) = &slots.running {
            debug!("cancelling route computation");
            running.store(true, Ordering::Release);
        }
    }

    /// Cancel, forget cached final candidates and drop all cached tiles
    pub fn clear_state(&self) {
        self.cancel();
        self.shared.params.lock().cached_final = None;
        self.shared.router.clear();
        info!("routing state cleared");
    }
}

impl Drop for AsyncRouteController {
    fn drop(&mut self) {
        self.cancel();
    }
}
