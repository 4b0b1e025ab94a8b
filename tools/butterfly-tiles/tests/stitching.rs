mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use butterfly_tiles::engine::TileParts;
use butterfly_tiles::memory::{country_fn, load_manifest, JsonTileProvider, MemoryTileProvider};
use butterfly_tiles::{
    Endpoint, Error, GeoPoint, Result, ResultCode, Route, RouteStitcher, Router, RouterConfig,
    TileId, TileProvider, TurnDirection,
};
use common::*;

fn route(router: &Router, from: GeoPoint, to: GeoPoint) -> Result<Route> {
    router.calculate(from, None, to, &AtomicBool::new(false))
}

#[test]
fn test_single_tile_short_route() {
    let router = single_tile().router();
    let from = pt(LAT, 4.0002);
    let to = pt(LAT, 4.0016);

    let start = router.resolve_endpoint(from, None, Endpoint::Start).unwrap();
    let finish = router.resolve_endpoint(to, None, Endpoint::Final).unwrap();
    let path = RouteStitcher::new(router.cache(), router.config())
        .route(&start, &finish, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(path.legs.len(), 1);
    assert_eq!(path.tiles(), vec![TileId::new("a")]);

    let route = route(&router, from, to).unwrap();
    assert!(route.turns.is_empty());
    assert!(route.points[0].almost_eq(&from, 1e-9));
    assert!(route.points.last().unwrap().almost_eq(&to, 1e-9));
    assert!((route.length_m - 100.0).abs() < 2.0, "length {}", route.length_m);

    // Times follow the route and end at zero remaining
    let last = route.times.last().unwrap();
    assert_eq!(last.point_index, route.points.len() - 1);
    assert!(last.remaining_s.abs() < 1e-9);
    assert!(route
        .times
        .windows(2)
        .all(|w| w[0].point_index < w[1].point_index && w[0].elapsed_s <= w[1].elapsed_s));
}

#[test]
fn test_pins_released_after_routing() {
    let router = single_tile().router();
    route(&router, pt(LAT, 4.0002), pt(LAT, 4.0016)).unwrap();

    let tile = router.cache().get(&TileId::new("a")).unwrap();
    assert_eq!(tile.map_count(), 0);
    assert_eq!(tile.facade_count(), 0);
    assert!(!tile.is_facade_loaded());
    assert_eq!(router.cache().len(), 1);
}

#[test]
fn test_two_tiles_join_at_border() {
    let router = two_tiles().router();
    let from = pt(LAT, 4.002);
    let to = pt(LAT, 4.017);

    let start = router.resolve_endpoint(from, None, Endpoint::Start).unwrap();
    let finish = router.resolve_endpoint(to, None, Endpoint::Final).unwrap();
    let path = RouteStitcher::new(router.cache(), router.config())
        .route(&start, &finish, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(path.legs.len(), 2);
    assert_eq!(path.tiles(), vec![TileId::new("a"), TileId::new("b")]);
    let border = pt(LAT, BORDER_LON);
    let end_of_first = path.legs[0].route.target.segment_point;
    let start_of_second = path.legs[1].route.source.segment_point;
    assert!(end_of_first.almost_eq(&border, 1e-6));
    assert!(end_of_first.almost_eq(&start_of_second, 1e-6));

    let route = router.route(&start, &finish, &AtomicBool::new(false)).unwrap();
    assert_eq!(route.tiles.len(), 2);
    assert!(route.turns.is_empty());
    // Border point appears once
    let at_border = route
        .points
        .iter()
        .filter(|p| p.almost_eq(&border, 1e-9))
        .count();
    assert_eq!(at_border, 1);
    assert!(route.points.last().unwrap().almost_eq(&to, 1e-9));
}

#[test]
fn test_two_tiles_reverse_direction() {
    let router = two_tiles().router();
    let route = route(&router, pt(LAT, 4.017), pt(LAT, 4.002)).unwrap();
    assert_eq!(route.tiles, vec![TileId::new("b"), TileId::new("a")]);
}

#[test]
fn test_no_adjacency_is_points_in_different_tiles() {
    let router = disconnected_tiles().router();
    let err = route(&router, pt(LAT, 4.002), pt(LAT, 4.017)).unwrap_err();
    assert!(matches!(err, Error::PointsInDifferentTiles { .. }));
    assert_eq!(err.code(), ResultCode::PointsInDifferentMwm);
}

#[test]
fn test_missing_tile_needs_more_maps() {
    let router = missing_middle_tile().router();
    let err = route(&router, pt(LAT, 4.002), pt(LAT, 4.037)).unwrap_err();
    assert_eq!(err.code(), ResultCode::NeedMoreMaps);
}

#[test]
fn test_unresolvable_points() {
    let router = single_tile().router();
    let outside = route(&router, pt(LAT, 4.0002), pt(LAT, 5.0)).unwrap_err();
    assert_eq!(outside.code(), ResultCode::NeedMoreMaps);

    // Inside the tile but nowhere near a road
    let far = route(&router, pt(LAT + 0.3, 4.0), pt(LAT, 4.0016)).unwrap_err();
    assert_eq!(far.code(), ResultCode::StartPointNotFound);
    let far = route(&router, pt(LAT, 4.0002), pt(LAT - 0.3, 4.0)).unwrap_err();
    assert_eq!(far.code(), ResultCode::EndPointNotFound);
}

#[test]
fn test_right_turn_at_junction() {
    let router = t_junction().router();
    let route = route(&router, pt(LAT, 4.0003), pt(LAT - 0.0007, 4.001)).unwrap();

    assert_eq!(route.turns.len(), 1);
    let turn = &route.turns[0];
    assert_eq!(turn.direction, TurnDirection::Right);
    assert!(route.points[turn.index].almost_eq(&JUNCTION, 1e-9));
    assert_eq!(turn.source_name, "Main Street");
    assert_eq!(turn.target_name, "Side Street");
    assert!((turn.in_bearing - 90.0).abs() < 1.0);
    assert!((turn.out_bearing - 180.0).abs() < 1.0);

    let geometry = &route.turn_geometry[0];
    assert_eq!(geometry.index, turn.index);
    assert!(geometry.points[geometry.turn_offset].almost_eq(&JUNCTION, 1e-9));
}

#[test]
fn test_oneway_and_u_turn_are_not_alternatives() {
    let router = t_junction().router();
    let route = route(&router, pt(LAT, 4.0003), pt(LAT - 0.0007, 4.001)).unwrap();
    let angles = &route.turns[0].candidate_angles;

    // Straight on and right; the oneway to the north and the way back are not
    assert_eq!(angles.len(), 2);
    assert!(angles[0].abs() < 1.0);
    assert!((angles[1] - 90.0).abs() < 1.0);
    assert!(angles.iter().all(|a| *a > -45.0));
}

#[test]
fn test_straight_through_junction_is_silent() {
    let router = t_junction().router();
    let route = route(&router, pt(LAT, 4.0003), pt(LAT, 4.0017)).unwrap();
    // Staying on the main road: straight with the side road on the right
    // reads as keeping left, dropped for sharing the road name
    assert!(route.turns.is_empty(), "{:?}", route.turns);
}

#[test]
fn test_roundabout_exit_number() {
    let router = roundabout().router();
    let route = route(&router, pt(LAT - 0.0012, 4.0), pt(LAT + 0.0012, 4.0)).unwrap();

    let directions: Vec<TurnDirection> = route.turns.iter().map(|t| t.direction).collect();
    assert_eq!(
        directions,
        vec![TurnDirection::EnterRoundabout, TurnDirection::LeaveRoundabout]
    );
    let exit = route.turns[0].roundabout.unwrap();
    assert_eq!(exit.exit_number, 2);
    assert_eq!(exit.net_direction, TurnDirection::GoStraight);
    assert!(route.turns.windows(2).all(|w| w[0].index < w[1].index));
    assert_eq!(route.turn_geometry.len(), 2);
}

#[test]
fn test_json_tiles_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    two_tiles().write_to(dir.path());

    let config = RouterConfig::default();
    let provider = Arc::new(JsonTileProvider::new(dir.path(), config.snap_radius_m));
    let router = Router::new(
        country_fn(load_manifest(dir.path()).unwrap()),
        provider,
        config,
    );
    let route = route(&router, pt(LAT, 4.002), pt(LAT, 4.017)).unwrap();
    assert_eq!(route.tiles.len(), 2);
    assert!(route.duration_s > 0.0);

    let json = serde_json::to_value(&route).unwrap();
    assert!(json["points"].is_array());
}

#[test]
fn test_route_through_middle_tile() {
    let router = three_tiles().router();
    let from = pt(LAT, 4.002);
    let to = pt(LAT, 4.037);

    let start = router.resolve_endpoint(from, None, Endpoint::Start).unwrap();
    let finish = router.resolve_endpoint(to, None, Endpoint::Final).unwrap();
    let path = RouteStitcher::new(router.cache(), router.config())
        .route(&start, &finish, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(
        path.tiles(),
        vec![TileId::new("a"), TileId::new("b"), TileId::new("c")]
    );
    assert!(path.legs[1].route.source.segment_point.almost_eq(&pt(LAT, BORDER_LON), 1e-6));
    assert!(path.legs[1]
        .route
        .target
        .segment_point
        .almost_eq(&pt(LAT, SECOND_BORDER_LON), 1e-6));

    let route = router.route(&start, &finish, &AtomicBool::new(false)).unwrap();
    assert_eq!(route.tiles.len(), 3);
    assert!(route.turns.is_empty(), "{:?}", route.turns);
    for border in [pt(LAT, BORDER_LON), pt(LAT, SECOND_BORDER_LON)] {
        let count = route.points.iter().filter(|p| p.almost_eq(&border, 1e-9)).count();
        assert_eq!(count, 1);
    }
    assert!(route.points.last().unwrap().almost_eq(&to, 1e-9));
}

#[test]
fn test_cheaper_border_crossing_wins() {
    let router = two_crossings().router();
    let start = router
        .resolve_endpoint(pt(LAT, 3.997), None, Endpoint::Start)
        .unwrap();
    let finish = router
        .resolve_endpoint(pt(LAT, 4.018), None, Endpoint::Final)
        .unwrap();
    let path = RouteStitcher::new(router.cache(), router.config())
        .route(&start, &finish, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(path.legs.len(), 2);
    let crossing = path.legs[0].route.target.segment_point;
    assert!(crossing.almost_eq(&SOUTH_CROSSING, 1e-6), "{crossing:?}");
    // 60 + 100 in `a`, 100 + 60 in `b`
    assert_eq!(path.weight(), 320);
}

#[test]
fn test_extreme_weights_do_not_overflow() {
    let router = three_tiles_with_middle_cost(u32::MAX).router();
    let start = router
        .resolve_endpoint(pt(LAT, 4.002), None, Endpoint::Start)
        .unwrap();
    let finish = router
        .resolve_endpoint(pt(LAT, 4.037), None, Endpoint::Final)
        .unwrap();
    let path = RouteStitcher::new(router.cache(), router.config())
        .route(&start, &finish, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(path.legs.len(), 3);
    assert_eq!(path.weight(), u32::MAX);
}

/// Raises a cancel flag when a given tile is opened
struct CancellingProvider {
    inner: MemoryTileProvider,
    tile: TileId,
    cancel: Arc<AtomicBool>,
}

impl TileProvider for CancellingProvider {
    fn open(&self, tile: &TileId) -> Result<TileParts> {
        if *tile == self.tile {
            self.cancel.store(true, Ordering::Release);
        }
        self.inner.open(tile)
    }
}

#[test]
fn test_cancel_observed_between_tile_searches() {
    let fixture = three_tiles();
    let cancel = Arc::new(AtomicBool::new(false));
    let router = fixture.router_with(Arc::new(CancellingProvider {
        inner: fixture.provider(),
        tile: TileId::new("b"),
        cancel: Arc::clone(&cancel),
    }));

    let start = router
        .resolve_endpoint(pt(LAT, 4.002), None, Endpoint::Start)
        .unwrap();
    let finish = router
        .resolve_endpoint(pt(LAT, 4.037), None, Endpoint::Final)
        .unwrap();
    assert!(!cancel.load(Ordering::Acquire));

    // The middle tile is first opened while the stitcher checks adjacency
    let err = RouteStitcher::new(router.cache(), router.config())
        .route(&start, &finish, &cancel)
        .err()
        .unwrap();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(err.code(), ResultCode::Cancelled);
}

#[test]
fn test_no_route_against_oneway() {
    let router = t_junction().router();
    // The only road at the destination is the oneway lane, driven towards
    // the junction
    let err = route(&router, pt(LAT, 4.0003), pt(LAT + 0.0007, 4.001)).unwrap_err();
    assert_eq!(err.code(), ResultCode::RouteNotFound);
}

#[test]
fn test_turn_at_border_junction() {
    let router = border_junction().router();
    let to = pt(LAT - 0.0015, 4.0115);
    let route = route(&router, pt(LAT, 4.003), to).unwrap();

    assert_eq!(route.tiles, vec![TileId::new("a"), TileId::new("b")]);
    assert_eq!(route.turns.len(), 1, "{:?}", route.turns);
    let turn = &route.turns[0];
    assert_eq!(turn.direction, TurnDirection::Right);
    assert!(route.points[turn.index].almost_eq(&pt(LAT, BORDER_LON), 1e-9));
    assert_eq!(turn.source_name, "Main");
    assert_eq!(turn.target_name, "Side Street");
    // The side road and the other road leaving inside `a`
    assert_eq!(turn.candidate_angles.len(), 2);
    assert!(route.points.last().unwrap().almost_eq(&to, 1e-9));
}
