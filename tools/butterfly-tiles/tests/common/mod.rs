//! Programmatic tile fixtures shared by the integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use butterfly_tiles::engine::{BorderKind, BorderNode, FeatureId, FeatureInfo, FeatureSegment, NodeId};
use butterfly_tiles::memory::{
    country_fn, FeatureRecord, Manifest, MemoryTileProvider, NodeRecord, TileDocument, TileExtent,
    MANIFEST_FILE,
};
use butterfly_tiles::{GeoPoint, Router, RouterConfig, TileId, TileProvider};

pub const LAT: f64 = 50.0;

pub fn pt(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint::new(lat, lon)
}

#[derive(Default)]
pub struct TileBuilder {
    doc: TileDocument,
    next_feature: FeatureId,
    next_node: NodeId,
}

impl TileBuilder {
    pub fn new() -> Self {
        Self {
            next_feature: 1,
            next_node: 1,
            ..Self::default()
        }
    }

    pub fn road(&mut self, name: &str, points: &[GeoPoint]) -> FeatureId {
        self.feature(
            FeatureInfo {
                name: name.to_string(),
                ..FeatureInfo::default()
            },
            points,
        )
    }

    pub fn feature(&mut self, info: FeatureInfo, points: &[GeoPoint]) -> FeatureId {
        let id = self.next_feature;
        self.next_feature += 1;
        self.doc.features.push(FeatureRecord {
            id,
            info,
            points: points.iter().map(|p| [p.lon, p.lat]).collect(),
        });
        id
    }

    /// Node walking feature points `start..=end`
    pub fn node(&mut self, feature: FeatureId, start: u32, end: u32, duration_ds: u32) -> NodeId {
        let id = self.next_node;
        self.next_node += 1;
        self.doc.nodes.push(NodeRecord {
            id,
            duration_ds,
            segments: vec![FeatureSegment {
                feature,
                start,
                end,
            }],
            successors: Vec::new(),
        });
        id
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if let Some(node) = self.doc.nodes.iter_mut().find(|n| n.id == from) {
            node.successors.push(to);
        }
    }

    pub fn border(&mut self, node: NodeId, neighbor: &str, kind: BorderKind, point: GeoPoint) {
        self.doc.borders.push(BorderNode {
            node,
            neighbor: TileId::new(neighbor),
            kind,
            point,
        });
    }

    pub fn build(self) -> TileDocument {
        self.doc
    }
}

pub fn extent(id: &str, min_lon: f64, max_lon: f64) -> TileExtent {
    TileExtent {
        id: TileId::new(id),
        min_lon,
        min_lat: LAT - 0.5,
        max_lon,
        max_lat: LAT + 0.5,
    }
}

pub struct Fixture {
    pub manifest: Manifest,
    pub tiles: Vec<(&'static str, TileDocument)>,
}

impl Fixture {
    pub fn provider(&self) -> MemoryTileProvider {
        let mut provider = MemoryTileProvider::new(RouterConfig::default().snap_radius_m);
        for (id, doc) in &self.tiles {
            provider.insert(*id, doc).unwrap();
        }
        provider
    }

    pub fn router(&self) -> Router {
        self.router_with(Arc::new(self.provider()))
    }

    pub fn router_with(&self, provider: Arc<dyn TileProvider>) -> Router {
        Router::new(
            country_fn(self.manifest.clone()),
            provider,
            RouterConfig::default(),
        )
    }

    /// Write tiles and manifest as JSON files
    pub fn write_to(&self, dir: &Path) {
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec(&self.manifest).unwrap(),
        )
        .unwrap();
        for (id, doc) in &self.tiles {
            std::fs::write(
                dir.join(format!("{id}.json")),
                serde_json::to_vec(doc).unwrap(),
            )
            .unwrap();
        }
    }
}

/// Add a two-way road split into nodes at the given point indices.
///
/// Returns the forward nodes and the backward nodes, each in travel order.
pub fn two_way(
    tile: &mut TileBuilder,
    name: &str,
    points: &[GeoPoint],
    splits: &[u32],
) -> (Vec<NodeId>, Vec<NodeId>) {
    two_way_timed(tile, name, points, splits, 100)
}

/// [`two_way`] with every node costing `duration_ds`
pub fn two_way_timed(
    tile: &mut TileBuilder,
    name: &str,
    points: &[GeoPoint],
    splits: &[u32],
    duration_ds: u32,
) -> (Vec<NodeId>, Vec<NodeId>) {
    let road = tile.road(name, points);
    let forward: Vec<NodeId> = splits
        .windows(2)
        .map(|w| tile.node(road, w[0], w[1], duration_ds))
        .collect();
    let backward: Vec<NodeId> = splits
        .windows(2)
        .rev()
        .map(|w| tile.node(road, w[1], w[0], duration_ds))
        .collect();
    for pair in forward.windows(2).chain(backward.windows(2)) {
        tile.connect(pair[0], pair[1]);
    }
    (forward, backward)
}

/// One tile, one straight ~143 m east-west road
pub fn single_tile() -> Fixture {
    let mut tile = TileBuilder::new();
    let points: Vec<GeoPoint> = (0..5).map(|i| pt(LAT, 4.0 + i as f64 * 0.0005)).collect();
    two_way(&mut tile, "Rue Haute", &points, &[0, 2, 4]);
    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, 4.01)],
        },
        tiles: vec![("a", tile.build())],
    }
}

pub const BORDER_LON: f64 = 4.01;

/// Tiles `a` and `b` joined by one road crossing their shared border
pub fn two_tiles() -> Fixture {
    let border = pt(LAT, BORDER_LON);

    let mut a = TileBuilder::new();
    let (fwd, back) = two_way(
        &mut a,
        "Chaussee",
        &[pt(LAT, 4.0), pt(LAT, 4.005), border],
        &[0, 1, 2],
    );
    a.border(fwd[1], "b", BorderKind::Exit, border);
    a.border(back[0], "b", BorderKind::Entry, border);

    let mut b = TileBuilder::new();
    let (fwd, back) = two_way(
        &mut b,
        "Chaussee",
        &[border, pt(LAT, 4.015), pt(LAT, 4.02)],
        &[0, 1, 2],
    );
    b.border(fwd[0], "a", BorderKind::Entry, border);
    b.border(back[1], "a", BorderKind::Exit, border);

    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, BORDER_LON), extent("b", BORDER_LON, 4.03)],
        },
        tiles: vec![("a", a.build()), ("b", b.build())],
    }
}

/// Two-way east-west road from `west` to `east` joined to the named
/// neighbour tiles at its ends
pub fn chain_tile(
    name: &str,
    west: GeoPoint,
    east: GeoPoint,
    west_tile: Option<&str>,
    east_tile: Option<&str>,
    duration_ds: u32,
) -> TileDocument {
    let mid = pt(LAT, (west.lon + east.lon) / 2.0);
    let mut tile = TileBuilder::new();
    let (fwd, back) = two_way_timed(&mut tile, name, &[west, mid, east], &[0, 1, 2], duration_ds);
    if let Some(neighbor) = west_tile {
        tile.border(fwd[0], neighbor, BorderKind::Entry, west);
        tile.border(back[1], neighbor, BorderKind::Exit, west);
    }
    if let Some(neighbor) = east_tile {
        tile.border(fwd[1], neighbor, BorderKind::Exit, east);
        tile.border(back[0], neighbor, BorderKind::Entry, east);
    }
    tile.build()
}

pub const SECOND_BORDER_LON: f64 = 4.03;

/// Tiles `a`, `b` and `c` in a row, one road running through all three
pub fn three_tiles() -> Fixture {
    three_tiles_with_middle_cost(100)
}

/// [`three_tiles`] with every node of the middle tile costing `duration_ds`
pub fn three_tiles_with_middle_cost(duration_ds: u32) -> Fixture {
    let first = pt(LAT, BORDER_LON);
    let second = pt(LAT, SECOND_BORDER_LON);
    Fixture {
        manifest: Manifest {
            tiles: vec![
                extent("a", 3.99, BORDER_LON),
                extent("b", BORDER_LON, SECOND_BORDER_LON),
                extent("c", SECOND_BORDER_LON, 4.05),
            ],
        },
        tiles: vec![
            ("a", chain_tile("Chaussee", pt(LAT, 4.0), first, None, Some("b"), 100)),
            ("b", chain_tile("Chaussee", first, second, Some("a"), Some("c"), duration_ds)),
            ("c", chain_tile("Chaussee", second, pt(LAT, 4.04), Some("b"), None, 100)),
        ],
    }
}

pub const NORTH_CROSSING: GeoPoint = GeoPoint::new(LAT + 0.002, BORDER_LON);
pub const SOUTH_CROSSING: GeoPoint = GeoPoint::new(LAT - 0.002, BORDER_LON);

/// A road forks in tile `a` into a slow northern and a fast southern road,
/// each crossing into tile `b`, where they join again
pub fn two_crossings() -> Fixture {
    let fork = pt(LAT, 4.0);
    let join = pt(LAT, 4.015);

    let mut a = TileBuilder::new();
    let start_road = a.road("Start Road", &[pt(LAT, 3.995), fork]);
    let north_road = a.road("North Road", &[fork, NORTH_CROSSING]);
    let south_road = a.road("South Road", &[fork, SOUTH_CROSSING]);
    let start = a.node(start_road, 0, 1, 100);
    let north = a.node(north_road, 0, 1, 300);
    let south = a.node(south_road, 0, 1, 100);
    a.connect(start, north);
    a.connect(start, south);
    a.border(north, "b", BorderKind::Exit, NORTH_CROSSING);
    a.border(south, "b", BorderKind::Exit, SOUTH_CROSSING);

    let mut b = TileBuilder::new();
    let north_link = b.road("North Road", &[NORTH_CROSSING, join]);
    let south_link = b.road("South Road", &[SOUTH_CROSSING, join]);
    let final_road = b.road("Final Road", &[join, pt(LAT, 4.02)]);
    let north = b.node(north_link, 0, 1, 100);
    let south = b.node(south_link, 0, 1, 100);
    let last = b.node(final_road, 0, 1, 100);
    b.connect(north, last);
    b.connect(south, last);
    b.border(north, "a", BorderKind::Entry, NORTH_CROSSING);
    b.border(south, "a", BorderKind::Entry, SOUTH_CROSSING);

    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, BORDER_LON), extent("b", BORDER_LON, 4.03)],
        },
        tiles: vec![("a", a.build()), ("b", b.build())],
    }
}

/// Main road ending on the border of `a` and `b`, where a side road turns
/// off south-east into `b` and another road leaves north-west inside `a`
pub fn border_junction() -> Fixture {
    let border = pt(LAT, BORDER_LON);

    let mut a = TileBuilder::new();
    let main = a.road("Main", &[pt(LAT, 4.0), pt(LAT, 4.005), border]);
    let other = a.road("Other Road", &[border, pt(LAT + 0.001, 4.0095)]);
    let first = a.node(main, 0, 1, 100);
    let last = a.node(main, 1, 2, 100);
    let other = a.node(other, 0, 1, 100);
    a.connect(first, last);
    a.connect(last, other);
    a.border(last, "b", BorderKind::Exit, border);

    let mut b = TileBuilder::new();
    let side = b.road(
        "Side Street",
        &[border, pt(LAT - 0.001, 4.011), pt(LAT - 0.002, 4.012)],
    );
    let entry = b.node(side, 0, 1, 100);
    let on = b.node(side, 1, 2, 100);
    b.connect(entry, on);
    b.border(entry, "a", BorderKind::Entry, border);

    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, BORDER_LON), extent("b", BORDER_LON, 4.03)],
        },
        tiles: vec![("a", a.build()), ("b", b.build())],
    }
}

/// Tile `a` with a road ending in tile `b`, which is listed but not provided,
/// and tile `c` beyond it
pub fn missing_middle_tile() -> Fixture {
    let border = pt(LAT, BORDER_LON);
    let mut a = TileBuilder::new();
    let (fwd, _) = two_way(
        &mut a,
        "Chaussee",
        &[pt(LAT, 4.0), pt(LAT, 4.005), border],
        &[0, 1, 2],
    );
    a.border(fwd[1], "b", BorderKind::Exit, border);

    let mut c = TileBuilder::new();
    two_way(&mut c, "Far Road", &[pt(LAT, 4.035), pt(LAT, 4.04)], &[0, 1]);

    Fixture {
        manifest: Manifest {
            tiles: vec![
                extent("a", 3.99, BORDER_LON),
                extent("b", BORDER_LON, 4.03),
                extent("c", 4.03, 4.05),
            ],
        },
        tiles: vec![("a", a.build()), ("c", c.build())],
    }
}

/// Two tiles with roads but no border between them
pub fn disconnected_tiles() -> Fixture {
    let mut a = TileBuilder::new();
    two_way(&mut a, "West", &[pt(LAT, 4.0), pt(LAT, 4.005)], &[0, 1]);
    let mut b = TileBuilder::new();
    two_way(&mut b, "East", &[pt(LAT, 4.015), pt(LAT, 4.02)], &[0, 1]);
    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, BORDER_LON), extent("b", BORDER_LON, 4.03)],
        },
        tiles: vec![("a", a.build()), ("b", b.build())],
    }
}

pub const JUNCTION: GeoPoint = GeoPoint::new(LAT, 4.001);

/// Main road west-east through a junction, a side road south from it and a
/// oneway road digitized from the north into the junction
pub fn t_junction() -> Fixture {
    let mut tile = TileBuilder::new();
    let main = tile.road("Main Street", &[pt(LAT, 4.0), JUNCTION, pt(LAT, 4.002)]);
    let side = tile.road("Side Street", &[JUNCTION, pt(LAT - 0.001, 4.001)]);
    let oneway = tile.feature(
        FeatureInfo {
            name: "Oneway Lane".into(),
            oneway: true,
            roundabout: false,
        },
        &[pt(LAT + 0.001, 4.001), JUNCTION],
    );

    let west_in = tile.node(main, 0, 1, 100);
    let east_out = tile.node(main, 1, 2, 100);
    let east_in = tile.node(main, 2, 1, 100);
    let west_out = tile.node(main, 1, 0, 100);
    let south_out = tile.node(side, 0, 1, 100);
    let south_in = tile.node(side, 1, 0, 100);
    let north_in = tile.node(oneway, 0, 1, 100);
    // Against the oneway: in the tile data, dropped when the graph loads
    let north_out = tile.node(oneway, 1, 0, 100);

    for from in [west_in, east_in, south_in, north_in] {
        for to in [east_out, west_out, south_out, north_out] {
            tile.connect(from, to);
        }
    }

    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, 4.01)],
        },
        tiles: vec![("a", tile.build())],
    }
}

pub const RING_CENTER: GeoPoint = GeoPoint::new(LAT, 4.0);

/// A counter-clockwise roundabout with roads leaving south, east, north, west
pub fn roundabout() -> Fixture {
    let r0 = pt(LAT - 0.0005, 4.0);
    let r1 = pt(LAT, 4.0007);
    let r2 = pt(LAT + 0.0005, 4.0);
    let r3 = pt(LAT, 3.9993);

    let mut tile = TileBuilder::new();
    let ring = tile.feature(
        FeatureInfo {
            name: "Place Ronde".into(),
            oneway: true,
            roundabout: true,
        },
        &[r0, r1, r2, r3, r0],
    );
    let south = tile.road("South Road", &[pt(LAT - 0.0015, 4.0), r0]);
    let east = tile.road("East Road", &[r1, pt(LAT, 4.0017)]);
    let north = tile.road("North Road", &[r2, pt(LAT + 0.0015, 4.0)]);
    let west = tile.road("West Road", &[r3, pt(LAT, 3.9983)]);

    let approach = tile.node(south, 0, 1, 100);
    let r01 = tile.node(ring, 0, 1, 50);
    let r12 = tile.node(ring, 1, 2, 50);
    let r23 = tile.node(ring, 2, 3, 50);
    let r30 = tile.node(ring, 3, 4, 50);
    let east_out = tile.node(east, 0, 1, 100);
    let north_out = tile.node(north, 0, 1, 100);
    let west_out = tile.node(west, 0, 1, 100);

    tile.connect(approach, r01);
    tile.connect(r01, r12);
    tile.connect(r01, east_out);
    tile.connect(r12, r23);
    tile.connect(r12, north_out);
    tile.connect(r23, r30);
    tile.connect(r23, west_out);
    tile.connect(r30, r01);

    Fixture {
        manifest: Manifest {
            tiles: vec![extent("a", 3.99, 4.01)],
        },
        tiles: vec![("a", tile.build())],
    }
}
