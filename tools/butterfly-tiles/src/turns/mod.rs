//! Turn-by-turn instructions for a stitched path
//!
//! [`TurnAnnotator`] walks the legs of a [`crate::stitch::StitchedPath`],
//! rebuilds the route polyline from feature geometry, classifies every
//! junction, then hands the raw instructions to the fixup pass.

pub mod annotate;
pub mod classify;
pub mod fixup;

pub use annotate::{SegmentEnd, TurnAnnotator};
pub use classify::{
    intermediate_direction, invert_direction, most_left_direction, most_right_direction,
    roundabout_direction,
};

use serde::Serialize;

use crate::engine::TileId;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TurnDirection {
    NoTurn,
    GoStraight,
    SlightRight,
    Right,
    SharpRight,
    SlightLeft,
    Left,
    SharpLeft,
    UTurn,
    EnterRoundabout,
    StayOnRoundabout,
    LeaveRoundabout,
}

impl TurnDirection {
    pub fn is_left(self) -> bool {
        matches!(
            self,
            TurnDirection::SlightLeft | TurnDirection::Left | TurnDirection::SharpLeft
        )
    }

    pub fn is_right(self) -> bool {
        matches!(
            self,
            TurnDirection::SlightRight | TurnDirection::Right | TurnDirection::SharpRight
        )
    }

    pub fn is_straight_or_slight(self) -> bool {
        matches!(
            self,
            TurnDirection::GoStraight | TurnDirection::SlightLeft | TurnDirection::SlightRight
        )
    }

    pub fn is_roundabout(self) -> bool {
        matches!(
            self,
            TurnDirection::EnterRoundabout
                | TurnDirection::StayOnRoundabout
                | TurnDirection::LeaveRoundabout
        )
    }
}

/// Where to leave a roundabout, attached to the entering instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundaboutExit {
    /// 1 = first exit after entering
    pub exit_number: u32,
    /// Direction from the road entering the roundabout to the road leaving it
    pub net_direction: TurnDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnInstruction {
    /// Index of the junction in [`Route::points`]
    pub index: usize,
    pub direction: TurnDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roundabout: Option<RoundaboutExit>,
    pub source_name: String,
    pub target_name: String,
    /// Travel bearing arriving at the junction, degrees from North
    pub in_bearing: f64,
    /// Travel bearing leaving the junction
    pub out_bearing: f64,
    /// Signed angles of every road that could be taken, ascending
    pub candidate_angles: Vec<f64>,
}

/// Route shape around one instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnGeometry {
    /// Index of the instruction's junction in [`Route::points`]
    pub index: usize,
    pub turn_point: GeoPoint,
    /// Route points surrounding the junction
    pub points: Vec<GeoPoint>,
    /// Position of `turn_point` inside `points`
    pub turn_offset: usize,
    pub candidate_angles: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeMark {
    pub point_index: usize,
    pub elapsed_s: f64,
    pub remaining_s: f64,
}

/// A fully annotated route, owned by the caller once delivered
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Route {
    pub points: Vec<GeoPoint>,
    pub turns: Vec<TurnInstruction>,
    pub times: Vec<TimeMark>,
    pub turn_geometry: Vec<TurnGeometry>,
    pub tiles: Vec<TileId>,
    pub length_m: f64,
    pub duration_s: f64,
}
