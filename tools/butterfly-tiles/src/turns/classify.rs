//! Turn angle to direction buckets
//!
//! Angles are signed degrees in (-180, 180]: 0 is straight on, positive
//! turns right, negative turns left.
//!
//! [`intermediate_direction`] is used when the taken road has alternatives
//! on both sides and is symmetric around 0°. The rightmost and leftmost
//! roads of a junction use shifted buckets: taking the rightmost of two
//! nearly straight roads reads as "keep right" rather than "go straight".

use super::TurnDirection;

const STRAIGHT: f64 = 10.0;
const SLIGHT: f64 = 50.0;
const NORMAL: f64 = 113.0;
const SHARP: f64 = 157.0;

pub fn intermediate_direction(angle: f64) -> TurnDirection {
    let magnitude = angle.abs();
    let right = if magnitude < STRAIGHT {
        return TurnDirection::GoStraight;
    } else if magnitude < SLIGHT {
        TurnDirection::SlightRight
    } else if magnitude < NORMAL {
        TurnDirection::Right
    } else if magnitude < SHARP {
        TurnDirection::SharpRight
    } else {
        return TurnDirection::UTurn;
    };
    if angle < 0.0 {
        invert_direction(right)
    } else {
        right
    }
}

/// Direction of the rightmost road of a junction
pub fn most_right_direction(angle: f64) -> TurnDirection {
    match angle {
        a if (113.0..157.0).contains(&a) => TurnDirection::SharpRight,
        a if (40.0..113.0).contains(&a) => TurnDirection::Right,
        a if (-15.0..40.0).contains(&a) => TurnDirection::SlightRight,
        a if (-25.0..-15.0).contains(&a) => TurnDirection::GoStraight,
        a if (-60.0..-25.0).contains(&a) => TurnDirection::SlightLeft,
        a if (-156.0..-60.0).contains(&a) => TurnDirection::Left,
        _ => TurnDirection::UTurn,
    }
}

/// Direction of the leftmost road of a junction, the mirror of
/// [`most_right_direction`]
pub fn most_left_direction(angle: f64) -> TurnDirection {
    invert_direction(most_right_direction(-angle))
}

/// Mirror a direction left to right
pub fn invert_direction(direction: TurnDirection) -> TurnDirection {
    use TurnDirection::*;
    match direction {
        SlightRight => SlightLeft,
        SlightLeft => SlightRight,
        Right => Left,
        Left => Right,
        SharpRight => SharpLeft,
        SharpLeft => SharpRight,
        other => other,
    }
}

/// Roundabout instruction for a junction touching a roundabout.
///
/// `None` when neither side is a roundabout.
pub fn roundabout_direction(
    in_roundabout: bool,
    out_roundabout: bool,
    has_alternatives: bool,
) -> Option<TurnDirection> {
    match (in_roundabout, out_roundabout) {
        (true, true) if has_alternatives => Some(TurnDirection::StayOnRoundabout),
        (true, true) => Some(TurnDirection::NoTurn),
        (false, true) => Some(TurnDirection::EnterRoundabout),
        (true, false) => Some(TurnDirection::LeaveRoundabout),
        (false, false) => None,
    }
}
