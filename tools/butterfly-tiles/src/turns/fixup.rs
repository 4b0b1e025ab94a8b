//! Post-processing of raw junction instructions
//!
//! 1. Roundabouts collapse into their entering instruction, which carries
//!    the exit number and the net direction; stay-on-roundabout junctions
//!    only count exits.
//! 2. Straight or slight turns between roads of the same name are dropped.
//! 3. Straight or slight turns within `merge_turn_distance_m` of a real
//!    turn are dropped.

use crate::config::RouterConfig;
use crate::geo::{haversine_distance, normalize_angle, GeoPoint};

use super::classify::intermediate_direction;
use super::{RoundaboutExit, TurnDirection, TurnInstruction};

pub fn fixup_turns(
    turns: Vec<TurnInstruction>,
    points: &[GeoPoint],
    config: &RouterConfig,
) -> Vec<TurnInstruction> {
    let turns = merge_roundabouts(turns);
    let turns = drop_same_name(turns);
    merge_close_turns(turns, points, config.merge_turn_distance_m)
}

fn merge_roundabouts(turns: Vec<TurnInstruction>) -> Vec<TurnInstruction> {
    let mut out: Vec<TurnInstruction> = Vec::with_capacity(turns.len());
    // Position in `out` of the open entry and the exits passed since
    let mut entered: Option<(usize, u32)> = None;

    for turn in turns {
        match turn.direction {
            TurnDirection::EnterRoundabout => {
                entered = Some((out.len(), 0));
                out.push(turn);
            }
            TurnDirection::StayOnRoundabout => {
                if let Some((_, passed)) = entered.as_mut() {
                    *passed += 1;
                }
            }
            TurnDirection::LeaveRoundabout => {
                if let Some((at, passed)) = entered.take() {
                    let enter = &mut out[at];
                    let net = normalize_angle(turn.out_bearing - enter.in_bearing);
                    enter.roundabout = Some(RoundaboutExit {
                        exit_number: passed + 1,
                        net_direction: intermediate_direction(net),
                    });
                }
                out.push(turn);
            }
            _ => out.push(turn),
        }
    }
    out
}

fn drop_same_name(turns: Vec<TurnInstruction>) -> Vec<TurnInstruction> {
    turns
        .into_iter()
        .filter(|turn| {
            !(turn.direction.is_straight_or_slight()
                && !turn.source_name.is_empty()
                && turn.source_name == turn.target_name)
        })
        .collect()
}

/// Distance along the route between two point indices
fn route_distance(points: &[GeoPoint], from: usize, to: usize) -> f64 {
    let (lo, hi) = (from.min(to), from.max(to).min(points.len().saturating_sub(1)));
    if lo >= hi {
        return 0.0;
    }
    points[lo..=hi]
        .windows(2)
        .map(|w| haversine_distance(w[0], w[1]))
        .sum()
}

fn merge_close_turns(
    turns: Vec<TurnInstruction>,
    points: &[GeoPoint],
    merge_distance_m: f64,
) -> Vec<TurnInstruction> {
    let is_turn = |t: &TurnInstruction| {
        use TurnDirection::*;
        matches!(t.direction, Left | Right | SharpLeft | SharpRight | UTurn)
    };
    let near = |a: &TurnInstruction, b: &TurnInstruction| {
        route_distance(points, a.index, b.index) < merge_distance_m
    };

    let keep: Vec<bool> = (0..turns.len())
        .map(|i| {
            let turn = &turns[i];
            if !turn.direction.is_straight_or_slight() {
                return true;
            }
            let before = i
                .checked_sub(1)
                .is_some_and(|j| is_turn(&turns[j]) && near(&turns[j], turn));
            let after = turns
                .get(i + 1)
                .is_some_and(|next| is_turn(next) && near(turn, next));
            !(before || after)
        })
        .collect();

    turns
        .into_iter()
        .zip(keep)
        .filter_map(|(turn, keep)| keep.then_some(turn))
        .collect()
}
