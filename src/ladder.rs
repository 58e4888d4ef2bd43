//! Ladder reading for the input planes.
//!
//! Two maps are produced: stones that are ladder-capturable right now,
//! and empty points from which the player to move can start a working
//! ladder. The reader performs a depth-bounded search of forcing moves
//! only — the defender extends into the last liberty or counter-captures
//! an adjacent attacker group in atari, the attacker answers so as to
//! restore atari — with a node budget against pathological shapes.
//! Exhausting depth or budget counts as "no ladder", so the reader never
//! claims a capture it did not read out.

use tracing::trace;

use crate::board::{Board, Player, Point, PointState, neighbors};
use crate::constants::{LADDER_MAX_DEPTH, LADDER_NODE_BUDGET, NUM_POINTS};

/// Fill both ladder maps for the position: `laddered` marks stones of
/// either color that are capturable in a ladder now, `working` marks
/// empty points from which `player` can start a working ladder.
pub fn ladder_features(
    board: &Board,
    player: Player,
    laddered: &mut [bool],
    working: &mut [bool],
) {
    laddered_stones(board, laddered);
    working_ladder_moves(board, player, working);
}

/// Mark every stone belonging to a group that is ladder-capturable now.
///
/// Groups in atari are read with the owner to move (can it escape?);
/// groups with two liberties are read with the capturer to move.
pub fn laddered_stones(board: &Board, out: &mut [bool]) {
    debug_assert!(out.len() >= NUM_POINTS);
    out[..NUM_POINTS].fill(false);

    let mut scratch = board.clone();
    let mut seen = [false; NUM_POINTS];
    let mut group = Vec::new();
    for p in 0..NUM_POINTS as Point {
        if seen[p as usize] {
            continue;
        }
        let PointState::Stone(owner) = board.stone_at(p) else {
            continue;
        };
        group.clear();
        board.collect_group(p, &mut group);
        for &s in &group {
            seen[s as usize] = true;
        }

        let libs = board.group_liberties_upto(p, 3);
        let captured = match libs {
            1 => {
                let mut budget = LADDER_NODE_BUDGET;
                search_captured(&mut scratch, p, owner, true, 0, &mut budget)
            }
            2 => {
                let mut budget = LADDER_NODE_BUDGET;
                search_captured(&mut scratch, p, owner, false, 0, &mut budget)
            }
            _ => false,
        };
        debug_assert!(scratch == *board, "ladder search must restore the board");
        if captured {
            for &s in &group {
                out[s as usize] = true;
            }
        }
    }
}

/// Mark the empty points from which `player` can put an opponent group
/// with two liberties into a ladder that captures it.
pub fn working_ladder_moves(board: &Board, player: Player, out: &mut [bool]) {
    debug_assert!(out.len() >= NUM_POINTS);
    out[..NUM_POINTS].fill(false);

    let opp = player.opponent();
    let mut scratch = board.clone();
    let mut seen = [false; NUM_POINTS];
    let mut group = Vec::new();
    let mut libs = Vec::new();
    for p in 0..NUM_POINTS as Point {
        if seen[p as usize] || board.stone_at(p) != PointState::Stone(opp) {
            continue;
        }
        group.clear();
        board.collect_group(p, &mut group);
        for &s in &group {
            seen[s as usize] = true;
        }

        libs.clear();
        board.group_liberty_points(p, 3, &mut libs);
        if libs.len() != 2 {
            continue;
        }
        for &lib in &libs {
            if out[lib as usize] || !board.is_plausibly_legal(lib, player) {
                continue;
            }
            let Ok(undo) = scratch.play(lib, player) else {
                continue;
            };
            let works = scratch.stone_at(p) != PointState::Empty && {
                let mut budget = LADDER_NODE_BUDGET;
                search_captured(&mut scratch, p, opp, true, 0, &mut budget)
            };
            scratch.undo(lib, player, undo);
            if works {
                out[lib as usize] = true;
            }
        }
        debug_assert!(scratch == *board, "ladder search must restore the board");
    }
}

/// Read whether the group at `prey` (owned by `owner`) is captured with
/// best play by both sides, considering forcing moves only.
fn search_captured(
    board: &mut Board,
    prey: Point,
    owner: Player,
    defender_to_move: bool,
    depth: u32,
    budget: &mut u32,
) -> bool {
    if depth >= LADDER_MAX_DEPTH || *budget == 0 {
        if *budget == 0 {
            trace!(depth, "ladder node budget exhausted");
        }
        return false;
    }
    *budget -= 1;

    if board.stone_at(prey) == PointState::Empty {
        return true;
    }
    let attacker = owner.opponent();
    let mut libs = Vec::new();
    board.group_liberty_points(prey, 3, &mut libs);

    if defender_to_move {
        if libs.len() >= 2 {
            return false;
        }
        if libs.is_empty() {
            return true;
        }
        // Candidate defenses: extend into the last liberty, or capture
        // an adjacent attacker group that is itself in atari.
        let mut candidates = vec![libs[0]];
        counter_capture_moves(board, prey, attacker, &mut candidates);
        for &mv in &candidates {
            let Ok(undo) = board.play(mv, owner) else {
                continue;
            };
            let escaped = board.group_liberties_upto(prey, 3) >= 3
                || !search_captured(board, prey, owner, false, depth + 1, budget);
            board.undo(mv, owner, undo);
            if escaped {
                return false;
            }
        }
        // No defense works (or none is legal): the group is dead.
        true
    } else {
        if libs.len() >= 3 {
            return false;
        }
        // Forcing chase only: the attacker's move must leave the prey in
        // atari (or capture it outright). Prefer the liberty where the
        // attacking stone ends up stronger.
        let mut chases: Vec<(u32, Point)> = Vec::with_capacity(2);
        for &mv in &libs {
            let Ok(undo) = board.play(mv, attacker) else {
                continue;
            };
            if board.stone_at(prey) == PointState::Empty {
                board.undo(mv, attacker, undo);
                return true;
            }
            let prey_libs = board.group_liberties_upto(prey, 2);
            let own_libs = board.group_liberties_upto(mv, 3);
            board.undo(mv, attacker, undo);
            if prey_libs == 1 {
                chases.push((own_libs, mv));
            }
        }
        chases.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for &(_, mv) in &chases {
            let Ok(undo) = board.play(mv, attacker) else {
                continue;
            };
            let captured = search_captured(board, prey, owner, true, depth + 1, budget);
            board.undo(mv, attacker, undo);
            if captured {
                return true;
            }
        }
        false
    }
}

/// Append the liberties of attacker groups in atari that touch the prey
/// group (capturing them is the prey's other way out).
fn counter_capture_moves(board: &Board, prey: Point, attacker: Player, out: &mut Vec<Point>) {
    let mut prey_stones = Vec::new();
    board.collect_group(prey, &mut prey_stones);
    let mut checked = [false; NUM_POINTS];
    let mut libs = Vec::new();
    let mut group = Vec::new();
    for &s in &prey_stones {
        for &n in neighbors(s) {
            if checked[n as usize] || board.stone_at(n) != PointState::Stone(attacker) {
                continue;
            }
            group.clear();
            board.collect_group(n, &mut group);
            for &g in &group {
                checked[g as usize] = true;
            }
            libs.clear();
            board.group_liberty_points(n, 2, &mut libs);
            if libs.len() == 1 && !out.contains(&libs[0]) {
                out.push(libs[0]);
            }
        }
    }
}
