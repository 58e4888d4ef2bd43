//! Neural-net input building: 22 spatial channels per intersection plus
//! 19 global features.
//!
//! Spatial buffers are channel-major within each point (NHWC): the
//! value of channel `c` at point `p` lives at `p * 22 + c`, where `p`
//! has already been pushed through the chosen board symmetry. The
//! policy and ownership the net returns are then interpreted in that
//! symmetry space and unshuffled by the consumer via the same tables.
//!
//! Channel layout:
//!
//! | ch | contents |
//! |----|----------|
//! | 0  | on-board (always 1) |
//! | 1,2 | our / opponent stones |
//! | 3-5 | group liberties exactly 1 / 2 / >= 3 |
//! | 6  | ko point |
//! | 9-13 | last five moves (alternation-checked) |
//! | 14-16 | ladder-capturable stones now / one / two moves ago |
//! | 17 | moves that start a working ladder |
//! | 18,19 | our / opponent area (Chinese rules only) |
//!
//! Globals: 0-4 pass-at-history, 5 self-komi / 20, 9 territory scoring,
//! 10 seki tax, 14 "an immediate pass ends the game", 18 komi wave.
//! Channels 7, 8, 20, 21 and all other globals are zero.

use std::sync::OnceLock;

use crate::board::{Board, PASS, Player, PointState, RecentMove, Rules};
use crate::constants::{
    HISTORY_LEN, N, NUM_GLOBAL_FEATURES, NUM_POINTS, NUM_SPATIAL_CHANNELS, NUM_SYMMETRIES,
};
use crate::ladder::{ladder_features, laddered_stones};

// =============================================================================
// Symmetries
// =============================================================================

struct SymmetryTables {
    map: [[u16; NUM_POINTS]; NUM_SYMMETRIES],
    inverse: [usize; NUM_SYMMETRIES],
}

static SYMMETRIES: OnceLock<SymmetryTables> = OnceLock::new();

fn apply_symmetry(s: usize, p: usize) -> usize {
    let (mut x, mut y) = (p % N, p / N);
    if s & 4 != 0 {
        std::mem::swap(&mut x, &mut y);
    }
    if s & 1 != 0 {
        x = N - 1 - x;
    }
    if s & 2 != 0 {
        y = N - 1 - y;
    }
    y * N + x
}

fn symmetry_tables() -> &'static SymmetryTables {
    SYMMETRIES.get_or_init(|| {
        let mut map = [[0u16; NUM_POINTS]; NUM_SYMMETRIES];
        for (s, table) in map.iter_mut().enumerate() {
            for (p, out) in table.iter_mut().enumerate() {
                *out = apply_symmetry(s, p) as u16;
            }
        }
        let mut inverse = [usize::MAX; NUM_SYMMETRIES];
        for s in 0..NUM_SYMMETRIES {
            for t in 0..NUM_SYMMETRIES {
                if (0..NUM_POINTS).all(|p| map[t][map[s][p] as usize] as usize == p) {
                    inverse[s] = t;
                    break;
                }
            }
            assert!(inverse[s] < NUM_SYMMETRIES);
        }
        SymmetryTables { map, inverse }
    })
}

/// The point-permutation table of symmetry `s` (0 is the identity).
#[inline]
pub fn symmetry_map(s: usize) -> &'static [u16; NUM_POINTS] {
    &symmetry_tables().map[s]
}

/// The symmetry that undoes symmetry `s`.
#[inline]
pub fn inverse_symmetry(s: usize) -> usize {
    symmetry_tables().inverse[s]
}

// =============================================================================
// Feature Building
// =============================================================================

/// Everything the input builder reads about a position.
pub struct FeatureContext<'a> {
    pub board: &'a Board,
    /// Position before the last move, for the one-move-ago ladder plane.
    pub prev_board: Option<&'a Board>,
    /// Position before the last two moves.
    pub prev_prev_board: Option<&'a Board>,
    /// Move history, most-recent-last; only the last five are read.
    pub recent: &'a [RecentMove],
    pub player: Player,
    pub rules: Rules,
    pub komi: f32,
    /// When set and the last move was a pass, all history inputs are
    /// suppressed: planes 9-13 and the past-ladder planes 15-16, plus
    /// globals 0-4 and 14. The ladder-now plane (14) is not history
    /// and stays live.
    pub conservative_pass_at_root: bool,
}

/// Reusable buffers for the derived maps. Grown once, never shrunk; the
/// area buffer is only allocated when a rule set that uses the area
/// planes shows up.
#[derive(Debug)]
pub struct FeatureScratch {
    liberties: Vec<u8>,
    laddered: Vec<bool>,
    working: Vec<bool>,
    area: Vec<i8>,
}

impl FeatureScratch {
    pub fn new() -> Self {
        FeatureScratch {
            liberties: vec![0; NUM_POINTS],
            laddered: vec![false; NUM_POINTS],
            working: vec![false; NUM_POINTS],
            area: Vec::new(),
        }
    }
}

impl Default for FeatureScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Write the spatial and global features of `ctx` under symmetry `s`.
///
/// `spatial` must hold at least `361 * 22` values and `global` at least
/// 19; both are zeroed before filling.
pub fn write_features(
    ctx: &FeatureContext<'_>,
    s: usize,
    scratch: &mut FeatureScratch,
    spatial: &mut [f32],
    global: &mut [f32],
) {
    debug_assert!(spatial.len() >= NUM_POINTS * NUM_SPATIAL_CHANNELS);
    debug_assert!(global.len() >= NUM_GLOBAL_FEATURES);
    spatial[..NUM_POINTS * NUM_SPATIAL_CHANNELS].fill(0.0);
    global[..NUM_GLOBAL_FEATURES].fill(0.0);

    let sym = symmetry_map(s);
    let at = |p: usize, c: usize| sym[p] as usize * NUM_SPATIAL_CHANNELS + c;
    let last_was_pass = ctx.recent.last().is_some_and(|m| m.mv == PASS);
    let suppress_history = ctx.conservative_pass_at_root && last_was_pass;

    // Board state: on-board plane, stones, liberties, ko.
    ctx.board.liberty_map(&mut scratch.liberties);
    for p in 0..NUM_POINTS {
        spatial[at(p, 0)] = 1.0;
        match ctx.board.stones()[p] {
            PointState::Stone(c) if c == ctx.player => spatial[at(p, 1)] = 1.0,
            PointState::Stone(_) => spatial[at(p, 2)] = 1.0,
            PointState::Empty => {}
        }
        match scratch.liberties[p] {
            1 => spatial[at(p, 3)] = 1.0,
            2 => spatial[at(p, 4)] = 1.0,
            3 => spatial[at(p, 5)] = 1.0,
            _ => {}
        }
    }
    if let Some(k) = ctx.board.ko() {
        spatial[at(k as usize, 6)] = 1.0;
    }

    // Move history: plane i holds the move i turns ago, valid only while
    // the recorded players alternate correctly ending in the opponent.
    let mut hist_len = 0;
    if !suppress_history {
        let mut expect = ctx.player.opponent();
        for i in 0..HISTORY_LEN.min(ctx.recent.len()) {
            let m = ctx.recent[ctx.recent.len() - 1 - i];
            if m.player != expect {
                break;
            }
            hist_len = i + 1;
            if m.mv == PASS {
                global[i] = 1.0;
            } else {
                spatial[at(m.mv as usize, 9 + i)] = 1.0;
            }
            expect = expect.opponent();
        }
    }

    // Ladder planes: current stones in a working ladder, the same map
    // one and two moves ago, and the moves that start a working ladder.
    ladder_features(
        ctx.board,
        ctx.player,
        &mut scratch.laddered,
        &mut scratch.working,
    );
    for p in 0..NUM_POINTS {
        if scratch.laddered[p] {
            spatial[at(p, 14)] = 1.0;
        }
        if scratch.working[p] {
            spatial[at(p, 17)] = 1.0;
        }
    }
    if hist_len >= 1 {
        if let Some(prev) = ctx.prev_board {
            laddered_stones(prev, &mut scratch.laddered);
            for p in 0..NUM_POINTS {
                if scratch.laddered[p] {
                    spatial[at(p, 15)] = 1.0;
                }
            }
        }
    }
    if hist_len >= 2 {
        if let Some(prev_prev) = ctx.prev_prev_board {
            laddered_stones(prev_prev, &mut scratch.laddered);
            for p in 0..NUM_POINTS {
                if scratch.laddered[p] {
                    spatial[at(p, 16)] = 1.0;
                }
            }
        }
    }

    // Area planes under area scoring rules.
    if ctx.rules.uses_area_features() {
        if scratch.area.is_empty() {
            scratch.area.resize(NUM_POINTS, 0);
        }
        ctx.board.area_map(&mut scratch.area);
        let our_sign: i8 = if ctx.player == Player::Black { 1 } else { -1 };
        for p in 0..NUM_POINTS {
            if scratch.area[p] == our_sign {
                spatial[at(p, 18)] = 1.0;
            } else if scratch.area[p] == -our_sign {
                spatial[at(p, 19)] = 1.0;
            }
        }
    }

    // Globals beyond the pass-history indicators written above.
    let self_komi = match ctx.player {
        Player::White => ctx.komi as f64,
        Player::Black => -(ctx.komi as f64),
    };
    global[5] = (self_komi / 20.0) as f32;
    if ctx.rules.is_territory_scoring() {
        global[9] = 1.0;
        global[10] = 1.0;
    }
    if last_was_pass && !suppress_history {
        global[14] = 1.0;
    }
    global[18] = komi_wave(self_komi) as f32;
}

/// Triangle-wave encoding of the fractional komi: zero at playable
/// integer komi values, peaks of +-0.5 at half-point komi. The wave is
/// anchored on the largest even (even board area) or odd (odd board
/// area) integer below the self-komi.
fn komi_wave(self_komi: f64) -> f64 {
    let board_area_even = NUM_POINTS % 2 == 0;
    let floor2 = if board_area_even {
        (self_komi / 2.0).floor() * 2.0
    } else {
        ((self_komi - 1.0) / 2.0).floor() * 2.0 + 1.0
    };
    let delta = (self_komi - floor2).clamp(0.0, 2.0);
    if delta < 0.5 {
        delta
    } else if delta < 1.5 {
        1.0 - delta
    } else {
        delta - 2.0
    }
}
