//! Constants for board geometry and search parameters.
//!
//! The engine is fixed at 19x19. Points are dense indices `0..361` in
//! row-major order with row 0 at the top; the pass move is index 361.

// =============================================================================
// Board Geometry
// =============================================================================

/// Board size (19x19).
pub const N: usize = 19;

/// Number of intersections.
pub const NUM_POINTS: usize = N * N;

/// Dense policy length: all intersections plus the pass move.
pub const NUM_MOVES: usize = NUM_POINTS + 1;

/// Number of dihedral board symmetries.
pub const NUM_SYMMETRIES: usize = 8;

// =============================================================================
// Input Features
// =============================================================================

/// Spatial feature channels per intersection.
pub const NUM_SPATIAL_CHANNELS: usize = 22;

/// Global (non-spatial) input features.
pub const NUM_GLOBAL_FEATURES: usize = 19;

/// How many turns of move history the input planes look back.
pub const HISTORY_LEN: usize = 5;

// =============================================================================
// Ladder Reading
// =============================================================================

/// Maximum ply depth of the ladder reader (proportional to board size).
pub const LADDER_MAX_DEPTH: u32 = 3 * N as u32;

/// Node budget per ladder query; exhausting it means "no ladder".
pub const LADDER_NODE_BUDGET: u32 = 1000;

// =============================================================================
// Selection (PUCT)
// =============================================================================

/// Base exploration coefficient.
pub const CPUCT_BASE: f64 = 1.0;

/// Logarithmic growth of the exploration coefficient with child weight.
pub const CPUCT_LOG_SCALE: f64 = 0.45;

/// Weight offset inside the exploration logarithm.
pub const CPUCT_LOG_OFFSET: f64 = 500.0;

/// First-play-urgency reduction at non-root nodes.
pub const FPU_REDUCTION_MAX: f64 = 0.2;

/// First-play-urgency reduction at the root.
pub const ROOT_FPU_REDUCTION_MAX: f64 = 0.1;

/// Prior belief about per-node utility standard deviation.
pub const UTILITY_STDEV_PRIOR: f64 = 0.4;

/// Pseudo-observations backing the utility stdev prior.
pub const UTILITY_STDEV_PRIOR_WEIGHT: f64 = 2.0;

/// How strongly observed utility stdev scales the exploration term.
pub const UTILITY_STDEV_SCALE: f64 = 0.85;

// =============================================================================
// Utility Combination
// =============================================================================

/// Weight of the win/loss difference in black's utility.
pub const WIN_LOSS_UTILITY: f64 = 1.0;

/// Weight of the no-result probability in black's utility.
pub const NO_RESULT_UTILITY: f64 = 0.0;

/// Weight of the statically centered score value.
pub const STATIC_SCORE_UTILITY: f64 = 0.1;

/// Weight of the dynamically centered score value.
pub const DYNAMIC_SCORE_UTILITY: f64 = 0.3;

/// Scale (in board-lengths) of the static score value.
pub const STATIC_SCORE_SCALE: f64 = 2.0;

/// Scale of the dynamically centered score value.
pub const DYNAMIC_SCORE_SCALE: f64 = 0.75;

/// Total swing of the utility: win/loss + static + dynamic score terms.
pub const UTILITY_RADIUS: f64 = WIN_LOSS_UTILITY + STATIC_SCORE_UTILITY + DYNAMIC_SCORE_UTILITY;

/// Fraction by which the dynamic score center regresses toward zero.
pub const SCORE_CENTER_ZERO_WEIGHT: f64 = 0.2;

/// The dynamic score center stays within this many points (times sqrt of
/// the board area) of the root expected score.
pub const SCORE_CENTER_CLAMP_SCALE: f64 = 0.75;

// =============================================================================
// Batching & Termination
// =============================================================================

/// Give up filling a batch after this many fruitless (abandoned)
/// descents per batch slot.
pub const MAX_DESCENT_ATTEMPTS_PER_SLOT: u32 = 8;

/// Check the wall clock once per this many descent attempts.
pub const DEADLINE_CHECK_PERIOD: u32 = 32;

// =============================================================================
// Report-Time Aggregation
// =============================================================================

/// Utility-gap scale of the exponential in noise pruning.
pub const NOISE_PRUNE_GAP_SCALE: f64 = 0.15;

/// Cap on the weight subtracted from any one child by noise pruning.
pub const NOISE_PRUNE_MAX_SUBTRACT: f64 = 1e50;

/// Base coefficient below which an ownership subtree stops recursing.
pub const OWNERSHIP_MIN_PROP_COEFF: f64 = 0.5;

/// Visit exponent of the ownership recursion threshold.
pub const OWNERSHIP_MIN_PROP_POW: f64 = -0.75;

/// Child shares below this fraction of the threshold fold into the parent.
pub const OWNERSHIP_PRUNE_FACTOR: f64 = 0.01;

// =============================================================================
// Parameter Clamps
// =============================================================================

/// Visit budget bounds for a single run.
pub const VISITS_RANGE: (u32, u32) = (16, 5000);

/// Wall-clock budget bounds in milliseconds.
pub const TIME_MS_RANGE: (u64, u64) = (25, 60_000);

/// Leaves evaluated per neural-net call.
pub const BATCH_SIZE_RANGE: (usize, usize) = (1, 64);

/// Children retained per expanded node.
pub const MAX_CHILDREN_RANGE: (usize, usize) = (4, 361);

/// Default number of children retained per expanded node.
pub const DEFAULT_MAX_CHILDREN: usize = 64;

/// Candidate moves reported.
pub const TOP_K_RANGE: (usize, usize) = (1, 50);

/// Principal-variation length bounds.
pub const PV_LEN_RANGE: (usize, usize) = (0, 60);

/// Wide-root-noise magnitude bounds.
pub const WIDE_ROOT_NOISE_RANGE: (f64, f64) = (0.0, 5.0);
