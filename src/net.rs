//! The neural-net seam: the evaluator contract, calibration constants
//! carried with a model, and postprocessing of raw outputs into
//! black-perspective quantities.
//!
//! The engine never runs a network itself. It builds input tensors,
//! hands them to an [`Evaluator`], and interprets what comes back. The
//! evaluator may live on another thread or device; the tree is not
//! touched while a batch is in flight.

use crate::board::Player;
use crate::constants::{
    DYNAMIC_SCORE_SCALE, DYNAMIC_SCORE_UTILITY, NO_RESULT_UTILITY, NUM_POINTS,
    SCORE_CENTER_CLAMP_SCALE, SCORE_CENTER_ZERO_WEIGHT, STATIC_SCORE_SCALE, STATIC_SCORE_UTILITY,
    WIN_LOSS_UTILITY,
};
use crate::error::SearchError;
use crate::score::expected_score_value;

// =============================================================================
// Evaluator Contract
// =============================================================================

/// Calibration constants shipped with a set of model weights.
#[derive(Clone, Debug)]
pub struct ModelConstants {
    pub model_version: u32,
    /// Policy head channels: 1 (plain), or 2/4 (paired with an
    /// optimistic policy). Anything else is rejected.
    pub policy_out_channels: u32,
    /// Scale applied to policy logits before the softmax.
    pub output_scale_multiplier: f32,
    /// Scales recovering points from the four score-value outputs.
    pub score_mean_multiplier: f32,
    pub score_stdev_multiplier: f32,
    pub lead_multiplier: f32,
    pub variance_time_multiplier: f32,
    /// Blend weight toward the optimistic policy at inner nodes.
    pub policy_optimism: f64,
    /// Blend weight toward the optimistic policy at the root.
    pub root_policy_optimism: f64,
}

impl Default for ModelConstants {
    fn default() -> Self {
        ModelConstants {
            model_version: 16,
            policy_out_channels: 2,
            output_scale_multiplier: 1.0,
            score_mean_multiplier: 20.0,
            score_stdev_multiplier: 20.0,
            lead_multiplier: 20.0,
            variance_time_multiplier: 40.0,
            policy_optimism: 0.2,
            root_policy_optimism: 0.2,
        }
    }
}

/// One batch of input tensors, batch-major: entry `i` occupies
/// `spatial[i * 361 * 22 ..]` and `global[i * 19 ..]`.
pub struct EvalBatch<'a> {
    pub len: usize,
    pub spatial: &'a [f32],
    pub global: &'a [f32],
}

/// Raw outputs of the net for one position, in the symmetry space the
/// inputs were built in.
pub struct RawNetOutput {
    /// Per-point policy logits, `361 * policy_out_channels` values.
    pub policy: Vec<f32>,
    /// Pass logits, one per policy channel.
    pub pass: Vec<f32>,
    /// Win / loss / no-result logits from the player to move.
    pub value: Vec<f32>,
    /// Score mean, stdev, lead and variance-time, pre-calibration.
    pub score_value: Vec<f32>,
    /// Per-point ownership as raw tanh inputs, if requested.
    pub ownership: Option<Vec<f32>>,
}

/// The forward pass the engine consumes. Implementations own their own
/// device scheduling and retry semantics.
pub trait Evaluator {
    /// The calibration constants of the loaded model.
    fn constants(&self) -> &ModelConstants;

    /// Evaluate a batch of positions. Must return exactly `batch.len`
    /// outputs, in order.
    fn evaluate(&mut self, batch: EvalBatch<'_>, include_ownership: bool) -> Vec<RawNetOutput>;
}

/// Check one raw output against the model constants.
pub fn validate_output(
    raw: &RawNetOutput,
    constants: &ModelConstants,
    include_ownership: bool,
) -> Result<(), SearchError> {
    let channels = constants.policy_out_channels as usize;
    if !matches!(channels, 1 | 2 | 4) {
        return Err(SearchError::InvalidModelOutput {
            reason: format!("unrecognized policy channel count {channels}"),
        });
    }
    if raw.policy.len() != NUM_POINTS * channels {
        return Err(SearchError::InvalidModelOutput {
            reason: format!(
                "policy length {} != {} x {channels}",
                raw.policy.len(),
                NUM_POINTS
            ),
        });
    }
    if raw.pass.len() != channels {
        return Err(SearchError::InvalidModelOutput {
            reason: format!("pass logit count {} != {channels}", raw.pass.len()),
        });
    }
    if raw.value.len() != 3 {
        return Err(SearchError::InvalidModelOutput {
            reason: format!("value logit count {} != 3", raw.value.len()),
        });
    }
    if raw.score_value.len() != 4 {
        return Err(SearchError::InvalidModelOutput {
            reason: format!("score-value count {} != 4", raw.score_value.len()),
        });
    }
    match &raw.ownership {
        None if include_ownership => return Err(SearchError::MissingOwnership),
        Some(o) if o.len() != NUM_POINTS => {
            return Err(SearchError::InvalidModelOutput {
                reason: format!("ownership length {} != {}", o.len(), NUM_POINTS),
            });
        }
        _ => {}
    }
    Ok(())
}

/// Policy logit for move index `idx` (`0..361`, or `361` for pass) in
/// symmetry space, with the optimistic channel blended in and the
/// model's output scale applied.
pub fn policy_logit(
    raw: &RawNetOutput,
    constants: &ModelConstants,
    optimism: f64,
    idx: usize,
) -> f64 {
    let two_channel = constants.policy_out_channels >= 2;
    let (base, optimistic) = if idx == NUM_POINTS {
        let b = raw.pass[0] as f64;
        (b, if two_channel { raw.pass[1] as f64 } else { b })
    } else {
        let b = raw.policy[idx] as f64;
        (
            b,
            if two_channel {
                raw.policy[NUM_POINTS + idx] as f64
            } else {
                b
            },
        )
    };
    (base + optimism * (optimistic - base)) * constants.output_scale_multiplier as f64
}

// =============================================================================
// Postprocessing
// =============================================================================

/// Calibrated, black-perspective summary of one evaluation.
#[derive(Clone, Copy, Debug)]
pub struct NetOutcome {
    /// Probability that Black wins.
    pub black_win_prob: f64,
    /// Probability of no result.
    pub no_result_prob: f64,
    /// Win minus loss probability from Black's perspective, in [-1, 1].
    pub value: f64,
    /// Expected final score in points, positive = Black ahead.
    pub score_mean: f64,
    /// Standard deviation of the final score, in points.
    pub score_stdev: f64,
    /// Calibrated score lead in points, positive = Black ahead.
    pub score_lead: f64,
    /// Predicted remaining score variance over the game.
    pub variance_time: f64,
}

/// Turn a validated raw output into black-perspective quantities.
pub fn postprocess(raw: &RawNetOutput, player: Player, constants: &ModelConstants) -> NetOutcome {
    // Softmax over the three value logits, from the player to move.
    let max = raw.value.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b)) as f64;
    let exps: Vec<f64> = raw.value.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    let (win, loss, no_result) = (exps[0] / sum, exps[1] / sum, exps[2] / sum);

    let (black_win, black_loss) = match player {
        Player::Black => (win, loss),
        Player::White => (loss, win),
    };
    let sign = player.sign();
    NetOutcome {
        black_win_prob: black_win,
        no_result_prob: no_result,
        value: black_win - black_loss,
        score_mean: raw.score_value[0] as f64 * constants.score_mean_multiplier as f64 * sign,
        score_stdev: (raw.score_value[1] as f64 * constants.score_stdev_multiplier as f64).max(0.0),
        score_lead: raw.score_value[2] as f64 * constants.lead_multiplier as f64 * sign,
        variance_time: (raw.score_value[3] as f64 * constants.variance_time_multiplier as f64)
            .max(0.0),
    }
}

/// The dynamic-score center used for the whole life of one search:
/// the root expected score regressed toward zero, clamped to stay
/// within three quarters of a board-length of the root expectation.
pub fn recent_score_center(root_score_mean: f64) -> f64 {
    let radius = (NUM_POINTS as f64).sqrt() * SCORE_CENTER_CLAMP_SCALE;
    ((1.0 - SCORE_CENTER_ZERO_WEIGHT) * root_score_mean)
        .clamp(root_score_mean - radius, root_score_mean + radius)
}

/// Black's utility of an evaluation: the win/loss difference plus a
/// statically and a dynamically centered expected score value.
pub fn black_utility(outcome: &NetOutcome, recent_score_center: f64) -> f64 {
    let static_sv = expected_score_value(
        outcome.score_mean / STATIC_SCORE_SCALE,
        outcome.score_stdev / STATIC_SCORE_SCALE,
    );
    let dynamic_sv = expected_score_value(
        (outcome.score_mean - recent_score_center) / DYNAMIC_SCORE_SCALE,
        outcome.score_stdev / DYNAMIC_SCORE_SCALE,
    );
    WIN_LOSS_UTILITY * outcome.value
        + NO_RESULT_UTILITY * outcome.no_result_prob
        + STATIC_SCORE_UTILITY * static_sv
        + DYNAMIC_SCORE_UTILITY * dynamic_sv
}

// =============================================================================
// Half-Precision Packing
// =============================================================================

/// Pack an `f32` into IEEE 754 half precision with round-to-nearest-even.
///
/// Used to store per-node ownership maps at half the footprint; the
/// values are tanh outputs in [-1, 1], comfortably inside half range.
pub fn f16_pack(value: f32) -> u16 {
    let x = value.to_bits();
    let sign = ((x >> 16) & 0x8000) as u16;
    let raw_exp = (x >> 23) & 0xff;
    let mant = x & 0x007f_ffff;

    if raw_exp == 0xff {
        // Infinity and NaN; keep NaN-ness in the top mantissa bit.
        let nan = if mant != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    let exp = raw_exp as i32 - 127 + 15;
    if exp >= 0x1f {
        return sign | 0x7c00;
    }
    if exp <= 0 {
        if exp < -10 {
            return sign;
        }
        // Subnormal half: shift the full 24-bit significand down.
        let m = mant | 0x0080_0000;
        let shift = (14 - exp) as u32;
        let half_mant = (m >> shift) as u16;
        let round_bit = 1u32 << (shift - 1);
        if (m & round_bit) != 0 && ((m & (round_bit - 1)) != 0 || (half_mant & 1) != 0) {
            return sign | (half_mant + 1);
        }
        return sign | half_mant;
    }
    let mut half = sign | ((exp as u16) << 10) | (mant >> 13) as u16;
    let round_bits = mant & 0x1fff;
    if round_bits > 0x1000 || (round_bits == 0x1000 && (half & 1) == 1) {
        half = half.wrapping_add(1);
    }
    half
}

/// Unpack an IEEE 754 half-precision value into an `f32` exactly.
pub fn f16_unpack(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exp = ((half >> 10) & 0x1f) as u32;
    let mant = (half & 0x3ff) as u32;
    let bits = if exp == 0 {
        if mant == 0 {
            sign
        } else {
            // Normalize the subnormal significand.
            let mut e = 127 - 14;
            let mut m = mant;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | ((e as u32) << 23) | ((m & 0x3ff) << 13)
        }
    } else if exp == 0x1f {
        sign | 0x7f80_0000 | (mant << 13)
    } else {
        sign | ((exp + 127 - 15) << 23) | (mant << 13)
    };
    f32::from_bits(bits)
}
