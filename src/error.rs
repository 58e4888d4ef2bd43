//! Typed failures surfaced by a search.
//!
//! Cancellation is not an error: a cancelled run reports itself through
//! the `run` return value and the partially built tree is simply
//! dropped. Hitting the deadline is not an error either — the tree
//! built so far is still reportable.

use crate::board::{MoveError, Player, Point};

/// Failure kinds a search can surface. There are no retries inside the
/// engine and no silent fallback to a degraded mode.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The search tried to play a move the board rejected. Candidate
    /// generation filters illegal moves, so this is a bug; the search
    /// aborts rather than continuing on a corrupt tree.
    #[error("illegal move {mv} for {player:?} inside the search: {source}")]
    IllegalMove {
        mv: Point,
        player: Player,
        #[source]
        source: MoveError,
    },
    /// Ownership was requested but the evaluator did not return it.
    #[error("ownership requested but the evaluator returned none")]
    MissingOwnership,
    /// The evaluator returned tensors with unexpected shapes, or its
    /// model constants are outside the recognized set.
    #[error("invalid model output: {reason}")]
    InvalidModelOutput { reason: String },
}
