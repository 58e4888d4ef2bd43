//! Yomi: a neural-network-guided Go analysis engine.
//!
//! This crate implements a batched, PUCT-driven Monte Carlo tree search
//! over 19x19 Go positions. It consumes a position (board, history,
//! rules, komi) and a policy/value network behind the [`net::Evaluator`]
//! trait, and produces a ranked set of candidate moves with win rates,
//! score leads, visit counts, principal variations, per-point ownership
//! and the raw policy.
//!
//! ## Modules
//!
//! - [`board`] - Position representation, move execution, coordinates
//! - [`ladder`] - Ladder reading for the input planes
//! - [`features`] - Input tensor building and board symmetries
//! - [`score`] - Expected-score-value tables
//! - [`net`] - The evaluator contract and output postprocessing
//! - [`tree`] - Search tree nodes and statistics
//! - [`search`] - PUCT selection, expansion, batching and the driver
//! - [`analysis`] - Report building and aggregation
//! - [`constants`] - Board geometry and engine parameters
//! - [`error`] - Typed failure kinds
//!
//! ## Example
//!
//! ```
//! use yomi::analysis::ReportOptions;
//! use yomi::board::{Board, Player, Rules};
//! use yomi::constants::NUM_POINTS;
//! use yomi::net::{EvalBatch, Evaluator, ModelConstants, RawNetOutput};
//! use yomi::search::{OwnershipMode, RunLimits, Search, SearchRequest};
//!
//! /// A placeholder network: uniform policy, balanced value head.
//! struct UniformNet(ModelConstants);
//!
//! impl Evaluator for UniformNet {
//!     fn constants(&self) -> &ModelConstants {
//!         &self.0
//!     }
//!
//!     fn evaluate(&mut self, batch: EvalBatch<'_>, include_ownership: bool) -> Vec<RawNetOutput> {
//!         (0..batch.len)
//!             .map(|_| RawNetOutput {
//!                 policy: vec![0.0; NUM_POINTS],
//!                 pass: vec![-4.0],
//!                 value: vec![0.0, 0.0, -8.0],
//!                 score_value: vec![0.0, 0.5, 0.0, 0.5],
//!                 ownership: include_ownership.then(|| vec![0.0; NUM_POINTS]),
//!             })
//!             .collect()
//!     }
//! }
//!
//! let mut net = UniformNet(ModelConstants {
//!     policy_out_channels: 1,
//!     ..ModelConstants::default()
//! });
//! let board = Board::empty();
//! let mut search = Search::create(
//!     &mut net,
//!     &SearchRequest {
//!         board: &board,
//!         prev_board: None,
//!         prev_prev_board: None,
//!         history: &[],
//!         player: Player::Black,
//!         rules: Rules::Japanese,
//!         komi: 7.5,
//!         nn_randomize: false,
//!         conservative_pass: false,
//!         wide_root_noise: 0.0,
//!         ownership_mode: OwnershipMode::Root,
//!         max_children: 64,
//!         seed: Some(1),
//!     },
//! )
//! .unwrap();
//! search
//!     .run(
//!         &mut net,
//!         RunLimits { max_visits: 32, max_time_ms: 1000, batch_size: 4 },
//!         || false,
//!     )
//!     .unwrap();
//! let report = search.analysis(&ReportOptions {
//!     top_k: 5,
//!     pv_len: 8,
//!     include_moves_ownership: false,
//! });
//! assert!(!report.moves.is_empty());
//! ```

pub mod analysis;
pub mod board;
pub mod constants;
pub mod error;
pub mod features;
pub mod ladder;
pub mod net;
pub mod score;
pub mod search;
pub mod tree;
