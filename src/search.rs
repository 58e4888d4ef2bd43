//! The search driver: leaf-parallel PUCT with batched evaluation.
//!
//! One `Search` owns its tree, scratch board and input buffers, and is
//! single-threaded and cooperative: the only suspension point is the
//! evaluator call. Parallelism comes purely from batching — descents
//! claim leaves with a virtual-loss increment along their path, the
//! whole batch goes to the net in one call, and backups unwind the
//! virtual losses while folding the results into the path's nodes.
//!
//! A descent that reaches a leaf already awaiting evaluation is
//! abandoned and retried; after eight fruitless attempts per batch slot
//! the batch is issued short.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::board::{Board, MoveError, PASS, Player, Point, RecentMove, Rules};
use crate::constants::{
    BATCH_SIZE_RANGE, CPUCT_BASE, CPUCT_LOG_OFFSET, CPUCT_LOG_SCALE, DEADLINE_CHECK_PERIOD,
    FPU_REDUCTION_MAX, HISTORY_LEN, MAX_CHILDREN_RANGE, MAX_DESCENT_ATTEMPTS_PER_SLOT,
    NUM_GLOBAL_FEATURES, NUM_POINTS, NUM_SPATIAL_CHANNELS, NUM_SYMMETRIES, ROOT_FPU_REDUCTION_MAX,
    TIME_MS_RANGE, UTILITY_STDEV_PRIOR, UTILITY_STDEV_PRIOR_WEIGHT, UTILITY_STDEV_SCALE,
    VISITS_RANGE, WIDE_ROOT_NOISE_RANGE,
};
use crate::error::SearchError;
use crate::features::{FeatureContext, FeatureScratch, symmetry_map, write_features};
use crate::net::{
    EvalBatch, Evaluator, ModelConstants, NetOutcome, RawNetOutput, black_utility, policy_logit,
    postprocess, recent_score_center, validate_output,
};
use crate::tree::{Edge, Edges, Node};

const SPATIAL_STRIDE: usize = NUM_POINTS * NUM_SPATIAL_CHANNELS;
const GLOBAL_STRIDE: usize = NUM_GLOBAL_FEATURES;

/// How ownership is aggregated for the report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OwnershipMode {
    /// Only the root evaluation's ownership map.
    Root,
    /// Visit-weighted average over the whole tree.
    Tree,
}

/// Everything needed to set up a search on one position.
pub struct SearchRequest<'a> {
    pub board: &'a Board,
    /// Position before the last move, if known.
    pub prev_board: Option<&'a Board>,
    /// Position before the last two moves, if known.
    pub prev_prev_board: Option<&'a Board>,
    /// Move history, most-recent-last; only the last five are used.
    pub history: &'a [RecentMove],
    pub player: Player,
    pub rules: Rules,
    pub komi: f32,
    /// Randomize the board symmetry fed to the net.
    pub nn_randomize: bool,
    /// Suppress history inputs at the root after a pass, so the net
    /// does not assume the opponent will pass again.
    pub conservative_pass: bool,
    /// Root exploration noise magnitude; 0 disables it.
    pub wide_root_noise: f64,
    pub ownership_mode: OwnershipMode,
    /// Children kept per expanded node.
    pub max_children: usize,
    /// Fixed seed for the per-search RNG; `None` seeds from the
    /// process-global generator.
    pub seed: Option<u64>,
}

/// Budgets for one `run` call.
#[derive(Copy, Clone, Debug)]
pub struct RunLimits {
    pub max_visits: u32,
    pub max_time_ms: u64,
    pub batch_size: usize,
}

/// A leaf claimed by a descent, frozen until its batch returns.
struct PendingLeaf {
    path: Vec<usize>,
    board: Board,
    prev: Option<Board>,
    prev_prev: Option<Board>,
    recent: Vec<RecentMove>,
    player: Player,
    symmetry: usize,
}

/// Reusable buffers owned by one search. They grow to the largest
/// batch ever needed and are never shrunk; the area buffers inside the
/// feature scratch only materialize under rules that want them.
#[derive(Debug)]
struct SearchScratch {
    board: Board,
    features: FeatureScratch,
    spatial: Vec<f32>,
    global: Vec<f32>,
    ownership: Vec<f32>,
}

impl SearchScratch {
    fn new() -> Self {
        SearchScratch {
            board: Board::empty(),
            features: FeatureScratch::new(),
            spatial: Vec::new(),
            global: Vec::new(),
            ownership: vec![0.0; NUM_POINTS],
        }
    }

    fn ensure_batch(&mut self, len: usize) {
        if self.spatial.len() < len * SPATIAL_STRIDE {
            self.spatial.resize(len * SPATIAL_STRIDE, 0.0);
        }
        if self.global.len() < len * GLOBAL_STRIDE {
            self.global.resize(len * GLOBAL_STRIDE, 0.0);
        }
    }
}

enum Descent {
    Claimed(PendingLeaf),
    Retry,
}

/// A root-evaluated search over one position.
#[derive(Debug)]
pub struct Search {
    pub(crate) root: Node,
    pub(crate) player: Player,
    pub(crate) rules: Rules,
    pub(crate) komi: f32,
    pub(crate) wide_root_noise: f64,
    pub(crate) ownership_mode: OwnershipMode,
    pub(crate) constants: ModelConstants,
    pub(crate) recent_score_center: f64,
    /// The root's own evaluation, kept for report-time self stats.
    pub(crate) root_outcome: NetOutcome,
    /// Dense policy over all 362 moves; illegal points hold -1.
    pub(crate) root_policy: Vec<f32>,
    /// Root ownership, black perspective.
    pub(crate) root_ownership: Vec<f32>,
    root_board: Board,
    root_prev: Option<Board>,
    root_prev_prev: Option<Board>,
    root_recent: Vec<RecentMove>,
    nn_randomize: bool,
    max_children: usize,
    rng: fastrand::Rng,
    scratch: SearchScratch,
}

impl Search {
    /// Evaluate the root once (always with ownership), expand it with
    /// the root policy optimism and record the dense root policy.
    pub fn create<E>(evaluator: &mut E, req: &SearchRequest<'_>) -> Result<Search, SearchError>
    where
        E: Evaluator + ?Sized,
    {
        let constants = evaluator.constants().clone();
        if !matches!(constants.policy_out_channels, 1 | 2 | 4) {
            return Err(SearchError::InvalidModelOutput {
                reason: format!(
                    "unrecognized policy channel count {}",
                    constants.policy_out_channels
                ),
            });
        }

        let wide_root_noise = req
            .wide_root_noise
            .clamp(WIDE_ROOT_NOISE_RANGE.0, WIDE_ROOT_NOISE_RANGE.1);
        let max_children = req
            .max_children
            .clamp(MAX_CHILDREN_RANGE.0, MAX_CHILDREN_RANGE.1);
        let mut rng = fastrand::Rng::with_seed(req.seed.unwrap_or_else(|| fastrand::u64(..)));
        let symmetry = if req.nn_randomize {
            rng.usize(0..NUM_SYMMETRIES)
        } else {
            0
        };

        let root_recent: Vec<RecentMove> = req.history
            [req.history.len().saturating_sub(HISTORY_LEN)..]
            .to_vec();

        let mut scratch = SearchScratch::new();
        scratch.ensure_batch(1);
        let ctx = FeatureContext {
            board: req.board,
            prev_board: req.prev_board,
            prev_prev_board: req.prev_prev_board,
            recent: &root_recent,
            player: req.player,
            rules: req.rules,
            komi: req.komi,
            conservative_pass_at_root: req.conservative_pass,
        };
        write_features(
            &ctx,
            symmetry,
            &mut scratch.features,
            &mut scratch.spatial[..SPATIAL_STRIDE],
            &mut scratch.global[..GLOBAL_STRIDE],
        );
        let outputs = evaluator.evaluate(
            EvalBatch {
                len: 1,
                spatial: &scratch.spatial[..SPATIAL_STRIDE],
                global: &scratch.global[..GLOBAL_STRIDE],
            },
            true,
        );
        if outputs.len() != 1 {
            return Err(SearchError::InvalidModelOutput {
                reason: format!("evaluator returned {} outputs for the root", outputs.len()),
            });
        }
        let raw = &outputs[0];
        validate_output(raw, &constants, true)?;

        let root_outcome = postprocess(raw, req.player, &constants);
        let center = recent_score_center(root_outcome.score_mean);
        let utility = black_utility(&root_outcome, center);

        let mut root = Node::new(req.player);
        root.nn_utility = utility;
        root.apply_eval(&root_outcome, utility);

        let mut root_ownership = vec![0.0f32; NUM_POINTS];
        let own_raw = raw.ownership.as_ref().ok_or(SearchError::MissingOwnership)?;
        decode_ownership(own_raw, symmetry, req.player, &mut root_ownership);
        if req.ownership_mode == OwnershipMode::Tree {
            root.set_ownership(&root_ownership);
        }

        let mut root_policy = vec![-1.0f32; NUM_POINTS + 1];
        expand_node(
            &mut root,
            req.board,
            req.player,
            raw,
            &constants,
            symmetry,
            constants.root_policy_optimism,
            max_children,
            Some(&mut root_policy),
        );

        debug!(
            player = ?req.player,
            score_mean = root_outcome.score_mean,
            center,
            "search created"
        );
        Ok(Search {
            root,
            player: req.player,
            rules: req.rules,
            komi: req.komi,
            wide_root_noise,
            ownership_mode: req.ownership_mode,
            constants,
            recent_score_center: center,
            root_outcome,
            root_policy,
            root_ownership,
            root_board: req.board.clone(),
            root_prev: req.prev_board.cloned(),
            root_prev_prev: req.prev_prev_board.cloned(),
            root_recent,
            nn_randomize: req.nn_randomize,
            max_children,
            rng,
            scratch,
        })
    }

    /// Completed evaluations at the root, the root's own included.
    pub fn root_visits(&self) -> u32 {
        self.root.visits
    }

    /// The player to move at the root.
    pub fn player(&self) -> Player {
        self.player
    }

    /// Run the batched descent/backup loop until the visit budget is
    /// met, the deadline fires, or `should_abort` asks for a stop.
    /// Returns `Ok(true)` when cancelled; a cancelled search should be
    /// discarded. Hitting the deadline is a normal return.
    pub fn run<E, F>(
        &mut self,
        evaluator: &mut E,
        limits: RunLimits,
        mut should_abort: F,
    ) -> Result<bool, SearchError>
    where
        E: Evaluator + ?Sized,
        F: FnMut() -> bool,
    {
        let max_visits = limits.max_visits.clamp(VISITS_RANGE.0, VISITS_RANGE.1);
        let deadline =
            Duration::from_millis(limits.max_time_ms.clamp(TIME_MS_RANGE.0, TIME_MS_RANGE.1));
        let batch_size = limits
            .batch_size
            .clamp(BATCH_SIZE_RANGE.0, BATCH_SIZE_RANGE.1);
        let include_ownership = self.ownership_mode == OwnershipMode::Tree;

        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut deadline_hit = false;

        while self.root.visits < max_visits && !deadline_hit {
            if should_abort() {
                return Ok(true);
            }
            if start.elapsed() >= deadline {
                break;
            }

            // Claim up to one batch of leaves, never overshooting the
            // visit budget.
            let want = batch_size.min((max_visits - self.root.visits) as usize);
            let attempt_cap = MAX_DESCENT_ATTEMPTS_PER_SLOT * batch_size as u32;
            let mut batch: Vec<PendingLeaf> = Vec::with_capacity(want);
            let mut retries: u32 = 0;
            while batch.len() < want {
                attempts += 1;
                if attempts % DEADLINE_CHECK_PERIOD == 0 && start.elapsed() >= deadline {
                    deadline_hit = true;
                    break;
                }
                match self.descend_and_claim()? {
                    Descent::Claimed(leaf) => batch.push(leaf),
                    Descent::Retry => {
                        // Only fruitless descents count against the
                        // cutoff; claims never shrink the budget.
                        retries += 1;
                        if retries >= attempt_cap {
                            break;
                        }
                    }
                }
            }
            if batch.is_empty() {
                break;
            }
            trace!(
                size = batch.len(),
                retries,
                visits = self.root.visits,
                "evaluating batch"
            );

            // Build the input tensors, batch-major.
            self.scratch.ensure_batch(batch.len());
            for (i, leaf) in batch.iter().enumerate() {
                let ctx = FeatureContext {
                    board: &leaf.board,
                    prev_board: leaf.prev.as_ref(),
                    prev_prev_board: leaf.prev_prev.as_ref(),
                    recent: &leaf.recent,
                    player: leaf.player,
                    rules: self.rules,
                    komi: self.komi,
                    conservative_pass_at_root: false,
                };
                write_features(
                    &ctx,
                    leaf.symmetry,
                    &mut self.scratch.features,
                    &mut self.scratch.spatial[i * SPATIAL_STRIDE..(i + 1) * SPATIAL_STRIDE],
                    &mut self.scratch.global[i * GLOBAL_STRIDE..(i + 1) * GLOBAL_STRIDE],
                );
            }
            let outputs = evaluator.evaluate(
                EvalBatch {
                    len: batch.len(),
                    spatial: &self.scratch.spatial[..batch.len() * SPATIAL_STRIDE],
                    global: &self.scratch.global[..batch.len() * GLOBAL_STRIDE],
                },
                include_ownership,
            );
            if outputs.len() != batch.len() {
                return Err(SearchError::InvalidModelOutput {
                    reason: format!(
                        "evaluator returned {} outputs for a batch of {}",
                        outputs.len(),
                        batch.len()
                    ),
                });
            }

            for (leaf, raw) in batch.iter().zip(&outputs) {
                validate_output(raw, &self.constants, include_ownership)?;
                self.apply_backup(leaf, raw)?;
                if should_abort() {
                    return Ok(true);
                }
            }
        }

        debug!(
            visits = self.root.visits,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        Ok(false)
    }

    /// One descent from the root: select through expanded nodes, play
    /// the moves on the scratch board, and claim the first unexpanded
    /// node reached. Virtual loss is added along the way and unwound
    /// again when the descent has to be abandoned.
    fn descend_and_claim(&mut self) -> Result<Descent, SearchError> {
        self.scratch.board.clone_from(&self.root_board);
        let mut prev = self.root_prev.clone();
        let mut prev_prev = self.root_prev_prev.clone();
        let mut recent = self.root_recent.clone();
        let mut player = self.player;
        let mut path: Vec<usize> = Vec::new();

        enum Walk {
            Claimed(PendingLeaf),
            Collision(Vec<usize>),
            DeadEdge(Vec<usize>),
            Illegal(Point, Player, MoveError),
        }

        let wide_root_noise = self.wide_root_noise;
        let nn_randomize = self.nn_randomize;
        let outcome = {
            let mut node: &mut Node = &mut self.root;
            loop {
                if node.pending_eval {
                    break Walk::Collision(path);
                }
                node.in_flight += 1;
                if !node.is_expanded() {
                    node.pending_eval = true;
                    let symmetry = if nn_randomize {
                        self.rng.usize(0..NUM_SYMMETRIES)
                    } else {
                        0
                    };
                    break Walk::Claimed(PendingLeaf {
                        path,
                        board: self.scratch.board.clone(),
                        prev,
                        prev_prev,
                        recent,
                        player,
                        symmetry,
                    });
                }

                let idx = select_edge(node, path.is_empty(), wide_root_noise, &mut self.rng);
                let mv = node.expanded_edges().expect("node is expanded")[idx].mv;

                prev_prev = prev.take();
                prev = Some(self.scratch.board.clone());
                match self.scratch.board.play(mv, player) {
                    Ok(_) => {}
                    Err(MoveError::Suicide) => {
                        // The cheap legality filter admitted a point
                        // that turns out to be suicide; kill the edge
                        // and retry the descent.
                        if let Edges::Expanded(edges) = &mut node.edges {
                            edges[idx].prior = 0.0;
                        }
                        break Walk::DeadEdge(path);
                    }
                    Err(err) => break Walk::Illegal(mv, player, err),
                }
                recent.push(RecentMove { mv, player });
                if recent.len() > HISTORY_LEN {
                    recent.remove(0);
                }

                let next_player = player.opponent();
                let Edges::Expanded(edges) = &mut node.edges else {
                    unreachable!("node is expanded")
                };
                let edge = &mut edges[idx];
                if edge.child.is_none() {
                    edge.child = Some(Box::new(Node::new(next_player)));
                }
                path.push(idx);
                node = edge.child.as_deref_mut().expect("child just ensured");
                player = next_player;
            }
        };

        match outcome {
            Walk::Claimed(leaf) => Ok(Descent::Claimed(leaf)),
            Walk::Collision(path) => {
                // The colliding node itself was never incremented;
                // unwind the ancestors only.
                let trim = path.len().saturating_sub(1);
                unwind_virtual_loss(&mut self.root, &path[..trim]);
                Ok(Descent::Retry)
            }
            Walk::DeadEdge(path) => {
                unwind_virtual_loss(&mut self.root, &path);
                Ok(Descent::Retry)
            }
            Walk::Illegal(mv, player, source) => Err(SearchError::IllegalMove {
                mv,
                player,
                source,
            }),
        }
    }

    /// Fold one evaluated leaf back into the tree: set the leaf's own
    /// evaluation, expand it, then walk the path adding the stats and
    /// removing the virtual losses.
    fn apply_backup(&mut self, leaf: &PendingLeaf, raw: &RawNetOutput) -> Result<(), SearchError> {
        let outcome = postprocess(raw, leaf.player, &self.constants);
        let utility = black_utility(&outcome, self.recent_score_center);

        {
            let leaf_node = node_at_mut(&mut self.root, &leaf.path);
            leaf_node.nn_utility = utility;
            leaf_node.pending_eval = false;
            if self.ownership_mode == OwnershipMode::Tree {
                let own_raw = raw.ownership.as_ref().ok_or(SearchError::MissingOwnership)?;
                decode_ownership(own_raw, leaf.symmetry, leaf.player, &mut self.scratch.ownership);
                leaf_node.set_ownership(&self.scratch.ownership);
            }
            expand_node(
                leaf_node,
                &leaf.board,
                leaf.player,
                raw,
                &self.constants,
                leaf.symmetry,
                self.constants.policy_optimism,
                self.max_children,
                None,
            );
        }

        let mut node = &mut self.root;
        node.apply_eval(&outcome, utility);
        node.in_flight -= 1;
        for &i in &leaf.path {
            node = node.child_at_mut(i);
            node.apply_eval(&outcome, utility);
            node.in_flight -= 1;
        }
        Ok(())
    }
}

/// Walk `path` from `root` and return the node at its end.
pub(crate) fn node_at_mut<'a>(root: &'a mut Node, path: &[usize]) -> &'a mut Node {
    let mut node = root;
    for &i in path {
        node = node.child_at_mut(i);
    }
    node
}

/// Remove one virtual loss from `root` and the children along `path`.
fn unwind_virtual_loss(root: &mut Node, path: &[usize]) {
    let mut node = root;
    debug_assert!(node.in_flight > 0);
    node.in_flight -= 1;
    for &i in path {
        node = node.child_at_mut(i);
        debug_assert!(node.in_flight > 0);
        node.in_flight -= 1;
    }
}

/// Decode a raw ownership head (tanh inputs, symmetry space, player
/// perspective) into real-space black-perspective values.
fn decode_ownership(raw: &[f32], symmetry: usize, player: Player, out: &mut [f32]) {
    let sym = symmetry_map(symmetry);
    let sign = player.sign() as f32;
    for p in 0..NUM_POINTS {
        out[p] = (raw[sym[p] as usize] as f64).tanh() as f32 * sign;
    }
}

/// PUCT over the edges of an expanded node, from the perspective of the
/// node's player to move. Returns the index of the selected edge; ties
/// go to the earlier edge.
fn select_edge(node: &Node, is_root: bool, wide_root_noise: f64, rng: &mut fastrand::Rng) -> usize {
    let edges = node.expanded_edges().expect("selection on expanded node");
    let sign = node.player_to_move.sign();

    let mut total_child_weight = 0.0;
    let mut visited_prior_mass = 0.0;
    for e in edges {
        if let Some(c) = &e.child {
            let w = c.weight();
            total_child_weight += w;
            if w > 0.0 {
                visited_prior_mass += e.prior as f64;
            }
        }
    }

    // Observed utility spread, blended with a prior, scales exploration.
    let visits = node.visits as f64;
    let parent_avg_utility = node.avg_utility();
    let observed_var = if node.visits > 0 {
        (node.utility_sq_sum / visits - parent_avg_utility * parent_avg_utility).max(0.0)
    } else {
        0.0
    };
    let blended_var = (observed_var * visits
        + UTILITY_STDEV_PRIOR * UTILITY_STDEV_PRIOR * UTILITY_STDEV_PRIOR_WEIGHT)
        / (visits + UTILITY_STDEV_PRIOR_WEIGHT);
    let stdev_factor =
        1.0 + UTILITY_STDEV_SCALE * (blended_var.sqrt() / UTILITY_STDEV_PRIOR - 1.0);

    // First-play urgency: the parent's utility (leaning on the direct
    // evaluation while little policy mass has been visited), docked by
    // an amount growing with the visited mass.
    let fpu_max = if is_root {
        ROOT_FPU_REDUCTION_MAX
    } else {
        FPU_REDUCTION_MAX
    };
    let reduction = fpu_max * visited_prior_mass.sqrt();
    let blend = (visited_prior_mass * visited_prior_mass).min(1.0);
    let parent_for_fpu = blend * parent_avg_utility + (1.0 - blend) * node.nn_utility;
    let fpu = parent_for_fpu - sign * reduction;

    let cpuct = CPUCT_BASE
        + CPUCT_LOG_SCALE * ((total_child_weight + CPUCT_LOG_OFFSET) / CPUCT_LOG_OFFSET).ln();
    let explore_base = cpuct * (total_child_weight + 0.01).sqrt() * stdev_factor;

    // Wide-root noise flattens priors inside the formula only; the
    // stored priors are untouched.
    let use_noise = is_root && wide_root_noise > 0.0;
    let flat_priors: Option<Vec<f64>> = if use_noise {
        let pow = 1.0 / (4.0 * wide_root_noise + 1.0);
        let mut flat: Vec<f64> = edges.iter().map(|e| (e.prior as f64).powf(pow)).collect();
        let sum: f64 = flat.iter().sum();
        if sum > 0.0 {
            for f in &mut flat {
                *f /= sum;
            }
        }
        Some(flat)
    } else {
        None
    };

    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, e) in edges.iter().enumerate() {
        let (child_weight, child_utility) = match &e.child {
            Some(c) => (
                c.weight(),
                if c.visits > 0 {
                    c.utility_sum / c.visits as f64
                } else {
                    fpu
                },
            ),
            None => (0.0, fpu),
        };
        let prior = match &flat_priors {
            Some(flat) => flat[i],
            None => e.prior as f64,
        };
        let explore = explore_base * prior / (1.0 + child_weight);
        let mut score = explore + sign * child_utility;
        if use_noise && rng.bool() {
            score += wide_root_noise * standard_normal(rng).abs();
        }
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

/// A standard normal draw via the Box-Muller transform.
fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = rng.f64().max(1e-300);
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Expand a leaf: enumerate plausibly legal moves, softmax the blended
/// policy logits over them plus pass, keep the `max_children` best by
/// prior (pass always kept, last), and renormalize so the edge priors
/// sum to one. When `dense_policy` is given, the pre-pruning softmax is
/// recorded there with -1 at illegal points and pass at index 361.
#[allow(clippy::too_many_arguments)]
fn expand_node(
    node: &mut Node,
    board: &Board,
    player: Player,
    raw: &RawNetOutput,
    constants: &ModelConstants,
    symmetry: usize,
    optimism: f64,
    max_children: usize,
    dense_policy: Option<&mut [f32]>,
) {
    debug_assert!(!node.is_expanded());
    let sym = symmetry_map(symmetry);

    let mut entries: Vec<(Point, f64)> = Vec::with_capacity(NUM_POINTS);
    for p in 0..NUM_POINTS {
        if board.is_plausibly_legal(p as Point, player) {
            let logit = policy_logit(raw, constants, optimism, sym[p] as usize);
            entries.push((p as Point, logit));
        }
    }
    let pass_logit = policy_logit(raw, constants, optimism, NUM_POINTS);

    // Stabilized softmax over the legal moves and pass.
    let mut max = pass_logit;
    for &(_, l) in &entries {
        if l > max {
            max = l;
        }
    }
    let mut sum = (pass_logit - max).exp();
    for (_, l) in &mut entries {
        *l = (*l - max).exp();
        sum += *l;
    }
    for (_, l) in &mut entries {
        *l /= sum;
    }
    let pass_prior = (pass_logit - max).exp() / sum;

    if let Some(dense) = dense_policy {
        dense.fill(-1.0);
        for &(p, prob) in &entries {
            dense[p as usize] = prob as f32;
        }
        dense[NUM_POINTS] = pass_prior as f32;
    }

    // Keep the best `max_children` moves by prior, position index as
    // the tie break; pass rides along in addition.
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    entries.truncate(max_children);

    let kept: f64 = entries.iter().map(|e| e.1).sum::<f64>() + pass_prior;
    let mut edges: Vec<Edge> = Vec::with_capacity(entries.len() + 1);
    for &(p, prob) in &entries {
        edges.push(Edge {
            mv: p,
            prior: (prob / kept) as f32,
            child: None,
        });
    }
    edges.push(Edge {
        mv: PASS,
        prior: (pass_prior / kept) as f32,
        child: None,
    });
    node.edges = Edges::Expanded(edges);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PointState, parse_coord};
    use crate::constants::NUM_MOVES;

    struct StubNet {
        constants: ModelConstants,
        evals: u32,
    }

    impl StubNet {
        fn new() -> Self {
            StubNet {
                constants: ModelConstants {
                    policy_out_channels: 1,
                    score_mean_multiplier: 1.0,
                    score_stdev_multiplier: 1.0,
                    lead_multiplier: 1.0,
                    variance_time_multiplier: 1.0,
                    ..ModelConstants::default()
                },
                evals: 0,
            }
        }
    }

    impl Evaluator for StubNet {
        fn constants(&self) -> &ModelConstants {
            &self.constants
        }

        fn evaluate(
            &mut self,
            batch: EvalBatch<'_>,
            include_ownership: bool,
        ) -> Vec<RawNetOutput> {
            self.evals += 1;
            (0..batch.len)
                .map(|_| RawNetOutput {
                    policy: vec![0.0; NUM_POINTS],
                    pass: vec![-4.0],
                    value: vec![0.2, 0.1, -6.0],
                    score_value: vec![0.3, 8.0, 0.3, 1.0],
                    ownership: include_ownership.then(|| vec![0.1; NUM_POINTS]),
                })
                .collect()
        }
    }

    fn request<'a>(board: &'a Board) -> SearchRequest<'a> {
        SearchRequest {
            board,
            prev_board: None,
            prev_prev_board: None,
            history: &[],
            player: Player::Black,
            rules: Rules::Japanese,
            komi: 7.5,
            nn_randomize: false,
            conservative_pass: false,
            wide_root_noise: 0.0,
            ownership_mode: OwnershipMode::Root,
            max_children: 64,
            seed: Some(7),
        }
    }

    fn tree_quiescent(node: &Node) -> bool {
        if node.in_flight != 0 || node.pending_eval {
            return false;
        }
        if let Some(edges) = node.expanded_edges() {
            for e in edges {
                if let Some(c) = &e.child {
                    if !tree_quiescent(c) {
                        return false;
                    }
                }
            }
        }
        true
    }

    #[test]
    fn root_expansion_on_the_empty_board() {
        let board = Board::empty();
        let mut net = StubNet::new();
        let mut req = request(&board);
        req.max_children = 361;
        let search = Search::create(&mut net, &req).unwrap();

        let edges = search.root.expanded_edges().unwrap();
        // Every point is a candidate, plus pass, which comes last.
        assert_eq!(edges.len(), NUM_POINTS + 1);
        assert_eq!(edges.last().unwrap().mv, PASS);
        let prior_sum: f64 = edges.iter().map(|e| e.prior as f64).sum();
        assert!((prior_sum - 1.0).abs() < 1e-6);
        // Non-pass edges are in non-increasing prior order.
        for pair in edges[..edges.len() - 1].windows(2) {
            assert!(pair[0].prior >= pair[1].prior);
        }
        // Dense policy: all 361 points legal, none marked -1.
        assert_eq!(search.root_policy.len(), NUM_MOVES);
        assert!(search.root_policy.iter().all(|&p| p >= 0.0));
        assert_eq!(search.root_visits(), 1);
    }

    #[test]
    fn top_k_keeps_pass_and_renormalizes() {
        let board = Board::empty();
        let mut net = StubNet::new();
        let mut req = request(&board);
        req.max_children = 8;
        let search = Search::create(&mut net, &req).unwrap();
        let edges = search.root.expanded_edges().unwrap();
        assert_eq!(edges.len(), 9);
        assert_eq!(edges.last().unwrap().mv, PASS);
        let prior_sum: f64 = edges.iter().map(|e| e.prior as f64).sum();
        assert!((prior_sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn run_stops_at_exactly_max_visits() {
        let board = Board::empty();
        let mut net = StubNet::new();
        let mut search = Search::create(&mut net, &request(&board)).unwrap();
        let cancelled = search
            .run(
                &mut net,
                RunLimits {
                    max_visits: 16,
                    max_time_ms: 60_000,
                    batch_size: 4,
                },
                || false,
            )
            .unwrap();
        assert!(!cancelled);
        // The root evaluation counts as visit one, so 15 were simulated.
        assert_eq!(search.root_visits(), 16);
        assert!(tree_quiescent(&search.root));
    }

    #[test]
    fn visits_do_not_overshoot_with_large_batches() {
        let board = Board::empty();
        let mut net = StubNet::new();
        let mut search = Search::create(&mut net, &request(&board)).unwrap();
        search
            .run(
                &mut net,
                RunLimits {
                    max_visits: 18,
                    max_time_ms: 60_000,
                    batch_size: 64,
                },
                || false,
            )
            .unwrap();
        assert_eq!(search.root_visits(), 18);
        assert!(tree_quiescent(&search.root));
    }

    #[test]
    fn cancellation_before_the_first_batch() {
        let board = Board::empty();
        let mut net = StubNet::new();
        let mut search = Search::create(&mut net, &request(&board)).unwrap();
        let cancelled = search
            .run(
                &mut net,
                RunLimits {
                    max_visits: 64,
                    max_time_ms: 60_000,
                    batch_size: 4,
                },
                || true,
            )
            .unwrap();
        assert!(cancelled);
        assert_eq!(search.root_visits(), 1);
        // Only the root evaluation ever reached the net.
        assert_eq!(net.evals, 1);
    }

    #[test]
    fn pass_is_the_only_candidate_when_nothing_is_legal() {
        // Black owns every point except A1; black cannot play there.
        let mut stones = [PointState::Stone(Player::Black); NUM_POINTS];
        stones[parse_coord("A1").unwrap() as usize] = PointState::Empty;
        let board = Board::from_stones(stones, None).unwrap();
        let mut net = StubNet::new();
        let search = Search::create(&mut net, &request(&board)).unwrap();
        let edges = search.root.expanded_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].mv, PASS);
        assert!((edges[0].prior - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ko_point_is_not_a_candidate() {
        let mut board = Board::empty();
        for m in ["D5", "C4", "D3", "E4"] {
            board.play(parse_coord(m).unwrap(), Player::Black).unwrap();
        }
        for m in ["E5", "F4", "E3"] {
            board.play(parse_coord(m).unwrap(), Player::White).unwrap();
        }
        board.play(parse_coord("D4").unwrap(), Player::White).unwrap();
        let ko = board.ko().unwrap();

        let mut net = StubNet::new();
        let mut req = request(&board);
        req.max_children = 361;
        let search = Search::create(&mut net, &req).unwrap();
        let edges = search.root.expanded_edges().unwrap();
        assert!(edges.iter().all(|e| e.mv != ko));
        assert_eq!(search.root_policy[ko as usize], -1.0);
    }

    #[test]
    fn selection_prefers_the_larger_prior_first() {
        let mut node = Node::new(Player::Black);
        node.nn_utility = 0.0;
        node.apply_eval(
            &NetOutcome {
                black_win_prob: 0.5,
                no_result_prob: 0.0,
                value: 0.0,
                score_mean: 0.0,
                score_stdev: 1.0,
                score_lead: 0.0,
                variance_time: 0.0,
            },
            0.0,
        );
        node.edges = Edges::Expanded(vec![
            Edge {
                mv: 0,
                prior: 0.7,
                child: None,
            },
            Edge {
                mv: 1,
                prior: 0.3,
                child: None,
            },
        ]);
        let mut rng = fastrand::Rng::with_seed(1);
        assert_eq!(select_edge(&node, false, 0.0, &mut rng), 0);
    }

    #[test]
    fn batched_descents_spread_over_children() {
        // With virtual loss, a batch of four descents from a fresh root
        // must claim four distinct leaves.
        let board = Board::empty();
        let mut net = StubNet::new();
        let mut search = Search::create(&mut net, &request(&board)).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            match search.descend_and_claim().unwrap() {
                Descent::Claimed(leaf) => {
                    assert_eq!(leaf.path.len(), 1);
                    assert!(!seen.contains(&leaf.path[0]));
                    seen.push(leaf.path[0]);
                }
                Descent::Retry => panic!("no collision expected on a fresh root"),
            }
        }
        assert_eq!(search.root.in_flight, 4);
    }
}
