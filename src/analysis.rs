//! Report building: aggregate the finished tree into root statistics,
//! ownership maps and a ranked candidate list.
//!
//! Reporting is a pure read of the tree — no node statistics are
//! touched — so calling it twice in a row yields identical output.
//! Child weights are adjusted in two report-time steps before
//! aggregation: exploration-noise pruning (when wide-root noise was
//! on) removes weight from children whose utility trails the running
//! average beyond their fair policy share, and a Student-t reweighting
//! discounts children whose utility sits far below the weighted mean
//! for their visit count.

use tracing::debug;

use crate::board::{Point, format_coord, point_to_xy};
use crate::constants::{
    NOISE_PRUNE_GAP_SCALE, NOISE_PRUNE_MAX_SUBTRACT, NUM_POINTS, OWNERSHIP_MIN_PROP_COEFF,
    OWNERSHIP_MIN_PROP_POW, OWNERSHIP_PRUNE_FACTOR, PV_LEN_RANGE, TOP_K_RANGE,
};
use crate::search::{OwnershipMode, Search};
use crate::tree::Node;

/// What to include in a report.
#[derive(Copy, Clone, Debug)]
pub struct ReportOptions {
    /// Candidate moves to report.
    pub top_k: usize,
    /// Principal variation length beyond the candidate move itself.
    pub pv_len: usize,
    /// Attach a per-candidate ownership map (tree ownership mode only).
    pub include_moves_ownership: bool,
}

/// One reported candidate move. All rates and scores are from Black's
/// perspective; the `*_lost` fields are from the root player's.
#[derive(Clone, Debug)]
pub struct MoveCandidate {
    /// Board coordinates with y = 0 at the top; pass is (-1, -1).
    pub x: i32,
    pub y: i32,
    pub win_rate: f64,
    pub win_rate_lost: f64,
    pub score_lead: f64,
    pub score_selfplay: f64,
    pub score_stdev: f64,
    pub visits: u32,
    pub points_lost: f64,
    pub relative_points_lost: f64,
    /// Rank among the reported moves, 0 = most visited.
    pub order: usize,
    pub prior: f64,
    /// Move labels of the best continuation, this move first.
    pub pv: Vec<String>,
    pub ownership: Option<Vec<f32>>,
}

/// The final analysis of one search.
#[derive(Clone, Debug)]
pub struct Report {
    pub root_win_rate: f64,
    pub root_score_lead: f64,
    pub root_score_selfplay: f64,
    pub root_score_stdev: f64,
    /// Per-point ownership in [-1, 1], +1 = Black owns the point.
    pub ownership: Vec<f32>,
    pub ownership_stdev: Vec<f32>,
    /// Dense root policy over 362 moves, -1 at illegal points, pass
    /// at index 361.
    pub policy: Vec<f32>,
    pub moves: Vec<MoveCandidate>,
}

impl Report {
    /// The most visited candidate, if any move was searched.
    pub fn best_move(&self) -> Option<&MoveCandidate> {
        self.moves.first()
    }
}

struct ChildStat {
    edge_idx: usize,
    mv: Point,
    prior: f64,
    visits: u32,
    /// Aggregation weight, seeded with the visit count and adjusted by
    /// the report-time reweighting steps.
    weight: f64,
    /// Mean utility from the root player's perspective.
    utility: f64,
    value_avg: f64,
    lead_avg: f64,
    mean_avg: f64,
    mean_sq_avg: f64,
}

impl Search {
    /// Build the report. Pure: the tree and the search are not mutated,
    /// so repeated calls return identical data.
    pub fn analysis(&self, opts: &ReportOptions) -> Report {
        let top_k = opts.top_k.clamp(TOP_K_RANGE.0, TOP_K_RANGE.1);
        let pv_len = opts.pv_len.clamp(PV_LEN_RANGE.0, PV_LEN_RANGE.1);
        let sign = self.player.sign();

        let edges = self.root.expanded_edges().unwrap_or(&[]);
        let mut stats: Vec<ChildStat> = Vec::new();
        for (i, e) in edges.iter().enumerate() {
            let Some(child) = e.child.as_ref() else {
                continue;
            };
            if child.visits == 0 {
                continue;
            }
            let visits = child.visits as f64;
            stats.push(ChildStat {
                edge_idx: i,
                mv: e.mv,
                prior: e.prior as f64,
                visits: child.visits,
                weight: visits,
                utility: sign * (child.utility_sum / visits),
                value_avg: child.value_sum / visits,
                lead_avg: child.score_lead_sum / visits,
                mean_avg: child.score_mean_sum / visits,
                mean_sq_avg: child.score_mean_sq_sum / visits,
            });
        }
        let pre_total: f64 = stats.iter().map(|s| s.weight).sum();

        if self.wide_root_noise > 0.0 {
            prune_noise_weights(&mut stats);
        }
        reweight_by_value(&mut stats);
        let post_total: f64 = stats.iter().map(|s| s.weight).sum();
        if post_total > 0.0 {
            let scale = pre_total / post_total;
            for s in &mut stats {
                s.weight *= scale;
            }
        }
        debug!(
            children = stats.len(),
            pre_total, post_total, "aggregating root children"
        );

        // Root aggregates: reweighted children plus the root's own
        // evaluation with weight one.
        let self_eval = &self.root_outcome;
        let mut weight_sum = 1.0;
        let mut value = self_eval.value;
        let mut lead = self_eval.score_lead;
        let mut mean = self_eval.score_mean;
        let mut mean_sq =
            self_eval.score_stdev * self_eval.score_stdev + self_eval.score_mean * self_eval.score_mean;
        for s in &stats {
            weight_sum += s.weight;
            value += s.weight * s.value_avg;
            lead += s.weight * s.lead_avg;
            mean += s.weight * s.mean_avg;
            mean_sq += s.weight * s.mean_sq_avg;
        }
        value /= weight_sum;
        lead /= weight_sum;
        mean /= weight_sum;
        mean_sq /= weight_sum;
        let root_win_rate = (value + 1.0) / 2.0;
        let root_score_stdev = (mean_sq - mean * mean).max(0.0).sqrt();

        let (ownership, ownership_stdev) = match self.ownership_mode {
            OwnershipMode::Root => (self.root_ownership.clone(), vec![0.0f32; NUM_POINTS]),
            OwnershipMode::Tree => tree_ownership(&self.root),
        };

        // Candidates ranked by raw visits, insertion order as the tie
        // break (the edge list is already in descending prior order).
        let mut ranking: Vec<usize> = (0..stats.len()).collect();
        ranking.sort_by(|&a, &b| {
            stats[b]
                .visits
                .cmp(&stats[a].visits)
                .then(stats[a].edge_idx.cmp(&stats[b].edge_idx))
        });
        ranking.truncate(top_k);

        let best_lead = ranking.first().map(|&i| stats[i].lead_avg);
        let mut moves = Vec::with_capacity(ranking.len());
        for (order, &i) in ranking.iter().enumerate() {
            let s = &stats[i];
            let (x, y) = point_to_xy(s.mv);
            let win_rate = (s.value_avg + 1.0) / 2.0;
            let child = edges[s.edge_idx]
                .child
                .as_deref()
                .expect("ranked child exists");
            let ownership = if opts.include_moves_ownership
                && self.ownership_mode == OwnershipMode::Tree
            {
                Some(tree_ownership(child).0)
            } else {
                None
            };
            moves.push(MoveCandidate {
                x,
                y,
                win_rate,
                win_rate_lost: sign * (root_win_rate - win_rate),
                score_lead: s.lead_avg,
                score_selfplay: s.mean_avg,
                score_stdev: (s.mean_sq_avg - s.mean_avg * s.mean_avg).max(0.0).sqrt(),
                visits: s.visits,
                points_lost: sign * (lead - s.lead_avg),
                relative_points_lost: sign * (best_lead.expect("ranking nonempty") - s.lead_avg),
                order,
                prior: s.prior,
                pv: principal_variation(s.mv, child, 1 + pv_len),
                ownership,
            });
        }

        Report {
            root_win_rate,
            root_score_lead: lead,
            root_score_selfplay: mean,
            root_score_stdev,
            ownership,
            ownership_stdev,
            policy: self.root_policy.clone(),
            moves,
        }
    }
}

/// Remove weight from low-utility children in excess of their lenient
/// policy share. Children are scanned in descending prior order; the
/// running average uses the already-adjusted weights.
fn prune_noise_weights(stats: &mut [ChildStat]) {
    let mut order: Vec<usize> = (0..stats.len()).collect();
    order.sort_by(|&a, &b| {
        stats[b]
            .prior
            .partial_cmp(&stats[a].prior)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(stats[a].edge_idx.cmp(&stats[b].edge_idx))
    });

    let mut weight_so_far = 0.0;
    let mut utility_sum = 0.0;
    let mut policy_so_far = 0.0;
    for (k, &i) in order.iter().enumerate() {
        if k > 0 && weight_so_far > 0.0 && policy_so_far > 0.0 {
            let avg_utility = utility_sum / weight_so_far;
            let gap = avg_utility - stats[i].utility;
            if gap > 0.0 {
                let share = 2.0 * weight_so_far * stats[i].prior / policy_so_far;
                if stats[i].weight > share {
                    let excess = stats[i].weight - share;
                    let subtract = (excess * (1.0 - (-gap / NOISE_PRUNE_GAP_SCALE).exp()))
                        .min(NOISE_PRUNE_MAX_SUBTRACT);
                    stats[i].weight -= subtract;
                }
            }
        }
        weight_so_far += stats[i].weight;
        utility_sum += stats[i].weight * stats[i].utility;
        policy_so_far += stats[i].prior;
    }
}

/// Multiply each child's weight by a Student-t (three degrees of
/// freedom) tail probability of its utility against the weighted mean,
/// with an uncertainty shrinking as the child's weight grows.
fn reweight_by_value(stats: &mut [ChildStat]) {
    let weight_sum: f64 = stats.iter().map(|s| s.weight).sum();
    if weight_sum <= 0.0 {
        return;
    }
    let simple_value: f64 =
        stats.iter().map(|s| s.weight * s.utility).sum::<f64>() / weight_sum;
    for s in stats.iter_mut() {
        if s.weight <= 0.0 {
            continue;
        }
        let stdev = (1e-8 + 1.0 / (1.5 * s.weight.sqrt())).sqrt();
        let z = (s.utility - simple_value) / stdev;
        let t = z / 3f64.sqrt();
        let p = 0.5 + (t.atan() + t / (1.0 + z * z / 3.0)) / std::f64::consts::PI;
        s.weight *= (p + 1e-4).powf(0.25);
    }
}

/// Visit-weighted average of the per-node ownership maps over the
/// tree, splitting each node's proportion between itself (weight one)
/// and its children (their visits), with the children's portion
/// subdivided by squared visits. Subtrees whose proportion falls under
/// a visit-dependent threshold contribute their own map directly.
fn tree_ownership(root: &Node) -> (Vec<f32>, Vec<f32>) {
    let mut mean = vec![0.0f64; NUM_POINTS];
    let mut sq = vec![0.0f64; NUM_POINTS];
    let mut decode = vec![0.0f32; NUM_POINTS];
    accumulate_ownership(root, 1.0, &mut mean, &mut sq, &mut decode);

    let ownership: Vec<f32> = mean.iter().map(|&m| m as f32).collect();
    let ownership_stdev: Vec<f32> = mean
        .iter()
        .zip(&sq)
        .map(|(&m, &s)| (s - m * m).max(0.0).sqrt() as f32)
        .collect();
    (ownership, ownership_stdev)
}

fn accumulate_ownership(
    node: &Node,
    prop: f64,
    mean: &mut [f64],
    sq: &mut [f64],
    decode: &mut [f32],
) {
    let visits = node.visits.max(1) as f64;
    let min_prop = OWNERSHIP_MIN_PROP_COEFF * visits.powf(OWNERSHIP_MIN_PROP_POW);
    let prune_prop = OWNERSHIP_PRUNE_FACTOR * min_prop;

    let children: Vec<&Node> = node
        .expanded_edges()
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| e.child.as_deref())
                .filter(|c| c.visits > 0)
                .collect()
        })
        .unwrap_or_default();

    if prop < min_prop || children.is_empty() {
        add_ownership(node, prop, mean, sq, decode);
        return;
    }

    let visit_sum: f64 = children.iter().map(|c| c.visits as f64).sum();
    let visit_sq_sum: f64 = children.iter().map(|c| (c.visits as f64).powi(2)).sum();
    let mut self_portion = prop / (1.0 + visit_sum);
    let children_portion = prop * visit_sum / (1.0 + visit_sum);
    for child in children {
        let v = child.visits as f64;
        let share = children_portion * v * v / visit_sq_sum;
        if share < prune_prop {
            self_portion += share;
        } else {
            accumulate_ownership(child, share, mean, sq, decode);
        }
    }
    add_ownership(node, self_portion, mean, sq, decode);
}

fn add_ownership(node: &Node, prop: f64, mean: &mut [f64], sq: &mut [f64], decode: &mut [f32]) {
    if prop <= 0.0 || !node.ownership_into(decode) {
        return;
    }
    for p in 0..NUM_POINTS {
        let o = decode[p] as f64;
        mean[p] += prop * o;
        sq[p] += prop * o * o;
    }
}

/// Follow the most-visited children downward, emitting move labels;
/// the candidate's own move comes first.
fn principal_variation(first_mv: Point, child: &Node, max_len: usize) -> Vec<String> {
    let mut pv = vec![format_coord(first_mv)];
    let mut node = child;
    while pv.len() < max_len {
        let Some(edges) = node.expanded_edges() else {
            break;
        };
        let mut best: Option<(u32, Point, &Node)> = None;
        for e in edges {
            if let Some(c) = e.child.as_deref() {
                if c.visits > 0 && best.is_none_or(|(v, _, _)| c.visits > v) {
                    best = Some((c.visits, e.mv, c));
                }
            }
        }
        let Some((_, mv, next)) = best else {
            break;
        };
        pv.push(format_coord(mv));
        node = next;
    }
    pv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Board, Player, Rules};
    use crate::constants::NUM_MOVES;
    use crate::net::{EvalBatch, Evaluator, ModelConstants, RawNetOutput};
    use crate::search::{RunLimits, SearchRequest};

    /// Deterministic stub: a mild preference for the center point and a
    /// balanced value head.
    struct StubNet {
        constants: ModelConstants,
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
            (0..batch.len)
                .map(|_| {
                    let mut policy = vec![0.0; NUM_POINTS];
                    policy[NUM_POINTS / 2] = 2.0;
                    RawNetOutput {
                        policy,
                        pass: vec![-5.0],
                        value: vec![0.1, 0.0, -7.0],
                        score_value: vec![0.4, 9.0, 0.5, 1.0],
                        ownership: include_ownership.then(|| vec![0.2; NUM_POINTS]),
                    }
                })
                .collect()
        }
    }

    fn searched(ownership_mode: crate::search::OwnershipMode, visits: u32) -> Search {
        let board = Board::empty();
        let mut net = StubNet::new();
        let req = SearchRequest {
            board: &board,
            prev_board: None,
            prev_prev_board: None,
            history: &[],
            player: Player::Black,
            rules: Rules::Japanese,
            komi: 7.5,
            nn_randomize: false,
            conservative_pass: false,
            wide_root_noise: 0.0,
            ownership_mode,
            max_children: 64,
            seed: Some(11),
        };
        let mut search = Search::create(&mut net, &req).unwrap();
        search
            .run(
                &mut net,
                RunLimits {
                    max_visits: visits,
                    max_time_ms: 60_000,
                    batch_size: 4,
                },
                || false,
            )
            .unwrap();
        search
    }

    fn options() -> ReportOptions {
        ReportOptions {
            top_k: 10,
            pv_len: 6,
            include_moves_ownership: false,
        }
    }

    #[test]
    fn report_shape_and_ranges() {
        let search = searched(crate::search::OwnershipMode::Root, 64);
        let report = search.analysis(&options());

        assert!((0.0..=1.0).contains(&report.root_win_rate));
        assert!(report.root_score_stdev >= 0.0);
        assert_eq!(report.policy.len(), NUM_MOVES);
        assert_eq!(report.ownership.len(), NUM_POINTS);
        assert!(!report.moves.is_empty());

        // Most-visited first, orders sequential, PVs start with the move.
        for (i, m) in report.moves.iter().enumerate() {
            assert_eq!(m.order, i);
            if i > 0 {
                assert!(report.moves[i - 1].visits >= m.visits);
            }
            assert!(!m.pv.is_empty());
            assert!(m.pv.len() <= 1 + 6);
        }
        let best = report.best_move().unwrap();
        // The stub favors the center point.
        assert_eq!((best.x, best.y), (9, 9));
        assert_eq!(best.relative_points_lost, 0.0);
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let search = searched(crate::search::OwnershipMode::Tree, 48);
        let opts = ReportOptions {
            top_k: 10,
            pv_len: 4,
            include_moves_ownership: true,
        };
        let a = search.analysis(&opts);
        let b = search.analysis(&opts);
        assert_eq!(a.policy, b.policy);
        assert_eq!(a.ownership, b.ownership);
        assert_eq!(a.ownership_stdev, b.ownership_stdev);
        assert_eq!(a.root_win_rate, b.root_win_rate);
        assert_eq!(a.moves.len(), b.moves.len());
        for (ma, mb) in a.moves.iter().zip(&b.moves) {
            assert_eq!(ma.visits, mb.visits);
            assert_eq!(ma.pv, mb.pv);
            assert_eq!(ma.ownership, mb.ownership);
        }
    }

    #[test]
    fn tree_ownership_is_bounded() {
        let search = searched(crate::search::OwnershipMode::Tree, 64);
        let report = search.analysis(&options());
        for (&o, &s) in report.ownership.iter().zip(&report.ownership_stdev) {
            assert!((-1.0001..=1.0001).contains(&(o as f64)), "ownership {o}");
            assert!(s >= 0.0);
        }
        // The stub's uniform 0.2 tanh inputs make every point lean black.
        assert!(report.ownership.iter().all(|&o| o > 0.0));
    }

    #[test]
    fn root_mode_reports_the_root_map_with_zero_stdev() {
        let search = searched(crate::search::OwnershipMode::Root, 32);
        let report = search.analysis(&options());
        assert_eq!(report.ownership, search.root_ownership);
        assert!(report.ownership_stdev.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn loss_fields_are_consistent() {
        let search = searched(crate::search::OwnershipMode::Root, 64);
        let report = search.analysis(&options());
        let best = &report.moves[0];
        for m in &report.moves {
            // Black at the root: relative loss is best lead minus lead.
            let expect = best.score_lead - m.score_lead;
            assert!((m.relative_points_lost - expect).abs() < 1e-9);
            let expect_points = report.root_score_lead - m.score_lead;
            assert!((m.points_lost - expect_points).abs() < 1e-9);
        }
    }

    #[test]
    fn reweighting_discounts_clear_losers() {
        let mut stats = vec![
            ChildStat {
                edge_idx: 0,
                mv: 0,
                prior: 0.5,
                visits: 100,
                weight: 100.0,
                utility: 0.3,
                value_avg: 0.3,
                lead_avg: 1.0,
                mean_avg: 1.0,
                mean_sq_avg: 2.0,
            },
            ChildStat {
                edge_idx: 1,
                mv: 1,
                prior: 0.5,
                visits: 100,
                weight: 100.0,
                utility: -0.5,
                value_avg: -0.5,
                lead_avg: -1.0,
                mean_avg: -1.0,
                mean_sq_avg: 2.0,
            },
        ];
        reweight_by_value(&mut stats);
        assert!(stats[0].weight > stats[1].weight);
        assert!(stats[1].weight > 0.0);
    }

    #[test]
    fn noise_pruning_spares_fair_shares() {
        // Equal priors and equal utilities: nothing to prune.
        let mut stats = vec![
            ChildStat {
                edge_idx: 0,
                mv: 0,
                prior: 0.4,
                visits: 50,
                weight: 50.0,
                utility: 0.1,
                value_avg: 0.1,
                lead_avg: 0.0,
                mean_avg: 0.0,
                mean_sq_avg: 1.0,
            },
            ChildStat {
                edge_idx: 1,
                mv: 1,
                prior: 0.4,
                visits: 50,
                weight: 50.0,
                utility: 0.1,
                value_avg: 0.1,
                lead_avg: 0.0,
                mean_avg: 0.0,
                mean_sq_avg: 1.0,
            },
        ];
        prune_noise_weights(&mut stats);
        assert_eq!(stats[0].weight, 50.0);
        assert_eq!(stats[1].weight, 50.0);

        // A low-utility child holding far more weight than its policy
        // share loses most of the excess.
        stats[1].utility = -0.8;
        stats[1].weight = 200.0;
        prune_noise_weights(&mut stats);
        assert!(stats[1].weight < 200.0);
        // The lenient share is 2 * 50 * 0.4 / 0.4 = 100.
        assert!(stats[1].weight >= 100.0);
    }
}
