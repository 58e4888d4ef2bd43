//! Expected score value: the mean of `(2/pi) * atan(X / sqrt(361))`
//! under a Gaussian score distribution `X ~ N(mean, stdev)`.
//!
//! The value is precomputed once per process into a 2D table over
//! integer (mean, stdev) steps by integrating the Gaussian against the
//! atan curve at ten samples per standard-deviation unit out to five
//! standard deviations. Queries bilinearly interpolate the table and
//! clamp at its edges. Callers fold any center/scale into the query:
//! `E[(2/pi) atan((X - c) / (s * sqrt(361)))]` equals
//! `expected_score_value((mean - c) / s, stdev / s)`.

use std::sync::OnceLock;

use crate::constants::NUM_POINTS;

/// Largest |mean| the table covers, in scaled points.
const MEAN_RADIUS: usize = 600;

/// Largest stdev the table covers, in scaled points.
const STDEV_MAX: usize = 160;

/// Integration step in standard deviations.
const Z_STEP: f64 = 0.1;

/// Integration bound in standard deviations.
const Z_BOUND: f64 = 5.0;

const MEAN_STEPS: usize = 2 * MEAN_RADIUS + 1;
const STDEV_STEPS: usize = STDEV_MAX + 1;

/// Pointwise score value of a fixed score `x`.
#[inline]
fn score_value(x: f64) -> f64 {
    (2.0 / std::f64::consts::PI) * (x / (NUM_POINTS as f64).sqrt()).atan()
}

struct ScoreValueTable {
    values: Vec<f64>,
}

impl ScoreValueTable {
    fn build() -> Self {
        // Gaussian quadrature weights on the fixed z grid, shared by
        // every table entry.
        let n_samples = (2.0 * Z_BOUND / Z_STEP).round() as usize + 1;
        let mut zs = Vec::with_capacity(n_samples);
        let mut weights = Vec::with_capacity(n_samples);
        let mut weight_sum = 0.0;
        for k in 0..n_samples {
            let z = -Z_BOUND + k as f64 * Z_STEP;
            let w = (-0.5 * z * z).exp();
            zs.push(z);
            weights.push(w);
            weight_sum += w;
        }
        for w in &mut weights {
            *w /= weight_sum;
        }

        let mut values = vec![0.0; MEAN_STEPS * STDEV_STEPS];
        for mi in 0..MEAN_STEPS {
            let mean = mi as f64 - MEAN_RADIUS as f64;
            for si in 0..STDEV_STEPS {
                let v = if si == 0 {
                    score_value(mean)
                } else {
                    let stdev = si as f64;
                    zs.iter()
                        .zip(&weights)
                        .map(|(&z, &w)| w * score_value(mean + z * stdev))
                        .sum()
                };
                values[mi * STDEV_STEPS + si] = v;
            }
        }
        ScoreValueTable { values }
    }

    #[inline]
    fn at(&self, mi: usize, si: usize) -> f64 {
        self.values[mi * STDEV_STEPS + si]
    }
}

static TABLE: OnceLock<ScoreValueTable> = OnceLock::new();

/// Expected value of `(2/pi) * atan(X / 19)` for `X ~ N(mean, stdev)`.
///
/// Inputs outside the table range clamp to its edge; the result is
/// always within `[-1, 1]`.
pub fn expected_score_value(mean: f64, stdev: f64) -> f64 {
    let table = TABLE.get_or_init(ScoreValueTable::build);

    let m = mean.clamp(-(MEAN_RADIUS as f64), MEAN_RADIUS as f64) + MEAN_RADIUS as f64;
    let s = stdev.clamp(0.0, STDEV_MAX as f64);
    let mi = (m.floor() as usize).min(MEAN_STEPS - 2);
    let si = (s.floor() as usize).min(STDEV_STEPS - 2);
    let mf = m - mi as f64;
    let sf = s - si as f64;

    let v00 = table.at(mi, si);
    let v10 = table.at(mi + 1, si);
    let v01 = table.at(mi, si + 1);
    let v11 = table.at(mi + 1, si + 1);
    (1.0 - mf) * ((1.0 - sf) * v00 + sf * v01) + mf * ((1.0 - sf) * v10 + sf * v11)
}
