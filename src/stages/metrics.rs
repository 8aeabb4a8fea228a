//! Built-in frame-sequence metrics.
//!
//! Thin DTW-based kernels over ndarray matrices: a (frames x dims) matrix
//! per item, one frame distance evaluated along the optimal alignment path.
//! The `normalized` flag divides the accumulated cost by the alignment path
//! length.

use ndarray::{Array2, ArrayView1};

/// Frame-level distance used inside DTW.
pub type FrameDistance = fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64;

/// Cosine distance between two frames, in [0, 2].
///
/// A zero-norm frame is at distance 0 from another zero-norm frame and 1
/// from anything else.
pub fn cosine_distance(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let norm_x = x.dot(&x).sqrt();
    let norm_y = y.dot(&y).sqrt();
    if norm_x == 0.0 || norm_y == 0.0 {
        return if norm_x == norm_y { 0.0 } else { 1.0 };
    }
    1.0 - x.dot(&y) / (norm_x * norm_y)
}

/// Symmetrised Kullback-Leibler divergence between two frames interpreted
/// as unnormalized distributions. Values are floored to a small epsilon so
/// zero entries do not blow up the logarithm.
pub fn kl_distance(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    const EPS: f64 = 1e-10;

    let sum_x: f64 = x.iter().map(|v| v.max(EPS)).sum();
    let sum_y: f64 = y.iter().map(|v| v.max(EPS)).sum();

    let mut forward = 0.0;
    let mut backward = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let p = a.max(EPS) / sum_x;
        let q = b.max(EPS) / sum_y;
        forward += p * (p / q).ln();
        backward += q * (q / p).ln();
    }
    (forward + backward) / 2.0
}

/// Dynamic time warping between two frame sequences.
///
/// Classic quadratic DP; when `normalized` is set the accumulated cost is
/// divided by the length of the optimal alignment path.
pub fn dtw(x: &Array2<f64>, y: &Array2<f64>, frame_dist: FrameDistance, normalized: bool) -> f64 {
    let n = x.nrows();
    let m = y.nrows();
    if n == 0 || m == 0 {
        return f64::INFINITY;
    }

    // cost[i][j]: accumulated cost ending at (i, j); length tracks the
    // number of steps along the chosen path for normalization.
    let mut cost = vec![vec![0.0f64; m]; n];
    let mut length = vec![vec![0usize; m]; n];

    cost[0][0] = frame_dist(x.row(0), y.row(0));
    length[0][0] = 1;
    for j in 1..m {
        cost[0][j] = cost[0][j - 1] + frame_dist(x.row(0), y.row(j));
        length[0][j] = j + 1;
    }
    for i in 1..n {
        cost[i][0] = cost[i - 1][0] + frame_dist(x.row(i), y.row(0));
        length[i][0] = i + 1;
    }

    for i in 1..n {
        for j in 1..m {
            let d = frame_dist(x.row(i), y.row(j));
            let (prev_cost, prev_len) = [
                (cost[i - 1][j - 1], length[i - 1][j - 1]),
                (cost[i - 1][j], length[i - 1][j]),
                (cost[i][j - 1], length[i][j - 1]),
            ]
            .into_iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .expect("three candidates");
            cost[i][j] = prev_cost + d;
            length[i][j] = prev_len + 1;
        }
    }

    if normalized {
        cost[n - 1][m - 1] / length[n - 1][m - 1] as f64
    } else {
        cost[n - 1][m - 1]
    }
}

/// DTW with the cosine frame distance, the default evaluation metric.
pub fn dtw_cosine(x: &Array2<f64>, y: &Array2<f64>, normalized: bool) -> f64 {
    dtw(x, y, cosine_distance, normalized)
}

/// DTW with the symmetrised KL frame distance, for posteriorgram features.
pub fn dtw_kl_divergence(x: &Array2<f64>, y: &Array2<f64>, normalized: bool) -> f64 {
    dtw(x, y, kl_distance, normalized)
}
