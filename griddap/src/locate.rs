//! Nearest point searches on coordinate axes.
//!
use ndarray::{ArrayView1, ArrayView2};
use num_traits::Float;

use crate::time::Timestamp;

/// Index of the axis value closest to `value`.
///
/// Ties go to the lowest index. Values outside the axis map to the nearest endpoint. An empty
/// axis yields 0.
///
pub fn nearest_1d<N>(axis: ArrayView1<N>, value: N) -> usize
where
    N: Float,
{
    let mut nearest = 0;
    let mut best: Option<N> = None;
    for (i, &point) in axis.iter().enumerate() {
        let distance = (point - value).abs();
        if best.map_or(true, |best| distance < best) {
            nearest = i;
            best = Some(distance);
        }
    }

    nearest
}

/// `(row, col)` of the grid point closest to `point` on a curvilinear grid.
///
/// `x` and `y` are the coordinates of each grid point and must have the same shape. Ties go to
/// the first match in row major order.
///
pub fn nearest_2d<N>(x: ArrayView2<N>, y: ArrayView2<N>, point: (N, N)) -> (usize, usize)
where
    N: Float,
{
    let (px, py) = point;
    let mut nearest = (0, 0);
    let mut best: Option<N> = None;
    for ((index, &gx), &gy) in x.indexed_iter().zip(y.iter()) {
        let (dx, dy) = (gx - px, gy - py);
        let distance = dx * dx + dy * dy;
        if best.map_or(true, |best| distance < best) {
            nearest = index;
            best = Some(distance);
        }
    }

    nearest
}

/// Index of the timestamp closest to `instant` in a sorted time axis.
///
/// Ties go to the earlier timestamp.
///
pub fn nearest_time(times: &[Timestamp], instant: Timestamp) -> usize {
    let after = times.partition_point(|t| *t < instant);
    if after == 0 {
        0
    } else if after == times.len() {
        times.len() - 1
    } else {
        let before = after - 1;
        if instant - times[before] <= times[after] - instant {
            before
        } else {
            after
        }
    }
}
