use nalgebra as na;

use crate::bbox::{BBox, Ltrb};

/// `min(area) / max(area)`; zero when both boxes are degenerate.
#[inline]
pub fn area_ratio(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    let (aa, ab) = (a.area(), b.area());
    let max = aa.max(ab);

    if max > 0.0 {
        aa.min(ab) / max
    } else {
        0.0
    }
}

/// Center distance scaled by `2 - area_ratio`, so boxes of very different
/// size look up to twice as far apart as their centers are.
#[inline]
pub fn weighted_distance(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    na::distance(&a.center(), &b.center()) * (2.0 - area_ratio(a, b))
}

/// Frame-count-weighted mean after folding in one more sample.
#[inline]
pub fn running_mean(mean: f32, count: u32, sample: f32) -> f32 {
    (mean * count as f32 + sample) / (count + 1) as f32
}
