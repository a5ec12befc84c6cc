use std::fmt;

use munkres::{solve_assignment, WeightMatrix};
use ndarray::ArrayView2;
use tracing::warn;

/// Cost of a track/detection pair that may never be matched.
pub const FORBIDDEN: f32 = f32::INFINITY;

/// `(row, column, cost)`: track index, detection index and their distance.
pub type Assignment = (usize, usize, f32);

/// Pairs rows (tracks, in creation order) with columns (detections) of a
/// cost matrix. Only pairs with `cost < max_cost` may be returned, and each
/// row and each column appears at most once.
pub trait Matcher: fmt::Debug {
    fn name(&self) -> &'static str;

    fn assign(&self, costs: ArrayView2<'_, f32>, max_cost: f32) -> Vec<Assignment>;
}

/// Rows pick their nearest unclaimed column in turn, so earlier rows win
/// contested columns even when a later row would fit them better.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyMatcher;

impl Matcher for GreedyMatcher {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn assign(&self, costs: ArrayView2<'_, f32>, max_cost: f32) -> Vec<Assignment> {
        let (rows, cols) = costs.dim();
        let mut claimed = vec![false; cols];
        let mut assignments = Vec::with_capacity(rows.min(cols));

        for r in 0..rows {
            let mut best: Option<(usize, f32)> = None;

            for c in 0..cols {
                if claimed[c] {
                    continue;
                }

                let cost = costs[[r, c]];
                if cost < max_cost && best.map_or(true, |(_, b)| cost < b) {
                    best = Some((c, cost));
                }
            }

            if let Some((c, cost)) = best {
                claimed[c] = true;
                assignments.push((r, c, cost));
            }
        }

        assignments
    }
}

/// Minimum total cost assignment (Hungarian method).
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimalMatcher;

impl OptimalMatcher {
    /// Penalty standing in for gated-out pairs; it must dwarf any sum of real
    /// costs so the solver prefers more matches over cheaper ones.
    const UNASSIGNABLE: f32 = 100_000.0;

    /// Larger problems are matched greedily.
    const MAX_SIZE: usize = 256;
}

impl Matcher for OptimalMatcher {
    fn name(&self) -> &'static str {
        "optimal"
    }

    fn assign(&self, costs: ArrayView2<'_, f32>, max_cost: f32) -> Vec<Assignment> {
        let (rows, cols) = costs.dim();
        if rows == 0 || cols == 0 {
            return Vec::new();
        }

        let n = rows.max(cols);
        if n > Self::MAX_SIZE {
            warn!(n, max = Self::MAX_SIZE, "cost matrix too big, matching greedily");
            return GreedyMatcher.assign(costs, max_cost);
        }

        let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
            if r < rows && c < cols && costs[[r, c]] < max_cost {
                costs[[r, c]]
            } else {
                Self::UNASSIGNABLE
            }
        });

        let positions = match solve_assignment(&mut weights) {
            Ok(positions) => positions,
            Err(err) => {
                warn!(?err, "assignment could not be solved, matching greedily");
                return GreedyMatcher.assign(costs, max_cost);
            }
        };

        let mut assignments: Vec<Assignment> = positions
            .into_iter()
            .filter(|p| p.row < rows && p.column < cols)
            .filter_map(|p| {
                let cost = costs[[p.row, p.column]];
                (cost < max_cost).then_some((p.row, p.column, cost))
            })
            .collect();

        assignments.sort_unstable_by_key(|&(r, _, _)| r);
        assignments
    }
}
