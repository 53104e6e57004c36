//! Centroid initialization.
//!
//! Seeding is a coordinator-only act: rank 0 owns the full dataset, draws
//! the initial centroids from it, and the first epoch's broadcast makes
//! them visible everywhere. Both methods are deterministic given a seed.

use rand::Rng;

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::point::Point;

/// How initial centroids are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InitMethod {
    /// K distinct dataset points, drawn uniformly without replacement.
    #[default]
    Random,
    /// Farthest-first traversal: a random first pick, then repeatedly the
    /// point whose minimum distance to the chosen set is maximal.
    Furthest,
}

/// Draw initial clusters from the dataset.
///
/// Requires `k >= 1` and `k <= points.len()`.
pub fn initialize<R: Rng>(
    method: InitMethod,
    points: &[Point],
    k: usize,
    rng: &mut R,
) -> Result<Vec<Cluster>> {
    if k < 1 {
        return Err(Error::InvalidParameter {
            name: "num_clusters",
            message: "must be at least 1",
        });
    }
    if points.len() < k {
        return Err(Error::InvalidClusterCount {
            requested: k,
            n_items: points.len(),
        });
    }

    let picks = match method {
        InitMethod::Random => pick_random(points.len(), k, rng),
        InitMethod::Furthest => pick_furthest(points, k, rng),
    };

    Ok(picks.into_iter().map(|i| Cluster::new(points[i])).collect())
}

/// K distinct indices, uniform, duplicates rejected and redrawn.
fn pick_random<R: Rng>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    let mut picks: Vec<usize> = Vec::with_capacity(k);
    while picks.len() < k {
        let idx = rng.random_range(0..n);
        if !picks.contains(&idx) {
            picks.push(idx);
        }
    }
    picks
}

/// Farthest-first traversal. Ties go to the lowest index, so the sequence
/// is fully determined by the first random pick.
fn pick_furthest<R: Rng>(points: &[Point], k: usize, rng: &mut R) -> Vec<usize> {
    let mut picks: Vec<usize> = Vec::with_capacity(k);
    picks.push(rng.random_range(0..points.len()));

    while picks.len() < k {
        let mut furthest = 0usize;
        let mut max_dist = f32::NEG_INFINITY;

        for (i, p) in points.iter().enumerate() {
            let mut min_dist = f32::INFINITY;
            for &c in &picks {
                let d = points[c].sq_distance(p);
                if d < min_dist {
                    min_dist = d;
                }
            }
            // Strict > keeps the first (lowest-index) maximizer.
            if min_dist > max_dist {
                max_dist = min_dist;
                furthest = i;
            }
        }

        picks.push(furthest);
    }

    picks
}
