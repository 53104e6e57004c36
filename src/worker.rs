//! The per-rank worker: one participant in the epoch protocol.
//!
//! A worker owns its contiguous chunk of the dataset, the memberships for
//! that chunk, and a length-K cluster array. The coordinator (rank 0) is
//! itself a worker that additionally seeds, fuses gathered partials,
//! commits, and decides convergence.
//!
//! The assignment+accumulation step is thread-parallel: the chunk is split
//! into at most `threads` contiguous subranges, each subrange folds its
//! points into a private cluster array, and the partials are fused back in
//! subrange order. Because fuse is associative and commutative, the split
//! never changes the committed result beyond float rounding; fusing in a
//! fixed order keeps a given configuration bit-reproducible.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::fabric::{step, tag, Fabric};
use crate::point::Point;
use crate::seed::{self, InitMethod};
use crate::wire;

pub(crate) struct Worker<F: Fabric> {
    fabric: F,
    k: usize,
    dim: usize,
    threads: usize,
    tolerance: f32,
    pool: rayon::ThreadPool,
    /// This worker's chunk of the dataset.
    points: Vec<Point>,
    /// Membership of each local point, updated once per epoch.
    memberships: Vec<u32>,
    /// Length-K cluster array. On the coordinator this is the global,
    /// committed view; elsewhere it mirrors the last broadcast.
    clusters: Vec<Cluster>,
    /// Global loss after the most recent epoch sync.
    loss: f32,
}

impl<F: Fabric> Worker<F> {
    pub fn new(fabric: F, k: usize, dim: usize, threads: usize, tolerance: f32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        Ok(Self {
            fabric,
            k,
            dim,
            threads,
            tolerance,
            pool,
            points: Vec::new(),
            memberships: Vec::new(),
            clusters: Vec::new(),
            loss: 0.0,
        })
    }

    pub fn rank(&self) -> usize {
        self.fabric.rank()
    }

    pub fn loss(&self) -> f32 {
        self.loss
    }

    pub fn fabric_mut(&mut self) -> &mut F {
        &mut self.fabric
    }

    /// The committed centroid array.
    pub fn centroids(&self) -> Vec<Point> {
        self.clusters.iter().map(|c| *c.centroid()).collect()
    }

    /// Split the dataset into contiguous per-worker chunks and receive
    /// this worker's own. Only the coordinator passes `Some`.
    pub fn scatter_points(&mut self, dataset: Option<&[Point]>) -> Result<()> {
        let parts = dataset.map(|data| {
            let mut parts = Vec::with_capacity(self.fabric.world_size());
            let mut offset = 0;
            for size in chunk_sizes(data.len(), self.fabric.world_size()) {
                parts.push(wire::encode_all(&data[offset..offset + size]));
                offset += size;
            }
            parts
        });

        let own = self.fabric.scatter(tag(0, step::POINTS), parts)?;
        self.points = wire::decode_all(&own, self.dim)?;
        self.memberships = vec![0; self.points.len()];
        Ok(())
    }

    /// Draw the initial centroids. The coordinator seeds from the full
    /// dataset; everyone else starts from identity clusters and picks up
    /// the real centroids at the first broadcast.
    pub fn seed_clusters(
        &mut self,
        dataset: Option<&[Point]>,
        method: InitMethod,
        rng_seed: u64,
    ) -> Result<()> {
        self.clusters = match dataset {
            Some(data) => {
                let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
                seed::initialize(method, data, self.k, &mut rng)?
            }
            None => vec![Cluster::identity(self.dim); self.k],
        };
        Ok(())
    }

    /// Protocol steps 1–3 for one epoch: receive the committed centroids,
    /// fold local losses into the global loss, and learn whether the run
    /// has converged. Returns the coordinator's convergence verdict.
    pub fn sync_epoch(&mut self, epoch: u32) -> Result<bool> {
        // Step 1: centroid broadcast. Every rank resets its cluster array
        // onto the broadcast centroids, clearing any working state.
        let coordinator = self.rank() == crate::fabric::COORDINATOR;
        let mut frame = if coordinator {
            wire::encode_all(&self.centroids())
        } else {
            Vec::new()
        };
        self.fabric.broadcast(tag(epoch, step::CENTROIDS), &mut frame)?;
        let centroids: Vec<Point> = wire::decode_all(&frame, self.dim)?;
        if centroids.len() != self.k {
            return Err(Error::ShortFrame {
                expected: self.k * wire::POINT_WIRE_SIZE,
                found: frame.len(),
            });
        }
        for (cluster, centroid) in self.clusters.iter_mut().zip(centroids) {
            cluster.reset(centroid);
        }

        // Step 2: loss of the previous epoch's memberships against the
        // fresh centroids, reduced at the coordinator and re-broadcast.
        let local = self.local_loss();
        let reduced = self.fabric.reduce_sum(tag(epoch, step::LOSS), local)?;
        let mut loss_frame = match reduced {
            Some(global) => wire::encode_f32(global),
            None => Vec::new(),
        };
        self.fabric.broadcast(tag(epoch, step::LOSS), &mut loss_frame)?;
        let global_loss = wire::decode_f32(&loss_frame)?;

        // Step 3: the coordinator alone decides convergence; the flag is
        // broadcast so no worker runs a later epoch than another.
        let mut flag_frame = if coordinator {
            wire::encode_bool((global_loss - self.loss).abs() <= self.tolerance)
        } else {
            Vec::new()
        };
        self.fabric.broadcast(tag(epoch, step::FLAG), &mut flag_frame)?;
        let converged = wire::decode_bool(&flag_frame)?;

        self.loss = global_loss;
        Ok(converged)
    }

    /// Protocol step 4: assign every local point to its nearest centroid
    /// and accumulate it into the matching cluster, thread-parallel with
    /// private per-thread partials fused in subrange order.
    pub fn assign_accumulate(&mut self) {
        if self.points.is_empty() {
            return;
        }

        let chunk = self.points.len().div_ceil(self.threads);
        let points = &self.points;
        let memberships = &mut self.memberships;
        let clusters = &self.clusters;

        let partials: Vec<Vec<Cluster>> = self.pool.install(|| {
            points
                .par_chunks(chunk)
                .zip(memberships.par_chunks_mut(chunk))
                .map(|(pts, ms)| {
                    // Working state is zero after the epoch reset, so this
                    // copy is the fuse identity carrying the broadcast
                    // centroids.
                    let mut local = clusters.clone();
                    for (p, m) in pts.iter().zip(ms.iter_mut()) {
                        let nearest = nearest_cluster(&local, p);
                        *m = nearest as u32;
                        local[nearest].add_point(p);
                    }
                    local
                })
                .collect()
        });

        for partial in &partials {
            for (cluster, thread_cluster) in self.clusters.iter_mut().zip(partial) {
                cluster.fuse(thread_cluster);
            }
        }
    }

    /// Protocol steps 5–6: gather per-worker partials at the coordinator,
    /// fuse them in rank order, and commit the new centroids.
    pub fn update_global(&mut self, epoch: u32) -> Result<()> {
        let frame = wire::encode_all(&self.clusters);
        let gathered = self.fabric.gather(tag(epoch, step::CLUSTERS), frame)?;

        if let Some(frames) = gathered {
            // The coordinator's own partials are already in
            // `self.clusters` (frame 0 is its own encoding); fuse the
            // remote ranks on top, in rank order.
            for frame in &frames[1..] {
                let remote: Vec<Cluster> = wire::decode_all(frame, self.dim)?;
                for (cluster, r) in self.clusters.iter_mut().zip(&remote) {
                    cluster.fuse(r);
                }
            }
            for cluster in &mut self.clusters {
                cluster.commit();
            }
        }
        Ok(())
    }

    /// Gather local memberships into the global vector at the
    /// coordinator. Chunks are contiguous and gathered in rank order, so
    /// concatenation restores dataset order.
    pub fn finalize(&mut self, epoch: u32) -> Result<Option<Vec<u32>>> {
        let frame = wire::encode_memberships(&self.memberships);
        let gathered = self
            .fabric
            .gather_variable(tag(epoch, step::MEMBERSHIPS), frame)?;

        match gathered {
            Some(frames) => {
                let mut all = Vec::new();
                for f in &frames {
                    all.extend(wire::decode_memberships(f)?);
                }
                Ok(Some(all))
            }
            None => Ok(None),
        }
    }

    /// Sum of distances from each local point to its assigned centroid,
    /// accumulated per subrange and then in subrange order so the result
    /// is stable for a fixed thread count.
    fn local_loss(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }

        let chunk = self.points.len().div_ceil(self.threads);
        let points = &self.points;
        let memberships = &self.memberships;
        let clusters = &self.clusters;

        let partials: Vec<f32> = self.pool.install(|| {
            points
                .par_chunks(chunk)
                .zip(memberships.par_chunks(chunk))
                .map(|(pts, ms)| {
                    let mut acc = 0.0f32;
                    for (p, &m) in pts.iter().zip(ms) {
                        acc += clusters[m as usize].distance_to(p);
                    }
                    acc
                })
                .collect()
        });

        partials.iter().sum()
    }
}

/// Index of the nearest cluster; ties go to the lowest index.
#[inline]
fn nearest_cluster(clusters: &[Cluster], p: &Point) -> usize {
    let mut nearest = 0;
    let mut min_dist = clusters[0].sq_distance_to(p);
    for (i, cluster) in clusters.iter().enumerate().skip(1) {
        let d = cluster.sq_distance_to(p);
        if d < min_dist {
            min_dist = d;
            nearest = i;
        }
    }
    nearest
}

/// Contiguous chunk sizes: `⌊n/w⌋` each, with the `n mod w` leftover
/// points going to the last workers. Stable and deterministic in `n, w`.
pub(crate) fn chunk_sizes(n: usize, world: usize) -> Vec<usize> {
    let base = n / world;
    let rem = n % world;
    (0..world)
        .map(|i| base + usize::from(i >= world - rem))
        .collect()
}
