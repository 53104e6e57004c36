//! The orchestrator: configuration, worker spawning, and the epoch loop.
//!
//! [`Engine`] is configured builder-style and drives a full run: partition
//! the dataset across W workers, seed, iterate epochs until the loss-based
//! convergence test fires or the epoch budget runs out, then gather the
//! global membership vector. Every worker executes the same loop; the
//! coordinator (rank 0) additionally owns seeding, commits, and the
//! convergence decision.
//!
//! The run advances through the phases
//! `Init → Ready → (Broadcast → Assign → Gather → Commit)* → Finalize →
//! Done`, with any fatal error tearing down the fabric so all workers
//! fail together instead of deadlocking.

use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::fabric::{Fabric, LocalFabric, COORDINATOR};
use crate::point::Point;
use crate::seed::InitMethod;
use crate::worker::Worker;

/// Phase of a worker's run, in protocol order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Init,
    Ready,
    Broadcast,
    Assign,
    Gather,
    Commit,
    Finalize,
    Done,
    Failed,
}

/// A distributed k-means engine.
///
/// ```
/// use drove::{Engine, Point};
///
/// let data: Vec<Point> = [[0.0f32, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]]
///     .iter()
///     .map(|c| Point::from_slice(c).unwrap())
///     .collect();
///
/// let fit = Engine::new(2).with_workers(2).with_seed(7).fit(&data).unwrap();
/// assert_eq!(fit.memberships.len(), data.len());
/// ```
#[derive(Clone, Debug)]
pub struct Engine {
    k: usize,
    workers: usize,
    threads: usize,
    max_epochs: u32,
    tolerance: f32,
    init: InitMethod,
    seed: u64,
}

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct EngineFit {
    /// Final committed centroid per cluster.
    pub centroids: Vec<Point>,
    /// Final membership in `[0, K)` per dataset point, in dataset order.
    pub memberships: Vec<u32>,
    /// Epoch index at which the run stopped.
    pub epochs: u32,
    /// Global loss at the last epoch sync.
    pub loss: f32,
    /// Whether the loss test fired before the epoch budget ran out.
    pub converged: bool,
    /// Global loss per epoch sync, coordinator view. The first entry is
    /// measured against zero-initialized memberships.
    pub loss_trace: Vec<f32>,
}

impl Engine {
    /// An engine for `k` clusters with default settings: one worker, one
    /// thread, at most 100 epochs, tolerance `1e-4`, random seeding.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            workers: 1,
            threads: 1,
            max_epochs: 100,
            tolerance: 1e-4,
            init: InitMethod::Random,
            seed: 0,
        }
    }

    /// Set the number of distributed workers (default 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the number of threads per worker (default 1).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the epoch budget (default 100).
    pub fn with_max_epochs(mut self, max_epochs: u32) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    /// Set the absolute loss-delta convergence tolerance (default 1e-4).
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the seeding method (default [`InitMethod::Random`]).
    pub fn with_init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    /// Set the RNG seed for centroid initialization (default 0).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run the full pipeline on `data` and return the fit.
    ///
    /// The dataset is validated up front (nonempty, uniform dimension,
    /// finite coordinates, at least `k` points), so workers never observe
    /// malformed input mid-protocol.
    pub fn fit(&self, data: &[Point]) -> Result<EngineFit> {
        self.validate(data)?;
        let dim = data[0].dim();

        let mut endpoints = LocalFabric::mesh(self.workers);
        let root = endpoints.remove(0);

        std::thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|fabric| scope.spawn(move || self.run_worker(fabric, dim, None)))
                .collect();

            let root_result = self.run_worker(root, dim, Some(data));

            let mut peer_err = None;
            for handle in handles {
                let joined = handle
                    .join()
                    .map_err(|_| Error::Fabric("worker thread panicked".into()));
                match joined {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) | Err(e) => {
                        if peer_err.is_none() {
                            peer_err = Some(e);
                        }
                    }
                }
            }

            match root_result {
                Ok(Some(fit)) => match peer_err {
                    None => {
                        info!(
                            epochs = fit.epochs,
                            converged = fit.converged,
                            loss = fit.loss,
                            "run complete"
                        );
                        Ok(fit)
                    }
                    Some(e) => Err(e),
                },
                Ok(None) => Err(Error::Fabric("coordinator produced no result".into())),
                Err(e) => Err(e),
            }
        })
    }

    fn validate(&self, data: &[Point]) -> Result<()> {
        if self.workers < 1 {
            return Err(Error::InvalidParameter {
                name: "workers",
                message: "must be at least 1",
            });
        }
        if self.threads < 1 {
            return Err(Error::InvalidParameter {
                name: "threads",
                message: "must be at least 1",
            });
        }
        if self.k < 1 {
            return Err(Error::InvalidParameter {
                name: "num_clusters",
                message: "must be at least 1",
            });
        }
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        if data.len() < self.k {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: data.len(),
            });
        }

        let dim = data[0].dim();
        for (index, p) in data.iter().enumerate() {
            if p.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: p.dim(),
                });
            }
            if !p.is_finite() {
                return Err(Error::NonFinitePoint { index });
            }
        }
        Ok(())
    }

    /// Run one worker to completion, tearing the fabric down on error so
    /// peers blocked in a collective fail instead of waiting forever.
    fn run_worker<F: Fabric>(
        &self,
        fabric: F,
        dim: usize,
        dataset: Option<&[Point]>,
    ) -> Result<Option<EngineFit>> {
        let mut worker = Worker::new(fabric, self.k, dim, self.threads, self.tolerance)?;
        let result = self.drive(&mut worker, dataset);
        if result.is_err() {
            enter(worker.rank(), Phase::Failed);
            worker.fabric_mut().abort();
        }
        result
    }

    fn drive<F: Fabric>(
        &self,
        worker: &mut Worker<F>,
        dataset: Option<&[Point]>,
    ) -> Result<Option<EngineFit>> {
        let rank = worker.rank();
        let coordinator = rank == COORDINATOR;
        enter(rank, Phase::Init);

        enter(rank, Phase::Ready);
        worker.scatter_points(dataset)?;
        worker.seed_clusters(dataset, self.init, self.seed)?;

        let mut epoch = 0u32;
        let mut converged = false;
        let mut loss_trace = Vec::new();

        while epoch < self.max_epochs {
            enter(rank, Phase::Broadcast);
            converged = worker.sync_epoch(epoch)?;
            if coordinator {
                loss_trace.push(worker.loss());
                debug!(epoch, loss = worker.loss(), "epoch sync");
            }
            if converged {
                break;
            }

            enter(rank, Phase::Assign);
            worker.assign_accumulate();

            enter(rank, Phase::Gather);
            worker.update_global(epoch)?;
            enter(rank, Phase::Commit);

            epoch += 1;
        }

        enter(rank, Phase::Finalize);
        let memberships = worker.finalize(epoch)?;
        enter(rank, Phase::Done);

        Ok(memberships.map(|memberships| EngineFit {
            centroids: worker.centroids(),
            memberships,
            epochs: epoch,
            loss: worker.loss(),
            converged,
            loss_trace,
        }))
    }
}

#[inline]
fn enter(rank: usize, phase: Phase) {
    trace!(rank, ?phase, "phase");
}
