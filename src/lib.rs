//! Distributed, data-parallel k-means.
//!
//! `drove` partitions a dataset across W message-passing workers, runs
//! Lloyd iterations with thread-parallel assignment inside each worker,
//! and aggregates partial cluster sums through a three-layer pipeline:
//! per-thread partials, a per-worker fuse, and a cross-worker gather at a
//! coordinator that commits centroids and decides convergence.
//!
//! The primary entry point is [`Engine`]:
//! - configure builder-style (`Engine::new(k).with_workers(4)`, ...),
//! - call [`Engine::fit`] with the dataset,
//! - read centroids, memberships, and the loss trajectory off the
//!   returned [`EngineFit`].
//!
//! [`io`] provides the CSV source/sink and a synthetic blob generator;
//! [`fabric`] is the narrow seam a different distributed substrate can be
//! plugged into.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod engine;
pub mod error;
pub mod fabric;
pub mod io;
pub mod point;
pub mod seed;
pub mod wire;

mod worker;

pub use cluster::Cluster;
pub use engine::{Engine, EngineFit};
pub use error::{Error, Result};
pub use point::{Point, MAX_DIM};
pub use seed::InitMethod;
