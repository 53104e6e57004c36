//! The cross-worker communication seam.
//!
//! Workers never share memory; everything that crosses a worker boundary
//! is a tagged byte frame moved by a [`Fabric`]. The trait is deliberately
//! narrow (point-to-point send/receive plus the five collectives the
//! protocol needs) so any distributed-memory substrate with per-source
//! in-order delivery can sit behind it. [`LocalFabric`] is the reference
//! substrate: an in-process channel mesh.
//!
//! All collectives are rooted at rank 0 (the coordinator), and the root
//! always drains peers in rank order, which pins the fuse order and makes
//! runs with identical inputs bit-reproducible.

mod local;

pub use local::LocalFabric;

use crate::error::{Error, Result};
use crate::wire;

/// The coordinator's rank.
pub const COORDINATOR: usize = 0;

/// Tag reserved for fabric teardown on a fatal error.
pub(crate) const ABORT_TAG: u64 = u64::MAX;

/// Protocol step codes, combined with the epoch index into a message tag.
pub mod step {
    /// Scatter of dataset chunks (load time).
    pub const POINTS: u64 = 1;
    /// Broadcast of committed centroids.
    pub const CENTROIDS: u64 = 2;
    /// Reduction and re-broadcast of the global loss.
    pub const LOSS: u64 = 3;
    /// Broadcast of the convergence flag.
    pub const FLAG: u64 = 4;
    /// Gather of per-worker cluster partials.
    pub const CLUSTERS: u64 = 5;
    /// Gather of local memberships (finalize).
    pub const MEMBERSHIPS: u64 = 6;
}

/// Build the logical tag for a protocol step of a given epoch.
///
/// Epoch-keyed tags keep per-epoch ordering explicit even though the
/// reference substrate already delivers in order per source.
#[inline]
pub fn tag(epoch: u32, step: u64) -> u64 {
    (u64::from(epoch) << 4) | step
}

/// A message-passing fabric connecting the worker set.
pub trait Fabric {
    /// This worker's rank in `[0, world_size)`.
    fn rank(&self) -> usize;

    /// Number of workers in the run (fixed at init).
    fn world_size(&self) -> usize;

    /// Send one tagged frame to a peer.
    fn send(&mut self, to: usize, tag: u64, frame: Vec<u8>) -> Result<()>;

    /// Receive the next frame with this source and tag, stashing any
    /// other traffic that arrives first.
    fn recv(&mut self, from: usize, tag: u64) -> Result<Vec<u8>>;

    /// Tear the fabric down after a local fatal error so blocked peers
    /// fail instead of waiting forever. Send errors are ignored: a peer
    /// that is already gone needs no abort.
    fn abort(&mut self) {
        for peer in 0..self.world_size() {
            if peer != self.rank() {
                let _ = self.send(peer, ABORT_TAG, Vec::new());
            }
        }
    }

    /// Coordinator sends one frame to every worker; everyone else
    /// receives it. On return `frame` holds the broadcast value on all
    /// ranks.
    fn broadcast(&mut self, tag: u64, frame: &mut Vec<u8>) -> Result<()> {
        if self.rank() == COORDINATOR {
            for peer in 1..self.world_size() {
                self.send(peer, tag, frame.clone())?;
            }
        } else {
            *frame = self.recv(COORDINATOR, tag)?;
        }
        Ok(())
    }

    /// Coordinator splits `parts` (one frame per rank) across the worker
    /// set; every rank gets its own part back. Only the coordinator may
    /// pass `Some`.
    fn scatter(&mut self, tag: u64, parts: Option<Vec<Vec<u8>>>) -> Result<Vec<u8>> {
        if self.rank() == COORDINATOR {
            let mut parts = parts
                .ok_or_else(|| Error::Fabric("scatter: coordinator supplied no parts".into()))?;
            if parts.len() != self.world_size() {
                return Err(Error::Fabric(format!(
                    "scatter: {} parts for {} workers",
                    parts.len(),
                    self.world_size()
                )));
            }
            for (peer, part) in parts.drain(1..).enumerate() {
                self.send(peer + 1, tag, part)?;
            }
            Ok(parts.pop().unwrap_or_default())
        } else {
            self.recv(COORDINATOR, tag)
        }
    }

    /// Sum one scalar per worker into the coordinator. Returns `Some` at
    /// the coordinator, `None` elsewhere. Peers are summed in rank order.
    fn reduce_sum(&mut self, tag: u64, value: f32) -> Result<Option<f32>> {
        if self.rank() == COORDINATOR {
            let mut acc = value;
            for peer in 1..self.world_size() {
                acc += wire::decode_f32(&self.recv(peer, tag)?)?;
            }
            Ok(Some(acc))
        } else {
            self.send(COORDINATOR, tag, wire::encode_f32(value))?;
            Ok(None)
        }
    }

    /// Collect one equal-sized frame per worker at the coordinator, in
    /// rank order (the coordinator's own frame first). Returns `Some`
    /// at the coordinator, `None` elsewhere.
    fn gather(&mut self, tag: u64, frame: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>> {
        let expected = frame.len();
        let gathered = self.gather_variable(tag, frame)?;
        if let Some(frames) = &gathered {
            for f in frames {
                if f.len() != expected {
                    return Err(Error::ShortFrame {
                        expected,
                        found: f.len(),
                    });
                }
            }
        }
        Ok(gathered)
    }

    /// [`Fabric::gather`] without the equal-size requirement; frame
    /// lengths carry the per-worker counts.
    fn gather_variable(&mut self, tag: u64, frame: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>> {
        if self.rank() == COORDINATOR {
            let mut frames = Vec::with_capacity(self.world_size());
            frames.push(frame);
            for peer in 1..self.world_size() {
                frames.push(self.recv(peer, tag)?);
            }
            Ok(Some(frames))
        } else {
            self.send(COORDINATOR, tag, frame)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_distinct_across_epochs_and_steps() {
        let mut seen = std::collections::HashSet::new();
        for epoch in 0..16u32 {
            for s in [
                step::POINTS,
                step::CENTROIDS,
                step::LOSS,
                step::FLAG,
                step::CLUSTERS,
                step::MEMBERSHIPS,
            ] {
                assert!(seen.insert(tag(epoch, s)));
            }
        }
    }

    #[test]
    fn test_single_worker_collectives_short_circuit() {
        let mut solo = LocalFabric::mesh(1).pop().unwrap();
        assert_eq!(solo.rank(), 0);
        assert_eq!(solo.world_size(), 1);

        let mut frame = vec![1, 2, 3];
        solo.broadcast(7, &mut frame).unwrap();
        assert_eq!(frame, vec![1, 2, 3]);

        let total = solo.reduce_sum(8, 2.5).unwrap();
        assert_eq!(total, Some(2.5));

        let own = solo.scatter(9, Some(vec![vec![4, 5]])).unwrap();
        assert_eq!(own, vec![4, 5]);

        let frames = solo.gather(10, vec![6]).unwrap().unwrap();
        assert_eq!(frames, vec![vec![6]]);
    }
}
