//! In-process reference substrate: a full mesh of channels.
//!
//! Every worker owns one receiving endpoint and a sender to every peer.
//! Channels preserve per-sender order, so delivery is in-order per source;
//! frames that arrive ahead of the receive that wants them are stashed by
//! `(source, tag)` until asked for.

use std::collections::{HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::fabric::{Fabric, ABORT_TAG};

struct Frame {
    src: usize,
    tag: u64,
    payload: Vec<u8>,
}

/// One endpoint of an in-process worker mesh.
pub struct LocalFabric {
    rank: usize,
    senders: Vec<flume::Sender<Frame>>,
    receiver: flume::Receiver<Frame>,
    stash: HashMap<(usize, u64), VecDeque<Vec<u8>>>,
}

impl LocalFabric {
    /// Build a fully-connected mesh of `world_size` endpoints.
    ///
    /// The returned endpoints are indexed by rank; hand each to exactly
    /// one worker thread.
    pub fn mesh(world_size: usize) -> Vec<LocalFabric> {
        assert!(world_size >= 1, "world size must be at least 1");

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| flume::unbounded::<Frame>()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| LocalFabric {
                rank,
                senders: senders.clone(),
                receiver,
                stash: HashMap::new(),
            })
            .collect()
    }
}

impl Fabric for LocalFabric {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.senders.len()
    }

    fn send(&mut self, to: usize, tag: u64, frame: Vec<u8>) -> Result<()> {
        let msg = Frame {
            src: self.rank,
            tag,
            payload: frame,
        };
        self.senders[to]
            .send(msg)
            .map_err(|_| Error::Fabric(format!("rank {to} is gone")))
    }

    fn recv(&mut self, from: usize, tag: u64) -> Result<Vec<u8>> {
        if let Some(frame) = self
            .stash
            .get_mut(&(from, tag))
            .and_then(VecDeque::pop_front)
        {
            return Ok(frame);
        }

        loop {
            let msg = self
                .receiver
                .recv()
                .map_err(|_| Error::Fabric(format!("rank {}: all peers gone", self.rank)))?;

            if msg.tag == ABORT_TAG {
                return Err(Error::Fabric(format!("aborted by rank {}", msg.src)));
            }
            if msg.src == from && msg.tag == tag {
                return Ok(msg.payload);
            }
            self.stash
                .entry((msg.src, msg.tag))
                .or_default()
                .push_back(msg.payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::COORDINATOR;

    #[test]
    fn test_point_to_point_in_order() {
        let mut mesh = LocalFabric::mesh(2);
        let mut b = mesh.pop().unwrap();
        let mut a = mesh.pop().unwrap();

        a.send(1, 10, vec![1]).unwrap();
        a.send(1, 10, vec![2]).unwrap();
        assert_eq!(b.recv(0, 10).unwrap(), vec![1]);
        assert_eq!(b.recv(0, 10).unwrap(), vec![2]);
    }

    #[test]
    fn test_recv_stashes_other_tags() {
        let mut mesh = LocalFabric::mesh(2);
        let mut b = mesh.pop().unwrap();
        let mut a = mesh.pop().unwrap();

        a.send(1, 20, vec![20]).unwrap();
        a.send(1, 10, vec![10]).unwrap();

        // Asking for the later tag first must not lose the earlier frame.
        assert_eq!(b.recv(0, 10).unwrap(), vec![10]);
        assert_eq!(b.recv(0, 20).unwrap(), vec![20]);
    }

    #[test]
    fn test_collectives_across_threads() {
        let world = 3;
        let mesh = LocalFabric::mesh(world);

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for mut fabric in mesh {
                handles.push(scope.spawn(move || -> Result<()> {
                    let rank = fabric.rank();

                    // Broadcast from the coordinator.
                    let mut frame = if rank == COORDINATOR {
                        vec![42]
                    } else {
                        Vec::new()
                    };
                    fabric.broadcast(1, &mut frame)?;
                    assert_eq!(frame, vec![42]);

                    // Reduce ranks as floats: 0 + 1 + 2.
                    let total = fabric.reduce_sum(2, rank as f32)?;
                    if rank == COORDINATOR {
                        assert_eq!(total, Some(3.0));
                    } else {
                        assert_eq!(total, None);
                    }

                    // Gather rank bytes in rank order.
                    let frames = fabric.gather(3, vec![rank as u8])?;
                    if rank == COORDINATOR {
                        assert_eq!(frames.unwrap(), vec![vec![0], vec![1], vec![2]]);
                    }

                    // Scatter one byte per rank.
                    let parts = (rank == COORDINATOR)
                        .then(|| (0..world).map(|r| vec![r as u8 * 10]).collect());
                    let own = fabric.scatter(4, parts)?;
                    assert_eq!(own, vec![rank as u8 * 10]);

                    Ok(())
                }));
            }
            for handle in handles {
                handle.join().expect("worker panicked").unwrap();
            }
        });
    }

    #[test]
    fn test_abort_unblocks_peer() {
        let mesh = LocalFabric::mesh(2);

        std::thread::scope(|scope| {
            let mut iter = mesh.into_iter();
            let mut a = iter.next().unwrap();
            let mut b = iter.next().unwrap();

            let waiter = scope.spawn(move || b.recv(0, 99));
            a.abort();

            let err = waiter.join().expect("worker panicked").unwrap_err();
            assert!(matches!(err, Error::Fabric(_)));
        });
    }
}
