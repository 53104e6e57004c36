//! Binary wire layout for values crossing the worker fabric.
//!
//! Everything on the wire is a raw little-endian byte frame of known
//! layout; the worker set is assumed endian-homogeneous.
//!
//! - A point occupies exactly [`POINT_WIRE_SIZE`] bytes: [`MAX_DIM`]
//!   IEEE-754 binary32 slots in coordinate order, with slots past the
//!   effective dimension zero-filled.
//! - A cluster is two point frames (centroid, working sum) followed by a
//!   4-byte binary32 weight, no padding: [`CLUSTER_WIRE_SIZE`] bytes.
//! - Memberships travel as 4-byte unsigned little-endian integers.
//!
//! Round-trips are bitwise exact; decoding never loses or invents a ULP.

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::point::{Point, MAX_DIM};

/// Wire size of one point, in bytes.
pub const POINT_WIRE_SIZE: usize = MAX_DIM * 4;

/// Wire size of one cluster, in bytes.
pub const CLUSTER_WIRE_SIZE: usize = 2 * POINT_WIRE_SIZE + 4;

/// A value with a fixed binary frame on the fabric.
pub trait Wire: Sized {
    /// Frame length in bytes.
    const WIRE_SIZE: usize;

    /// Append this value's frame to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>);

    /// Decode one frame. `dim` is the run's point dimension.
    fn decode(frame: &[u8], dim: usize) -> Result<Self>;
}

impl Wire for Point {
    const WIRE_SIZE: usize = POINT_WIRE_SIZE;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        for slot in self.raw() {
            buf.extend_from_slice(&slot.to_le_bytes());
        }
    }

    fn decode(frame: &[u8], dim: usize) -> Result<Self> {
        check_len(frame, POINT_WIRE_SIZE)?;
        let mut coords = [0.0f32; MAX_DIM];
        for (i, chunk) in frame[..POINT_WIRE_SIZE].chunks_exact(4).enumerate().take(dim) {
            coords[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Point::from_raw(coords, dim))
    }
}

impl Wire for Cluster {
    const WIRE_SIZE: usize = CLUSTER_WIRE_SIZE;

    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.centroid().encode_into(buf);
        self.working_sum().encode_into(buf);
        buf.extend_from_slice(&self.weight().to_le_bytes());
    }

    fn decode(frame: &[u8], dim: usize) -> Result<Self> {
        check_len(frame, CLUSTER_WIRE_SIZE)?;
        let centroid = Point::decode(&frame[..POINT_WIRE_SIZE], dim)?;
        let working_sum = Point::decode(&frame[POINT_WIRE_SIZE..2 * POINT_WIRE_SIZE], dim)?;
        let w = &frame[2 * POINT_WIRE_SIZE..CLUSTER_WIRE_SIZE];
        let weight = f32::from_le_bytes([w[0], w[1], w[2], w[3]]);
        Ok(Cluster::from_parts(centroid, working_sum, weight))
    }
}

/// Encode a slice of wire values into one frame.
pub fn encode_all<T: Wire>(items: &[T]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(items.len() * T::WIRE_SIZE);
    for item in items {
        item.encode_into(&mut buf);
    }
    buf
}

/// Decode a frame holding a whole number of wire values.
pub fn decode_all<T: Wire>(frame: &[u8], dim: usize) -> Result<Vec<T>> {
    if frame.len() % T::WIRE_SIZE != 0 {
        return Err(Error::ShortFrame {
            expected: frame.len().next_multiple_of(T::WIRE_SIZE),
            found: frame.len(),
        });
    }
    frame
        .chunks_exact(T::WIRE_SIZE)
        .map(|chunk| T::decode(chunk, dim))
        .collect()
}

/// Encode memberships as 4-byte LE unsigned integers.
pub fn encode_memberships(memberships: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(memberships.len() * 4);
    for m in memberships {
        buf.extend_from_slice(&m.to_le_bytes());
    }
    buf
}

/// Decode a membership frame.
pub fn decode_memberships(frame: &[u8]) -> Result<Vec<u32>> {
    if frame.len() % 4 != 0 {
        return Err(Error::ShortFrame {
            expected: frame.len().next_multiple_of(4),
            found: frame.len(),
        });
    }
    Ok(frame
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode one f32 scalar.
pub fn encode_f32(value: f32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Decode one f32 scalar.
pub fn decode_f32(frame: &[u8]) -> Result<f32> {
    check_len(frame, 4)?;
    Ok(f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]))
}

/// Encode one boolean flag.
pub fn encode_bool(value: bool) -> Vec<u8> {
    vec![u8::from(value)]
}

/// Decode one boolean flag.
pub fn decode_bool(frame: &[u8]) -> Result<bool> {
    check_len(frame, 1)?;
    Ok(frame[0] != 0)
}

fn check_len(frame: &[u8], expected: usize) -> Result<()> {
    if frame.len() < expected {
        return Err(Error::ShortFrame {
            expected,
            found: frame.len(),
        });
    }
    Ok(())
}
