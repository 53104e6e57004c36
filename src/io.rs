//! Dataset sources and sinks.
//!
//! The engine core is I/O-free; this module is the thin boundary that
//! loads points from CSV, writes the clustered output, and generates
//! synthetic blob datasets for testing and benchmarking.

use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::point::{Point, MAX_DIM};

/// Read one point per row from a CSV file.
///
/// Rows are D numeric columns; blank lines and a trailing empty field
/// (row ends with a comma) are skipped. With `expected_dim` set, rows may
/// carry one extra trailing column (a membership tag from a previous
/// output, say) which is ignored; without it, D is inferred from the
/// first row. All rows must agree, and D must fit [`MAX_DIM`].
pub fn read_points_csv<P: AsRef<Path>>(path: P, expected_dim: Option<usize>) -> Result<Vec<Point>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut points = Vec::new();
    let mut dim = expected_dim;

    for record in reader.records() {
        let record = record?;

        let mut fields: Vec<&str> = record.iter().map(str::trim).collect();
        if fields.last() == Some(&"") {
            fields.pop();
        }
        if fields.is_empty() {
            continue;
        }

        let expected = *dim.get_or_insert(fields.len());
        if fields.len() == expected + 1 {
            fields.pop();
        }
        if fields.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                found: fields.len(),
            });
        }

        let mut coords = Vec::with_capacity(fields.len());
        for field in &fields {
            let value: f32 = field.parse().map_err(|_| Error::InvalidParameter {
                name: "input",
                message: "non-numeric value in CSV row",
            })?;
            coords.push(value);
        }

        let point = Point::from_slice(&coords).ok_or(Error::DimensionMismatch {
            expected: MAX_DIM,
            found: coords.len(),
        })?;
        if !point.is_finite() {
            return Err(Error::NonFinitePoint {
                index: points.len(),
            });
        }
        points.push(point);
    }

    if points.is_empty() {
        return Err(Error::EmptyInput);
    }
    Ok(points)
}

/// Write one `coord,..,coord,membership` row per point, in dataset order.
///
/// `memberships` must hold exactly one entry per point; a mismatch is
/// rejected rather than silently truncating the output.
pub fn write_points_csv<P: AsRef<Path>>(
    path: P,
    points: &[Point],
    memberships: &[u32],
) -> Result<()> {
    if points.len() != memberships.len() {
        return Err(Error::InvalidParameter {
            name: "memberships",
            message: "must hold one entry per point",
        });
    }
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;

    for (point, membership) in points.iter().zip(memberships) {
        let mut row: Vec<String> = point.coords().iter().map(|c| format!("{c:.3}")).collect();
        row.push(membership.to_string());
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Generate a blob dataset suitable for k-means: `k` centers drawn
/// uniformly in the unit cube, each surrounded by `⌊n/k⌋` points placed
/// uniformly within a per-blob random radius. Deterministic given `seed`.
///
/// Returns `⌊n/k⌋ · k` points, blob by blob.
pub fn generate_blobs(n: usize, k: usize, dim: usize, seed: u64) -> Result<Vec<Point>> {
    if dim < 1 || dim > MAX_DIM {
        return Err(Error::InvalidParameter {
            name: "gen_dim",
            message: "must be between 1 and the point capacity",
        });
    }
    if k < 1 {
        return Err(Error::InvalidParameter {
            name: "num_clusters",
            message: "must be at least 1",
        });
    }
    let per_blob = n / k;
    if per_blob == 0 {
        return Err(Error::InvalidClusterCount {
            requested: k,
            n_items: n,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(per_blob * k);

    for _ in 0..k {
        let mut center = [0.0f32; MAX_DIM];
        for c in center.iter_mut().take(dim) {
            *c = rng.random::<f32>();
        }
        let radius = rng.random_range(0.1f32..0.3);

        for _ in 0..per_blob {
            // A random direction scaled back inside the blob radius.
            let mut coords = [0.0f32; MAX_DIM];
            let mut norm = 0.0f32;
            for c in coords.iter_mut().take(dim) {
                *c = rng.random::<f32>() - 0.5;
                norm += *c * *c;
            }
            let norm = norm.sqrt().max(f32::MIN_POSITIVE);
            let reach = radius * rng.random::<f32>() / norm;

            let mut blob_point = [0.0f32; MAX_DIM];
            for i in 0..dim {
                blob_point[i] = center[i] + coords[i] * reach;
            }
            points.push(Point::from_raw(blob_point, dim));
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_blobs_shape() {
        let points = generate_blobs(100, 3, 2, 9).unwrap();
        assert_eq!(points.len(), 33 * 3);
        assert!(points.iter().all(|p| p.dim() == 2));
        assert!(points.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_generate_blobs_deterministic() {
        let a = generate_blobs(64, 4, 3, 11).unwrap();
        let b = generate_blobs(64, 4, 3, 11).unwrap();
        assert_eq!(a, b);

        let c = generate_blobs(64, 4, 3, 12).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_generate_blobs_rejects_bad_dims() {
        assert!(generate_blobs(10, 2, 0, 1).is_err());
        assert!(generate_blobs(10, 2, MAX_DIM + 1, 1).is_err());
        assert!(generate_blobs(1, 2, 2, 1).is_err());
    }
}
