use drove::{Cluster, Engine, Point};
use proptest::prelude::*;

fn points_from(data: &[Vec<f32>]) -> Vec<Point> {
    data.iter()
        .map(|c| Point::from_slice(c).unwrap())
        .collect()
}

/// Build one cluster by folding a list of points into it.
fn folded(points: &[Point], dim: usize) -> Cluster {
    let mut c = Cluster::identity(dim);
    for p in points {
        c.add_point(p);
    }
    c
}

fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0)
}

fn approx_point(a: &Point, b: &Point, tol: f32) -> bool {
    a.coords()
        .iter()
        .zip(b.coords())
        .all(|(x, y)| approx_eq(*x, *y, tol))
}

proptest! {
    /// Swapping fuse operands is bitwise-identical: float addition
    /// commutes even though it does not associate.
    #[test]
    fn prop_fuse_commutative(
        xs in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 3), 0..12),
        ys in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 3), 0..12),
    ) {
        let a = folded(&points_from(&xs), 3);
        let b = folded(&points_from(&ys), 3);

        let mut ab = a;
        ab.fuse(&b);
        let mut ba = b;
        ba.fuse(&a);

        prop_assert_eq!(ab.working_sum(), ba.working_sum());
        prop_assert_eq!(ab.weight().to_bits(), ba.weight().to_bits());
    }

    /// Reassociating fuse changes the summation tree, so sums agree only
    /// within rounding; integer weights stay exact.
    #[test]
    fn prop_fuse_associative(
        xs in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 0..12),
        ys in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 0..12),
        zs in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 0..12),
    ) {
        let a = folded(&points_from(&xs), 2);
        let b = folded(&points_from(&ys), 2);
        let c = folded(&points_from(&zs), 2);

        let mut left = a;
        left.fuse(&b);
        left.fuse(&c);

        let mut bc = b;
        bc.fuse(&c);
        let mut right = a;
        right.fuse(&bc);

        prop_assert_eq!(left.weight().to_bits(), right.weight().to_bits());
        prop_assert!(approx_point(left.working_sum(), right.working_sum(), 1e-4));
    }

    /// The zero cluster is a two-sided fuse identity, bitwise.
    #[test]
    fn prop_fuse_identity(
        xs in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 0..12),
    ) {
        let a = folded(&points_from(&xs), 2);

        let mut left = Cluster::identity(2);
        left.fuse(&a);
        let mut right = a;
        right.fuse(&Cluster::identity(2));

        prop_assert_eq!(left.working_sum(), a.working_sum());
        prop_assert_eq!(right.working_sum(), a.working_sum());
        prop_assert_eq!(left.weight().to_bits(), a.weight().to_bits());
        prop_assert_eq!(right.weight().to_bits(), a.weight().to_bits());
    }

    /// However a cluster's points are split into chunks, fusing the
    /// per-chunk partials and committing lands on the mean of the points.
    #[test]
    fn prop_commit_is_chunked_mean(
        data in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 1..40),
        splits in prop::collection::vec(1usize..6, 0..4),
    ) {
        let points = points_from(&data);

        // Fold through arbitrary contiguous chunks.
        let mut fused = Cluster::identity(2);
        let mut rest: &[Point] = &points;
        for s in splits {
            let take = s.min(rest.len());
            let (head, tail) = rest.split_at(take);
            fused.fuse(&folded(head, 2));
            rest = tail;
        }
        fused.fuse(&folded(rest, 2));
        fused.commit();

        // Straight-line mean.
        let mut sum = Point::zero(2);
        for p in &points {
            sum += p;
        }
        let mean = sum * (1.0 / points.len() as f32);

        prop_assert!(approx_point(fused.centroid(), &mean, 1e-4));
    }

    /// Every point gets a label in range, regardless of worker count.
    #[test]
    fn prop_engine_all_assigned(
        data in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 1..24),
        k in 1usize..5,
        workers in 1usize..4,
    ) {
        if k <= data.len() {
            let points = points_from(&data);
            let fit = Engine::new(k)
                .with_workers(workers)
                .with_seed(42)
                .fit(&points)
                .unwrap();

            prop_assert_eq!(fit.memberships.len(), points.len());
            for &m in &fit.memberships {
                prop_assert!((m as usize) < k);
            }
            prop_assert_eq!(fit.centroids.len(), k);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Re-partitioning across workers only reassociates partial sums:
    /// centroids agree within rounding, and a label may differ only where
    /// the point is effectively equidistant to both candidates.
    #[test]
    fn prop_partition_invariance(seed in 0u64..500, n in 24usize..64) {
        let points = drove::io::generate_blobs(n, 3, 2, seed).unwrap();

        let solo = Engine::new(3).with_seed(seed).fit(&points).unwrap();
        let fleet = Engine::new(3)
            .with_workers(3)
            .with_seed(seed)
            .fit(&points)
            .unwrap();

        for (a, b) in solo.centroids.iter().zip(&fleet.centroids) {
            prop_assert!(approx_point(a, b, 1e-5));
        }
        for (i, (&ma, &mb)) in solo.memberships.iter().zip(&fleet.memberships).enumerate() {
            if ma != mb {
                let p = &points[i];
                let da = solo.centroids[ma as usize].distance(p);
                let db = solo.centroids[mb as usize].distance(p);
                prop_assert!(approx_eq(da, db, 1e-4), "point {} flipped off a tie", i);
            }
        }
    }

    /// Same law for the thread split inside one worker.
    #[test]
    fn prop_threading_invariance(seed in 0u64..500, n in 24usize..64) {
        let points = drove::io::generate_blobs(n, 3, 2, seed).unwrap();

        let single = Engine::new(3).with_seed(seed).fit(&points).unwrap();
        let threaded = Engine::new(3)
            .with_threads(3)
            .with_seed(seed)
            .fit(&points)
            .unwrap();

        for (a, b) in single.centroids.iter().zip(&threaded.centroids) {
            prop_assert!(approx_point(a, b, 1e-5));
        }
        for (i, (&ma, &mb)) in single.memberships.iter().zip(&threaded.memberships).enumerate() {
            if ma != mb {
                let p = &points[i];
                let da = single.centroids[ma as usize].distance(p);
                let db = single.centroids[mb as usize].distance(p);
                prop_assert!(approx_eq(da, db, 1e-4), "point {} flipped off a tie", i);
            }
        }
    }
}
