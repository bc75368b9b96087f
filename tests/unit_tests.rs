//! Comprehensive unit tests for the knncolle library.

use knncolle::prelude::*;
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::sync::Arc;

fn random_data(nobs: usize, ndim: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..nobs * ndim).map(|_| rng.sample(StandardNormal)).collect()
}

fn metrics() -> Vec<Arc<dyn DistanceMetric<f64>>> {
    let euclidean: Arc<dyn DistanceMetric<f64>> = Arc::new(EuclideanDistance);
    let manhattan: Arc<dyn DistanceMetric<f64>> = Arc::new(ManhattanDistance);
    vec![euclidean, manhattan]
}

/// Every exact algorithm configured with `metric`.
fn exact_builders(metric: &Arc<dyn DistanceMetric<f64>>) -> Vec<(&'static str, Box<dyn Builder<f64>>)> {
    let vptree: Box<dyn Builder<f64>> = Box::new(VptreeBuilder::new(Arc::clone(metric)));
    let kmknn: Box<dyn Builder<f64>> = Box::new(KmknnBuilder::new(Arc::clone(metric)));
    let kmknn_lloyd: Box<dyn Builder<f64>> = Box::new(KmknnBuilder::with_options(
        Arc::clone(metric),
        KmknnOptions::default().with_kmeans(
            KmeansOptions::default()
                .with_init(KmeansInit::VariancePartition)
                .with_refine(KmeansRefine::Lloyd),
        ),
    ));
    vec![("vptree", vptree), ("kmknn", kmknn), ("kmknn_lloyd", kmknn_lloyd)]
}

mod matrix_tests {
    use super::*;

    #[test]
    fn test_simple_matrix() {
        let data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mat = SimpleMatrix::new(3, 2, &data).unwrap();
        assert_eq!(mat.num_observations(), 2);
        assert_eq!(mat.num_dimensions(), 3);

        let mut extractor = mat.new_extractor();
        assert_eq!(extractor.next().unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(extractor.next().unwrap(), &[4.0, 5.0, 6.0]);
        assert!(extractor.next().is_none());
    }

    #[test]
    fn test_simple_matrix_wrong_length() {
        let data = vec![1.0f32; 5];
        let err = SimpleMatrix::new(3, 2, &data).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_from_rows() {
        let rows = vec![vec![1.0f64, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let mut buffer = Vec::new();
        let mat = SimpleMatrix::from_rows(&rows, &mut buffer).unwrap();
        assert_eq!(mat.num_observations(), 3);
        assert_eq!(mat.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let ragged = vec![vec![1.0f64, 2.0], vec![3.0]];
        let mut buffer = Vec::new();
        assert!(SimpleMatrix::from_rows(&ragged, &mut buffer).is_err());
    }
}

mod distance_tests {
    use super::*;

    #[test]
    fn test_euclidean() {
        let metric = EuclideanDistance;
        let raw = DistanceMetric::<f64>::raw(&metric, &[0.0, 0.0], &[3.0, 4.0]);
        assert_eq!(raw, 25.0);
        assert_eq!(DistanceMetric::<f64>::normalize(&metric, raw), 5.0);
        assert_eq!(DistanceMetric::<f64>::denormalize(&metric, 5.0), 25.0);
    }

    #[test]
    fn test_manhattan() {
        let metric = ManhattanDistance;
        let raw = DistanceMetric::<f32>::raw(&metric, &[1.0, -1.0], &[3.0, 4.0]);
        assert_eq!(raw, 7.0);
        assert_eq!(DistanceMetric::<f32>::normalize(&metric, raw), 7.0);
    }

    #[test]
    fn test_metric_registry() {
        let registry = MetricRegistry::<f64>::default();
        assert!(registry.contains("euclidean"));
        assert!(registry.contains("manhattan"));
        assert!(!MetricRegistry::<f64>::empty().contains("euclidean"));
    }
}

mod brute_force_tests {
    use super::*;

    #[test]
    fn test_simple_search() {
        let data = vec![0.0f64, 1.0, 3.0, 6.0, 10.0];
        let mat = SimpleMatrix::new(1, 5, &data).unwrap();
        let index = BruteforceBuilder::euclidean().build(&mat).unwrap();
        assert_eq!(index.num_observations(), 5);
        assert_eq!(index.num_dimensions(), 1);

        let mut searcher = index.initialize();
        assert_eq!(searcher.neighbors_of(2, 2).unwrap(), vec![(1, 2.0), (0, 3.0)]);
        assert_eq!(searcher.neighbors_of_query(&[5.0], 1).unwrap(), vec![(3, 1.0)]);
    }

    #[test]
    fn test_outputs_are_optional() {
        let data = random_data(30, 3, 1);
        let mat = SimpleMatrix::new(3, 30, &data).unwrap();
        let index = BruteforceBuilder::manhattan().build(&mat).unwrap();
        let mut searcher = index.initialize();

        let mut indices = Vec::new();
        let mut distances = Vec::new();
        searcher.search(4, 5, Some(&mut indices), None).unwrap();
        searcher.search(4, 5, None, Some(&mut distances)).unwrap();
        let pairs = searcher.neighbors_of(4, 5).unwrap();
        assert_eq!(indices, pairs.iter().map(|p| p.0).collect::<Vec<_>>());
        assert_eq!(distances, pairs.iter().map(|p| p.1).collect::<Vec<_>>());
        searcher.search(4, 5, None, None).unwrap();
    }

    #[test]
    fn test_k_larger_than_index() {
        let data = vec![0.0f64, 1.0, 2.0];
        let mat = SimpleMatrix::new(1, 3, &data).unwrap();
        let index = BruteforceBuilder::euclidean().build(&mat).unwrap();
        let mut searcher = index.initialize();
        assert_eq!(searcher.neighbors_of(0, 10).unwrap().len(), 2);
        assert_eq!(searcher.neighbors_of_query(&[0.5], 10).unwrap().len(), 3);
        assert!(searcher.neighbors_of_query(&[0.5], 0).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_requests() {
        let data = vec![0.0f64, 1.0, 2.0, 3.0];
        let mat = SimpleMatrix::new(2, 2, &data).unwrap();
        let index = BruteforceBuilder::euclidean().build(&mat).unwrap();
        let mut searcher = index.initialize();

        let err = searcher.neighbors_of(2, 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfRange);
        let err = searcher.neighbors_of_query(&[1.0], 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}

mod agreement_tests {
    use super::*;

    #[test]
    fn test_search_by_index_matches_brute_force() {
        for (nobs, ndim, k) in [(100, 3, 5), (250, 5, 10), (57, 12, 20)] {
            let data = random_data(nobs, ndim, (nobs * ndim) as u64);
            let mat = SimpleMatrix::new(ndim, nobs as u32, &data).unwrap();

            for metric in metrics() {
                let reference = BruteforceBuilder::new(Arc::clone(&metric)).build(&mat).unwrap();
                let mut expected = reference.initialize();

                for (name, builder) in exact_builders(&metric) {
                    let index = builder.build(&mat).unwrap();
                    let mut searcher = index.initialize();
                    for i in 0..nobs as u32 {
                        assert_eq!(
                            searcher.neighbors_of(i, k).unwrap(),
                            expected.neighbors_of(i, k).unwrap(),
                            "{} with {} disagrees at observation {}",
                            name,
                            metric.name(),
                            i
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_search_by_query_matches_brute_force() {
        let (nobs, ndim) = (200, 4);
        let data = random_data(nobs, ndim, 21);
        let queries = random_data(25, ndim, 22);
        let mat = SimpleMatrix::new(ndim, nobs as u32, &data).unwrap();

        for metric in metrics() {
            let reference = BruteforceBuilder::new(Arc::clone(&metric)).build(&mat).unwrap();
            let mut expected = reference.initialize();

            for (name, builder) in exact_builders(&metric) {
                let index = builder.build(&mat).unwrap();
                let mut searcher = index.initialize();
                for query in queries.chunks(ndim) {
                    for k in [1, 7, 300] {
                        assert_eq!(
                            searcher.neighbors_of_query(query, k).unwrap(),
                            expected.neighbors_of_query(query, k).unwrap(),
                            "{} disagrees for k = {}",
                            name,
                            k
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_results_are_sorted_and_exclude_self() {
        let data = random_data(150, 6, 31);
        let mat = SimpleMatrix::new(6, 150, &data).unwrap();
        let metric: Arc<dyn DistanceMetric<f64>> = Arc::new(EuclideanDistance);

        for (_, builder) in exact_builders(&metric) {
            let index = builder.build(&mat).unwrap();
            let mut searcher = index.initialize();
            for i in 0..150 {
                let found = searcher.neighbors_of(i, 12).unwrap();
                assert_eq!(found.len(), 12);
                assert!(found.iter().all(|&(j, _)| j != i));
                assert!(found.windows(2).all(|w| w[0].1 <= w[1].1));

                let mut ids: Vec<u32> = found.iter().map(|p| p.0).collect();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), 12);
            }
        }
    }

    #[test]
    fn test_duplicates_resolve_to_lower_index() {
        // Five copies each of three distinct points.
        let mut data = Vec::new();
        for _ in 0..5 {
            data.extend_from_slice(&[0.0f64, 0.0, 10.0, 10.0, -5.0, 3.0]);
        }
        let mat = SimpleMatrix::new(2, 15, &data).unwrap();
        let metric: Arc<dyn DistanceMetric<f64>> = Arc::new(EuclideanDistance);
        let reference = BruteforceBuilder::euclidean().build(&mat).unwrap();
        let mut expected = reference.initialize();
        assert_eq!(
            expected.neighbors_of(6, 3).unwrap(),
            vec![(0, 0.0), (3, 0.0), (9, 0.0)]
        );

        for (name, builder) in exact_builders(&metric) {
            let index = builder.build(&mat).unwrap();
            let mut searcher = index.initialize();
            for i in 0..15 {
                for k in [2, 4, 6] {
                    assert_eq!(
                        searcher.neighbors_of(i, k).unwrap(),
                        expected.neighbors_of(i, k).unwrap(),
                        "{} disagrees on duplicates",
                        name
                    );
                }
            }
            assert_eq!(
                searcher.neighbors_of_query(&[10.0, 10.0], 2).unwrap(),
                vec![(1, 0.0), (4, 0.0)]
            );
        }
    }

    #[test]
    fn test_single_precision() {
        let data: Vec<f32> = random_data(120, 3, 41).into_iter().map(|v| v as f32).collect();
        let mat = SimpleMatrix::new(3, 120, &data).unwrap();
        let reference = BruteforceBuilder::<f32>::euclidean().build(&mat).unwrap();
        let vptree = VptreeBuilder::<f32>::euclidean().build(&mat).unwrap();
        let kmknn = KmknnBuilder::<f32>::euclidean().build(&mat).unwrap();

        let mut expected = reference.initialize();
        let mut vp = vptree.initialize();
        let mut km = kmknn.initialize();
        for i in 0..120 {
            let truth = expected.neighbors_of(i, 6).unwrap();
            assert_eq!(vp.neighbors_of(i, 6).unwrap(), truth);
            assert_eq!(km.neighbors_of(i, 6).unwrap(), truth);
        }
    }

    /// A 12 x 12 x 3 integer lattice, full of ties at non-zero distances.
    fn lattice<T: DataValue>() -> Vec<T> {
        let mut data = Vec::new();
        for x in 0..12 {
            for y in 0..12 {
                for z in 0..3 {
                    data.extend([x, y, z].map(|v| T::of_f64(v as f64)));
                }
            }
        }
        data
    }

    fn check_lattice_ties<T: DataValue>() {
        let data = lattice::<T>();
        let nobs = (data.len() / 3) as u32;
        let mat = SimpleMatrix::new(3, nobs, &data).unwrap();

        let euclidean: Arc<dyn DistanceMetric<T>> = Arc::new(EuclideanDistance);
        let manhattan: Arc<dyn DistanceMetric<T>> = Arc::new(ManhattanDistance);
        for metric in [euclidean, manhattan] {
            let reference = BruteforceBuilder::new(Arc::clone(&metric)).build(&mat).unwrap();
            let mut expected = reference.initialize();

            let vptree: Box<dyn Builder<T>> = Box::new(VptreeBuilder::new(Arc::clone(&metric)));
            let kmknn: Box<dyn Builder<T>> = Box::new(KmknnBuilder::new(Arc::clone(&metric)));
            let kmknn_lloyd: Box<dyn Builder<T>> = Box::new(KmknnBuilder::with_options(
                Arc::clone(&metric),
                KmknnOptions::default().with_kmeans(KmeansOptions::default().with_refine(KmeansRefine::Lloyd)),
            ));

            for (name, builder) in [("vptree", vptree), ("kmknn", kmknn), ("kmknn_lloyd", kmknn_lloyd)] {
                let index = builder.build(&mat).unwrap();
                let mut searcher = index.initialize();
                for i in 0..nobs {
                    for k in [1, 5, 13] {
                        assert_eq!(
                            searcher.neighbors_of(i, k).unwrap(),
                            expected.neighbors_of(i, k).unwrap(),
                            "{} with {} at {} for k = {}",
                            name,
                            metric.name(),
                            i,
                            k
                        );
                    }

                    for threshold in [1.0, 2.0] {
                        let threshold = T::of_f64(threshold);
                        let (mut indices, mut distances) = (Vec::new(), Vec::new());
                        let count = searcher
                            .search_all(i, threshold, Some(&mut indices), Some(&mut distances))
                            .unwrap();
                        let (mut true_indices, mut true_distances) = (Vec::new(), Vec::new());
                        expected
                            .search_all(i, threshold, Some(&mut true_indices), Some(&mut true_distances))
                            .unwrap();
                        assert_eq!(indices, true_indices, "{} with {} at {}", name, metric.name(), i);
                        assert_eq!(distances, true_distances);
                        assert_eq!(count, true_indices.len());
                    }
                }
            }
        }
    }

    #[test]
    fn test_lattice_ties_match_brute_force() {
        check_lattice_ties::<f64>();
        check_lattice_ties::<f32>();
    }

    #[test]
    fn test_huge_k_is_capped() {
        let data = vec![0.0f64, 1.0, 2.0];
        let mat = SimpleMatrix::new(1, 3, &data).unwrap();
        let metric: Arc<dyn DistanceMetric<f64>> = Arc::new(EuclideanDistance);
        let mut builders = exact_builders(&metric);
        let bruteforce: Box<dyn Builder<f64>> = Box::new(BruteforceBuilder::euclidean());
        builders.push(("bruteforce", bruteforce));

        for (name, builder) in builders {
            let index = builder.build(&mat).unwrap();
            let mut searcher = index.initialize();
            for k in [1usize << 50, usize::MAX] {
                assert_eq!(searcher.neighbors_of(0, k).unwrap(), vec![(1, 1.0), (2, 2.0)], "{}", name);
                assert_eq!(searcher.neighbors_of_query(&[0.5], k).unwrap().len(), 3, "{}", name);
            }

            let all = find_nearest_neighbors(index.as_ref(), usize::MAX, 2).unwrap();
            assert!(all.iter().all(|neighbors| neighbors.len() == 2));
        }
    }
}

mod search_all_tests {
    use super::*;

    fn brute_force_within(data: &[f64], ndim: usize, target: &[f64], threshold: f64, metric: &dyn DistanceMetric<f64>) -> Vec<u32> {
        let mut found: Vec<(f64, u32)> = data
            .chunks(ndim)
            .enumerate()
            .map(|(i, obs)| (metric.normalize(metric.raw(target, obs)), i as u32))
            .filter(|&(d, _)| d <= threshold)
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.into_iter().map(|(_, i)| i).collect()
    }

    #[test]
    fn test_search_all_matches_filtering() {
        let (nobs, ndim) = (180, 3);
        let data = random_data(nobs, ndim, 51);
        let mat = SimpleMatrix::new(ndim, nobs as u32, &data).unwrap();

        for metric in metrics() {
            let mut builders = exact_builders(&metric);
            let bruteforce: Box<dyn Builder<f64>> = Box::new(BruteforceBuilder::new(Arc::clone(&metric)));
            builders.push(("bruteforce", bruteforce));

            for (name, builder) in builders {
                let index = builder.build(&mat).unwrap();
                let mut searcher = index.initialize();
                assert!(searcher.can_search_all());

                for threshold in [0.3, 1.0, 2.5] {
                    for i in (0..nobs).step_by(17) {
                        let target = &data[i * ndim..(i + 1) * ndim];
                        let expected: Vec<u32> = brute_force_within(&data, ndim, target, threshold, metric.as_ref())
                            .into_iter()
                            .filter(|&j| j != i as u32)
                            .collect();

                        let mut indices = Vec::new();
                        let mut distances = Vec::new();
                        let count = searcher
                            .search_all(i as u32, threshold, Some(&mut indices), Some(&mut distances))
                            .unwrap();
                        assert_eq!(indices, expected, "{} at threshold {}", name, threshold);
                        assert_eq!(count, expected.len());
                        assert!(distances.iter().all(|&d| d <= threshold));
                        assert_eq!(searcher.search_all(i as u32, threshold, None, None).unwrap(), count);
                    }

                    let query = [0.1, -0.2, 0.3];
                    let expected = brute_force_within(&data, ndim, &query, threshold, metric.as_ref());
                    let mut indices = Vec::new();
                    let count = searcher
                        .search_all_query(&query, threshold, Some(&mut indices), None)
                        .unwrap();
                    assert_eq!(indices, expected, "{} query at threshold {}", name, threshold);
                    assert_eq!(count, expected.len());
                }
            }
        }
    }
}

mod l2_normalized_tests {
    use super::*;

    #[test]
    fn test_cosine_matches_normalized_brute_force() {
        let (nobs, ndim) = (90, 4);
        let data = random_data(nobs, ndim, 61);
        let mut normalized = data.clone();
        normalized.chunks_mut(ndim).for_each(l2_normalize);

        let mat = SimpleMatrix::new(ndim, nobs as u32, &data).unwrap();
        let normalized_mat = SimpleMatrix::new(ndim, nobs as u32, &normalized).unwrap();
        let reference = BruteforceBuilder::euclidean().build(&normalized_mat).unwrap();
        let mut expected = reference.initialize();

        let metric: Arc<dyn DistanceMetric<f64>> = Arc::new(EuclideanDistance);
        for (name, builder) in exact_builders(&metric) {
            let index = L2NormalizedBuilder::new(Arc::from(builder)).build(&mat).unwrap();
            let mut searcher = index.initialize();
            for i in 0..nobs as u32 {
                assert_eq!(
                    searcher.neighbors_of(i, 5).unwrap(),
                    expected.neighbors_of(i, 5).unwrap(),
                    "normalized {} disagrees",
                    name
                );
            }
        }
    }

    #[test]
    fn test_scaled_queries_are_equivalent() {
        let data = random_data(60, 3, 62);
        let mat = SimpleMatrix::new(3, 60, &data).unwrap();
        let index = L2NormalizedBuilder::new(Arc::new(VptreeBuilder::<f64>::euclidean()))
            .build(&mat)
            .unwrap();
        let mut searcher = index.initialize();

        let query = [0.5, 1.5, -2.0];
        let scaled = [5.0, 15.0, -20.0];
        let a: Vec<u32> = searcher.neighbors_of_query(&query, 4).unwrap().iter().map(|p| p.0).collect();
        let b: Vec<u32> = searcher.neighbors_of_query(&scaled, 4).unwrap().iter().map(|p| p.0).collect();
        assert_eq!(a, b);
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn test_round_trip_all_algorithms() {
        let data = random_data(140, 4, 71);
        let queries = random_data(10, 4, 72);
        let mat = SimpleMatrix::new(4, 140, &data).unwrap();
        let dir = tempfile::tempdir().unwrap();

        for metric in metrics() {
            let mut builders = exact_builders(&metric);
            let bruteforce: Box<dyn Builder<f64>> = Box::new(BruteforceBuilder::new(Arc::clone(&metric)));
            builders.push(("bruteforce", bruteforce));
            let wrapped: Box<dyn Builder<f64>> =
                Box::new(L2NormalizedBuilder::new(Arc::new(KmknnBuilder::new(Arc::clone(&metric)))));
            builders.push(("normalized", wrapped));

            for (name, builder) in builders {
                let index = builder.build(&mat).unwrap();
                let prefix = dir.path().join(format!("{}_{}_", name, metric.name()));
                index.save(&prefix).unwrap();

                let reloaded = load_prebuilt::<f64>(&prefix).unwrap();
                assert_eq!(reloaded.num_observations(), 140);
                assert_eq!(reloaded.num_dimensions(), 4);

                let mut original = index.initialize();
                let mut restored = reloaded.initialize();
                for i in 0..140 {
                    assert_eq!(original.neighbors_of(i, 6).unwrap(), restored.neighbors_of(i, 6).unwrap());
                }
                for query in queries.chunks(4) {
                    assert_eq!(
                        original.neighbors_of_query(query, 6).unwrap(),
                        restored.neighbors_of_query(query, 6).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("missing_");
        assert!(load_prebuilt::<f64>(&prefix).is_err());

        std::fs::write(dir.path().join("odd_ALGORITHM"), "knncolle::Annoy").unwrap();
        let err = load_prebuilt::<f64>(&dir.path().join("odd_")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.message().contains("knncolle::Annoy"));
    }

    #[test]
    fn test_numeric_type_mismatch() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        let mat = SimpleMatrix::new(2, 2, &data).unwrap();
        let index = VptreeBuilder::<f32>::euclidean().build(&mat).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("vp_");
        index.save(&prefix).unwrap();

        let err = load_prebuilt::<f64>(&prefix).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(load_prebuilt::<f32>(&prefix).is_ok());
    }

    #[test]
    fn test_custom_registry() {
        let data = vec![1.0f64, 2.0, 3.0, 4.0];
        let mat = SimpleMatrix::new(2, 2, &data).unwrap();
        let index = BruteforceBuilder::euclidean().build(&mat).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("bf_");
        index.save(&prefix).unwrap();

        let empty = LoadRegistry::<f64>::empty();
        assert_eq!(empty.load(&prefix).unwrap_err().code(), ErrorCode::NotFound);
        let registry = LoadRegistry::<f64>::default();
        assert!(registry.load_shared(&prefix).is_ok());
    }
}

mod find_nearest_neighbors_tests {
    use super::*;

    #[test]
    fn test_matches_individual_searches() {
        let data = random_data(300, 5, 81);
        let mat = SimpleMatrix::new(5, 300, &data).unwrap();
        let index = VptreeBuilder::euclidean().build_shared(&mat).unwrap();

        let all = find_nearest_neighbors(index.as_ref(), 8, 4).unwrap();
        let mut searcher = index.initialize();
        assert_eq!(all.len(), 300);
        for (i, neighbors) in all.iter().enumerate() {
            assert_eq!(neighbors, &searcher.neighbors_of(i as u32, 8).unwrap());
        }

        let indices = find_nearest_neighbors_index_only(index.as_ref(), 8, 3).unwrap();
        assert_eq!(indices.len(), 300);
        assert_eq!(indices[10], all[10].iter().map(|p| p.0).collect::<Vec<_>>());
    }

    #[test]
    fn test_capping() {
        assert_eq!(cap_k(5, 3), 2);
        assert_eq!(cap_k_query(5, 3), 3);

        let data = vec![0.0f64, 1.0];
        let mat = SimpleMatrix::new(1, 2, &data).unwrap();
        let index = KmknnBuilder::euclidean().build(&mat).unwrap();
        let all = find_nearest_neighbors(index.as_ref(), 10, 2).unwrap();
        assert_eq!(all, vec![vec![(1, 1.0)], vec![(0, 1.0)]]);
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_builds_exact_searchers() {
        let data = random_data(80, 3, 91);
        let mat = SimpleMatrix::new(3, 80, &data).unwrap();
        let reference = BruteforceBuilder::manhattan().build(&mat).unwrap();
        let mut expected = reference.initialize();

        for algorithm in ["bruteforce", "vptree", "kmknn"] {
            let json = format!(r#"{{"algorithm": "{}", "distance": "manhattan"}}"#, algorithm);
            let config = SearchConfig::from_json_str(&json).unwrap();
            let index = config.build_builder::<f64>().unwrap().build(&mat).unwrap();
            let mut searcher = index.initialize();
            for i in 0..80 {
                assert_eq!(searcher.neighbors_of(i, 4).unwrap(), expected.neighbors_of(i, 4).unwrap());
            }
        }
    }
}

mod doc_index_tests {
    use knncolle::doc_index::*;

    #[test]
    fn test_index_pipeline() {
        let symbols = vec![
            SymbolRecord::new("search", "../classknncolle_1_1BruteforceSearcher.html#a5", "knncolle::BruteforceSearcher::search()"),
            SymbolRecord::new("Kmknn.hpp", "../Kmknn_8hpp.html", ""),
            SymbolRecord::new("search", "../classknncolle_1_1VptreeSearcher.html#ac8", "knncolle::VptreeSearcher::search()"),
            SymbolRecord::new("KmknnBuilder", "../classknncolle_1_1KmknnBuilder.html", "knncolle"),
            SymbolRecord::new("subpar", "https://ltla.github.io/subpar/namespacesubpar.html", ""),
        ];

        let shards = shard_entries(build_entries(&symbols));
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].entries[0].key, "kmknn_2ehpp");
        assert_eq!(shards[0].entries[1].key, "kmknnbuilder");
        assert_eq!(shards[1].entries[0].targets.len(), 2);

        for shard in &shards {
            shard.validate().unwrap();
            let text = shard.render();
            assert!(text.starts_with("var searchData=\n[\n"));
            assert!(text.ends_with("\n];\n"));
            assert_eq!(&SearchIndexShard::parse(shard.shard_id, &text).unwrap(), shard);
        }
    }
}
