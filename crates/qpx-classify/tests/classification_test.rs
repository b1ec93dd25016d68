//! End-to-end classification tests on synthetic feature batches.

use qpx_classify::{
    classify, Classifier, ClassifierConfig, DistanceKind, DistanceMatrix, DistanceRegistry, KnnGraphBuilder,
    NormalizedLaplacian, SpectralClustering, TopologyDistance, TopologyMetricSpec,
};
use qpx_core::{DimensionError, FeatureBundle, QpxError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const CENTRES: [[f64; 2]; 3] = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];

/// Three Gaussian blobs of `per_blob` samples in a 2-vector invariant plus
/// a correlated scalar.
fn blobs(per_blob: usize, seed: u64) -> Vec<FeatureBundle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.5).unwrap();
    let mut features = Vec::with_capacity(3 * per_blob);
    for (g, centre) in CENTRES.iter().enumerate() {
        for i in 0..per_blob {
            let x = centre[0] + noise.sample(&mut rng);
            let y = centre[1] + noise.sample(&mut rng);
            features.push(
                FeatureBundle::new(format!("blob{g}-{i}"))
                    .with_static("betti_curve", vec![x, y])
                    .with_static("spectral_weight", g as f64 * 3.0 + noise.sample(&mut rng) * 0.1),
            );
        }
    }
    features
}

fn blob_metric() -> TopologyMetricSpec {
    TopologyMetricSpec::new()
        .with_static("betti_curve", DistanceKind::EUCLIDEAN)
        .with_static("spectral_weight", DistanceKind::ABSOLUTE)
        .with_weight("spectral_weight", 0.5)
}

/// Fraction of samples whose label matches the majority label of their
/// true group, requiring distinct majorities per group.
fn agreement(labels: &[usize], groups: usize, per_group: usize) -> f64 {
    let mut majorities = Vec::new();
    let mut matched = 0;
    for g in 0..groups {
        let chunk = &labels[g * per_group..(g + 1) * per_group];
        let mut counts = vec![0usize; groups];
        for &l in chunk {
            counts[l] += 1;
        }
        let (majority, count) = counts.iter().enumerate().max_by_key(|(_, &c)| c).map(|(l, &c)| (l, c)).unwrap();
        majorities.push(majority);
        matched += count;
    }
    majorities.sort_unstable();
    majorities.dedup();
    if majorities.len() != groups {
        return 0.0;
    }
    matched as f64 / labels.len() as f64
}

#[test]
fn three_blobs_are_recovered() {
    let features = blobs(30, 2024);
    let result = classify(&features, &blob_metric(), 10, 3).unwrap();

    let score = agreement(&result.labels, 3, 30);
    println!("blob agreement: {score:.3}, eigenvalues: {:?}", result.eigenvalues);
    assert!(score >= 0.95, "agreement too low: {score}");
    assert!(result.ambiguous_count() <= 2, "ambiguous: {}", result.ambiguous_count());
    assert!(result.report.eigengap > 0.0);
}

#[test]
fn separated_blobs_classify_for_every_seed() {
    let mut failures = Vec::new();
    for seed in 0..20 {
        let features = blobs(30, seed);
        match classify(&features, &blob_metric(), 10, 3) {
            Ok(result) => {
                let score = agreement(&result.labels, 3, 30);
                if score < 0.95 {
                    failures.push(format!("seed {seed}: agreement {score:.3}"));
                }
                for &lambda in &result.eigenvalues[..3] {
                    assert!(lambda.abs() < 1e-6, "seed {seed}: expected a zero eigenvalue, got {lambda}");
                }
            }
            Err(err) => failures.push(format!("seed {seed}: {err}")),
        }
    }
    assert!(failures.is_empty(), "failed seeds: {failures:?}");
}

#[test]
fn result_ranges_hold() {
    let features = blobs(15, 7);
    let result = classify(&features, &blob_metric(), 5, 3).unwrap();

    assert_eq!(result.labels.len(), features.len());
    assert_eq!(result.confidence.len(), features.len());
    assert!(result.labels.iter().all(|&l| l < 3));
    assert!(result.confidence.iter().all(|&c| c > 0.0 && c <= 1.0));
    assert!(result.eigenvalues.len() >= 3);
    for pair in result.eigenvalues.windows(2) {
        assert!(pair[0] <= pair[1] + 1e-12);
    }
    for &lambda in &result.eigenvalues {
        assert!((-1e-8..=2.0 + 1e-8).contains(&lambda), "eigenvalue out of range: {lambda}");
    }
}

#[test]
fn missing_vector_invariant_is_a_schema_error() {
    let mut features = blobs(4, 1);
    features[5] = FeatureBundle::new("broken").with_static("spectral_weight", 1.0);

    let err = classify(&features, &blob_metric(), 3, 3).unwrap_err();
    match err {
        QpxError::SchemaInconsistency { sample, .. } => assert_eq!(sample, 5),
        other => panic!("expected schema inconsistency, got {other:?}"),
    }
}

#[test]
fn vector_distance_on_scalar_is_rejected_for_any_batch_size() {
    let metric = TopologyMetricSpec::new().with_static("spectral_weight", DistanceKind::COSINE);
    for per_blob in [1, 2, 10] {
        let err = classify(&blobs(per_blob, 3), &metric, 1, 1).unwrap_err();
        assert!(matches!(err, QpxError::MetricIncompatibility { .. }), "{err:?}");
    }
}

#[test]
fn largest_k_is_accepted() {
    let features: Vec<FeatureBundle> = [0.0, 0.1, 0.2, 9.0, 9.1]
        .iter()
        .enumerate()
        .map(|(i, &x)| FeatureBundle::new(format!("s{i}")).with_static("spectral_weight", x))
        .collect();
    let metric = TopologyMetricSpec::new().with_static("spectral_weight", DistanceKind::ABSOLUTE);

    let result = classify(&features, &metric, 3, 2).unwrap();
    assert_eq!(result.len(), 5);

    let registry = DistanceRegistry::standard();
    let matrix = DistanceMatrix::compute(&features, &TopologyDistance::new(&metric, &registry)).unwrap();
    let graph = KnnGraphBuilder::new(3).build(&matrix).unwrap();
    assert!((0..5).all(|i| graph.row_nnz(i) == 3));

    let err = classify(&features, &metric, 4, 2).unwrap_err();
    assert!(matches!(err, QpxError::Dimension(DimensionError::OutOfRange { parameter: "k", .. })));
}

#[test]
fn too_few_samples_are_rejected() {
    let features = vec![
        FeatureBundle::new("a").with_static("spectral_weight", 0.0),
        FeatureBundle::new("b").with_static("spectral_weight", 1.0),
    ];
    let metric = TopologyMetricSpec::new().with_static("spectral_weight", DistanceKind::ABSOLUTE);
    let err = classify(&features, &metric, 1, 1).unwrap_err();
    assert!(matches!(err, QpxError::Dimension(DimensionError::OutOfRange { parameter: "samples", .. })));
}

#[test]
fn directed_graph_matches_symmetrized_graph_on_separated_blobs() {
    let features = blobs(20, 11);
    let registry = DistanceRegistry::standard();
    let matrix = DistanceMatrix::compute(&features, &TopologyDistance::new(&blob_metric(), &registry)).unwrap();
    let graph = KnnGraphBuilder::new(6).build(&matrix).unwrap();
    let symmetric = graph.symmetrized();
    assert!(symmetric.is_symmetric());

    let engine = SpectralClustering::new(3);
    let directed = engine.fit(&graph, &mut StdRng::seed_from_u64(5)).unwrap();
    let undirected = engine.fit(&symmetric, &mut StdRng::seed_from_u64(5)).unwrap();

    assert!(agreement(&directed.labels, 3, 20) >= 0.95);
    assert!(agreement(&undirected.labels, 3, 20) >= 0.95);

    let lap = NormalizedLaplacian::new(&symmetric, 1e-12);
    assert_eq!(lap.isolated_nodes(), 0);
}

#[test]
fn classifier_seed_makes_runs_reproducible() {
    let features = blobs(12, 99);
    let classifier = Classifier::new(ClassifierConfig { seed: Some(123), ..ClassifierConfig::with_counts(5, 3) });
    let a = classifier.classify(&features, &blob_metric()).unwrap();
    let b = classifier.classify(&features, &blob_metric()).unwrap();
    assert_eq!(a.labels, b.labels);
    assert_eq!(a.eigenvalues, b.eigenvalues);
}

#[test]
fn result_survives_a_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.json");
    let result = classify(&blobs(6, 5), &blob_metric(), 3, 3).unwrap();
    result.to_json(&path).unwrap();
    let loaded = qpx_classify::ClassificationResult::from_json(&path).unwrap();
    assert_eq!(loaded.labels, result.labels);
    assert_eq!(loaded.report.settings, result.report.settings);
}
