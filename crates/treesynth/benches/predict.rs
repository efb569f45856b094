//! Forest prediction benchmarks.
//!
//! Quantized vs float reference prediction on a synthetic forest, and
//! sequential vs parallel member evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use treesynth::source::ReferenceForest;
use treesynth::testing::{SourceTree, SourceTreeBuilder};
use treesynth::{Classifier, Parallelism, QuantizedForest, SynthConfig, TreeExtractor};

const N_FEATURES: usize = 32;
const DEPTH: u32 = 8;
const BATCH: usize = 1_000;

/// Complete tree of `DEPTH` levels with random features and thresholds.
fn random_tree(rng: &mut StdRng) -> SourceTree {
    let mut builder = SourceTreeBuilder::new();
    let n_splits = (1usize << DEPTH) - 1;
    let n_nodes = (1usize << (DEPTH + 1)) - 1;
    for id in 0..n_nodes {
        if id < n_splits {
            let feature = rng.gen_range(0..N_FEATURES) as i64;
            let threshold = rng.r#gen::<f64>();
            builder.split(id, feature, threshold, (2 * id + 1) as i64, (2 * id + 2) as i64);
        } else {
            let class = rng.gen_range(0..4);
            let mut counts = [0u64; 4];
            counts[class] = 10;
            builder.leaf(id, &counts);
        }
    }
    builder.build()
}

fn bench_forest_prediction(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let sources: Vec<SourceTree> = (0..64).map(|_| random_tree(&mut rng)).collect();
    let samples: Vec<Vec<f64>> = (0..BATCH)
        .map(|_| (0..N_FEATURES).map(|_| rng.r#gen::<f64>()).collect())
        .collect();

    let config = SynthConfig::builder()
        .name("bench")
        .n_features(N_FEATURES)
        .bits_per_feature(8)
        .build()
        .unwrap();
    let forest: QuantizedForest = TreeExtractor::new(config)
        .unwrap()
        .extract_forest(&sources)
        .unwrap();
    let parallel = forest.clone().with_parallelism(Parallelism::Parallel);
    let reference = ReferenceForest::new(&sources, N_FEATURES);

    let mut group = c.benchmark_group("forest/predict");
    group.throughput(Throughput::Elements(BATCH as u64));

    let predictors: [(&str, &dyn Classifier); 3] = [
        ("quantized", &forest),
        ("quantized_parallel", &parallel),
        ("float_reference", &reference),
    ];
    for (name, predictor) in predictors {
        group.bench_with_input(BenchmarkId::new(name, 64), &samples, |b, samples| {
            b.iter(|| {
                for sample in samples {
                    black_box(predictor.predict(black_box(sample)).unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forest_prediction);
criterion_main!(benches);
