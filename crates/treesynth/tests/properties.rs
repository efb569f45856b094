//! Property-based tests for the codec, extraction and forest voting.

use std::collections::VecDeque;

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use treesynth::fixed::{dequantize, quantize, quantize_row, MAX_BITS};
use treesynth::source::float_leaf;
use treesynth::testing::{SourceTree, SourceTreeBuilder};
use treesynth::{EquivalenceChecker, QuantizedForest, SynthConfig, TreeExtractor};

const N_FEATURES: usize = 3;
const MAX_NODES: usize = 63;

// =============================================================================
// Generators
// =============================================================================

/// Split descriptor: feature, threshold numerator, whether to split at all.
type Desc = (usize, i64, bool);

fn arb_descs() -> impl Strategy<Value = Vec<Desc>> {
    prop_vec((0..N_FEATURES, -48i64..48, any::<bool>()), 0..48)
}

/// Grow a tree breadth-first from descriptors. Thresholds are `k / 2^bits`,
/// so they are exact at `bits`. Leaf `id` votes for class `id % 3`.
fn grow(descs: &[Desc], bits: u32) -> SourceTree {
    let scale = (1u64 << bits) as f64;
    let mut builder = SourceTreeBuilder::new();
    let mut queue = VecDeque::from([0usize]);
    let mut next_id = 1;
    let mut step = 0;
    while let Some(id) = queue.pop_front() {
        let (feature, k, split) = descs.get(step).copied().unwrap_or((0, 0, false));
        step += 1;
        if split && next_id + 2 <= MAX_NODES {
            let (left, right) = (next_id, next_id + 1);
            next_id += 2;
            builder.split(id, feature as i64, k as f64 / scale, left as i64, right as i64);
            queue.push_back(left);
            queue.push_back(right);
        } else {
            let mut counts = [1u64; 3];
            counts[id % 3] = 5;
            builder.leaf(id, &counts);
        }
    }
    builder.build()
}

fn extractor(bits: u32) -> TreeExtractor {
    let config = SynthConfig::builder()
        .name("prop")
        .n_features(N_FEATURES)
        .bits_per_feature(bits)
        .build()
        .unwrap();
    TreeExtractor::new(config).unwrap()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn codec_is_stable(v in -1e6f64..1e6, bits in 0u32..=MAX_BITS) {
        let q = quantize(v, bits).unwrap();
        let again = quantize(dequantize(q), bits).unwrap();
        prop_assert_eq!(q, again);
        prop_assert!((dequantize(q) - v).abs() <= 0.5 / (1u64 << bits) as f64);
    }

    #[test]
    fn quantized_tree_is_isomorphic(
        descs in arb_descs(),
        bits in 2u32..=10,
        sample in prop_vec(-64i64..64, N_FEATURES),
    ) {
        let source = grow(&descs, bits);
        let tree = extractor(bits).extract_tree(&source).unwrap();
        prop_assert_eq!(tree.n_nodes(), source.children_left.len());

        // Samples on the grid of `bits` are exact, so both domains must agree.
        let scale = (1u64 << bits) as f64;
        let sample: Vec<f64> = sample.iter().map(|&j| j as f64 / scale).collect();
        let mantissas = quantize_row(&sample, bits).unwrap();
        let expected = float_leaf(&source, &sample).unwrap();
        prop_assert_eq!(tree.leaf_for(&mantissas).unwrap() as usize, expected);
    }

    #[test]
    fn forest_predicts_within_member_universe(
        forest_descs in prop_vec(arb_descs(), 1..6),
        sample in prop_vec(-2.0f64..2.0, N_FEATURES),
    ) {
        let sources: Vec<SourceTree> = forest_descs.iter().map(|d| grow(d, 4)).collect();
        let forest: QuantizedForest = extractor(4).extract_forest(&sources).unwrap();
        let label = forest.predict(&sample).unwrap();
        prop_assert!(forest.class_universe().contains(&label));

        let votes = forest.votes(&sample).unwrap();
        prop_assert_eq!(votes.iter().sum::<u64>(), forest.n_trees() as u64);
    }

    #[test]
    fn compare_is_repeatable(
        descs in arb_descs(),
        rows in prop_vec(prop_vec(-2.0f64..2.0, N_FEATURES), 0..20),
    ) {
        let source = grow(&descs, 6);
        let coarse = extractor(2).extract_tree(&source).unwrap();
        let fine = extractor(6).extract_tree(&source).unwrap();
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let samples = ndarray::Array2::from_shape_vec((rows.len(), N_FEATURES), flat).unwrap();

        let checker = EquivalenceChecker::new().with_details(true);
        let first = checker.compare(&fine, &coarse, samples.view()).unwrap();
        let second = checker.compare(&fine, &coarse, samples.view()).unwrap();
        prop_assert_eq!(first.total, rows.len());
        prop_assert_eq!(first, second);
    }
}
