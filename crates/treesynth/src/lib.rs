//! treesynth: fixed-point decision trees and random forests.
//!
//! Takes a classifier trained elsewhere, re-expresses every threshold and
//! every input feature as a fixed-point number, predicts bit-exactly in the
//! integer domain and emits the same decision logic as VHDL.
//!
//! # Key Types
//!
//! - [`SynthConfig`] - Model name, feature count and bit width
//! - [`TreeExtractor`] - Trained float model → [`QuantizedTree`] / [`QuantizedForest`]
//! - [`HardwareEmitter`] - Quantized model → VHDL text
//! - [`EquivalenceChecker`] - Float vs quantized predictions over a dataset
//!
//! # Loading scikit-learn dumps
//!
//! Use [`compat::sklearn::SklearnModel`] to load the JSON parallel-array
//! format. Any other toolkit plugs in by implementing [`source::TreeSource`].
//!
//! # Example
//!
//! ```
//! use treesynth::{SynthConfig, TreeExtractor};
//!
//! let config = SynthConfig::builder().n_features(1).bits_per_feature(4).build()?;
//! let tree = TreeExtractor::new(config)?.extract_tree(&treesynth::testing::stump(0.5))?;
//! assert_eq!(tree.predict(&[0.5])?, 0);
//! assert_eq!(tree.predict(&[0.6])?, 1);
//! # Ok::<(), treesynth::Error>(())
//! ```

pub mod check;
pub mod compat;
pub mod config;
pub mod error;
pub mod extract;
pub mod fixed;
pub mod hdl;
pub mod inference;
pub mod metrics;
pub mod repr;
pub mod source;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use error::{Error, Result};

pub use config::{ConfigError, SynthConfig};

pub use fixed::{dequantize, quantize, FixedPoint, MAX_BITS};

pub use inference::{ClassLabel, Classifier};

pub use repr::{Node, NodeId, QuantizedForest, QuantizedTree};

pub use extract::TreeExtractor;

pub use hdl::{HardwareEmitter, HdlModel};

pub use check::{EquivalenceChecker, Mismatch, Report, TargetReport};

pub use utils::{run_with_threads, Parallelism};
