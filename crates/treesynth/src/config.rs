//! Quantization configuration with builder pattern.
//!
//! [`SynthConfig`] carries the three numbers every component agrees on: the
//! model name (used only for artifact naming), the number of input features and
//! the bit width shared by features and thresholds.
//!
//! # Example
//!
//! ```
//! use treesynth::SynthConfig;
//!
//! let config = SynthConfig::builder()
//!     .name("hog_forest")
//!     .n_features(3540)
//!     .bits_per_feature(8)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.bits_per_feature, 8);
//! ```

use std::num::NonZeroUsize;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::fixed::MAX_BITS;
use crate::utils::Parallelism;

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bits_per_feature must be at most {max}, got {bits}")]
    InvalidBits { bits: u32, max: u32 },
    #[error("n_features must be at least 1")]
    InvalidNFeatures,
    #[error("model name must not be empty")]
    EmptyName,
}

/// Configuration consumed by extraction and emission.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct SynthConfig {
    /// Model name. Default: `"tree"`.
    #[builder(into, default = String::from("tree"))]
    pub name: String,

    /// Number of input features every sample carries.
    pub n_features: usize,

    /// Fractional bits for features and thresholds. Default: 8.
    #[builder(default = 8)]
    pub bits_per_feature: u32,

    /// Worker threads for forest and checker loops. `None` = sequential.
    pub n_threads: Option<NonZeroUsize>,
}

impl<S: synth_config_builder::IsComplete> SynthConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `bits_per_feature > MAX_BITS`,
    /// `n_features == 0` or the name is empty.
    pub fn build(self) -> Result<SynthConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl SynthConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bits_per_feature > MAX_BITS {
            return Err(ConfigError::InvalidBits {
                bits: self.bits_per_feature,
                max: MAX_BITS,
            });
        }
        if self.n_features == 0 {
            return Err(ConfigError::InvalidNFeatures);
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }

    /// Parallelism implied by `n_threads`.
    pub fn parallelism(&self) -> Parallelism {
        match self.n_threads {
            Some(n) => Parallelism::from_threads(n.get()),
            None => Parallelism::Sequential,
        }
    }
}
