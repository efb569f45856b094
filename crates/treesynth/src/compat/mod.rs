//! Loaders for models dumped by external training toolkits.

pub mod sklearn;

pub use sklearn::{Dataset, ModelKind, SklearnModel, SklearnTree};
