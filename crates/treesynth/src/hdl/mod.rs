//! VHDL emission for quantized models.
//!
//! The output is deterministic: the same model always yields byte-identical
//! text (no timestamps, no hash-ordered iteration).
//!
//! # Example
//!
//! ```
//! use treesynth::hdl::{HardwareEmitter, HdlModel};
//! use treesynth::{SynthConfig, TreeExtractor};
//!
//! let config = SynthConfig::builder().name("stump").n_features(1).bits_per_feature(4).build()?;
//! let tree = TreeExtractor::new(config)?.extract_tree(&treesynth::testing::stump(0.5))?;
//! let vhdl = HardwareEmitter::new().emit(HdlModel::Tree(&tree))?;
//! assert!(vhdl.contains("entity stump is"));
//! # Ok::<(), treesynth::Error>(())
//! ```

mod vhdl;
mod writer;

use std::io;

use tracing::debug;

use crate::error::{Error, Result};
use crate::repr::{QuantizedForest, QuantizedTree};

pub use vhdl::{class_width, feature_width, signed_literal, unsigned_literal, vote_width};

use writer::LineWriter;

/// Model handed to the emitter.
#[derive(Debug, Clone, Copy)]
pub enum HdlModel<'a> {
    Tree(&'a QuantizedTree),
    Forest(&'a QuantizedForest),
}

impl<'a> From<&'a QuantizedTree> for HdlModel<'a> {
    fn from(tree: &'a QuantizedTree) -> Self {
        HdlModel::Tree(tree)
    }
}

impl<'a> From<&'a QuantizedForest> for HdlModel<'a> {
    fn from(forest: &'a QuantizedForest) -> Self {
        HdlModel::Forest(forest)
    }
}

/// Renders quantized trees and forests as VHDL.
///
/// The circuit reads each feature as `signed(bits + 2)`, i.e. reals in
/// `[-2, 2)`. Models must be trained on features normalized into that range;
/// a threshold outside it is rejected, and inputs outside it wrap in hardware
/// where [`QuantizedTree::predict`] would not.
#[derive(Debug, Clone)]
pub struct HardwareEmitter {
    library: String,
}

impl Default for HardwareEmitter {
    fn default() -> Self {
        Self {
            library: "work".to_string(),
        }
    }
}

impl HardwareEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library the forest top level instantiates member entities from.
    pub fn with_library(mut self, library: impl AsRef<str>) -> Self {
        self.library = sanitize_identifier(library.as_ref());
        self
    }

    pub fn emit(&self, model: HdlModel<'_>) -> Result<String> {
        match model {
            HdlModel::Tree(tree) => self.emit_tree(tree),
            HdlModel::Forest(forest) => self.emit_forest(forest),
        }
    }

    /// One entity named after the tree.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedModel`] if a threshold lies outside `[-2, 2)` and so
    /// does not fit the feature port.
    pub fn emit_tree(&self, tree: &QuantizedTree) -> Result<String> {
        let entity = sanitize_identifier(tree.name());
        let mut w = LineWriter::new();
        write_header(&mut w, &entity, tree.n_features(), tree.bits_per_feature());
        vhdl::write_tree_entity(&mut w, &entity, tree, vhdl::class_width(tree.n_classes()))?;
        debug!(entity = %entity, n_nodes = tree.n_nodes(), "emitted tree");
        Ok(w.finish())
    }

    /// One entity per member tree plus a voting top-level entity.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyModel`] for a forest without trees, otherwise as
    /// [`emit_tree`](Self::emit_tree).
    pub fn emit_forest(&self, forest: &QuantizedForest) -> Result<String> {
        if forest.n_trees() == 0 {
            return Err(Error::EmptyModel);
        }
        let top = sanitize_identifier(forest.name());
        let members: Vec<String> = (0..forest.n_trees())
            .map(|t| sanitize_identifier(&format!("{top}_tree_{t}")))
            .collect();

        let mut w = LineWriter::new();
        write_header(&mut w, &top, forest.n_features(), forest.bits_per_feature());
        vhdl::write_forest(&mut w, &top, &members, forest, &self.library)?;
        debug!(entity = %top, n_trees = forest.n_trees(), "emitted forest");
        Ok(w.finish())
    }

    /// Emit into any writer.
    pub fn emit_to<W: io::Write>(&self, model: HdlModel<'_>, mut writer: W) -> Result<()> {
        let text = self.emit(model)?;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

fn write_header(w: &mut LineWriter, entity: &str, n_features: usize, bits: u32) {
    w.line(format!("-- {entity}: generated by treesynth, do not edit."));
    w.line(format!(
        "-- {n_features} features as signed fixed point, {bits} fractional bits, range [-2, 2)."
    ));
    w.line("-- A split routes left when feature <= threshold.");
    w.blank();
}

// =============================================================================
// Identifiers
// =============================================================================

const RESERVED: &[&str] = &[
    "abs", "access", "after", "alias", "all", "and", "architecture", "array", "assert", "assume",
    "attribute", "begin", "block", "body", "buffer", "bus", "case", "component", "configuration",
    "constant", "context", "cover", "default", "disconnect", "downto", "else", "elsif", "end",
    "entity", "exit", "fairness", "file", "for", "force", "function", "generate", "generic",
    "group", "guarded", "if", "impure", "in", "inertial", "inout", "is", "label", "library",
    "linkage", "literal", "loop", "map", "mod", "nand", "new", "next", "nor", "not", "null", "of",
    "on", "open", "or", "others", "out", "package", "parameter", "port", "postponed", "procedure",
    "process", "property", "protected", "pure", "range", "record", "register", "reject",
    "release", "rem", "report", "restrict", "return", "rol", "ror", "select", "sequence",
    "severity", "shared", "signal", "sla", "sll", "sra", "srl", "strong", "subtype", "then", "to",
    "transport", "type", "unaffected", "units", "until", "use", "variable", "vmode", "vprop",
    "vunit", "wait", "when", "while", "with", "xnor", "xor",
];

/// Turn an arbitrary name into a legal basic VHDL identifier.
///
/// Lowercases, maps other characters to `_`, collapses repeated underscores,
/// strips leading and trailing ones, prefixes names that do not start with a
/// letter and suffixes reserved words.
pub fn sanitize_identifier(name: &str) -> String {
    let mut ident = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if c == '_' && (ident.is_empty() || ident.ends_with('_')) {
            continue;
        }
        ident.push(c);
    }
    while ident.ends_with('_') {
        ident.pop();
    }
    if ident.is_empty() {
        return "model".to_string();
    }
    if !ident.starts_with(|c: char| c.is_ascii_alphabetic()) {
        ident.insert_str(0, "m_");
    }
    if RESERVED.contains(&ident.as_str()) {
        ident.push_str("_e");
    }
    ident
}
