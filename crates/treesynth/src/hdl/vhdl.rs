//! VHDL generation for quantized trees and forests.
//!
//! Feature ports are two's-complement `signed(bits + 2)`: one sign bit, one
//! integer bit and `bits` fractional bits, covering reals in `[-2, 2)`.
//! Inputs outside that range wrap in hardware, so models must be trained on
//! features normalized into it.
//! Every numeric constant is written as a bit-string literal, so no value is
//! bound by VHDL's 32-bit `integer` range and no float ever appears.

use crate::error::{Error, Result};
use crate::fixed::dequantize;
use crate::repr::{Node, QuantizedForest, QuantizedTree};
use crate::utils::ceil_log2;

use super::writer::LineWriter;

/// Width of a feature port for `bits` fractional bits.
pub fn feature_width(bits: u32) -> u32 {
    bits + 2
}

/// Width of a class port, at least one bit.
pub fn class_width(n_classes: usize) -> u32 {
    ceil_log2(n_classes).max(1)
}

/// Width of a vote counter able to hold `n_trees`.
pub fn vote_width(n_trees: usize) -> u32 {
    ceil_log2(n_trees + 1).max(1)
}

/// Two's-complement bit string of `value`, or `None` if it does not fit.
pub fn signed_literal(value: i64, width: u32) -> Option<String> {
    debug_assert!((1..64).contains(&width));
    let max = (1i64 << (width - 1)) - 1;
    let min = -(1i64 << (width - 1));
    if value < min || value > max {
        return None;
    }
    let mask = (1u64 << width) - 1;
    Some(format!("\"{:0w$b}\"", (value as u64) & mask, w = width as usize))
}

/// Unsigned bit string of `value`, truncated to `width` bits.
pub fn unsigned_literal(value: u64, width: u32) -> String {
    let mask = (1u64 << width) - 1;
    format!("\"{:0w$b}\"", value & mask, w = width as usize)
}

fn signed_type(width: u32) -> String {
    format!("signed({} downto 0)", width - 1)
}

fn unsigned_type(width: u32) -> String {
    format!("unsigned({} downto 0)", width - 1)
}

fn write_context(w: &mut LineWriter) {
    w.line("library ieee;");
    w.line("use ieee.std_logic_1164.all;");
    w.line("use ieee.numeric_std.all;");
    w.blank();
}

fn write_ports(w: &mut LineWriter, n_features: usize, feature_width: u32, class_width: u32) {
    w.line("port (");
    w.indent();
    let feature_type = signed_type(feature_width);
    for f in 0..n_features {
        w.line(format!("feature_{f} : in {feature_type};"));
    }
    w.line(format!("class_out : out {}", unsigned_type(class_width)));
    w.dedent();
    w.line(");");
}

/// One entity + architecture for a single tree.
pub(crate) fn write_tree_entity(
    w: &mut LineWriter,
    entity: &str,
    tree: &QuantizedTree,
    class_width: u32,
) -> Result<()> {
    let fw = feature_width(tree.bits_per_feature());
    let class_type = unsigned_type(class_width);

    w.line(format!(
        "-- Decision tree: {} nodes, {} splits, {} leaves, depth {}.",
        tree.n_nodes(),
        tree.n_splits(),
        tree.n_leaves(),
        tree.depth()
    ));
    write_context(w);

    w.line(format!("entity {entity} is"));
    w.indent();
    write_ports(w, tree.n_features(), fw, class_width);
    w.dedent();
    w.line(format!("end entity {entity};"));
    w.blank();

    w.line(format!("architecture rtl of {entity} is"));
    w.indent();
    for (id, feature, threshold) in tree.splits() {
        let literal = signed_literal(threshold.mantissa(), fw).ok_or_else(|| {
            Error::MalformedModel(format!(
                "tree `{}` node {id}: threshold {} on feature_{feature} is outside the \
                 {} port range [-2, 2); normalize features into [-2, 2) before training",
                tree.name(),
                dequantize(threshold),
                signed_type(fw)
            ))
        })?;
        w.line(format!(
            "constant split_{id}_threshold : {} := {literal}; -- feature_{feature} <= {threshold}",
            signed_type(fw)
        ));
    }
    for (id, node) in tree.nodes().iter().enumerate() {
        if let Some(class) = node.class() {
            w.line(format!(
                "constant leaf_{id}_class : {class_type} := {};",
                unsigned_literal(u64::from(class), class_width)
            ));
        }
    }
    for (id, _, _) in tree.splits() {
        w.line(format!("signal split_{id}_le : std_logic;"));
    }
    for id in 0..tree.n_nodes() {
        w.line(format!("signal node_{id}_class : {class_type};"));
    }
    w.dedent();
    w.line("begin");
    w.indent();
    for (id, node) in tree.nodes().iter().enumerate() {
        match node {
            Node::Split {
                feature,
                left,
                right,
                ..
            } => {
                w.line(format!(
                    "split_{id}_le <= '1' when feature_{feature} <= split_{id}_threshold else '0';"
                ));
                w.line(format!(
                    "node_{id}_class <= node_{left}_class when split_{id}_le = '1' else node_{right}_class;"
                ));
            }
            Node::Leaf { .. } => {
                w.line(format!("node_{id}_class <= leaf_{id}_class;"));
            }
        }
    }
    w.line("class_out <= node_0_class;");
    w.dedent();
    w.line("end architecture rtl;");
    Ok(())
}

/// Member entities followed by the voting top-level entity.
pub(crate) fn write_forest(
    w: &mut LineWriter,
    top: &str,
    members: &[String],
    forest: &QuantizedForest,
    library: &str,
) -> Result<()> {
    let n_classes = forest.n_classes();
    let cw = class_width(n_classes);
    let vw = vote_width(forest.n_trees());
    let fw = feature_width(forest.bits_per_feature());

    for (tree, entity) in forest.trees().zip(members) {
        write_tree_entity(w, entity, tree, cw)?;
        w.blank();
    }

    w.line(format!(
        "-- Random forest: {} trees, majority vote, lowest class wins ties.",
        forest.n_trees()
    ));
    write_context(w);

    w.line(format!("entity {top} is"));
    w.indent();
    write_ports(w, forest.n_features(), fw, cw);
    w.dedent();
    w.line(format!("end entity {top};"));
    w.blank();

    w.line(format!("architecture rtl of {top} is"));
    w.indent();
    w.line(format!("constant N_CLASSES : natural := {n_classes};"));
    w.line(format!(
        "type vote_array is array (0 to N_CLASSES - 1) of {};",
        unsigned_type(vw)
    ));
    for t in 0..members.len() {
        w.line(format!("signal tree_{t}_class : {};", unsigned_type(cw)));
    }
    w.dedent();
    w.line("begin");
    w.indent();

    for (t, entity) in members.iter().enumerate() {
        w.line(format!("tree_{t} : entity {library}.{entity}"));
        w.indent();
        w.line("port map (");
        w.indent();
        for f in 0..forest.n_features() {
            w.line(format!("feature_{f} => feature_{f},"));
        }
        w.line(format!("class_out => tree_{t}_class"));
        w.dedent();
        w.line(");");
        w.dedent();
        w.blank();
    }

    let sensitivity = (0..members.len())
        .map(|t| format!("tree_{t}_class"))
        .collect::<Vec<_>>()
        .join(", ");
    w.line(format!("vote : process ({sensitivity})"));
    w.indent();
    w.line("variable votes : vote_array;");
    w.line("variable best : natural range 0 to N_CLASSES - 1;");
    w.dedent();
    w.line("begin");
    w.indent();
    w.line("votes := (others => (others => '0'));");
    for t in 0..members.len() {
        w.line(format!(
            "votes(to_integer(tree_{t}_class)) := votes(to_integer(tree_{t}_class)) + 1;"
        ));
    }
    w.line("best := 0;");
    w.line("for c in 1 to N_CLASSES - 1 loop");
    w.indent();
    // Strict comparison keeps the lowest class on ties.
    w.line("if votes(c) > votes(best) then");
    w.indent();
    w.line("best := c;");
    w.dedent();
    w.line("end if;");
    w.dedent();
    w.line("end loop;");
    w.line(format!("class_out <= to_unsigned(best, {cw});"));
    w.dedent();
    w.line("end process vote;");
    w.dedent();
    w.line("end architecture rtl;");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(8, 6, "\"001000\"")]
    #[case(-8, 6, "\"111000\"")]
    #[case(0, 2, "\"00\"")]
    #[case(31, 6, "\"011111\"")]
    #[case(-32, 6, "\"100000\"")]
    fn signed_literals(#[case] value: i64, #[case] width: u32, #[case] expected: &str) {
        assert_eq!(signed_literal(value, width).as_deref(), Some(expected));
    }

    #[test]
    fn signed_literal_overflow() {
        assert_eq!(signed_literal(32, 6), None);
        assert_eq!(signed_literal(-33, 6), None);
    }

    #[test]
    fn widths() {
        assert_eq!(feature_width(8), 10);
        assert_eq!(class_width(1), 1);
        assert_eq!(class_width(2), 1);
        assert_eq!(class_width(3), 2);
        assert_eq!(class_width(10), 4);
        assert_eq!(vote_width(1), 1);
        assert_eq!(vote_width(3), 2);
        assert_eq!(vote_width(4), 3);
    }

    #[test]
    fn unsigned_literals() {
        assert_eq!(unsigned_literal(2, 2), "\"10\"");
        assert_eq!(unsigned_literal(0, 1), "\"0\"");
    }
}
