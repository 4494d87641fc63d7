//! Textual dump of instruction trees.
//!
//! The format is meant for logging and test diagnostics, not for parsing back:
//!
//! ```text
//! BlockContainer(Normal) {
//!   Block I1 (incoming: 0) {
//!     if (comp.i4.Equality.None(ldloc x, ldc.i4 1)) br I5
//!     br I7
//!   }
//! }
//! ```

use std::fmt::{self, Write};

use crate::il::{
    function::{ILFunction, InstrId},
    opcode::{InstructionKind, OpCode},
};

impl ILFunction {
    /// Renders the subtree rooted at `id`.
    #[must_use]
    pub fn dump(&self, id: InstrId) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_node(&mut out, id, 0);
        out
    }

    fn write_node(&self, out: &mut String, id: InstrId, indent: usize) -> fmt::Result {
        match self.kind(id) {
            InstructionKind::BlockContainer { kind, .. } => {
                writeln!(out, "BlockContainer({kind}) {{")?;
                for block in self.children(id) {
                    write!(out, "{:width$}", "", width = indent + 2)?;
                    self.write_node(out, block, indent + 2)?;
                    writeln!(out)?;
                }
                write!(out, "{:width$}}}", "", width = indent)
            }
            InstructionKind::Block {
                incoming_edge_count,
            } => {
                writeln!(out, "Block {id} (incoming: {incoming_edge_count}) {{")?;
                for inst in self.children(id) {
                    write!(out, "{:width$}", "", width = indent + 2)?;
                    self.write_node(out, inst, indent + 2)?;
                    writeln!(out)?;
                }
                write!(out, "{:width$}}}", "", width = indent)
            }
            InstructionKind::IfInstruction => {
                let children = self.child_list(id);
                write!(out, "if (")?;
                self.write_node(out, children[0], indent)?;
                write!(out, ") ")?;
                self.write_node(out, children[1], indent)?;
                if !self.match_nop(children[2]) {
                    write!(out, " else ")?;
                    self.write_node(out, children[2], indent)?;
                }
                Ok(())
            }
            InstructionKind::SwitchSection { labels, .. } => {
                write!(out, "case {labels}: ")?;
                if let Some(body) = self.first_child(id) {
                    self.write_node(out, body, indent)?;
                }
                Ok(())
            }
            InstructionKind::Switch { .. } => {
                let children = self.child_list(id);
                write!(out, "switch (")?;
                if let Some(&value) = children.first() {
                    self.write_node(out, value, indent)?;
                }
                writeln!(out, ") {{")?;
                for &section in children.iter().skip(1) {
                    write!(out, "{:width$}", "", width = indent + 2)?;
                    self.write_node(out, section, indent + 2)?;
                    writeln!(out)?;
                }
                write!(out, "{:width$}}}", "", width = indent)
            }
            kind => {
                self.write_head(out, kind)?;
                if self.child_count(id) > 0 {
                    write!(out, "(")?;
                    for (i, child) in self.children(id).enumerate() {
                        if i > 0 {
                            write!(out, ", ")?;
                        }
                        self.write_node(out, child, indent)?;
                    }
                    write!(out, ")")?;
                }
                Ok(())
            }
        }
    }

    fn write_head(&self, out: &mut String, kind: &InstructionKind) -> fmt::Result {
        match kind {
            InstructionKind::Branch { target } => write!(out, "br {target}"),
            InstructionKind::Leave { target_container } => write!(out, "leave {target_container}"),
            InstructionKind::LdLoc { variable } => {
                write!(out, "ldloc {}", self.variable(*variable).name)
            }
            InstructionKind::LdLoca { variable } => {
                write!(out, "ldloca {}", self.variable(*variable).name)
            }
            InstructionKind::StLoc { variable } => {
                write!(out, "stloc {}", self.variable(*variable).name)
            }
            InstructionKind::LdcI4 { value } => write!(out, "ldc.i4 {value}"),
            InstructionKind::LdcI8 { value } => write!(out, "ldc.i8 {value}"),
            InstructionKind::LdcF4 { value } => write!(out, "ldc.f4 {value}"),
            InstructionKind::LdcF8 { value } => write!(out, "ldc.f8 {value}"),
            InstructionKind::LdStr { value } => write!(out, "ldstr {value:?}"),
            InstructionKind::BinaryNumeric {
                operator,
                check_for_overflow,
                sign,
                ..
            } => {
                write!(out, "binary.{operator}")?;
                if *check_for_overflow {
                    write!(out, ".ovf")?;
                }
                if *sign != crate::il::Sign::None {
                    write!(out, ".{sign}")?;
                }
                Ok(())
            }
            InstructionKind::Comp {
                kind,
                sign,
                input_type,
                ..
            } => write!(out, "comp.{input_type}.{kind}.{sign}"),
            InstructionKind::Conv { target_type, .. } => write!(out, "conv.{target_type}"),
            InstructionKind::NumericCompoundAssign {
                operator,
                target_kind,
                eval_mode,
                ..
            } => write!(out, "compound.{operator}.{target_kind}.{eval_mode}"),
            InstructionKind::LdObj { ty } | InstructionKind::StObj { ty } => {
                write!(out, "{}.{ty}", kind.opcode())
            }
            InstructionKind::LdFlda { field } | InstructionKind::LdsFlda { field } => {
                write!(out, "{} {field}", kind.opcode())
            }
            InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
                write!(out, "{} {method}", kind.opcode())
            }
            other if other.opcode() == OpCode::Nop => write!(out, "nop"),
            other => write!(out, "{}", other.opcode()),
        }
    }
}

impl fmt::Display for ILFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {}", self.name())?;
        write!(f, "{}", self.dump(self.body()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        il::{ComparisonKind, IlType, ILVariable, PrimitiveType, Sign, VariableKind},
        Result,
    };

    #[test]
    fn test_dump_if_and_branch() -> Result<()> {
        let mut func = ILFunction::new("M");
        let x = func.add_variable(ILVariable::new(
            VariableKind::Local,
            IlType::primitive(PrimitiveType::I4),
            "x",
        ));
        let body = func.body();
        let entry = func.block(&[])?;
        let exit = func.block(&[])?;
        func.add_child(body, entry)?;
        func.add_child(body, exit)?;

        let load = func.ld_loc(x);
        let one = func.ldc_i4(1);
        let cond = func.comp(ComparisonKind::Equality, Sign::None, load, one)?;
        let br = func.branch(exit);
        let if_inst = func.if_then(cond, br)?;
        func.add_child(entry, if_inst)?;

        let text = func.dump(body);
        assert!(text.contains("if (comp.i4.Equality.None(ldloc x, ldc.i4 1)) br"));
        assert!(text.contains("(incoming: 1)"));
        Ok(())
    }
}
