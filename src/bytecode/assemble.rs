use std::collections::HashMap;

use log::warn;

use crate::bytecode::assemble_error::AssembleError;
use crate::bytecode::{Op, ProgramImage};
use crate::frontend::line::SourceLine;

/// Lowers parsed source lines into a `ProgramImage`.
///
/// Two passes: the first maps every label to the index of its own line, the
/// second types each operand and resolves label references to code indices.
/// A duplicate label keeps its last definition; a reference to a label no
/// line defines is fatal here, before anything executes.
pub struct Assembler {
    labels: HashMap<String, usize>,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            labels: HashMap::new(),
        }
    }

    pub fn assemble(mut self, lines: &[SourceLine]) -> Result<ProgramImage, AssembleError> {
        let first = lines.first().ok_or(AssembleError::EmptyProgram)?;
        if first.operation != "START" {
            return Err(AssembleError::missing_start(&first.operation));
        }

        self.collect_labels(lines);

        let mut ops = Vec::with_capacity(lines.len());
        for line in lines {
            ops.push(self.lower(line)?);
        }

        Ok(ProgramImage {
            ops,
            labels: self.labels,
        })
    }

    fn collect_labels(&mut self, lines: &[SourceLine]) {
        for (index, line) in lines.iter().enumerate() {
            if let Some(label) = &line.label {
                if let Some(previous) = self.labels.insert(label.clone(), index) {
                    warn!(
                        "label '{}' redefined at line {}, dropping earlier definition at index {}",
                        label, line.line, previous
                    );
                }
            }
        }
    }

    fn lower(&self, line: &SourceLine) -> Result<Op, AssembleError> {
        if line.is_marker() {
            return Ok(Op::Marker);
        }

        // extra operands after a no-operand mnemonic are ignored, matching
        // the loose source format this machine has always accepted
        let op = match line.operation.as_str() {
            "START" => Op::Start,
            "HLT" => Op::Halt,
            "DEBUG" => Op::Debug,
            "LDC" => Op::Ldc(self.int_operand(line)?),
            "LDV" => Op::Ldv(self.addr_operand(line, line.op1.as_deref())?),
            "STR" => Op::Str(self.addr_operand(line, line.op1.as_deref())?),
            "ADD" => Op::Add,
            "SUB" => Op::Sub,
            "MULT" => Op::Mult,
            "DIVI" => Op::Divi,
            "INV" => Op::Inv,
            "AND" => Op::And,
            "OR" => Op::Or,
            "NEG" => Op::Neg,
            "CME" => Op::Cme,
            "CMA" => Op::Cma,
            "CEQ" => Op::Ceq,
            "CDIF" => Op::Cdif,
            "CMEQ" => Op::Cmeq,
            "CMAQ" => Op::Cmaq,
            "JMP" => Op::Jmp(self.target_operand(line)?),
            "JMPF" => Op::Jmpf(self.target_operand(line)?),
            "ALLOC" => {
                let (base, count) = self.pair_operand(line)?;
                Op::Alloc { base, count }
            }
            "DALLOC" => {
                let (base, count) = self.pair_operand(line)?;
                Op::Dalloc { base, count }
            }
            "RD" => Op::Rd,
            "PRN" => Op::Prn,
            "CALL" => Op::Call(self.target_operand(line)?),
            "RETURN" => Op::Return,
            other => return Err(AssembleError::unknown_operation(other, line.line)),
        };

        Ok(op)
    }

    fn int_operand(&self, line: &SourceLine) -> Result<i64, AssembleError> {
        let text = line
            .op1
            .as_deref()
            .ok_or_else(|| AssembleError::missing_operand(&line.operation, line.line))?;
        text.parse().map_err(|_| {
            AssembleError::bad_operand(&line.operation, text, "an integer literal", line.line)
        })
    }

    fn addr_operand(&self, line: &SourceLine, text: Option<&str>) -> Result<usize, AssembleError> {
        let text =
            text.ok_or_else(|| AssembleError::missing_operand(&line.operation, line.line))?;
        text.parse().map_err(|_| {
            AssembleError::bad_operand(&line.operation, text, "a non-negative address", line.line)
        })
    }

    fn pair_operand(&self, line: &SourceLine) -> Result<(usize, usize), AssembleError> {
        let base = self.addr_operand(line, line.op1.as_deref())?;
        let count = self.addr_operand(line, line.op2.as_deref())?;
        Ok((base, count))
    }

    fn target_operand(&self, line: &SourceLine) -> Result<usize, AssembleError> {
        let label = line
            .op1
            .as_deref()
            .ok_or_else(|| AssembleError::missing_operand(&line.operation, line.line))?;
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| AssembleError::unknown_label(label, line.line))
    }
}
