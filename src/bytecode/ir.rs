use crate::bytecode::Op;
use crate::bytecode::assemble_error::AssembleError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An assembled program.
///
/// `ops` is the instruction stream, one entry per source line; `labels` maps
/// each label to the index of its own line. Built once by the assembler and
/// read-only afterwards; the label map survives for disassembly listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramImage {
    pub ops: Vec<Op>,
    pub labels: HashMap<String, usize>,
}

impl ProgramImage {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Check the load-time entry invariant: a non-empty program whose first
    /// instruction is `START`. Images produced by the assembler always pass;
    /// images read back from disk are checked before execution.
    pub fn validate(&self) -> Result<(), AssembleError> {
        match self.ops.first() {
            None => Err(AssembleError::EmptyProgram),
            Some(Op::Start) => Ok(()),
            Some(other) => Err(AssembleError::missing_start(other.mnemonic())),
        }
    }

    /// Serialize to the on-disk image format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserialize from the on-disk image format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
