#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// The source contained no instructions at all
    EmptyProgram,
    /// The first instruction was something other than START
    MissingStart { found: String },
    /// A mnemonic outside the instruction set
    UnknownOperation { mnemonic: String, line: usize },
    /// An opcode that requires an operand was given none
    MissingOperand { mnemonic: String, line: usize },
    /// An operand of the wrong shape for its opcode
    BadOperand {
        mnemonic: String,
        operand: String,
        expected: &'static str,
        line: usize,
    },
    /// A branch or call referencing a label no line defines
    UnknownLabel { label: String, line: usize },
}

impl AssembleError {
    pub fn missing_start(found: &str) -> Self {
        AssembleError::MissingStart {
            found: found.to_string(),
        }
    }

    pub fn unknown_operation(mnemonic: &str, line: usize) -> Self {
        AssembleError::UnknownOperation {
            mnemonic: mnemonic.to_string(),
            line,
        }
    }

    pub fn missing_operand(mnemonic: &str, line: usize) -> Self {
        AssembleError::MissingOperand {
            mnemonic: mnemonic.to_string(),
            line,
        }
    }

    pub fn bad_operand(mnemonic: &str, operand: &str, expected: &'static str, line: usize) -> Self {
        AssembleError::BadOperand {
            mnemonic: mnemonic.to_string(),
            operand: operand.to_string(),
            expected,
            line,
        }
    }

    pub fn unknown_label(label: &str, line: usize) -> Self {
        AssembleError::UnknownLabel {
            label: label.to_string(),
            line,
        }
    }
}

impl std::fmt::Display for AssembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssembleError::EmptyProgram => {
                write!(f, "load error: program is empty")
            }
            AssembleError::MissingStart { found } => {
                if found.is_empty() {
                    write!(f, "load error: program must begin with START, found a label marker")
                } else {
                    write!(f, "load error: program must begin with START, found '{}'", found)
                }
            }
            AssembleError::UnknownOperation { mnemonic, line } => {
                write!(f, "load error: line {}: unknown operation '{}'", line, mnemonic)
            }
            AssembleError::MissingOperand { mnemonic, line } => {
                write!(f, "load error: line {}: {} requires an operand", line, mnemonic)
            }
            AssembleError::BadOperand {
                mnemonic,
                operand,
                expected,
                line,
            } => {
                write!(
                    f,
                    "load error: line {}: {} expects {}, got '{}'",
                    line, mnemonic, expected, operand
                )
            }
            AssembleError::UnknownLabel { label, line } => {
                write!(f, "load error: line {}: undefined label '{}'", line, label)
            }
        }
    }
}

impl std::error::Error for AssembleError {}
