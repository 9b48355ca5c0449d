/// One parsed program line.
///
/// Either a label marker (`operation` empty, `label` present) or an
/// executable instruction with up to two raw operand strings. Operand
/// meaning is decided per-mnemonic by the assembler, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number in the source file.
    pub line: usize,
    pub label: Option<String>,
    pub operation: String,
    pub op1: Option<String>,
    pub op2: Option<String>,
}

impl SourceLine {
    /// A pure label marker carries no operation.
    pub fn is_marker(&self) -> bool {
        self.operation.is_empty()
    }
}
