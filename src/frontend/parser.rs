use crate::frontend::line::SourceLine;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Line-oriented parser for assembly source text.
///
/// A line is either blank (skipped), a label marker (`<label> NULL`), or an
/// instruction: a mnemonic followed by nothing, one operand, or two operands
/// separated by a comma with optional spaces around it.
pub struct Parser<'a> {
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Parser { source }
    }

    pub fn parse(self) -> Result<Vec<SourceLine>, ParseError> {
        let mut lines = Vec::new();

        for (i, raw) in self.source.lines().enumerate() {
            let line_no = i + 1;
            if let Some(parsed) = parse_line(line_no, raw)? {
                lines.push(parsed);
            }
        }

        Ok(lines)
    }
}

fn parse_line(line_no: usize, raw: &str) -> Result<Option<SourceLine>, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();

    // `<label> NULL` marks a position without an operation
    if tokens.len() == 2 && tokens[1] == "NULL" {
        return Ok(Some(SourceLine {
            line: line_no,
            label: Some(tokens[0].to_string()),
            operation: String::new(),
            op1: None,
            op2: None,
        }));
    }

    let mnemonic = tokens[0];
    let rest = text[mnemonic.len()..].trim();

    let (op1, op2) = parse_operands(line_no, rest)?;

    Ok(Some(SourceLine {
        line: line_no,
        label: None,
        operation: mnemonic.to_string(),
        op1,
        op2,
    }))
}

fn parse_operands(
    line_no: usize,
    rest: &str,
) -> Result<(Option<String>, Option<String>), ParseError> {
    if rest.is_empty() {
        return Ok((None, None));
    }

    let parts: Vec<&str> = rest.split(',').collect();
    if parts.len() > 2 {
        return Err(ParseError {
            message: format!("too many operands: '{}'", rest),
            line: line_no,
        });
    }

    let mut operands = Vec::with_capacity(2);
    for part in parts {
        let operand = part.trim();
        if operand.is_empty() {
            return Err(ParseError {
                message: format!("empty operand in '{}'", rest),
                line: line_no,
            });
        }
        if operand.contains(char::is_whitespace) {
            return Err(ParseError {
                message: format!("malformed operand: '{}'", operand),
                line: line_no,
            });
        }
        operands.push(operand.to_string());
    }

    let mut operands = operands.into_iter();
    Ok((operands.next(), operands.next()))
}
