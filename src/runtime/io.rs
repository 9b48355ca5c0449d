use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoError {
    pub message: String,
}

impl IoError {
    pub fn new(message: impl Into<String>) -> Self {
        IoError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "io error: {}", self.message)
    }
}

impl std::error::Error for IoError {}

/// The machine's only connection to the outside world.
///
/// RD pulls one integer from `read`, PRN hands one integer to `write`. The
/// VM itself never touches stdin or stdout; the channel is injected into
/// `Vm::run`, so hosts decide where values come from and go to.
pub trait IoChannel {
    fn read(&mut self) -> Result<i64, IoError>;
    fn write(&mut self, value: i64) -> Result<(), IoError>;
}

/// Line-oriented stdin/stdout channel used by the command line runner.
pub struct StdIo;

impl IoChannel for StdIo {
    fn read(&mut self) -> Result<i64, IoError> {
        let mut buffer = String::new();
        let bytes = io::stdin()
            .lock()
            .read_line(&mut buffer)
            .map_err(|e| IoError::new(format!("stdin read failed: {}", e)))?;
        if bytes == 0 {
            return Err(IoError::new("end of input"));
        }
        buffer
            .trim()
            .parse()
            .map_err(|_| IoError::new(format!("not an integer: '{}'", buffer.trim())))
    }

    fn write(&mut self, value: i64) -> Result<(), IoError> {
        writeln!(io::stdout(), "{}", value)
            .map_err(|e| IoError::new(format!("stdout write failed: {}", e)))
    }
}

/// Channel for configurations with no injected I/O: RD and PRN fail fast.
#[allow(dead_code)]
pub struct NullIo;

impl IoChannel for NullIo {
    fn read(&mut self) -> Result<i64, IoError> {
        Err(IoError::new("no input channel configured"))
    }

    fn write(&mut self, _value: i64) -> Result<(), IoError> {
        Err(IoError::new("no output channel configured"))
    }
}

/// Queued inputs and captured outputs, for tests and embedding hosts.
#[derive(Debug, Default)]
#[allow(dead_code)]
pub struct ScriptedIo {
    inputs: VecDeque<i64>,
    pub outputs: Vec<i64>,
}

#[allow(dead_code)]
impl ScriptedIo {
    pub fn new() -> Self {
        ScriptedIo::default()
    }

    pub fn with_inputs(inputs: &[i64]) -> Self {
        ScriptedIo {
            inputs: inputs.iter().copied().collect(),
            outputs: Vec::new(),
        }
    }
}

impl IoChannel for ScriptedIo {
    fn read(&mut self) -> Result<i64, IoError> {
        self.inputs
            .pop_front()
            .ok_or_else(|| IoError::new("scripted input exhausted"))
    }

    fn write(&mut self, value: i64) -> Result<(), IoError> {
        self.outputs.push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reads_in_order() {
        let mut io = ScriptedIo::with_inputs(&[1, 2, 3]);
        assert_eq!(io.read(), Ok(1));
        assert_eq!(io.read(), Ok(2));
        assert_eq!(io.read(), Ok(3));
    }

    #[test]
    fn test_scripted_read_exhausted() {
        let mut io = ScriptedIo::new();
        assert!(io.read().is_err());
    }

    #[test]
    fn test_scripted_write_captures() {
        let mut io = ScriptedIo::new();
        io.write(8).unwrap();
        io.write(-1).unwrap();
        assert_eq!(io.outputs, vec![8, -1]);
    }

    #[test]
    fn test_null_io_fails_fast() {
        let mut io = NullIo;
        assert!(io.read().is_err());
        assert!(io.write(0).is_err());
    }

    #[test]
    fn test_io_error_display() {
        let err = IoError::new("end of input");
        assert_eq!(err.to_string(), "io error: end of input");
    }
}
