use log::{debug, info};

use crate::bytecode::{Op, ProgramImage};
use crate::runtime::io::IoChannel;
use crate::runtime::runtime_error::RuntimeError;

/// `sp` value for an empty stack, one below the first usable slot.
const START_SP: isize = -1;

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Size of the flat stack array. Slots double as operand stack and
    /// addressable variable storage.
    pub stack_capacity: usize,
    /// Optional step budget. None means a non-terminating program simply
    /// does not terminate, which is a property of the program, not a fault.
    pub max_steps: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_capacity: 8192,
            max_steps: None,
        }
    }
}

/// The execution engine: instruction pointer, stack pointer, and the fixed
/// stack array, driven over a validated `ProgramImage`.
///
/// Every stack access is bounds-checked; any violation surfaces as a typed
/// `RuntimeError` and aborts the run. Callers are expected to have run
/// `ProgramImage::validate` first: the loop starts at index 1, past the
/// mandatory START.
pub struct Vm {
    image: ProgramImage,
    stack: Vec<i64>,
    ip: usize,
    sp: isize,
    steps: usize,
    config: VmConfig,
}

impl Vm {
    pub fn new(image: ProgramImage) -> Self {
        Self::with_config(image, VmConfig::default())
    }

    pub fn with_config(image: ProgramImage, config: VmConfig) -> Self {
        Vm {
            stack: vec![0; config.stack_capacity],
            image,
            ip: 0,
            sp: START_SP,
            steps: 0,
            config,
        }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn sp(&self) -> isize {
        self.sp
    }

    /// The whole stack array, variable slots included.
    #[allow(dead_code)]
    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    /// The occupied slots, bottom first.
    pub fn occupied(&self) -> &[i64] {
        &self.stack[..(self.sp - START_SP) as usize]
    }

    /// Fetch-decode-execute until HLT, the end of the program, or a fault.
    pub fn run(&mut self, io: &mut dyn IoChannel) -> Result<(), RuntimeError> {
        self.ip = 1;
        self.sp = START_SP;
        self.steps = 0;

        while self.ip < self.image.ops.len() {
            self.check_limits()?;

            let op = self.image.ops[self.ip];
            self.ip += 1;
            debug!("{:04} {}", self.ip - 1, op.mnemonic());

            match op {
                Op::Start | Op::Marker => {}
                Op::Halt => break,
                Op::Debug => info!("{}", self.snapshot()),

                Op::Ldc(k) => self.push("LDC", k)?,
                Op::Ldv(addr) => {
                    let value = self.load("LDV", addr)?;
                    self.push("LDV", value)?;
                }
                Op::Str(addr) => {
                    let value = self.pop("STR")?;
                    self.store("STR", addr, value)?;
                }

                Op::Add => self.binary("ADD", |a, b| Ok(a.wrapping_add(b)))?,
                Op::Sub => self.binary("SUB", |a, b| Ok(a.wrapping_sub(b)))?,
                Op::Mult => self.binary("MULT", |a, b| Ok(a.wrapping_mul(b)))?,
                Op::Divi => self.binary("DIVI", |a, b| {
                    if b == 0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        // truncates toward zero
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Op::Inv => {
                    let value = self.pop("INV")?;
                    self.push("INV", value.wrapping_neg())?;
                }

                // strict equality to 1, not nonzero-is-true
                Op::And => self.binary("AND", |a, b| Ok((a == 1 && b == 1) as i64))?,
                Op::Or => self.binary("OR", |a, b| Ok((a == 1 || b == 1) as i64))?,
                Op::Neg => {
                    let value = self.pop("NEG")?;
                    self.push("NEG", 1i64.wrapping_sub(value))?;
                }

                Op::Cme => self.binary("CME", |a, b| Ok((a < b) as i64))?,
                Op::Cma => self.binary("CMA", |a, b| Ok((a > b) as i64))?,
                Op::Ceq => self.binary("CEQ", |a, b| Ok((a == b) as i64))?,
                Op::Cdif => self.binary("CDIF", |a, b| Ok((a != b) as i64))?,
                Op::Cmeq => self.binary("CMEQ", |a, b| Ok((a <= b) as i64))?,
                Op::Cmaq => self.binary("CMAQ", |a, b| Ok((a >= b) as i64))?,

                Op::Jmp(target) => self.ip = target,
                Op::Jmpf(target) => {
                    // pops the condition whether or not it branches
                    if self.pop("JMPF")? == 0 {
                        self.ip = target;
                    }
                }

                Op::Alloc { base, count } => {
                    for k in 0..count {
                        let value = self.load("ALLOC", base + k)?;
                        self.push("ALLOC", value)?;
                    }
                }
                Op::Dalloc { base, count } => {
                    for k in (0..count).rev() {
                        let value = self.pop("DALLOC")?;
                        self.store("DALLOC", base + k, value)?;
                    }
                }

                Op::Rd => {
                    let value = io.read()?;
                    self.push("RD", value)?;
                }
                Op::Prn => {
                    let value = self.pop("PRN")?;
                    io.write(value)?;
                }

                Op::Call(target) => {
                    // ip already points past the CALL: that is the return address
                    self.push("CALL", self.ip as i64)?;
                    self.ip = target;
                }
                Op::Return => {
                    let value = self.pop("RETURN")?;
                    self.ip = self.code_address(value)?;
                }
            }
        }

        Ok(())
    }

    /// Human-readable state dump: ip, sp, and the occupied stack top-first.
    pub fn snapshot(&self) -> String {
        let mut values = Vec::new();
        let mut i = self.sp;
        while i > START_SP {
            values.push(self.stack[i as usize].to_string());
            i -= 1;
        }
        format!(
            "vm state: ip={} sp={} stack(top..bottom)=[{}]",
            self.ip,
            self.sp,
            values.join(", ")
        )
    }

    // Stack discipline

    fn depth(&self) -> usize {
        (self.sp - START_SP) as usize
    }

    fn push(&mut self, op: &'static str, value: i64) -> Result<(), RuntimeError> {
        if self.sp + 1 >= self.stack.len() as isize {
            return Err(RuntimeError::StackOverflow {
                op,
                capacity: self.stack.len(),
            });
        }
        self.sp += 1;
        self.stack[self.sp as usize] = value;
        Ok(())
    }

    fn pop(&mut self, op: &'static str) -> Result<i64, RuntimeError> {
        if self.sp <= START_SP {
            return Err(RuntimeError::StackUnderflow {
                op,
                needed: 1,
                depth: 0,
            });
        }
        let value = self.stack[self.sp as usize];
        self.sp -= 1;
        Ok(value)
    }

    /// Consume the top two slots, leave one result. `a` is the value below
    /// `b` on the stack.
    fn binary(
        &mut self,
        op: &'static str,
        f: impl FnOnce(i64, i64) -> Result<i64, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        if self.depth() < 2 {
            return Err(RuntimeError::StackUnderflow {
                op,
                needed: 2,
                depth: self.depth(),
            });
        }
        let b = self.stack[self.sp as usize];
        let a = self.stack[(self.sp - 1) as usize];
        let result = f(a, b)?;
        self.sp -= 1;
        self.stack[self.sp as usize] = result;
        Ok(())
    }

    fn load(&self, op: &'static str, addr: usize) -> Result<i64, RuntimeError> {
        self.stack
            .get(addr)
            .copied()
            .ok_or(RuntimeError::AddressOutOfRange {
                op,
                addr,
                capacity: self.stack.len(),
            })
    }

    fn store(&mut self, op: &'static str, addr: usize, value: i64) -> Result<(), RuntimeError> {
        if addr >= self.stack.len() {
            return Err(RuntimeError::AddressOutOfRange {
                op,
                addr,
                capacity: self.stack.len(),
            });
        }
        self.stack[addr] = value;
        Ok(())
    }

    fn code_address(&self, value: i64) -> Result<usize, RuntimeError> {
        let len = self.image.ops.len();
        if value < 0 || value as usize > len {
            return Err(RuntimeError::InvalidReturnAddress { value, len });
        }
        Ok(value as usize)
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(RuntimeError::StepLimitExceeded { limit });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::assemble::Assembler;
    use crate::frontend::parser::Parser;
    use crate::runtime::io::{NullIo, ScriptedIo};

    // ============================================================
    // Test helpers
    // ============================================================

    fn image(source: &str) -> ProgramImage {
        let lines = Parser::new(source).parse().expect("parse should succeed");
        Assembler::new()
            .assemble(&lines)
            .expect("assemble should succeed")
    }

    /// Run a program with scripted inputs; return the VM and captured outputs.
    fn run_with_inputs(source: &str, inputs: &[i64]) -> (Vm, Vec<i64>) {
        let mut vm = Vm::new(image(source));
        let mut io = ScriptedIo::with_inputs(inputs);
        vm.run(&mut io).expect("execution should succeed");
        (vm, io.outputs)
    }

    fn run_ok(source: &str) -> Vm {
        run_with_inputs(source, &[]).0
    }

    fn run_err(source: &str) -> RuntimeError {
        let mut vm = Vm::new(image(source));
        let mut io = ScriptedIo::new();
        vm.run(&mut io).expect_err("execution should fail")
    }

    /// Assert the occupied stack after a successful run.
    fn assert_stack(source: &str, expected: &[i64]) {
        let vm = run_ok(source);
        assert_eq!(vm.occupied(), expected, "stack mismatch");
    }

    /// Assert the values written to the output channel.
    fn assert_output(source: &str, expected: &[i64]) {
        let (_, outputs) = run_with_inputs(source, &[]);
        assert_eq!(outputs, expected, "output mismatch");
    }

    // ============================================================
    // Loads, stores, arithmetic
    // ============================================================

    #[test]
    fn test_ldc_pushes_literal() {
        assert_stack("START\nLDC 5\nHLT", &[5]);
    }

    #[test]
    fn test_ldc_negative_literal() {
        assert_stack("START\nLDC -3\nHLT", &[-3]);
    }

    #[test]
    fn test_str_then_ldv_roundtrip() {
        // STR parks the value in slot 0, LDV fetches it back
        assert_stack("START\nLDC 7\nSTR 0\nLDV 0\nHLT", &[7]);
    }

    #[test]
    fn test_add_consumes_two_produces_one() {
        let vm = run_ok("START\nLDC 5\nLDC 3\nADD\nHLT");
        assert_eq!(vm.occupied(), &[8]);
        assert_eq!(vm.sp(), 0);
    }

    #[test]
    fn test_sub_operand_order() {
        assert_stack("START\nLDC 5\nLDC 3\nSUB\nHLT", &[2]);
    }

    #[test]
    fn test_mult() {
        assert_stack("START\nLDC -4\nLDC 6\nMULT\nHLT", &[-24]);
    }

    #[test]
    fn test_divi_truncates_toward_zero() {
        assert_stack("START\nLDC -7\nLDC 2\nDIVI\nHLT", &[-3]);
        assert_stack("START\nLDC 7\nLDC -2\nDIVI\nHLT", &[-3]);
        assert_stack("START\nLDC 7\nLDC 2\nDIVI\nHLT", &[3]);
    }

    #[test]
    fn test_divi_by_zero_fails() {
        assert_eq!(
            run_err("START\nLDC 10\nLDC 0\nDIVI\nHLT"),
            RuntimeError::DivisionByZero
        );
    }

    #[test]
    fn test_divi_by_zero_negative_dividend() {
        assert_eq!(
            run_err("START\nLDC -10\nLDC 0\nDIVI\nHLT"),
            RuntimeError::DivisionByZero
        );
    }

    #[test]
    fn test_inv_negates_top() {
        assert_stack("START\nLDC 5\nINV\nHLT", &[-5]);
        assert_stack("START\nLDC -5\nINV\nHLT", &[5]);
    }

    // ============================================================
    // Logic and comparison
    // ============================================================

    #[test]
    fn test_and_requires_strict_one() {
        assert_stack("START\nLDC 1\nLDC 1\nAND\nHLT", &[1]);
        // 2 is not truth here
        assert_stack("START\nLDC 2\nLDC 1\nAND\nHLT", &[0]);
        assert_stack("START\nLDC 1\nLDC 0\nAND\nHLT", &[0]);
    }

    #[test]
    fn test_or_requires_strict_one() {
        assert_stack("START\nLDC 0\nLDC 1\nOR\nHLT", &[1]);
        assert_stack("START\nLDC 2\nLDC 0\nOR\nHLT", &[0]);
    }

    #[test]
    fn test_neg_flips_boolean() {
        assert_stack("START\nLDC 0\nNEG\nHLT", &[1]);
        assert_stack("START\nLDC 1\nNEG\nHLT", &[0]);
    }

    #[test]
    fn test_comparisons() {
        // a = 1, b = 2
        let cases: &[(&str, i64)] = &[
            ("CME", 1),
            ("CMA", 0),
            ("CEQ", 0),
            ("CDIF", 1),
            ("CMEQ", 1),
            ("CMAQ", 0),
        ];
        for (mnemonic, expected) in cases {
            let source = format!("START\nLDC 1\nLDC 2\n{}\nHLT", mnemonic);
            let vm = run_ok(&source);
            assert_eq!(vm.occupied(), &[*expected], "{} of 1,2", mnemonic);
        }
    }

    #[test]
    fn test_comparisons_on_equal_values() {
        let cases: &[(&str, i64)] = &[
            ("CME", 0),
            ("CMA", 0),
            ("CEQ", 1),
            ("CDIF", 0),
            ("CMEQ", 1),
            ("CMAQ", 1),
        ];
        for (mnemonic, expected) in cases {
            let source = format!("START\nLDC 4\nLDC 4\n{}\nHLT", mnemonic);
            let vm = run_ok(&source);
            assert_eq!(vm.occupied(), &[*expected], "{} of 4,4", mnemonic);
        }
    }

    // ============================================================
    // Branching, call/return
    // ============================================================

    #[test]
    fn test_jmp_skips_instructions() {
        assert_output("START\nJMP L1\nLDC 99\nL1 NULL\nLDC 1\nPRN\nHLT", &[1]);
    }

    #[test]
    fn test_jmpf_branches_on_zero() {
        assert_output("START\nLDC 0\nJMPF L\nLDC 99\nPRN\nL NULL\nHLT", &[]);
    }

    #[test]
    fn test_jmpf_falls_through_on_nonzero() {
        assert_output("START\nLDC 1\nJMPF L\nLDC 99\nPRN\nL NULL\nHLT", &[99]);
    }

    #[test]
    fn test_jmpf_always_pops_exactly_one() {
        // branch taken
        let vm = run_ok("START\nLDC 0\nJMPF L\nL NULL\nHLT");
        assert_eq!(vm.sp(), START_SP);
        // branch not taken
        let vm = run_ok("START\nLDC 1\nJMPF L\nL NULL\nHLT");
        assert_eq!(vm.sp(), START_SP);
    }

    #[test]
    fn test_call_pushes_index_after_call() {
        // the subroutine prints the pushed return address: index 2
        assert_output("START\nCALL S\nHLT\nS NULL\nPRN\nHLT", &[2]);
    }

    #[test]
    fn test_call_return_roundtrip() {
        assert_output(
            "START\nLDC 7\nCALL S\nPRN\nHLT\nS NULL\nRETURN",
            &[7],
        );
    }

    #[test]
    fn test_return_to_invalid_address() {
        assert_eq!(
            run_err("START\nLDC -5\nRETURN"),
            RuntimeError::InvalidReturnAddress { value: -5, len: 3 }
        );
    }

    // ============================================================
    // Frame allocation
    // ============================================================

    #[test]
    fn test_alloc_copies_frame_onto_top() {
        assert_stack("START\nLDC 10\nLDC 20\nALLOC 0,2\nHLT", &[10, 20, 10, 20]);
    }

    #[test]
    fn test_alloc_dalloc_roundtrip() {
        // ALLOC saves stack[0..3], STR scribbles over slot 0, DALLOC restores
        let vm = run_ok(
            "START\n\
             LDC 10\nLDC 20\nLDC 30\n\
             ALLOC 0,3\n\
             LDC 99\nSTR 0\n\
             DALLOC 0,3\n\
             HLT",
        );
        assert_eq!(vm.occupied(), &[10, 20, 30]);
        assert_eq!(vm.sp(), 2);
    }

    #[test]
    fn test_dalloc_reverse_fill_order() {
        // top value lands in the highest slot of the frame
        let vm = run_ok("START\nLDC 1\nLDC 2\nLDC 9\nLDC 8\nDALLOC 0,2\nHLT");
        assert_eq!(vm.occupied(), &[9, 8]);
    }

    #[test]
    fn test_alloc_count_zero_is_noop() {
        let vm = run_ok("START\nLDC 5\nALLOC 0,0\nHLT");
        assert_eq!(vm.occupied(), &[5]);
    }

    // ============================================================
    // I/O
    // ============================================================

    #[test]
    fn test_rd_pushes_input() {
        let (_, outputs) = run_with_inputs("START\nRD\nRD\nADD\nPRN\nHLT", &[5, 7]);
        assert_eq!(outputs, vec![12]);
    }

    #[test]
    fn test_rd_exhausted_input_fails() {
        assert!(matches!(run_err("START\nRD\nHLT"), RuntimeError::Io(_)));
    }

    #[test]
    fn test_null_io_fails_fast() {
        let mut vm = Vm::new(image("START\nRD\nHLT"));
        let err = vm.run(&mut NullIo).expect_err("RD without a channel");
        assert!(matches!(err, RuntimeError::Io(_)));
    }

    // ============================================================
    // Dispatch loop
    // ============================================================

    #[test]
    fn test_scenario_add_and_print() {
        assert_output("START\nLDC 5\nLDC 3\nADD\nPRN\nHLT", &[8]);
    }

    #[test]
    fn test_hlt_stops_execution() {
        assert_stack("START\nLDC 1\nHLT\nLDC 2", &[1]);
    }

    #[test]
    fn test_terminates_at_end_without_hlt() {
        assert_stack("START\nLDC 1", &[1]);
    }

    #[test]
    fn test_start_mid_program_is_noop() {
        assert_stack("START\nLDC 1\nSTART\nLDC 2\nHLT", &[1, 2]);
    }

    #[test]
    fn test_label_marker_is_noop() {
        assert_stack("START\nL1 NULL\nLDC 1\nL2 NULL\nHLT", &[1]);
    }

    #[test]
    fn test_debug_does_not_alter_state() {
        assert_stack("START\nLDC 1\nDEBUG\nLDC 2\nHLT", &[1, 2]);
    }

    #[test]
    fn test_step_limit() {
        let mut vm = Vm::with_config(
            image("START\nL NULL\nJMP L"),
            VmConfig {
                max_steps: Some(10),
                ..VmConfig::default()
            },
        );
        let err = vm.run(&mut ScriptedIo::new()).expect_err("infinite loop");
        assert_eq!(err, RuntimeError::StepLimitExceeded { limit: 10 });
    }

    // ============================================================
    // Bounds discipline
    // ============================================================

    #[test]
    fn test_add_underflow() {
        assert_eq!(
            run_err("START\nLDC 1\nADD\nHLT"),
            RuntimeError::StackUnderflow {
                op: "ADD",
                needed: 2,
                depth: 1
            }
        );
    }

    #[test]
    fn test_unary_ops_underflow_on_empty_stack() {
        for mnemonic in ["INV", "NEG", "PRN", "RETURN", "JMPF L"] {
            let source = format!("START\nL NULL\n{}\nHLT", mnemonic);
            let err = run_err(&source);
            assert!(
                matches!(err, RuntimeError::StackUnderflow { needed: 1, .. }),
                "{} on empty stack: {:?}",
                mnemonic,
                err
            );
        }
    }

    #[test]
    fn test_dalloc_underflow() {
        assert!(matches!(
            run_err("START\nLDC 1\nDALLOC 0,2\nHLT"),
            RuntimeError::StackUnderflow { op: "DALLOC", .. }
        ));
    }

    #[test]
    fn test_ldv_address_out_of_range() {
        let mut vm = Vm::with_config(
            image("START\nLDV 100\nHLT"),
            VmConfig {
                stack_capacity: 8,
                ..VmConfig::default()
            },
        );
        let err = vm.run(&mut ScriptedIo::new()).expect_err("bad address");
        assert_eq!(
            err,
            RuntimeError::AddressOutOfRange {
                op: "LDV",
                addr: 100,
                capacity: 8
            }
        );
    }

    #[test]
    fn test_str_address_out_of_range() {
        let mut vm = Vm::with_config(
            image("START\nLDC 1\nSTR 100\nHLT"),
            VmConfig {
                stack_capacity: 8,
                ..VmConfig::default()
            },
        );
        assert!(matches!(
            vm.run(&mut ScriptedIo::new()),
            Err(RuntimeError::AddressOutOfRange { op: "STR", .. })
        ));
    }

    #[test]
    fn test_stack_overflow() {
        let mut vm = Vm::with_config(
            image("START\nLDC 1\nLDC 2\nLDC 3\nHLT"),
            VmConfig {
                stack_capacity: 2,
                ..VmConfig::default()
            },
        );
        let err = vm.run(&mut ScriptedIo::new()).expect_err("overflow");
        assert_eq!(
            err,
            RuntimeError::StackOverflow {
                op: "LDC",
                capacity: 2
            }
        );
    }

    // ============================================================
    // Inspection surface
    // ============================================================

    #[test]
    fn test_snapshot_lists_stack_top_first() {
        let vm = run_ok("START\nLDC 1\nLDC 2\nHLT");
        let snap = vm.snapshot();
        assert!(snap.contains("sp=1"));
        assert!(snap.contains("[2, 1]"));
    }

    #[test]
    fn test_snapshot_empty_stack() {
        let vm = run_ok("START\nHLT");
        assert!(vm.snapshot().contains("sp=-1"));
        assert!(vm.snapshot().contains("[]"));
    }

    #[test]
    fn test_variable_slots_visible_through_stack_accessor() {
        let vm = run_ok("START\nLDC 41\nSTR 3\nHLT");
        assert_eq!(vm.stack()[3], 41);
        assert_eq!(vm.sp(), START_SP);
    }

    #[test]
    fn test_ip_points_past_the_halt() {
        let vm = run_ok("START\nHLT");
        assert_eq!(vm.ip(), 2);
    }
}
