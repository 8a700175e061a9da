//! The tree-walking STAPL interpreter: drives a [`Program`] to
//! completion against a [`Host`].
//!
//! Grounded on `ebyst/stapl/interpreter.py::Interpreter.run`'s dispatch
//! loop, rebuilt here around a flat PC-indexed instruction stream (see
//! [`super::program`]) instead of a tree of statement objects, and a
//! `call_stack`/`loop_stack`/`data_stack` rather than Python's native
//! call stack and generator-based loops.

use bitvec::prelude::*;
use tracing::{info, trace};

use super::expr::Expr;
use super::program::{Instruction, ProcedureCategory, Program, ScanClauses};
use super::value::{Kind, Scope};
use super::{Host, StaplError, Value};

/// How a [`Program`] run terminated.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Execution fell off the end of the instruction stream.
    Completed,
    /// An `EXIT` statement was reached, with its optional status code.
    Exited(Option<i128>),
}

struct LoopFrame {
    name: String,
    end: i128,
    step: i128,
}

/// The caller-side state a `CALL` saves and a return restores: STAPL
/// procedures run in a fresh, non-inherited scope (confirmed against
/// `ebyst/stapl/interpreter.py`'s `VariableScope()` swap on call/return),
/// so a call's own loop nesting can't leak into it either.
struct CallFrame {
    return_pc: usize,
    caller_scope: Scope,
    caller_loop_stack: Vec<LoopFrame>,
}

/// Executes a [`Program`] one instruction at a time against a [`Host`].
pub struct Interpreter<'a, H: Host> {
    program: &'a Program,
    host: &'a mut H,
    scope: Scope,
    call_stack: Vec<CallFrame>,
    loop_stack: Vec<LoopFrame>,
    data_stack: Vec<Value>,
    exports: Vec<(String, Value)>,
    pc: usize,
}

impl<'a, H: Host> Interpreter<'a, H> {
    /// Build an interpreter positioned at the start of `program`.
    pub fn new(program: &'a Program, host: &'a mut H) -> Self {
        Interpreter {
            program,
            host,
            scope: Scope::new(),
            call_stack: Vec::new(),
            loop_stack: Vec::new(),
            data_stack: Vec::new(),
            exports: Vec::new(),
            pc: 0,
        }
    }

    /// The variable scope accumulated so far, for inspection after a run
    /// (or between steps, if driving the interpreter by hand).
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Key/value pairs recorded by every `EXPORT` statement executed so
    /// far, in execution order.
    pub fn exports(&self) -> &[(String, Value)] {
        &self.exports
    }

    /// Run a named `ACTION`'s procedure table to completion (spec.md's
    /// run contract): each listed procedure is skipped unless its
    /// category is selected — `Required` always runs, `Recommended` runs
    /// when `recommended` is set, `Optional` only when `optional` is set.
    /// A procedure that calls `EXIT 0` stops the action normally; `EXIT`
    /// with a nonzero code aborts the whole action with that code.
    pub fn run_action(&mut self, action: &str, recommended: bool, optional: bool) -> Result<Outcome, StaplError> {
        let procs = self
            .program
            .actions
            .get(action)
            .ok_or_else(|| StaplError::procedure_not_defined(action.to_string()))?
            .clone();
        for (name, category) in &procs {
            let selected = match category {
                ProcedureCategory::Required => true,
                ProcedureCategory::Recommended => recommended,
                ProcedureCategory::Optional => optional,
            };
            if !selected {
                continue;
            }
            match self.call_and_run(name)? {
                outcome @ Outcome::Exited(_) => return Ok(outcome),
                Outcome::Completed => continue,
            }
        }
        Ok(Outcome::Completed)
    }

    /// Invoke `name` as a standalone call (as [`Self::run_action`] does
    /// for each selected procedure), running it to completion and
    /// returning how it terminated.
    fn call_and_run(&mut self, name: &str) -> Result<Outcome, StaplError> {
        let end = self.program.instructions.len();
        self.pc = self.enter_procedure(name, end)?;
        self.run()
    }

    /// Push a fresh call frame for `name`, merging in any `USES`
    /// dependencies, and return the instruction index its body starts
    /// at. `return_pc` is where execution resumes once its `ENDPROC`
    /// pops this frame.
    fn enter_procedure(&mut self, name: &str, return_pc: usize) -> Result<usize, StaplError> {
        let target = self
            .program
            .procedure_entry(name)
            .ok_or_else(|| StaplError::procedure_not_defined(name.to_string()))?;
        let caller_scope = std::mem::replace(&mut self.scope, Scope::new());
        let caller_loop_stack = std::mem::take(&mut self.loop_stack);
        for dep in self.program.procedure_uses(name) {
            if let Some(bytes) = self.program.data_blocks.get(dep) {
                let words: Vec<i128> = bytes.iter().map(|b| *b as i128).collect();
                self.scope.set(dep.clone(), Value::IntArray(words))?;
            }
        }
        self.call_stack.push(CallFrame { return_pc, caller_scope, caller_loop_stack });
        Ok(target)
    }

    /// Run from the current program counter until `EXIT` or the end of
    /// the instruction stream.
    pub fn run(&mut self) -> Result<Outcome, StaplError> {
        loop {
            let Some(instruction) = self.program.instructions.get(self.pc) else {
                return Ok(Outcome::Completed);
            };
            trace!(pc = self.pc, ?instruction, "executing");
            match self.step(instruction)? {
                Some(outcome) => return Ok(outcome),
                None => continue,
            }
        }
    }

    fn step(&mut self, instruction: &Instruction) -> Result<Option<Outcome>, StaplError> {
        match instruction {
            Instruction::Boolean { name, len } => {
                let default = match len {
                    Some(n) => Value::BoolArray(BitVec::<u8, Lsb0>::repeat(false, *n)),
                    None => Value::Bool(false),
                };
                self.scope.set(name.clone(), default)?;
                self.pc += 1;
            }
            Instruction::Integer { name, len } => {
                let default = match len {
                    Some(n) => Value::IntArray(vec![0; *n]),
                    None => Value::Int(0),
                };
                self.scope.set(name.clone(), default)?;
                self.pc += 1;
            }
            Instruction::Assignment { name, value } => {
                let evaluated = value.evaluate(&self.scope)?;
                let coerced = self.coerce_for_assignment(name, evaluated)?;
                self.scope.set(name.clone(), coerced)?;
                self.pc += 1;
            }
            Instruction::If { condition, else_pc } => {
                if condition.evaluate(&self.scope)?.as_bool()? {
                    self.pc += 1;
                } else {
                    self.pc = *else_pc;
                }
            }
            Instruction::For { name, start, end, step, after_pc } => {
                let start_val = start.evaluate(&self.scope)?.as_int()?;
                let end_val = end.evaluate(&self.scope)?.as_int()?;
                let step_val = match step {
                    Some(expr) => expr.evaluate(&self.scope)?.as_int()?,
                    None => 1,
                };
                self.scope.set(name.clone(), Value::Int(start_val))?;
                if loop_condition_holds(start_val, end_val, step_val) {
                    self.loop_stack.push(LoopFrame { name: name.clone(), end: end_val, step: step_val });
                    self.pc += 1;
                } else {
                    self.pc = *after_pc;
                }
            }
            Instruction::Next { name, loop_pc } => {
                let frame = self
                    .loop_stack
                    .pop()
                    .ok_or_else(|| StaplError::value(format!("NEXT {name} without matching FOR")))?;
                let current = self.scope.get(&frame.name)?.as_int()?;
                let next_val = current.wrapping_add(frame.step);
                if loop_condition_holds(next_val, frame.end, frame.step) {
                    self.scope.set(frame.name.clone(), Value::Int(next_val))?;
                    self.loop_stack.push(frame);
                    self.pc = *loop_pc;
                } else {
                    self.pc += 1;
                }
            }
            Instruction::Call { name } => {
                let return_pc = self.pc + 1;
                self.pc = self.enter_procedure(name, return_pc)?;
            }
            Instruction::Procedure { after_pc, .. } => self.pc = *after_pc,
            Instruction::EndProcedure => match self.call_stack.pop() {
                Some(frame) => {
                    self.pc = frame.return_pc;
                    self.scope = frame.caller_scope;
                    self.loop_stack = frame.caller_loop_stack;
                }
                None => self.pc += 1,
            },
            Instruction::Exit { code } => {
                let value = match code {
                    Some(expr) => Some(expr.evaluate(&self.scope)?.as_int()?),
                    None => None,
                };
                return Ok(Some(Outcome::Exited(value)));
            }
            Instruction::Export { key, value } => {
                let evaluated = value.evaluate(&self.scope)?;
                self.host.export(key, &evaluated.to_string());
                self.exports.push((key.clone(), evaluated));
                self.pc += 1;
            }
            Instruction::Print { values } => {
                let rendered: Result<Vec<Value>, StaplError> = values.iter().map(|v| v.evaluate(&self.scope)).collect();
                info!(values = ?rendered?, "PRINT");
                self.pc += 1;
            }
            Instruction::Data { .. } | Instruction::EndData => self.pc += 1,
            Instruction::IrScan { length, tdi, clauses } => {
                self.do_scan(*length, tdi, true, clauses)?;
                self.pc += 1;
            }
            Instruction::DrScan { length, tdi, clauses } => {
                self.do_scan(*length, tdi, false, clauses)?;
                self.pc += 1;
            }
            Instruction::State { name, cycles } => {
                self.host.state(name, *cycles)?;
                self.pc += 1;
            }
            Instruction::Wait { state, cycles } => {
                self.host.wait(state, *cycles)?;
                self.pc += 1;
            }
            Instruction::Trst { mode } => {
                self.host.trst(mode);
                self.pc += 1;
            }
            Instruction::DrStop { state } | Instruction::IrStop { state } => {
                trace!(state, "scan settle state changed");
                self.pc += 1;
            }
            Instruction::Frequency { hz } => {
                let value = hz.evaluate(&self.scope)?.as_int()?;
                self.host.set_frequency(value as f64);
                self.pc += 1;
            }
            Instruction::Goto { label } => {
                self.pc = self
                    .program
                    .label_target(label)
                    .ok_or_else(|| StaplError::label_not_defined(label.clone()))?;
            }
            Instruction::Push { value } => {
                let evaluated = value.evaluate(&self.scope)?;
                self.data_stack.push(evaluated);
                self.pc += 1;
            }
            Instruction::Pop { name } => {
                let value = self.data_stack.pop().ok_or_else(|| StaplError::value("data stack underflow"))?;
                let coerced = self.coerce_for_assignment(name, value)?;
                self.scope.set(name.clone(), coerced)?;
                self.pc += 1;
            }
            Instruction::Crc { expected } => {
                trace!(expected, "CRC checkpoint");
                self.pc += 1;
            }
            Instruction::Label { .. } => self.pc += 1,
        }
        Ok(None)
    }

    fn coerce_for_assignment(&self, name: &str, value: Value) -> Result<Value, StaplError> {
        let Ok(existing) = self.scope.get(name) else {
            return Ok(value);
        };
        match existing.kind() {
            Kind::Int => Ok(Value::Int(value.as_int()?)),
            Kind::Bool => Ok(Value::Bool(value.as_bool()?)),
            Kind::BoolArray | Kind::IntArray | Kind::Str => Ok(value),
        }
    }

    fn do_scan(&mut self, length: usize, tdi_expr: &Expr, is_ir: bool, clauses: &ScanClauses) -> Result<(), StaplError> {
        let value = tdi_expr.evaluate(&self.scope)?;
        let bits = value_to_bits(&value, length)?;
        let captured = if is_ir {
            self.host.ir_scan(length, &bits)
        } else {
            self.host.dr_scan(length, &bits)
        };
        // `CAPTURE expr` names the variable the shifted-out bits land in;
        // absent that, fall back to writing them back into `tdi` itself
        // when it's a bare in-place shift-register variable.
        if let Some(Expr::Var(name)) = &clauses.capture {
            self.scope.set(name.clone(), Value::BoolArray(captured.clone()))?;
        } else if let Expr::Var(name) = tdi_expr {
            if self.scope.contains(name) {
                self.scope.set(name.clone(), Value::BoolArray(captured.clone()))?;
            }
        }
        if let Some((mask, data, _expected)) = &clauses.compare {
            let mask_bits = value_to_bits(&mask.evaluate(&self.scope)?, length)?;
            let data_bits = value_to_bits(&data.evaluate(&self.scope)?, length)?;
            let mismatches = captured
                .iter()
                .zip(data_bits.iter())
                .zip(mask_bits.iter())
                .filter(|((c, d), m)| **m && c != d)
                .count();
            if mismatches > 0 {
                trace!(mismatches, "COMPARE clause observed a mismatch");
            }
        }
        Ok(())
    }
}

fn loop_condition_holds(current: i128, end: i128, step: i128) -> bool {
    if step >= 0 {
        current <= end
    } else {
        current >= end
    }
}

fn value_to_bits(value: &Value, length: usize) -> Result<BitVec<u8, Lsb0>, StaplError> {
    match value {
        Value::BoolArray(bits) => {
            let mut out = bits.clone();
            out.resize(length, false);
            Ok(out)
        }
        Value::IntArray(items) => {
            let mut out = BitVec::<u8, Lsb0>::with_capacity(length);
            for v in items {
                out.push(*v != 0);
            }
            out.resize(length, false);
            Ok(out)
        }
        other => {
            let n = other.as_int()?;
            let mut out = BitVec::<u8, Lsb0>::with_capacity(length);
            for i in 0..length {
                out.push((n >> i) & 1 != 0);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stapl::parser::parse;

    struct FakeHost {
        scanned: Vec<BitVec<u8, Lsb0>>,
        exported: Vec<(String, String)>,
    }

    impl Host for FakeHost {
        fn ir_scan(&mut self, _length: usize, tdi: &BitSlice<u8, Lsb0>) -> BitVec<u8, Lsb0> {
            self.scanned.push(tdi.to_bitvec());
            tdi.to_bitvec()
        }
        fn dr_scan(&mut self, _length: usize, tdi: &BitSlice<u8, Lsb0>) -> BitVec<u8, Lsb0> {
            self.scanned.push(tdi.to_bitvec());
            tdi.to_bitvec()
        }
        fn state(&mut self, _name: &str, _cycles: Option<usize>) -> Result<(), StaplError> {
            Ok(())
        }
        fn wait(&mut self, _state: &str, _cycles: usize) -> Result<(), StaplError> {
            Ok(())
        }
        fn trst(&mut self, _mode: &str) {}
        fn set_frequency(&mut self, _hz: f64) {}
        fn export(&mut self, key: &str, value: &str) {
            self.exported.push((key.to_string(), value.to_string()));
        }
    }

    #[test]
    fn runs_a_for_loop_to_completion() {
        let program = parse("INTEGER TOTAL; TOTAL = 0; FOR I = 1 TO 4; TOTAL = TOTAL + I; NEXT I; EXIT;").unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, Outcome::Exited(None));
        assert_eq!(interp.scope().get("TOTAL").unwrap(), &Value::Int(10));
    }

    #[test]
    fn if_false_skips_its_guarded_instruction() {
        let program = parse("INTEGER A; A = 0; IF 0 == 1 THEN A = 99; A = 2;").unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run().unwrap();
        assert_eq!(interp.scope().get("A").unwrap(), &Value::Int(2));
    }

    #[test]
    fn call_and_return_resumes_after_call_site() {
        // A procedure call runs in a fresh, non-inherited scope (grounded
        // on `ebyst/stapl/interpreter.py`'s scope swap on call/return), so
        // P's own assignment to A is invisible once control returns.
        let program = parse("INTEGER A; A = 0; PROCEDURE P; A = 5; ENDPROC; CALL P; A = A + 1;").unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run().unwrap();
        assert_eq!(interp.scope().get("A").unwrap(), &Value::Int(1));
    }

    #[test]
    fn procedure_uses_clause_pulls_in_a_data_blocks_bytes() {
        let mut program = parse("PROCEDURE P USES BLOB; EXPORT \"FIRST\", BLOB[0]; ENDPROC; CALL P;").unwrap();
        program.data_blocks.insert("BLOB".to_string(), vec![7, 8, 9]);
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run().unwrap();
        assert_eq!(interp.exports(), &[("FIRST".to_string(), Value::IntArray(vec![7]))]);
    }

    #[test]
    fn run_action_skips_optional_procedures_by_default() {
        let program = parse(
            "PROCEDURE MAIN; EXPORT \"RAN_MAIN\", 1; ENDPROC; \
             PROCEDURE EXTRA; EXPORT \"RAN_EXTRA\", 1; ENDPROC; \
             ACTION PROGRAM = MAIN, EXTRA OPTIONAL;",
        )
        .unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        let outcome = interp.run_action("PROGRAM", true, false).unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(interp.exports(), &[("RAN_MAIN".to_string(), Value::Any(1))]);
    }

    #[test]
    fn run_action_runs_optional_procedures_when_selected() {
        let program = parse(
            "PROCEDURE MAIN; EXPORT \"RAN_MAIN\", 1; ENDPROC; \
             PROCEDURE EXTRA; EXPORT \"RAN_EXTRA\", 1; ENDPROC; \
             ACTION PROGRAM = MAIN, EXTRA OPTIONAL;",
        )
        .unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run_action("PROGRAM", true, true).unwrap();
        assert_eq!(interp.exports().len(), 2);
    }

    #[test]
    fn run_action_aborts_with_a_procedures_nonzero_exit_code() {
        let program = parse(
            "PROCEDURE FIRST; EXIT 3; ENDPROC; \
             PROCEDURE SECOND; EXPORT \"UNREACHED\", 1; ENDPROC; \
             ACTION PROGRAM = FIRST, SECOND;",
        )
        .unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        let outcome = interp.run_action("PROGRAM", true, false).unwrap();
        assert_eq!(outcome, Outcome::Exited(Some(3)));
        assert!(interp.exports().is_empty());
    }

    #[test]
    fn export_is_recorded() {
        let program = parse("INTEGER A; A = 7; EXPORT \"RESULT\", A;").unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run().unwrap();
        assert_eq!(interp.exports(), &[("RESULT".to_string(), Value::Int(7))]);
    }

    #[test]
    fn export_forwards_the_stringified_pair_to_the_host() {
        let program = parse("INTEGER K; K = 7; EXPORT \"K\", K;").unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run().unwrap();
        assert_eq!(host.exported, &[("K".to_string(), "7".to_string())]);
    }

    #[test]
    fn drscan_writes_captured_bits_back_into_its_variable() {
        let program = parse("BOOLEAN DR[4]; DRSCAN 4, DR;").unwrap();
        let mut host = FakeHost { scanned: Vec::new(), exported: Vec::new() };
        let mut interp = Interpreter::new(&program, &mut host);
        interp.run().unwrap();
        assert_eq!(host.scanned.len(), 1);
        assert_eq!(host.scanned[0].len(), 4);
    }
}
