//! The STAPL statement grammar: turns a token stream into a flat
//! [`Program`].
//!
//! Grounded on `ebyst/stapl/stapl.py`'s pyparsing grammar (`action`,
//! `assignment`, `boolean`, `call`, `crc`, `drscan`, `exit`, `export`,
//! `for_`, `goto`, `if_`, `integer`, `irscan`, `note`, `pop`, `print`,
//! `push`, `state`, `trst`, `wait`), reimplemented as a hand-rolled
//! recursive-descent pass over [`Token`]s rather than a parser
//! combinator, to match this crate's BSDL intake style.

use tracing::warn;

use super::expr::{Expr, Parser as ExprParser};
use super::lexer::{lex, Token};
use super::program::{Instruction, ProcedureCategory, Program, ScanClauses};
use super::{aca, crc, StaplError};

struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_ident(&self) -> Option<String> {
        match self.peek() {
            Token::Ident(name) => Some(name.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_ident(&mut self) -> Result<String, StaplError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(StaplError::parse(format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), StaplError> {
        match self.advance() {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(StaplError::parse(format!("expected '{c}', found {other:?}"))),
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if matches!(self.peek(), Token::Punct(p) if *p == c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), StaplError> {
        match self.advance() {
            Token::Ident(name) if name.eq_ignore_ascii_case(kw) => Ok(()),
            other => Err(StaplError::parse(format!("expected {kw}, found {other:?}"))),
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), StaplError> {
        match self.advance() {
            Token::Op(found) if found == op => Ok(()),
            other => Err(StaplError::parse(format!("expected '{op}', found {other:?}"))),
        }
    }

    /// `proc_ref := ID ['OPTIONAL' | 'RECOMMENDED']`, as used in an
    /// `ACTION` statement's procedure list.
    fn parse_proc_ref(&mut self) -> Result<(String, ProcedureCategory), StaplError> {
        let name = self.expect_ident()?;
        let category = match self.peek_ident().as_deref() {
            Some("OPTIONAL") => {
                self.advance();
                ProcedureCategory::Optional
            }
            Some("RECOMMENDED") => {
                self.advance();
                ProcedureCategory::Recommended
            }
            _ => ProcedureCategory::Required,
        };
        Ok((name, category))
    }

    fn parse_expr(&mut self) -> Result<Expr, StaplError> {
        let mut expr_parser = ExprParser::new(&self.tokens[self.pos..]);
        let expr = expr_parser.parse_expr()?;
        self.pos += expr_parser.position();
        Ok(expr)
    }

    fn expect_int(&mut self) -> Result<i128, StaplError> {
        match self.advance() {
            Token::Int(v) => Ok(v),
            other => Err(StaplError::parse(format!("expected integer, found {other:?}"))),
        }
    }

    /// The `CRC` statement's operand is a bare hex word (`pp.Word` over
    /// `[0-9a-fA-F]` in the reference grammar), not a decimal literal.
    /// The general lexer only ever recognizes an unprefixed digit run as
    /// decimal, so a word mixing digits and hex letters (`04D2`) arrives
    /// split across a `Token::Int` (its leading digits) and a
    /// `Token::Ident` (the remaining hex letters/digits); a word starting
    /// with a letter (`B2A3`) arrives as one `Token::Ident`. Render
    /// whichever shows up back to text and parse the whole word as hex.
    fn expect_hex16(&mut self) -> Result<u16, StaplError> {
        let mut text = match self.advance() {
            Token::Int(v) => v.to_string(),
            Token::Ident(s) => s,
            other => return Err(StaplError::parse(format!("expected a CRC checksum, found {other:?}"))),
        };
        if let Token::Ident(s) = self.peek() {
            if s.chars().all(|c| c.is_ascii_hexdigit()) {
                text.push_str(s);
                self.advance();
            }
        }
        u16::from_str_radix(&text, 16).map_err(|_| StaplError::parse(format!("invalid CRC checksum {text}")))
    }

    fn expect_string(&mut self) -> Result<String, StaplError> {
        match self.advance() {
            Token::Str(s) => Ok(s),
            other => Err(StaplError::parse(format!("expected string, found {other:?}"))),
        }
    }

    /// Parse the optional `, CAPTURE expr` and `, COMPARE mask, data,
    /// expected` clauses trailing a `DRSCAN`/`IRSCAN` statement.
    fn parse_scan_clauses(&mut self) -> Result<ScanClauses, StaplError> {
        let mut clauses = ScanClauses { capture: None, compare: None };
        while self.eat_punct(',') {
            match self.peek_ident().as_deref() {
                Some("CAPTURE") => {
                    self.advance();
                    clauses.capture = Some(self.parse_expr()?);
                }
                Some("COMPARE") => {
                    self.advance();
                    let mask = self.parse_expr()?;
                    self.expect_punct(',')?;
                    let data = self.parse_expr()?;
                    self.expect_punct(',')?;
                    let expected = self.parse_expr()?;
                    clauses.compare = Some((mask, data, expected));
                }
                _ => return Err(StaplError::parse("expected CAPTURE or COMPARE clause")),
            }
        }
        Ok(clauses)
    }
}

/// Parse a full STAPL source file into a [`Program`].
pub fn parse(source: &str) -> Result<Program, StaplError> {
    let tokens = lex(source)?;
    let mut ts = TokenStream { tokens: &tokens, pos: 0 };
    let mut program = Program::default();

    let mut for_stack: Vec<usize> = Vec::new();
    let mut proc_stack: Vec<usize> = Vec::new();

    while !matches!(ts.peek(), Token::Eof) {
        // Label definition: `IDENT :` not followed immediately by `=`.
        if let Token::Ident(name) = ts.peek().clone() {
            if matches!(ts.tokens.get(ts.pos + 1), Some(Token::Punct(':'))) {
                ts.advance();
                ts.advance();
                program.labels.insert(name.clone(), program.instructions.len());
                program.instructions.push(Instruction::Label { name });
                continue;
            }
        }

        parse_instruction(&mut ts, &mut program, &mut for_stack, &mut proc_stack)?;
    }

    if !for_stack.is_empty() {
        return Err(StaplError::parse("unterminated FOR block"));
    }
    if !proc_stack.is_empty() {
        return Err(StaplError::parse("unterminated PROCEDURE block"));
    }

    if let Some(expected) = program.crc {
        if let Some(crc_start) = locate_crc_statement_start(source) {
            let actual = crc::crc16_ccitt_over_stapl_text(source[..crc_start].as_bytes());
            if actual != expected {
                warn!(expected = format!("{expected:#06x}"), actual = format!("{actual:#06x}"), "STAPL file CRC mismatch");
            }
        }
    }

    Ok(program)
}

/// Parse exactly one `proc_instruction` (no optional label prefix — that's
/// only legal at the top of [`parse`]'s loop, not as an `IF`'s guarded
/// statement).
fn parse_instruction(
    ts: &mut TokenStream,
    program: &mut Program,
    for_stack: &mut Vec<usize>,
    proc_stack: &mut Vec<usize>,
) -> Result<(), StaplError> {
    let keyword = ts
        .peek_ident()
        .ok_or_else(|| StaplError::parse(format!("expected statement, found {:?}", ts.peek())))?;

    match keyword.as_str() {
        "BOOLEAN" => {
            ts.advance();
            let name = ts.expect_ident()?;
            let len = if ts.eat_punct('[') {
                let n = ts.expect_int()? as usize;
                ts.expect_punct(']')?;
                Some(n)
            } else {
                None
            };
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Boolean { name, len });
        }
        "INTEGER" => {
            ts.advance();
            let name = ts.expect_ident()?;
            let len = if ts.eat_punct('[') {
                let n = ts.expect_int()? as usize;
                ts.expect_punct(']')?;
                Some(n)
            } else {
                None
            };
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Integer { name, len });
        }
        "IF" => {
            ts.advance();
            let condition = ts.parse_expr()?;
            ts.expect_keyword("THEN")?;
            let if_pc = program.instructions.len();
            program.instructions.push(Instruction::If { condition, else_pc: 0 });
            parse_instruction(ts, program, for_stack, proc_stack)?;
            let else_pc = program.instructions.len();
            if let Instruction::If { else_pc: e, .. } = &mut program.instructions[if_pc] {
                *e = else_pc;
            }
        }
        "FOR" => {
            ts.advance();
            let name = ts.expect_ident()?;
            ts.expect_op("=")?;
            let start = ts.parse_expr()?;
            ts.expect_keyword("TO")?;
            let end = ts.parse_expr()?;
            let step = if ts.peek_ident().as_deref() == Some("STEP") {
                ts.advance();
                Some(ts.parse_expr()?)
            } else {
                None
            };
            ts.expect_punct(';')?;
            for_stack.push(program.instructions.len());
            program.instructions.push(Instruction::For { name, start, end, step, after_pc: 0 });
        }
        "NEXT" => {
            ts.advance();
            let name = ts.expect_ident()?;
            ts.expect_punct(';')?;
            let for_pc = for_stack.pop().ok_or_else(|| StaplError::parse("NEXT without matching FOR"))?;
            let loop_pc = for_pc + 1;
            let next_pc = program.instructions.len();
            program.instructions.push(Instruction::Next { name, loop_pc });
            if let Instruction::For { after_pc, .. } = &mut program.instructions[for_pc] {
                *after_pc = next_pc + 1;
            }
        }
        "PROCEDURE" => {
            ts.advance();
            let name = ts.expect_ident()?;
            let mut uses = Vec::new();
            if ts.peek_ident().as_deref() == Some("USES") {
                ts.advance();
                uses.push(ts.expect_ident()?);
                while ts.eat_punct(',') {
                    uses.push(ts.expect_ident()?);
                }
            }
            ts.expect_punct(';')?;
            let proc_pc = program.instructions.len();
            program.procedures.insert(name.clone(), proc_pc + 1);
            proc_stack.push(proc_pc);
            program.instructions.push(Instruction::Procedure { name, uses, after_pc: 0 });
        }
        "ENDPROC" => {
            ts.advance();
            ts.expect_punct(';')?;
            let proc_pc = proc_stack.pop().ok_or_else(|| StaplError::parse("ENDPROC without matching PROCEDURE"))?;
            let after_pc = program.instructions.len() + 1;
            if let Instruction::Procedure { after_pc: a, .. } = &mut program.instructions[proc_pc] {
                *a = after_pc;
            }
            program.instructions.push(Instruction::EndProcedure);
        }
        "CALL" => {
            ts.advance();
            let name = ts.expect_ident()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Call { name });
        }
        "EXIT" => {
            ts.advance();
            let code = if !matches!(ts.peek(), Token::Punct(';')) {
                Some(ts.parse_expr()?)
            } else {
                None
            };
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Exit { code });
        }
        "EXPORT" => {
            ts.advance();
            let key = ts.expect_string()?;
            ts.expect_punct(',')?;
            let value = ts.parse_expr()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Export { key, value });
        }
        "PRINT" => {
            ts.advance();
            let mut values = vec![ts.parse_expr()?];
            while ts.eat_punct(',') {
                values.push(ts.parse_expr()?);
            }
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Print { values });
        }
        "DATA" => {
            ts.advance();
            let name = ts.expect_ident()?;
            let aca_text = ts.expect_string()?;
            ts.expect_punct(';')?;
            let bytes = aca::decompress(&aca_text)?;
            program.data_blocks.insert(name.clone(), bytes);
            program.instructions.push(Instruction::Data { name, aca_text });
        }
        "ENDDATA" => {
            ts.advance();
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::EndData);
        }
        "IRSCAN" => {
            ts.advance();
            let length = ts.expect_int()? as usize;
            ts.expect_punct(',')?;
            let tdi = ts.parse_expr()?;
            let clauses = ts.parse_scan_clauses()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::IrScan { length, tdi, clauses });
        }
        "DRSCAN" => {
            ts.advance();
            let length = ts.expect_int()? as usize;
            ts.expect_punct(',')?;
            let tdi = ts.parse_expr()?;
            let clauses = ts.parse_scan_clauses()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::DrScan { length, tdi, clauses });
        }
        "DRSTOP" => {
            ts.advance();
            let state = ts.expect_ident()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::DrStop { state });
        }
        "IRSTOP" => {
            ts.advance();
            let state = ts.expect_ident()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::IrStop { state });
        }
        "FREQUENCY" => {
            ts.advance();
            let hz = ts.parse_expr()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Frequency { hz });
        }
        "STATE" => {
            ts.advance();
            let name = ts.expect_ident()?;
            let cycles = if ts.eat_punct(',') { Some(ts.expect_int()? as usize) } else { None };
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::State { name, cycles });
        }
        "WAIT" => {
            ts.advance();
            let state = ts.expect_ident()?;
            ts.expect_punct(',')?;
            let cycles = ts.expect_int()? as usize;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Wait { state, cycles });
        }
        "TRST" => {
            ts.advance();
            let mode = ts.expect_ident()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Trst { mode });
        }
        "GOTO" => {
            ts.advance();
            let label = ts.expect_ident()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Goto { label });
        }
        "PUSH" => {
            ts.advance();
            let value = ts.parse_expr()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Push { value });
        }
        "POP" => {
            ts.advance();
            let name = ts.expect_ident()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Pop { name });
        }
        "CRC" => {
            ts.advance();
            let expected = ts.expect_hex16()?;
            ts.expect_punct(';')?;
            program.crc = Some(expected);
            program.instructions.push(Instruction::Crc { expected });
        }
        "ACTION" => {
            ts.advance();
            let name = ts.expect_ident()?;
            if matches!(ts.peek(), Token::Str(_)) {
                ts.advance(); // descriptive string, not stored
            }
            ts.expect_op("=")?;
            let mut procs = vec![ts.parse_proc_ref()?];
            while ts.eat_punct(',') {
                procs.push(ts.parse_proc_ref()?);
            }
            ts.expect_punct(';')?;
            program.actions.insert(name, procs);
        }
        "NOTE" => {
            ts.advance();
            ts.expect_string()?;
            ts.expect_string()?;
            ts.expect_punct(';')?;
        }
        other => {
            // Bare assignment: `name = expr;`
            let name = ts.expect_ident()?;
            let _ = other;
            ts.expect_op("=")?;
            let value = ts.parse_expr()?;
            ts.expect_punct(';')?;
            program.instructions.push(Instruction::Assignment { name, value });
        }
    }
    Ok(())
}

/// Find where the file's terminating `CRC hex16;` statement starts, so
/// its checksum can be computed over everything before it. The `CRC`
/// statement is always the file's last (per the grammar), so the last
/// whitespace-bounded `CRC` keyword in the source is it.
fn locate_crc_statement_start(source: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let upper = source.to_ascii_uppercase();
    let mut search_from = upper.len();
    while let Some(rel) = upper[..search_from].rfind("CRC") {
        let before_ok = rel == 0 || bytes[rel - 1].is_ascii_whitespace();
        let after = rel + 3;
        let after_ok = bytes.get(after).map_or(true, |b| b.is_ascii_whitespace());
        if before_ok && after_ok {
            return Some(rel);
        }
        search_from = rel;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boolean_declaration_and_assignment() {
        let program = parse("BOOLEAN A; A = 1;").unwrap();
        assert_eq!(program.instructions.len(), 2);
        assert!(matches!(program.instructions[0], Instruction::Boolean { .. }));
        assert!(matches!(program.instructions[1], Instruction::Assignment { .. }));
    }

    #[test]
    fn if_guards_exactly_the_one_following_instruction() {
        let program = parse("INTEGER A; IF A == 1 THEN A = 2; A = 3;").unwrap();
        let Instruction::If { else_pc, .. } = &program.instructions[1] else {
            panic!("expected If");
        };
        assert_eq!(*else_pc, 3);
        assert!(matches!(program.instructions[2], Instruction::Assignment { .. }));
        assert!(matches!(program.instructions[3], Instruction::Assignment { .. }));
    }

    #[test]
    fn if_guards_a_goto_without_a_block_terminator() {
        let program = parse("INTEGER A; IF A == 1 THEN GOTO FAIL; FAIL: EXIT;").unwrap();
        assert!(matches!(program.instructions[2], Instruction::Goto { .. }));
        assert_eq!(program.label_target("FAIL"), Some(3));
    }

    #[test]
    fn resolves_for_next_loop_targets() {
        let program = parse("INTEGER I; FOR I = 0 TO 3; PRINT I; NEXT I;").unwrap();
        let Instruction::For { after_pc, .. } = &program.instructions[1] else {
            panic!("expected For");
        };
        assert_eq!(*after_pc, 4);
        let Instruction::Next { loop_pc, .. } = &program.instructions[3] else {
            panic!("expected Next");
        };
        assert_eq!(*loop_pc, 2);
    }

    #[test]
    fn procedure_call_and_labels_resolve() {
        let program = parse("PROCEDURE P; EXIT; ENDPROC; L1: CALL P; GOTO L1;").unwrap();
        assert_eq!(program.procedure_entry("P"), Some(1));
        assert_eq!(program.label_target("L1"), Some(3));
    }

    #[test]
    fn action_table_tags_each_procedure_with_its_category() {
        let program = parse(
            "PROCEDURE MAIN; ENDPROC; PROCEDURE VERIFY; ENDPROC; \
             ACTION PROGRAM \"program the device\" = MAIN, VERIFY OPTIONAL;",
        )
        .unwrap();
        let procs = program.actions.get("PROGRAM").unwrap();
        assert_eq!(procs[0], ("MAIN".to_string(), ProcedureCategory::Required));
        assert_eq!(procs[1], ("VERIFY".to_string(), ProcedureCategory::Optional));
    }

    #[test]
    fn drscan_capture_and_compare_clauses_parse() {
        let program = parse("BOOLEAN A; BOOLEAN B; DRSCAN 8, A, CAPTURE B;").unwrap();
        let Instruction::DrScan { clauses, .. } = &program.instructions[2] else {
            panic!("expected DrScan");
        };
        assert!(clauses.capture.is_some());
        assert!(clauses.compare.is_none());
    }

    #[test]
    fn locates_the_trailing_crc_statement_by_its_standalone_keyword() {
        let source = "BOOLEAN A; A = 1; CRC 04D2;";
        let start = locate_crc_statement_start(source).unwrap();
        assert_eq!(&source[start..], "CRC 04D2;");
    }

    #[test]
    fn a_mismatched_crc_is_a_warning_not_a_parse_error() {
        // Wrong on purpose: correctness of the warning path isn't
        // assertable without a tracing subscriber, but this must still
        // parse successfully rather than erroring out.
        let program = parse("BOOLEAN A; A = 1; CRC 0000;").unwrap();
        assert_eq!(program.crc, Some(0x0000));
    }

    #[test]
    fn crc_checksum_split_across_a_digit_and_a_hex_letter_token_parses() {
        let program = parse("CRC 04D2;").unwrap();
        assert_eq!(program.crc, Some(0x04D2));
    }

    #[test]
    fn crc_checksum_starting_with_a_hex_letter_parses() {
        let program = parse("CRC B2A3;").unwrap();
        assert_eq!(program.crc, Some(0xB2A3));
    }

    #[test]
    fn drstop_and_frequency_statements_parse() {
        let program = parse("DRSTOP IDLE; FREQUENCY 1000000;").unwrap();
        assert!(matches!(program.instructions[0], Instruction::DrStop { .. }));
        assert!(matches!(program.instructions[1], Instruction::Frequency { .. }));
    }
}
