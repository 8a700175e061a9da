//! STAPL expression parsing and evaluation.
//!
//! Grounded on `ebyst/stapl/expressions.py`: the same operator ladder
//! (`|| && | ^ & == != < <= > >= << >> + - * / % unary{- ! ~}`), rebuilt
//! here as an explicit precedence-climbing recursive-descent parser
//! instead of a pyparsing grammar.

use super::lexer::Token;
use super::value::Scope;
use super::{StaplError, Value};

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// An integer literal.
    IntLit(i128),
    /// A `BOOLEAN` array literal.
    BoolArrayLit(bitvec::vec::BitVec<u8, bitvec::order::Lsb0>),
    /// An `INTEGER` array literal, from an ACA-compressed `@` literal.
    IntArrayLit(Vec<i128>),
    /// A string literal.
    StrLit(String),
    /// A variable reference.
    Var(String),
    /// `array[hi:lo]` (or `array[i]` when `hi == lo`).
    Slice(Box<Expr>, Box<Expr>, Box<Expr>),
    /// A built-in function call (`BOOL(x)`, `INT(x)`, `CHR$(x)`).
    Call(String, Vec<Expr>),
    /// A unary operator.
    Unary(&'static str, Box<Expr>),
    /// A binary operator.
    Binary(&'static str, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate this expression against a variable scope.
    pub fn evaluate(&self, scope: &Scope) -> Result<Value, StaplError> {
        match self {
            Expr::IntLit(v) => Ok(Value::Any(*v)),
            Expr::BoolArrayLit(bits) => Ok(Value::BoolArray(bits.clone())),
            Expr::IntArrayLit(items) => Ok(Value::IntArray(items.clone())),
            Expr::StrLit(s) => Ok(Value::Str(s.clone())),
            Expr::Var(name) => scope.get(name).map(|v| v.clone()),
            Expr::Slice(base, hi, lo) => {
                let base = base.evaluate(scope)?;
                let hi = hi.evaluate(scope)?.as_int()? as usize;
                let lo = lo.evaluate(scope)?.as_int()? as usize;
                base.slice(hi, lo)
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                call_builtin(name, values)
            }
            Expr::Unary(op, rhs) => {
                let rhs = rhs.evaluate(scope)?;
                match *op {
                    "-" => rhs.neg(),
                    "!" => rhs.not(),
                    "~" => rhs.bitnot(),
                    _ => unreachable!(),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.evaluate(scope)?;
                let rhs = rhs.evaluate(scope)?;
                match *op {
                    "||" => lhs.or(&rhs),
                    "&&" => lhs.and(&rhs),
                    "|" => lhs.bitor(&rhs),
                    "^" => lhs.bitxor(&rhs),
                    "&" => lhs.bitand(&rhs),
                    "==" => lhs.eq_val(&rhs),
                    "!=" => lhs.ne_val(&rhs),
                    "<" => lhs.lt(&rhs),
                    "<=" => lhs.le(&rhs),
                    ">" => lhs.gt(&rhs),
                    ">=" => lhs.ge(&rhs),
                    "<<" => lhs.shl(&rhs),
                    ">>" => lhs.shr(&rhs),
                    "+" => lhs.add(&rhs),
                    "-" => lhs.sub(&rhs),
                    "*" => lhs.mul(&rhs),
                    "/" => lhs.div(&rhs),
                    "%" => lhs.rem(&rhs),
                    _ => unreachable!(),
                }
            }
        }
    }
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> Result<Value, StaplError> {
    match name.to_ascii_uppercase().as_str() {
        "BOOL" if args.len() == 1 => Ok(Value::Bool(args.remove(0).as_bool()?)),
        "INT" if args.len() == 1 => Ok(Value::Int(args.remove(0).as_int()?)),
        "CHR$" if args.len() == 1 => {
            let code = args.remove(0).as_int()?;
            let ch = char::from_u32(code as u32).ok_or_else(|| StaplError::value(format!("{code} is not a valid character code")))?;
            Ok(Value::Str(ch.to_string()))
        }
        other => Err(StaplError::value(format!("unknown function {other}"))),
    }
}

/// A recursive-descent parser over a slice of [`Token`]s.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Build a parser starting at the first token.
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Index of the next unconsumed token.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_punct(&mut self, c: char) -> Result<(), StaplError> {
        match self.advance() {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(StaplError::value(format!("expected '{c}', found {other:?}"))),
        }
    }

    /// Parse a full expression at the lowest precedence level.
    pub fn parse_expr(&mut self) -> Result<Expr, StaplError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_level: u8) -> Result<Expr, StaplError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, level) = match self.peek() {
                Token::Op(op) => match binary_level(op) {
                    Some(level) if level >= min_level => (*op, level),
                    _ => break,
                },
                _ => break,
            };
            self.advance();
            let rhs = self.parse_binary(level + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, StaplError> {
        if let Token::Op(op @ ("-" | "!" | "~")) = self.peek() {
            let op = *op;
            self.advance();
            return Ok(Expr::Unary(op, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, StaplError> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek(), Token::Punct('[')) {
            self.advance();
            let hi = self.parse_expr()?;
            let lo = if matches!(self.peek(), Token::Punct(':')) {
                self.advance();
                self.parse_expr()?
            } else {
                hi.clone()
            };
            self.expect_punct(']')?;
            expr = Expr::Slice(Box::new(expr), Box::new(hi), Box::new(lo));
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, StaplError> {
        match self.advance() {
            Token::Int(v) => Ok(Expr::IntLit(v)),
            Token::BoolArray(bits) => Ok(Expr::BoolArrayLit(bits)),
            Token::IntArray(items) => Ok(Expr::IntArrayLit(items)),
            Token::Str(s) => Ok(Expr::StrLit(s)),
            Token::Ident(name) => {
                if matches!(self.peek(), Token::Punct('(')) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Token::Punct(')')) {
                        args.push(self.parse_expr()?);
                        while matches!(self.peek(), Token::Punct(',')) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect_punct(')')?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::Punct('(') => {
                let inner = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            other => Err(StaplError::value(format!("unexpected token {other:?} in expression"))),
        }
    }
}

fn binary_level(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 0,
        "&&" => 1,
        "|" => 2,
        "^" => 3,
        "&" => 4,
        "==" | "!=" => 5,
        "<" | "<=" | ">" | ">=" => 6,
        "<<" | ">>" => 7,
        "+" | "-" => 8,
        "*" | "/" | "%" => 9,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stapl::lexer::lex;

    fn eval_str(src: &str, scope: &Scope) -> Value {
        let tokens = lex(src).unwrap();
        let mut parser = Parser::new(&tokens);
        let expr = parser.parse_expr().unwrap();
        expr.evaluate(scope).unwrap()
    }

    #[test]
    fn respects_precedence_of_multiply_over_add() {
        let scope = Scope::new();
        assert_eq!(eval_str("2 + 3 * 4", &scope), Value::Int(14));
    }

    #[test]
    fn logical_or_binds_looser_than_and() {
        let scope = Scope::new();
        assert_eq!(eval_str("0 || 1 && 1", &scope), Value::Bool(true));
    }

    #[test]
    fn variables_resolve_through_scope() {
        let mut scope = Scope::new();
        scope.set("A", Value::Int(5)).unwrap();
        assert_eq!(eval_str("A + 1", &scope), Value::Int(6));
    }

    #[test]
    fn slice_parses_hi_colon_lo() {
        let mut scope = Scope::new();
        scope.set("ARR", Value::IntArray(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(eval_str("ARR[2:1]", &scope), Value::IntArray(vec![2, 3]));
    }
}
