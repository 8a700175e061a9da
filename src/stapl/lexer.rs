//! A hand-rolled STAPL tokenizer.
//!
//! Grounded on the token shapes `ebyst/stapl/expressions.py` and
//! `ebyst/stapl/stapl.py` build their pyparsing grammars from; reimplemented
//! here as an explicit lexer rather than a parser-combinator pass, matching
//! how this crate's BSDL attribute parsing is also hand-rolled.
//!
//! Comments are backtick-prefixed and run to end of line, per JESD71.
//! `!` on its own still lexes as the unary/binary not-equal operator.
//! Literal prefixes: `#` binary, `$` hex, `@` ACA-compressed; `%` is only
//! ever the modulo operator.

use bitvec::prelude::*;

use super::StaplError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An identifier or keyword, case preserved (STAPL keywords are
    /// matched case-insensitively by the parser).
    Ident(String),
    /// A decimal, `0x`-prefixed, or `$`-prefixed hex integer literal.
    Int(i128),
    /// A `#`-prefixed binary `BOOLEAN` array literal.
    BoolArray(BitVec<u8, Lsb0>),
    /// An `@`-prefixed ACA-compressed literal, already decompressed into
    /// bytes widened to `INTEGER` array elements.
    IntArray(Vec<i128>),
    /// A double-quoted string literal, unescaped.
    Str(String),
    /// A multi-character operator (`&&`, `==`, `<=`, `<<`, ...).
    Op(&'static str),
    /// A single-character punctuation mark.
    Punct(char),
    /// End of input.
    Eof,
}

/// Tokenize `source`, STAPL's backtick-prefixed line comments stripped.
pub fn lex(source: &str) -> Result<Vec<Token>, StaplError> {
    let bytes: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '`' {
            while i < bytes.len() && bytes[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == '_' || bytes[i] == '$') {
                i += 1;
            }
            tokens.push(Token::Ident(bytes[start..i].iter().collect()));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            if c == '0' && bytes.get(i + 1) == Some(&'x') {
                i += 2;
                while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                    i += 1;
                }
                let text: String = bytes[start + 2..i].iter().collect();
                let value = i128::from_str_radix(&text, 16)
                    .map_err(|_| StaplError::value(format!("invalid hex literal {text}")))?;
                tokens.push(Token::Int(value));
            } else {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = bytes[start..i].iter().collect();
                let value = text
                    .parse()
                    .map_err(|_| StaplError::value(format!("invalid integer literal {text}")))?;
                tokens.push(Token::Int(value));
            }
            continue;
        }
        if c == '#' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            let mut bits = BitVec::<u8, Lsb0>::new();
            for ch in text.chars().rev() {
                let digit = ch.to_digit(2).ok_or_else(|| StaplError::value(format!("invalid array literal digit {ch}")))?;
                bits.push(digit != 0);
            }
            tokens.push(Token::BoolArray(bits));
            continue;
        }
        if c == '$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            let value = i128::from_str_radix(&text, 16)
                .map_err(|_| StaplError::value(format!("invalid hex literal {text}")))?;
            tokens.push(Token::Int(value));
            continue;
        }
        if c == '@' {
            i += 1;
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == '_' || bytes[i] == '@') {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            let raw = super::aca::decompress(&text)?;
            tokens.push(Token::IntArray(raw.into_iter().map(|b| b as i128).collect()));
            continue;
        }
        if c == '"' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i] != '"' {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            i += 1; // closing quote
            tokens.push(Token::Str(text));
            continue;
        }
        let two: String = bytes[i..(i + 2).min(bytes.len())].iter().collect();
        if let Some(op) = match two.as_str() {
            "&&" => Some("&&"),
            "||" => Some("||"),
            "==" => Some("=="),
            "!=" => Some("!="),
            "<=" => Some("<="),
            ">=" => Some(">="),
            "<<" => Some("<<"),
            ">>" => Some(">>"),
            _ => None,
        } {
            tokens.push(Token::Op(op));
            i += 2;
            continue;
        }
        if "&|^~<>+-*/%=!".contains(c) {
            let op = match c {
                '&' => "&",
                '|' => "|",
                '^' => "^",
                '~' => "~",
                '<' => "<",
                '>' => ">",
                '+' => "+",
                '-' => "-",
                '*' => "*",
                '/' => "/",
                '%' => "%",
                '=' => "=",
                '!' => "!",
                _ => unreachable!(),
            };
            tokens.push(Token::Op(op));
            i += 1;
            continue;
        }
        if "(),;:[]".contains(c) {
            tokens.push(Token::Punct(c));
            i += 1;
            continue;
        }
        return Err(StaplError::value(format!("unexpected character {c:?}")));
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_identifiers_ints_and_operators() {
        let tokens = lex("A = B + 12;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("A".into()),
                Token::Op("="),
                Token::Ident("B".into()),
                Token::Op("+"),
                Token::Int(12),
                Token::Punct(';'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strips_backtick_comments() {
        let tokens = lex("A = 1; ` trailing comment\nB = 2;").unwrap();
        assert!(tokens.iter().any(|t| *t == Token::Ident("B".into())));
    }

    #[test]
    fn bang_still_lexes_as_not_operator() {
        let tokens = lex("A = !B;").unwrap();
        assert_eq!(tokens[2], Token::Op("!"));
    }

    #[test]
    fn binary_array_literal_is_lsb_first() {
        let tokens = lex("#1011").unwrap();
        match &tokens[0] {
            Token::BoolArray(bits) => {
                assert_eq!(bits.len(), 4);
                assert_eq!(bits[0], true);
                assert_eq!(bits[1], true);
                assert_eq!(bits[2], false);
                assert_eq!(bits[3], true);
            }
            other => panic!("expected BoolArray, got {other:?}"),
        }
    }

    #[test]
    fn dollar_prefixed_literal_is_hex_not_an_array() {
        let tokens = lex("$FF").unwrap();
        assert_eq!(tokens[0], Token::Int(0xFF));
    }

    #[test]
    fn percent_lexes_as_modulo_not_a_binary_array_prefix() {
        let tokens = lex("A % B").unwrap();
        assert_eq!(tokens[1], Token::Op("%"));
    }

    #[test]
    fn at_prefixed_literal_decompresses_via_aca() {
        let tokens = lex("@O00008Cn63PbPMRWpGBDgj6RV60").unwrap();
        match &tokens[0] {
            Token::IntArray(items) => {
                let bytes: Vec<u8> = items.iter().map(|v| *v as u8).collect();
                assert_eq!(bytes, b"abcdefabcdefghijkldefabc");
            }
            other => panic!("expected IntArray, got {other:?}"),
        }
    }
}
