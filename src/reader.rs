//! Reading program text into expressions.
//!
//! The [`Tokenizer`] scans one token at a time with exactly one token of
//! pushback, tracking a 1-based line counter for diagnostics. [`read`]
//! drives it with a recursive-descent parser: atoms become numbers,
//! booleans, or symbols, `(` opens a list, and `'E` is sugar for
//! `(quote E)`.
//!
//! ```text
//! (define x '(1 2 3))  ; => Pair(define, Pair(x, Pair((quote (1 2 3)), ())))
//! ```
//!
//! Number literals are whole numbers in plain decimal notation whose
//! magnitude is at most 2^53; anything else matching `-?[0-9]+` is a
//! syntax error rather than a symbol, verified by an exact string
//! round-trip so that boundary cases like `9007199254740993`, `007`, and
//! `-0` are all rejected.

use crate::ast::{Number, Value, MAX_EXACT_NUMBER};
use crate::{Error, MAX_READ_DEPTH};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Number),
    Boolean(bool),
    Symbol(String),
    OpenParen,
    CloseParen,
    Quote,
    EndOfInput,
}

/// A character that may appear in an atom: printable ASCII minus
/// whitespace, controls, single quote, parentheses, and semicolon.
fn is_atom_char(ch: char) -> bool {
    matches!(ch, '!'..='&' | '*'..=':' | '<'..='~')
}

/// Whole numbers in plain decimal notation, `-?[0-9]+`.
fn is_numeric_atom(atom: &str) -> bool {
    let digits = atom.strip_prefix('-').unwrap_or(atom);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub struct Tokenizer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    prev: Option<Token>,
    ungotten: bool,
}

impl Tokenizer {
    pub fn new(source: &str) -> Self {
        // Normalize all line-ending variants so the line counter only ever
        // sees '\n'.
        let normalized = source
            .replace("\r\n", "\n")
            .replace("\n\r", "\n")
            .replace('\r', "\n");
        Tokenizer {
            input: normalized.chars().collect(),
            pos: 0,
            line: 1,
            prev: None,
            ungotten: false,
        }
    }

    /// Line the most recent token was found on.
    pub fn line(&self) -> u32 {
        self.line
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, self.line)
    }

    /// Skips past whitespace and `;`-to-end-of-line comments.
    fn skip_whitespace_and_comments(&mut self) {
        let mut in_comment = false;
        while let Some(&ch) = self.input.get(self.pos) {
            match ch {
                '\n' => {
                    self.pos += 1;
                    self.line += 1;
                    in_comment = false;
                }
                _ if in_comment => self.pos += 1,
                ' ' | '\t' => self.pos += 1,
                ';' => {
                    self.pos += 1;
                    in_comment = true;
                }
                _ => break,
            }
        }
    }

    /// Reads the atom starting at the current position and classifies it
    /// as a number, boolean, or symbol.
    fn read_atom(&mut self) -> Result<Token, Error> {
        let mut atom = String::new();
        while let Some(&ch) = self.input.get(self.pos) {
            if !is_atom_char(ch) {
                break;
            }
            atom.push(ch);
            self.pos += 1;
        }

        if is_numeric_atom(&atom) {
            return self.numeric_token(&atom);
        }

        Ok(match atom.as_str() {
            "#t" => Token::Boolean(true),
            "#f" => Token::Boolean(false),
            _ => Token::Symbol(atom),
        })
    }

    /// Converts an atom matching `-?[0-9]+`. The exact string round-trip
    /// catches `9007199254740993` (which would pass a magnitude test after
    /// rounding through a float) along with leading-zero and `-0` spellings.
    fn numeric_token(&self, atom: &str) -> Result<Token, Error> {
        match atom.parse::<Number>() {
            Ok(n) if n.unsigned_abs() <= MAX_EXACT_NUMBER as u64 && n.to_string() == atom => {
                Ok(Token::Number(n))
            }
            _ if atom.starts_with('-') => Err(self.syntax_error(format!(
                "number ({atom}) too low (should be no lower than -{MAX_EXACT_NUMBER})"
            ))),
            _ => Err(self.syntax_error(format!(
                "number ({atom}) too high (should be no higher than {MAX_EXACT_NUMBER})"
            ))),
        }
    }

    /// Returns the next token, honoring a pending pushback.
    pub fn get(&mut self) -> Result<Token, Error> {
        if self.ungotten {
            if let Some(token) = self.prev.clone() {
                self.ungotten = false;
                return Ok(token);
            }
        }

        self.skip_whitespace_and_comments();

        let token = match self.input.get(self.pos) {
            None => Token::EndOfInput,
            Some(&'(') => {
                self.pos += 1;
                Token::OpenParen
            }
            Some(&')') => {
                self.pos += 1;
                Token::CloseParen
            }
            Some(&'\'') => {
                self.pos += 1;
                Token::Quote
            }
            Some(&ch) if is_atom_char(ch) => self.read_atom()?,
            Some(&ch) => return Err(self.syntax_error(format!("unexpected character {ch:?}"))),
        };

        self.prev = Some(token.clone());
        Ok(token)
    }

    /// Pushes the most recent token back so the next [`Tokenizer::get`]
    /// returns it again. At most one token of pushback is supported;
    /// violating that is a bug in the caller, not in user input.
    pub fn unget(&mut self) {
        assert!(self.prev.is_some(), "pushback before any token was read");
        assert!(!self.ungotten, "multi-level pushback is not supported");
        self.ungotten = true;
    }
}

/// Reads the next top-level expression, or `None` at end of input.
pub fn read(tokenizer: &mut Tokenizer) -> Result<Option<Value>, Error> {
    match tokenizer.get()? {
        Token::EndOfInput => Ok(None),
        token => parse_token(tokenizer, token, 0).map(Some),
    }
}

/// Reads one expression in a context where end of input is an error.
fn read_required(tokenizer: &mut Tokenizer, depth: usize) -> Result<Value, Error> {
    match tokenizer.get()? {
        Token::EndOfInput => Err(tokenizer.syntax_error("unexpected end of input")),
        token => parse_token(tokenizer, token, depth),
    }
}

fn parse_token(tokenizer: &mut Tokenizer, token: Token, depth: usize) -> Result<Value, Error> {
    if depth > MAX_READ_DEPTH {
        return Err(tokenizer.syntax_error(format!(
            "expression nested more than {MAX_READ_DEPTH} levels deep"
        )));
    }
    match token {
        Token::Number(n) => Ok(Value::Number(n)),
        Token::Boolean(b) => Ok(Value::Boolean(b)),
        Token::Symbol(name) => Ok(Value::Symbol(name)),
        Token::OpenParen => read_list(tokenizer, depth + 1),
        Token::CloseParen => Err(tokenizer.syntax_error("unexpected \")\"")),
        Token::Quote => {
            let quoted = read_required(tokenizer, depth + 1)?;
            Ok(Value::list_from_vec(vec![
                Value::Symbol("quote".to_owned()),
                quoted,
            ]))
        }
        Token::EndOfInput => Err(tokenizer.syntax_error("unexpected end of input")),
    }
}

/// Reads the rest of a list whose open paren has already been consumed.
fn read_list(tokenizer: &mut Tokenizer, depth: usize) -> Result<Value, Error> {
    let mut items = Vec::new();
    loop {
        match tokenizer.get()? {
            Token::EndOfInput => return Err(tokenizer.syntax_error("unexpected end of input")),
            Token::CloseParen => return Ok(Value::list_from_vec(items)),
            _ => {
                tokenizer.unget();
                items.push(read_required(tokenizer, depth)?);
            }
        }
    }
}
