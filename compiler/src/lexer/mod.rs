use serde::{Deserialize, Serialize};
use std::fmt;
use koala_vm::OpCode;

/// Instruction mnemonics recognised as keywords, in any letter case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mnemonic {
    Inc,
    Dec,
    Add,
    Sub,
    Mul,
    Div,

    And,
    Or,
    Xor,
    Not,

    Ret,
    End,
    Call,
    Jmp,
    Jez,
    Jnz,
    Push,
    Pop,
    Dup,
    PopN,
    Mark,
}

impl Mnemonic {
    const ALL: [Mnemonic; 21] = [
        Mnemonic::Inc, Mnemonic::Dec, Mnemonic::Add, Mnemonic::Sub, Mnemonic::Mul, Mnemonic::Div,
        Mnemonic::And, Mnemonic::Or, Mnemonic::Xor, Mnemonic::Not,
        Mnemonic::Ret, Mnemonic::End, Mnemonic::Call, Mnemonic::Jmp, Mnemonic::Jez, Mnemonic::Jnz,
        Mnemonic::Push, Mnemonic::Pop, Mnemonic::Dup, Mnemonic::PopN, Mnemonic::Mark,
    ];

    /// Case-insensitive keyword lookup
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(identifier))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mnemonic::Inc => "INC",
            Mnemonic::Dec => "DEC",
            Mnemonic::Add => "ADD",
            Mnemonic::Sub => "SUB",
            Mnemonic::Mul => "MUL",
            Mnemonic::Div => "DIV",
            Mnemonic::And => "AND",
            Mnemonic::Or => "OR",
            Mnemonic::Xor => "XOR",
            Mnemonic::Not => "NOT",
            Mnemonic::Ret => "RET",
            Mnemonic::End => "END",
            Mnemonic::Call => "CALL",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Jez => "JEZ",
            Mnemonic::Jnz => "JNZ",
            Mnemonic::Push => "PUSH",
            Mnemonic::Pop => "POP",
            Mnemonic::Dup => "DUP",
            Mnemonic::PopN => "POP_N",
            Mnemonic::Mark => "MARK",
        }
    }

    /// The VM opcode this mnemonic assembles to. `MARK` and `END` never reach bytecode.
    pub fn opcode(&self) -> Option<OpCode> {
        match self {
            Mnemonic::Inc => Some(OpCode::Inc),
            Mnemonic::Dec => Some(OpCode::Dec),
            Mnemonic::Add => Some(OpCode::Add),
            Mnemonic::Sub => Some(OpCode::Sub),
            Mnemonic::Mul => Some(OpCode::Mul),
            Mnemonic::Div => Some(OpCode::Div),
            Mnemonic::And => Some(OpCode::And),
            Mnemonic::Or => Some(OpCode::Or),
            Mnemonic::Xor => Some(OpCode::Xor),
            Mnemonic::Not => Some(OpCode::Not),
            Mnemonic::Ret => Some(OpCode::Ret),
            Mnemonic::Call => Some(OpCode::Call),
            Mnemonic::Jmp => Some(OpCode::Jmp),
            Mnemonic::Jez => Some(OpCode::Jez),
            Mnemonic::Jnz => Some(OpCode::Jnz),
            Mnemonic::Push => Some(OpCode::Push),
            Mnemonic::Pop => Some(OpCode::Pop),
            Mnemonic::Dup => Some(OpCode::Dup),
            Mnemonic::PopN => Some(OpCode::PopN),
            Mnemonic::End | Mnemonic::Mark => None,
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Digits of an integer literal, separators already removed
    Number(String),
    Identifier(String),
    Keyword(Mnemonic),
    Colon,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number '{}'", n),
            TokenKind::Identifier(s) => write!(f, "identifier '{}'", s),
            TokenKind::Keyword(m) => write!(f, "keyword {}", m),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Eof => write!(f, "EOF"),
        }
    }
}

/// A character the lexer could not classify. Lexing continues past it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error on ({line};{column}): Unrecognized token('{character}')!: {source_line}")]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub character: char,
    pub source_line: String,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    errors: Vec<LexError>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            errors: Vec::new(),
        }
    }

    /// Scan the whole input. The returned stream always ends with `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.skip_whitespace();

            if self.is_at_end() {
                break;
            }

            if let Some(token) = self.next_token() {
                tokens.push(token);
            }
        }

        tokens.push(Token::new(TokenKind::Eof, self.line, self.column));
        tokens
    }

    /// False once any character was rejected
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<LexError> {
        std::mem::take(&mut self.errors)
    }

    fn next_token(&mut self) -> Option<Token> {
        let start_line = self.line;
        let start_column = self.column;

        let ch = self.peek();
        let kind = match ch {
            ':' => {
                self.advance();
                TokenKind::Colon
            }
            _ if ch.is_ascii_digit() => self.number(),
            _ if ch.is_ascii_alphabetic() || ch == '_' => self.identifier_or_keyword(),
            _ => {
                self.report(ch);
                self.advance();
                return None;
            }
        };

        Some(Token::new(kind, start_line, start_column))
    }

    fn number(&mut self) -> TokenKind {
        let mut digits = String::new();

        while !self.is_at_end() && (self.peek().is_ascii_digit() || self.peek() == '_') {
            let ch = self.advance();
            if ch != '_' {
                digits.push(ch);
            }
        }

        TokenKind::Number(digits)
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let mut identifier = String::new();

        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            identifier.push(self.advance());
        }

        match Mnemonic::from_identifier(&identifier) {
            Some(mnemonic) => TokenKind::Keyword(mnemonic),
            None => TokenKind::Identifier(identifier),
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                ch if ch.is_whitespace() => {
                    self.advance();
                }
                ';' => {
                    // Line comment
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn report(&mut self, character: char) {
        let line_start = self.input[..self.position]
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |i| i + 1);
        let line_end = self.input[self.position..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(self.input.len(), |i| self.position + i);

        let source_line: String = self.input[line_start..line_end].iter().collect();
        self.errors.push(LexError {
            line: self.line,
            column: self.column,
            character,
            source_line: source_line.trim_end_matches('\r').to_string(),
        });
    }

    fn advance(&mut self) -> char {
        let ch = self.input[self.position];
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}
