use crate::lexer::{Mnemonic, Token, TokenKind};
use koala_vm::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// One source instruction. Operands are integer literals or symbolic labels
/// and are resolved by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operand: Option<Value>,
    pub line: usize,
    pub column: usize,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic, line: usize, column: usize) -> Self {
        Self {
            mnemonic,
            operand: None,
            line,
            column,
        }
    }

    pub fn with_operand(mut self, operand: Value) -> Self {
        self.operand = Some(operand);
        self
    }

    /// The symbolic operand of a CALL/JMP/JEZ/JNZ/MARK
    pub fn label(&self) -> Option<&str> {
        match &self.operand {
            Some(Value::Label(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(Value::Integer(n)) => write!(f, "{} {}", self.mnemonic, n),
            Some(Value::Label(name)) => write!(f, "{} {}", self.mnemonic, name),
            None => write!(f, "{}", self.mnemonic),
        }
    }
}

/// A labelled block as written, nested blocks included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub blocks: Vec<CodeBlock>,
    pub line: usize,
}

/// A block with its nesting discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unexpected {found} at line {line}, column {column}: expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Line {line}, column {column} is \"END {found}\", but it has to be \"END {expected}\"")]
    MismatchedEnd {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid number '{text}' at line {line}, column {column}: does not fit in 32 bits")]
    InvalidNumber { text: String, line: usize, column: usize },

    #[error("Unexpected end of input: block '{label}' is never closed")]
    UnexpectedEof { label: String },
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let (line, column) = tokens.last().map_or((1, 1), |t| (t.line, t.column));
            tokens.push(Token::new(TokenKind::Eof, line, column));
        }
        Self { tokens, current: 0 }
    }

    /// Parse and flatten: the blocks in pre-order, nesting discarded
    pub fn parse(&mut self) -> Result<Vec<FlatBlock>, ParseError> {
        let tree = self.parse_tree()?;
        Ok(flatten(&tree))
    }

    /// Parse the top-level blocks, keeping their nesting
    pub fn parse_tree(&mut self) -> Result<Vec<CodeBlock>, ParseError> {
        let mut blocks = Vec::new();

        loop {
            let token = self.advance().clone();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Identifier(label) => {
                    blocks.push(self.parse_block(label, token.line)?);
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "block label".to_string(),
                        found: other.to_string(),
                        line: token.line,
                        column: token.column,
                    });
                }
            }
        }

        debug!(blocks = blocks.len(), "parsed top-level blocks");
        Ok(blocks)
    }

    /// Parse a block body; the label has already been consumed
    fn parse_block(&mut self, label: String, line: usize) -> Result<CodeBlock, ParseError> {
        self.consume_colon(&label)?;

        let mut block = CodeBlock {
            label,
            instructions: Vec::new(),
            blocks: Vec::new(),
            line,
        };

        loop {
            let token = self.advance().clone();
            match token.kind {
                TokenKind::Eof => {
                    return Err(ParseError::UnexpectedEof { label: block.label });
                }
                TokenKind::Keyword(Mnemonic::End) => {
                    let (name, line, column) = self.consume_identifier(&block.label, "block label after END")?;
                    if name != block.label {
                        return Err(ParseError::MismatchedEnd {
                            expected: block.label,
                            found: name,
                            line,
                            column,
                        });
                    }
                    break;
                }
                TokenKind::Keyword(mnemonic) => {
                    let instruction = self.parse_instruction(mnemonic, &token, &block.label)?;
                    block.instructions.push(instruction);
                }
                TokenKind::Identifier(nested) => {
                    block.blocks.push(self.parse_block(nested, token.line)?);
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "instruction or nested block".to_string(),
                        found: other.to_string(),
                        line: token.line,
                        column: token.column,
                    });
                }
            }
        }

        Ok(block)
    }

    fn parse_instruction(&mut self, mnemonic: Mnemonic, token: &Token, label: &str) -> Result<Instruction, ParseError> {
        let instruction = Instruction::new(mnemonic, token.line, token.column);

        let instruction = match mnemonic {
            Mnemonic::Push | Mnemonic::PopN => {
                let value = self.consume_number(label, mnemonic)?;
                instruction.with_operand(Value::Integer(value))
            }
            Mnemonic::Call => {
                let (name, _, _) = self.consume_identifier(label, "block name after CALL")?;
                instruction.with_operand(Value::Label(name))
            }
            Mnemonic::Jmp | Mnemonic::Jez | Mnemonic::Jnz | Mnemonic::Mark => {
                let expected = format!("label name after {}", mnemonic);
                let (name, _, _) = self.consume_identifier(label, &expected)?;
                instruction.with_operand(Value::Label(name))
            }
            _ => instruction,
        };

        Ok(instruction)
    }

    fn consume_colon(&mut self, label: &str) -> Result<(), ParseError> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Colon => Ok(()),
            other => Err(unexpected(label, other, "':' after block label", token.line, token.column)),
        }
    }

    fn consume_identifier(&mut self, label: &str, expected: &str) -> Result<(String, usize, usize), ParseError> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Identifier(name) => Ok((name, token.line, token.column)),
            other => Err(unexpected(label, other, expected, token.line, token.column)),
        }
    }

    fn consume_number(&mut self, label: &str, mnemonic: Mnemonic) -> Result<i32, ParseError> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Number(text) => text.parse::<i32>().map_err(|_| ParseError::InvalidNumber {
                text,
                line: token.line,
                column: token.column,
            }),
            other => {
                let expected = format!("number after {}", mnemonic);
                Err(unexpected(label, other, &expected, token.line, token.column))
            }
        }
    }

    /// Return the current token and move past it. Never moves past `Eof`.
    fn advance(&mut self) -> &Token {
        let index = self.current;
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[index]
    }

    fn is_at_end(&self) -> bool {
        self.tokens[self.current].kind == TokenKind::Eof
    }
}

/// Inside an open block, running out of tokens is reported as an unclosed block
fn unexpected(label: &str, found: TokenKind, expected: &str, line: usize, column: usize) -> ParseError {
    match found {
        TokenKind::Eof => ParseError::UnexpectedEof { label: label.to_string() },
        other => ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: other.to_string(),
            line,
            column,
        },
    }
}

/// Flatten a block tree in pre-order: each block precedes the blocks nested in it
pub fn flatten(blocks: &[CodeBlock]) -> Vec<FlatBlock> {
    let mut flat = Vec::new();
    for block in blocks {
        flatten_into(block, &mut flat);
    }
    flat
}

fn flatten_into(block: &CodeBlock, out: &mut Vec<FlatBlock>) {
    out.push(FlatBlock {
        label: block.label.clone(),
        instructions: block.instructions.clone(),
        line: block.line,
    });
    for nested in &block.blocks {
        flatten_into(nested, out);
    }
}
