//! Binary `.kbc` format.
//!
//! Layout (little-endian):
//!
//! ```text
//! [5]  magic "KOALA"
//! [1]  format version
//! [8]  block count N,    N x { [8] begin, [8] end }
//! [8]  constant count M, M x { [1] type tag, [4] i32 }
//! [8]  code word count K, K x [8] word
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use tracing::info;
use crate::bytecode::{Block, ProgramData};
use crate::vm::Value;

pub const MAGIC: &[u8; 5] = b"KOALA";
pub const FORMAT_VERSION: u8 = 1;

const TYPE_INTEGER: u8 = 0;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: missing KOALA magic")]
    InvalidMagic,

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown constant type ID: {0}")]
    UnsupportedConstantType(u8),

    #[error("Unsupported constant type: {0}")]
    UnsupportedValue(String),

    #[error("Unexpected end of stream while reading {0}")]
    Truncated(&'static str),

    #[error("Value out of range: {0}")]
    ValueOutOfRange(u64),
}

fn eof_as(what: &'static str) -> impl Fn(io::Error) -> FormatError {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::Truncated(what)
        } else {
            FormatError::Io(err)
        }
    }
}

fn read_len<R: Read>(reader: &mut R, what: &'static str) -> Result<usize, FormatError> {
    let value = reader.read_u64::<LittleEndian>().map_err(eof_as(what))?;
    usize::try_from(value).map_err(|_| FormatError::ValueOutOfRange(value))
}

/// Decode a program from a reader (file, memory buffer, etc.)
pub fn read_program<R: Read>(reader: &mut R) -> Result<ProgramData, FormatError> {
    let mut magic = [0u8; 5];
    reader.read_exact(&mut magic).map_err(eof_as("magic"))?;
    if &magic != MAGIC {
        return Err(FormatError::InvalidMagic);
    }

    let version = reader.read_u8().map_err(eof_as("version"))?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let block_count = read_len(reader, "block count")?;
    let mut blocks = Vec::new();
    for _ in 0..block_count {
        let begin = read_len(reader, "block begin")?;
        let end = read_len(reader, "block end")?;
        blocks.push(Block::new(begin, end));
    }

    let constant_count = read_len(reader, "constant count")?;
    let mut constants = Vec::new();
    for _ in 0..constant_count {
        let type_id = reader.read_u8().map_err(eof_as("constant type"))?;
        let constant = match type_id {
            TYPE_INTEGER => {
                let value = reader.read_i32::<LittleEndian>().map_err(eof_as("integer constant"))?;
                Value::Integer(value)
            }
            _ => return Err(FormatError::UnsupportedConstantType(type_id)),
        };
        constants.push(constant);
    }

    let code_len = read_len(reader, "code size")?;
    let mut code = Vec::new();
    for _ in 0..code_len {
        code.push(reader.read_u64::<LittleEndian>().map_err(eof_as("code word"))?);
    }

    Ok(ProgramData { code, constants, blocks })
}

/// Encode a program into a writer
pub fn write_program<W: Write>(program: &ProgramData, writer: &mut W) -> Result<(), FormatError> {
    writer.write_all(MAGIC)?;
    writer.write_u8(FORMAT_VERSION)?;

    writer.write_u64::<LittleEndian>(program.blocks.len() as u64)?;
    for block in &program.blocks {
        writer.write_u64::<LittleEndian>(block.begin as u64)?;
        writer.write_u64::<LittleEndian>(block.end as u64)?;
    }

    writer.write_u64::<LittleEndian>(program.constants.len() as u64)?;
    for constant in &program.constants {
        match constant {
            Value::Integer(i) => {
                writer.write_u8(TYPE_INTEGER)?;
                writer.write_i32::<LittleEndian>(*i)?;
            }
            Value::Label(name) => {
                return Err(FormatError::UnsupportedValue(format!("label '{}'", name)));
            }
        }
    }

    writer.write_u64::<LittleEndian>(program.code.len() as u64)?;
    for word in &program.code {
        writer.write_u64::<LittleEndian>(*word)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a program to a file.
///
/// The program is fully encoded before the file is created.
pub fn save<P: AsRef<Path>>(program: &ProgramData, path: P) -> Result<(), FormatError> {
    let mut buffer = Vec::new();
    write_program(program, &mut buffer)?;

    let path = path.as_ref();
    fs::write(path, &buffer)?;
    info!(path = %path.display(), bytes = buffer.len(), "saved program");
    Ok(())
}

/// Read a program from a file
pub fn load<P: AsRef<Path>>(path: P) -> Result<ProgramData, FormatError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let program = read_program(&mut reader)?;
    info!(
        path = %path.display(),
        blocks = program.blocks.len(),
        constants = program.constants.len(),
        code = program.code.len(),
        "loaded program"
    );
    Ok(program)
}
