use std::fmt::Display;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::errors::RsrcError;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct HeaderField<T> {
    pub value: T,
    pub offset: u64,
    pub rva: u64,
}

impl<T> Display for HeaderField<T> where T: Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[macro_export]
macro_rules! new_header_field {
    ($value:expr, $offset:ident) => {{
        let value = $value;
        let size = std::mem::size_of_val(&value) as u64;
        let field = $crate::types::HeaderField { value, offset: $offset, rva: $offset };
        #[allow(unused_assignments)]
        { $offset += size; }
        field
    }};
}

pub trait Header {
    fn parse_bytes(bytes: Vec<u8>, pos: u64) -> crate::Result<Self> where Self: Sized;
    fn is_valid(&self) -> bool;
    fn length() -> usize;
}

/// Extension over a random access byte source. All offsets are absolute
/// within the resource section; multi-byte reads are little-endian.
pub trait BufReadExt: Read + Seek {
    fn stream_size(&mut self) -> crate::Result<u64> {
        let pos = self.stream_position()?;
        let size = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(size)
    }

    /// Reads exactly `size` bytes at `offset`. A short read is an error.
    fn read_bytes_at_offset(&mut self, offset: u64, size: usize) -> crate::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a counted UTF-16LE string at `offset`: a `u16` length in code
    /// units followed by that many units. No terminator is expected.
    fn read_wchar_string_at_offset(&mut self, offset: u64) -> crate::Result<String> {
        self.seek(SeekFrom::Start(offset))?;
        let length = self.read_u16::<LittleEndian>()? as usize;
        let mut units = vec![0u16; length];
        self.read_u16_into::<LittleEndian>(&mut units)?;
        String::from_utf16(&units).map_err(|_| RsrcError::InvalidData {
            target: "resource name",
            reason: format!("invalid UTF-16 string at offset {offset:#010x}"),
        })
    }
}

impl BufReadExt for std::io::Cursor<Vec<u8>> { }
impl BufReadExt for std::io::BufReader<std::fs::File> { }
