use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::types::BufReadExt;

/// In-memory reader over a resource section byte dump.
pub struct FragmentReader {
    cursor: Cursor<Vec<u8>>,
}

impl FragmentReader {
    pub fn new(content: Vec<u8>) -> Self {
        Self { cursor: Cursor::new(content) }
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }
}

impl Read for FragmentReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for FragmentReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl BufReadExt for FragmentReader { }

#[cfg(test)]
mod tests {
    use super::FragmentReader;
    use crate::types::BufReadExt;

    #[test]
    fn read_wchar_string_at_offset() {
        let mut reader = FragmentReader::new(
            [0x04u8, 0x00, 0x41, 0x00, 0x41, 0x00, 0x41, 0x00, 0x41, 0x00].to_vec(),
        );
        let str = reader.read_wchar_string_at_offset(0).unwrap();
        assert_eq!(str, "AAAA");
    }

    #[test]
    fn stream_size() {
        let mut reader = FragmentReader::new(vec![0u8; 0x60]);
        assert_eq!(reader.stream_size().unwrap(), 0x60);
        assert_eq!(reader.len(), 0x60);
    }
}
