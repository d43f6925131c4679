use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{
    errors::RsrcError,
    rsrc::tree::ResourceEntry,
    stream::{Codepage, StreamContext},
};

use super::{read_descriptor_data, for_each_language_leaf, LanguageEntry, LanguageTable};

const RANGE_LENGTH: u64 = 12;
const ENTRY_HEADER_LENGTH: usize = 4;
const FLAG_UNICODE: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq)]
struct MessageRange {
    low: u32,
    high: u32,
    first_entry_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageValue {
    pub identifier: u32,
    pub string: String,
}

/// Decoded `MESSAGE_TABLE` resource: range-indexed message strings, either
/// UTF-16LE or in the stream's ASCII codepage.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MessageTable {
    table: LanguageTable<MessageValue>,
}

impl MessageTable {
    pub(crate) fn read(resource: &ResourceEntry, context: &StreamContext) -> crate::Result<Self> {
        let mut table = LanguageTable::new();

        for_each_language_leaf(resource, |_, lcid, descriptor| {
            let data = read_descriptor_data(context, descriptor)?;
            decode_blocks(&data, context.ascii_codepage, table.entry_mut_or_insert(lcid))
        })?;

        Ok(Self { table })
    }

    pub fn get(&self, identifier: u32, lcid: u32) -> Option<&str> {
        self.table
            .get_by_lcid(lcid)?
            .values
            .iter()
            .find(|value| value.identifier == identifier)
            .map(|value| value.string.as_str())
    }

    pub fn messages(&self, lcid: u32) -> Option<&[MessageValue]> {
        self.table.get_by_lcid(lcid).map(|entry| entry.values.as_slice())
    }

    pub fn languages(&self) -> impl Iterator<Item = u32> + '_ {
        self.table.languages()
    }

    pub fn number_of_languages(&self) -> usize {
        self.table.number_of_languages()
    }
}

fn decode_blocks(
    data: &[u8],
    codepage: Codepage,
    entry: &mut LanguageEntry<MessageValue>,
) -> crate::Result<()> {
    let mut cursor = Cursor::new(data);
    let number_of_ranges = cursor.read_u32::<LittleEndian>()? as u64;

    let ranges_end = 4 + RANGE_LENGTH * number_of_ranges;
    if ranges_end > data.len() as u64 {
        return Err(RsrcError::BufferTooSmall {
            target: format!("{number_of_ranges} message ranges"),
            expected: ranges_end,
            actual: data.len() as u64,
        });
    }

    let mut ranges: Vec<MessageRange> = Vec::with_capacity(number_of_ranges as usize);

    for _ in 0..number_of_ranges {
        let range = MessageRange {
            low: cursor.read_u32::<LittleEndian>()?,
            high: cursor.read_u32::<LittleEndian>()?,
            first_entry_offset: cursor.read_u32::<LittleEndian>()?,
        };

        if range.high < range.low {
            return Err(RsrcError::InvalidData {
                target: "message table",
                reason: format!("range {:#010x}..={:#010x} is inverted", range.low, range.high),
            });
        }
        for seen in &ranges {
            if range.low <= seen.high && seen.low <= range.high {
                return Err(RsrcError::OverlappingRanges(
                    seen.low, seen.high, range.low, range.high,
                ));
            }
        }
        ranges.push(range);
    }

    for range in &ranges {
        let mut position = range.first_entry_offset as usize;

        for index in 0..=(range.high - range.low) {
            let (string, next) = decode_entry(data, position, codepage)?;
            entry.values.push(MessageValue { identifier: range.low + index, string });
            position = next;
        }
    }

    Ok(())
}

/// Decodes one `{ size, flags, body }` entry at `position`; returns the
/// message text and the offset of the next entry.
fn decode_entry(data: &[u8], position: usize, codepage: Codepage) -> crate::Result<(String, usize)> {
    let end = position + ENTRY_HEADER_LENGTH;
    if end > data.len() {
        return Err(RsrcError::OffsetOutOfBounds {
            offset: position as u64,
            lower: 0,
            upper: data.len() as u64,
        });
    }

    let mut cursor = Cursor::new(&data[position..end]);
    let size = cursor.read_u16::<LittleEndian>()? as usize;
    let flags = cursor.read_u16::<LittleEndian>()?;

    if size < ENTRY_HEADER_LENGTH || position + size > data.len() {
        return Err(RsrcError::InvalidData {
            target: "message table",
            reason: format!("entry size {size} at offset {position:#010x} escapes the leaf"),
        });
    }

    let body = &data[position + ENTRY_HEADER_LENGTH..position + size];
    let string = if flags & FLAG_UNICODE != 0 {
        decode_utf16le(body)?
    } else {
        codepage.decode(body)?
    };

    Ok((trim_message(&string).to_string(), position + size))
}

fn decode_utf16le(body: &[u8]) -> crate::Result<String> {
    if body.len() % 2 != 0 {
        return Err(RsrcError::InvalidData {
            target: "message table",
            reason: format!("Unicode entry body has odd length {}", body.len()),
        });
    }

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| RsrcError::InvalidData {
        target: "message table",
        reason: "entry body is not valid UTF-16".into(),
    })
}

/// Message bodies are padded with NULs and usually end in `\r\n`.
fn trim_message(string: &str) -> &str {
    let trimmed = string.trim_end_matches('\0');
    trimmed.strip_suffix("\r\n").unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::LanguageTable;

    fn table_with(ranges: &[(u32, u32, u32)], entries: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
        for (low, high, offset) in ranges {
            data.extend_from_slice(&low.to_le_bytes());
            data.extend_from_slice(&high.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
        }
        for entry in entries {
            data.extend_from_slice(entry);
        }
        data
    }

    fn ansi_entry(text: &str) -> Vec<u8> {
        let mut body = text.as_bytes().to_vec();
        body.push(0);
        let size = (ENTRY_HEADER_LENGTH + body.len()) as u16;
        let mut entry = size.to_le_bytes().to_vec();
        entry.extend_from_slice(&0u16.to_le_bytes());
        entry.extend_from_slice(&body);
        entry
    }

    fn unicode_entry(text: &str) -> Vec<u8> {
        let mut body = Vec::new();
        for unit in text.encode_utf16() {
            body.extend_from_slice(&unit.to_le_bytes());
        }
        body.extend_from_slice(&[0, 0]);
        let size = (ENTRY_HEADER_LENGTH + body.len()) as u16;
        let mut entry = size.to_le_bytes().to_vec();
        entry.extend_from_slice(&FLAG_UNICODE.to_le_bytes());
        entry.extend_from_slice(&body);
        entry
    }

    #[test]
    fn decode_ansi_and_unicode() {
        let first = ansi_entry("File not found.\r\n");
        let second = unicode_entry("Zugriff verweigert");
        let entries_offset = 4 + RANGE_LENGTH as u32;
        let data = table_with(
            &[(0x10, 0x11, entries_offset)],
            &[&first, &second],
        );

        let mut table: LanguageTable<MessageValue> = LanguageTable::new();
        decode_blocks(&data, Codepage::default(), table.entry_mut_or_insert(0x409)).unwrap();

        let entry = table.get_by_lcid(0x409).unwrap();
        assert_eq!(entry.values.len(), 2);
        assert_eq!(entry.values[0].identifier, 0x10);
        assert_eq!(entry.values[0].string, "File not found.");
        assert_eq!(entry.values[1].identifier, 0x11);
        assert_eq!(entry.values[1].string, "Zugriff verweigert");
    }

    #[test]
    fn two_ranges() {
        let first = ansi_entry("one");
        let second = ansi_entry("forty");
        let ranges_end = 4 + 2 * RANGE_LENGTH as u32;
        let data = table_with(
            &[
                (1, 1, ranges_end),
                (40, 40, ranges_end + first.len() as u32),
            ],
            &[&first, &second],
        );

        let mut table: LanguageTable<MessageValue> = LanguageTable::new();
        decode_blocks(&data, Codepage::default(), table.entry_mut_or_insert(0x409)).unwrap();

        let entry = table.get_by_lcid(0x409).unwrap();
        assert_eq!(entry.values[0].identifier, 1);
        assert_eq!(entry.values[0].string, "one");
        assert_eq!(entry.values[1].identifier, 40);
        assert_eq!(entry.values[1].string, "forty");
    }

    #[test]
    fn overlapping_ranges_fail() {
        let entry = ansi_entry("x");
        let data = table_with(
            &[(1, 5, 28), (5, 9, 28)],
            &[&entry],
        );

        let mut table: LanguageTable<MessageValue> = LanguageTable::new();
        let result = decode_blocks(&data, Codepage::default(), table.entry_mut_or_insert(0x409));
        assert!(matches!(result, Err(RsrcError::OverlappingRanges(1, 5, 5, 9))));
    }

    #[test]
    fn inverted_range_fails() {
        let data = table_with(&[(9, 5, 16)], &[]);
        let mut table: LanguageTable<MessageValue> = LanguageTable::new();
        let result = decode_blocks(&data, Codepage::default(), table.entry_mut_or_insert(0x409));
        assert!(matches!(result, Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn entry_escaping_leaf_fails() {
        let mut entry = ansi_entry("text");
        // size field larger than the remaining bytes
        entry[0] = 0xff;
        let entries_offset = 4 + RANGE_LENGTH as u32;
        let data = table_with(&[(1, 1, entries_offset)], &[&entry]);

        let mut table: LanguageTable<MessageValue> = LanguageTable::new();
        let result = decode_blocks(&data, Codepage::default(), table.entry_mut_or_insert(0x409));
        assert!(matches!(result, Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn codepage_1252_body() {
        let mut body = vec![0x54, 0x53, 0xc4, 0x00]; // "TSÄ" in windows-1252
        body.push(0);
        let size = (ENTRY_HEADER_LENGTH + body.len()) as u16;
        let mut entry = size.to_le_bytes().to_vec();
        entry.extend_from_slice(&0u16.to_le_bytes());
        entry.extend_from_slice(&body);

        let entries_offset = 4 + RANGE_LENGTH as u32;
        let data = table_with(&[(7, 7, entries_offset)], &[&entry]);

        let mut table: LanguageTable<MessageValue> = LanguageTable::new();
        decode_blocks(&data, Codepage::default(), table.entry_mut_or_insert(0x407)).unwrap();
        assert_eq!(table.get_by_lcid(0x407).unwrap().values[0].string, "TSÄ");
    }
}
