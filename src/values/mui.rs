use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{
    errors::RsrcError,
    rsrc::tree::ResourceEntry,
    stream::StreamContext,
};

use super::{read_descriptor_data, for_each_language_leaf, LanguageTable};

pub const MUI_SIGNATURE: u32 = 0xfecdfecd;
pub const MUI_VERSION: u32 = 0x00010000;

const HEADER_LENGTH: usize = 112;
const CHECKSUM_LENGTH: usize = 16;
const RESERVED_LENGTH: usize = 24;

/// Decoded MUI descriptor of one language.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MuiValue {
    pub file_type: u32,
    pub system_attributes: u32,
    pub ultimate_fallback_location: u32,
    pub service_checksum: Vec<u8>,
    pub checksum: Vec<u8>,
    pub main_name: Option<String>,
    pub mui_name: Option<String>,
    pub language: Option<String>,
    pub fallback_language: Option<String>,
}

/// Decoded `MUI` resource (recognized by name at level 1).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MuiResource {
    table: LanguageTable<MuiValue>,
}

impl MuiResource {
    pub(crate) fn read(resource: &ResourceEntry, context: &StreamContext) -> crate::Result<Self> {
        let mut table = LanguageTable::new();

        for_each_language_leaf(resource, |_, lcid, descriptor| {
            let data = read_descriptor_data(context, descriptor)?;
            let value = decode_mui(&data)?;
            table.entry_mut_or_insert(lcid).values.push(value);
            Ok(())
        })?;

        Ok(Self { table })
    }

    pub fn file_type(&self, lcid: u32) -> Option<u32> {
        self.value(lcid).map(|value| value.file_type)
    }

    pub fn main_name(&self, lcid: u32) -> Option<&str> {
        self.value(lcid)?.main_name.as_deref()
    }

    pub fn mui_name(&self, lcid: u32) -> Option<&str> {
        self.value(lcid)?.mui_name.as_deref()
    }

    pub fn language(&self, lcid: u32) -> Option<&str> {
        self.value(lcid)?.language.as_deref()
    }

    pub fn fallback_language(&self, lcid: u32) -> Option<&str> {
        self.value(lcid)?.fallback_language.as_deref()
    }

    pub fn value(&self, lcid: u32) -> Option<&MuiValue> {
        self.table.get_by_lcid(lcid)?.values.first()
    }

    pub fn languages(&self) -> impl Iterator<Item = u32> + '_ {
        self.table.languages()
    }

    pub fn number_of_languages(&self) -> usize {
        self.table.number_of_languages()
    }
}

fn decode_mui(data: &[u8]) -> crate::Result<MuiValue> {
    if data.len() < HEADER_LENGTH {
        return Err(RsrcError::BufferTooSmall {
            target: "MUI header".into(),
            expected: HEADER_LENGTH as u64,
            actual: data.len() as u64,
        });
    }

    let mut cursor = Cursor::new(data);

    let signature = cursor.read_u32::<LittleEndian>()?;
    if signature != MUI_SIGNATURE {
        return Err(RsrcError::SignatureMismatch {
            target: "MUI header",
            expected: MUI_SIGNATURE as u64,
            actual: signature as u64,
        });
    }

    let size = cursor.read_u32::<LittleEndian>()? as usize;
    if size < HEADER_LENGTH || size > data.len() {
        return Err(RsrcError::InvalidData {
            target: "MUI header",
            reason: format!("total size {size} does not fit the leaf of {} bytes", data.len()),
        });
    }

    let version = cursor.read_u32::<LittleEndian>()?;
    if version != MUI_VERSION {
        return Err(RsrcError::UnsupportedMuiVersion(version));
    }

    let file_type = cursor.read_u32::<LittleEndian>()?;
    let system_attributes = cursor.read_u32::<LittleEndian>()?;
    let ultimate_fallback_location = cursor.read_u32::<LittleEndian>()?;

    let mut service_checksum = vec![0u8; CHECKSUM_LENGTH];
    std::io::Read::read_exact(&mut cursor, &mut service_checksum)?;
    let mut checksum = vec![0u8; CHECKSUM_LENGTH];
    std::io::Read::read_exact(&mut cursor, &mut checksum)?;

    let mut reserved = [0u8; RESERVED_LENGTH];
    std::io::Read::read_exact(&mut cursor, &mut reserved)?;

    let main_name = read_header_string(data, &mut cursor, size)?;
    let mui_name = read_header_string(data, &mut cursor, size)?;
    let language = read_header_string(data, &mut cursor, size)?;
    let fallback_language = read_header_string(data, &mut cursor, size)?;

    Ok(MuiValue {
        file_type,
        system_attributes,
        ultimate_fallback_location,
        service_checksum,
        checksum,
        main_name,
        mui_name,
        language,
        fallback_language,
    })
}

/// Reads one `(offset, size)` pair and resolves the UTF-16LE string it
/// addresses. A zeroed pair means the string is absent.
fn read_header_string(
    data: &[u8],
    cursor: &mut Cursor<&[u8]>,
    total_size: usize,
) -> crate::Result<Option<String>> {
    let offset = cursor.read_u32::<LittleEndian>()? as usize;
    let size = cursor.read_u32::<LittleEndian>()? as usize;

    if offset == 0 || size == 0 {
        return Ok(None);
    }
    if offset + size > total_size {
        return Err(RsrcError::OffsetOutOfBounds {
            offset: offset as u64,
            lower: HEADER_LENGTH as u64,
            upper: total_size as u64,
        });
    }
    if size % 2 != 0 {
        return Err(RsrcError::InvalidData {
            target: "MUI header",
            reason: format!("string at offset {offset:#010x} has odd size {size}"),
        });
    }

    let units: Vec<u16> = data[offset..offset + size]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let string = String::from_utf16(&units).map_err(|_| RsrcError::InvalidData {
        target: "MUI header",
        reason: format!("string at offset {offset:#010x} is not valid UTF-16"),
    })?;

    Ok(Some(string.trim_end_matches('\0').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_mui(language: &str, fallback: &str) -> Vec<u8> {
        let mut strings = Vec::new();
        let mut pairs = Vec::new();

        for text in [language, fallback] {
            let offset = HEADER_LENGTH + strings.len();
            let mut encoded = Vec::new();
            for unit in text.encode_utf16() {
                encoded.extend_from_slice(&unit.to_le_bytes());
            }
            encoded.extend_from_slice(&[0, 0]);
            pairs.push((offset as u32, encoded.len() as u32));
            strings.extend_from_slice(&encoded);
        }

        let total = (HEADER_LENGTH + strings.len()) as u32;
        let mut data = Vec::new();
        data.extend_from_slice(&MUI_SIGNATURE.to_le_bytes());
        data.extend_from_slice(&total.to_le_bytes());
        data.extend_from_slice(&MUI_VERSION.to_le_bytes());
        data.extend_from_slice(&0x12u32.to_le_bytes()); // file type
        data.extend_from_slice(&0x100u32.to_le_bytes()); // system attributes
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&[0x11u8; CHECKSUM_LENGTH]);
        data.extend_from_slice(&[0x22u8; CHECKSUM_LENGTH]);
        data.extend_from_slice(&[0u8; RESERVED_LENGTH]);
        data.extend_from_slice(&[0u8; 8]); // no main name
        data.extend_from_slice(&[0u8; 8]); // no mui name
        for (offset, size) in pairs {
            data.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&size.to_le_bytes());
        }
        data.extend_from_slice(&strings);
        data
    }

    #[test]
    fn decode_sample() {
        let value = decode_mui(&sample_mui("en-US", "en")).unwrap();

        assert_eq!(value.file_type, 0x12);
        assert_eq!(value.system_attributes, 0x100);
        assert_eq!(value.service_checksum, vec![0x11u8; CHECKSUM_LENGTH]);
        assert_eq!(value.checksum, vec![0x22u8; CHECKSUM_LENGTH]);
        assert_eq!(value.main_name, None);
        assert_eq!(value.mui_name, None);
        assert_eq!(value.language.as_deref(), Some("en-US"));
        assert_eq!(value.fallback_language.as_deref(), Some("en"));
    }

    #[test]
    fn bad_signature_fails() {
        let mut data = sample_mui("en-US", "en");
        data[0] = 0;
        assert!(matches!(
            decode_mui(&data),
            Err(RsrcError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn unsupported_version_fails() {
        let mut data = sample_mui("en-US", "en");
        data[8..12].copy_from_slice(&0x00020000u32.to_le_bytes());
        assert!(matches!(
            decode_mui(&data),
            Err(RsrcError::UnsupportedMuiVersion(0x00020000))
        ));
    }

    #[test]
    fn string_outside_size_fails() {
        let mut data = sample_mui("en-US", "en");
        // grow the language string size beyond the total size
        data[96 + 4..96 + 8].copy_from_slice(&0x1000u32.to_le_bytes());
        assert!(matches!(
            decode_mui(&data),
            Err(RsrcError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn truncated_header_fails() {
        let data = sample_mui("en-US", "en");
        assert!(matches!(
            decode_mui(&data[..64]),
            Err(RsrcError::BufferTooSmall { .. })
        ));
    }
}
