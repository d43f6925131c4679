use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{
    errors::RsrcError,
    rsrc::tree::ResourceEntry,
    stream::StreamContext,
};

use super::{read_descriptor_data, for_each_language_leaf, LanguageEntry, LanguageTable};

/// Every string table leaf holds exactly this many slots.
pub const STRINGS_PER_BUNDLE: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringValue {
    pub identifier: u32,
    pub string: String,
}

/// Decoded `STRING` resource. Strings are sharded into 16-slot bundles; the
/// absolute identifier of a slot is `(bundle_id - 1) * 16 + slot`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StringTable {
    table: LanguageTable<StringValue>,
}

impl StringTable {
    pub(crate) fn read(resource: &ResourceEntry, context: &StreamContext) -> crate::Result<Self> {
        let mut table = LanguageTable::new();

        for_each_language_leaf(resource, |item, lcid, descriptor| {
            let bundle_id = item.identifier().ok_or(RsrcError::InvalidData {
                target: "string table",
                reason: "bundle entry carries a name instead of an identifier".into(),
            })?;
            if bundle_id == 0 {
                return Err(RsrcError::InvalidBundleIdentifier);
            }

            let data = read_descriptor_data(context, descriptor)?;
            decode_bundle(&data, bundle_id, table.entry_mut_or_insert(lcid))
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

    pub fn strings(&self, lcid: u32) -> Option<&[StringValue]> {
        self.table.get_by_lcid(lcid).map(|entry| entry.values.as_slice())
    }

    pub fn languages(&self) -> impl Iterator<Item = u32> + '_ {
        self.table.languages()
    }

    pub fn number_of_languages(&self) -> usize {
        self.table.number_of_languages()
    }
}

/// Decodes one 16-slot bundle. Empty slots are skipped but still consumed;
/// the bundle must account for the whole leaf.
fn decode_bundle(
    data: &[u8],
    bundle_id: u32,
    entry: &mut LanguageEntry<StringValue>,
) -> crate::Result<()> {
    let mut cursor = Cursor::new(data);

    for slot in 0..STRINGS_PER_BUNDLE {
        let length = cursor.read_u16::<LittleEndian>()? as usize;
        let mut units = vec![0u16; length];
        cursor.read_u16_into::<LittleEndian>(&mut units)?;

        if length == 0 {
            continue;
        }

        let identifier = (bundle_id - 1) * STRINGS_PER_BUNDLE + slot;
        if entry.values.iter().any(|value| value.identifier == identifier) {
            return Err(RsrcError::ValueAlreadySet { identifier, lcid: entry.lcid });
        }

        let string = String::from_utf16(&units).map_err(|_| RsrcError::InvalidData {
            target: "string table",
            reason: format!("string {identifier} is not valid UTF-16"),
        })?;
        entry.values.push(StringValue { identifier, string });
    }

    if cursor.position() != data.len() as u64 {
        return Err(RsrcError::InvalidData {
            target: "string table",
            reason: format!(
                "bundle consumed {} of {} bytes",
                cursor.position(),
                data.len()
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::LanguageTable;

    fn bundle_with(strings: &[(usize, &str)]) -> Vec<u8> {
        let mut data = Vec::new();
        for slot in 0..16 {
            match strings.iter().find(|(index, _)| *index == slot) {
                Some((_, text)) => {
                    let units: Vec<u16> = text.encode_utf16().collect();
                    data.extend_from_slice(&(units.len() as u16).to_le_bytes());
                    for unit in units {
                        data.extend_from_slice(&unit.to_le_bytes());
                    }
                }
                None => data.extend_from_slice(&[0, 0]),
            }
        }
        data
    }

    #[test]
    fn decode_single_string() {
        let data = bundle_with(&[(0, "Hello")]);
        assert_eq!(data.len(), 42);

        let mut table: LanguageTable<StringValue> = LanguageTable::new();
        decode_bundle(&data, 1, table.entry_mut_or_insert(0x409)).unwrap();

        let entry = table.get_by_lcid(0x409).unwrap();
        assert_eq!(entry.values.len(), 1);
        assert_eq!(entry.values[0].identifier, 0);
        assert_eq!(entry.values[0].string, "Hello");
    }

    #[test]
    fn identifier_uses_bundle_base() {
        let data = bundle_with(&[(2, "Third"), (15, "Last")]);

        let mut table: LanguageTable<StringValue> = LanguageTable::new();
        decode_bundle(&data, 3, table.entry_mut_or_insert(0x409)).unwrap();

        let entry = table.get_by_lcid(0x409).unwrap();
        assert_eq!(entry.values[0].identifier, (3 - 1) * 16 + 2);
        assert_eq!(entry.values[1].identifier, (3 - 1) * 16 + 15);
    }

    #[test]
    fn short_bundle_fails() {
        // 15 slots only
        let data = vec![0u8; 30];
        let mut table: LanguageTable<StringValue> = LanguageTable::new();
        let result = decode_bundle(&data, 1, table.entry_mut_or_insert(0x409));
        assert!(matches!(result, Err(RsrcError::Io(_))));
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut data = bundle_with(&[(0, "A")]);
        data.push(0);
        let mut table: LanguageTable<StringValue> = LanguageTable::new();
        let result = decode_bundle(&data, 1, table.entry_mut_or_insert(0x409));
        assert!(matches!(result, Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn duplicate_slot_fails() {
        let data = bundle_with(&[(4, "Twice")]);
        let mut table: LanguageTable<StringValue> = LanguageTable::new();
        decode_bundle(&data, 2, table.entry_mut_or_insert(0x409)).unwrap();

        let result = decode_bundle(&data, 2, table.entry_mut_or_insert(0x409));
        assert!(matches!(
            result,
            Err(RsrcError::ValueAlreadySet { identifier: 20, lcid: 0x409 })
        ));
    }
}
