use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{
    errors::RsrcError,
    rsrc::tree::ResourceEntry,
    stream::StreamContext,
};

use super::{read_descriptor_data, for_each_language_leaf, LanguageTable};

const ROOT_KEY: &str = "VS_VERSION_INFO";
const STRING_FILE_INFO_KEY: &str = "StringFileInfo";
const VAR_FILE_INFO_KEY: &str = "VarFileInfo";
const TRANSLATION_KEY: &str = "Translation";

const FIXED_FILE_INFO_SIGNATURE: u32 = 0xfeef04bd;
const FIXED_FILE_INFO_LENGTH: usize = 52;
const BLOCK_HEADER_LENGTH: usize = 6;

/// `VS_FIXEDFILEINFO` value of the root block. The 64-bit versions combine
/// the on-disk `(ms, ls)` pairs as `(ms << 32) | ls`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct FixedFileInfo {
    pub structure_version: u32,
    pub file_version: u64,
    pub product_version: u64,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionString {
    pub key: String,
    pub value: String,
}

/// One `StringFileInfo` child: key is the 8-hex-digit language/codepage
/// pair, e.g. `040904B0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionStringTable {
    pub key: String,
    pub strings: Vec<VersionString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Translation {
    pub language: u16,
    pub codepage: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct VersionValue {
    pub fixed_info: FixedFileInfo,
    pub string_tables: Vec<VersionStringTable>,
    pub translations: Vec<Translation>,
}

/// Decoded `VERSION` resource.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct VersionInformation {
    table: LanguageTable<VersionValue>,
}

impl VersionInformation {
    pub(crate) fn read(resource: &ResourceEntry, context: &StreamContext) -> crate::Result<Self> {
        let mut table = LanguageTable::new();

        for_each_language_leaf(resource, |_, lcid, descriptor| {
            let data = read_descriptor_data(context, descriptor)?;
            let value = decode_version(&data)?;
            table.entry_mut_or_insert(lcid).values.push(value);
            Ok(())
        })?;

        Ok(Self { table })
    }

    pub fn fixed_info(&self, lcid: u32) -> Option<&FixedFileInfo> {
        self.value(lcid).map(|value| &value.fixed_info)
    }

    pub fn file_version(&self, lcid: u32) -> Option<u64> {
        self.fixed_info(lcid).map(|info| info.file_version)
    }

    pub fn product_version(&self, lcid: u32) -> Option<u64> {
        self.fixed_info(lcid).map(|info| info.product_version)
    }

    /// Looks a string up by key, e.g. `CompanyName`, across the language's
    /// string tables.
    pub fn string(&self, lcid: u32, key: &str) -> Option<&str> {
        self.value(lcid)?
            .string_tables
            .iter()
            .flat_map(|table| table.strings.iter())
            .find(|string| string.key == key)
            .map(|string| string.value.as_str())
    }

    pub fn translations(&self, lcid: u32) -> Option<&[Translation]> {
        self.value(lcid).map(|value| value.translations.as_slice())
    }

    pub fn value(&self, lcid: u32) -> Option<&VersionValue> {
        self.table.get_by_lcid(lcid)?.values.first()
    }

    pub fn languages(&self) -> impl Iterator<Item = u32> + '_ {
        self.table.languages()
    }

    pub fn number_of_languages(&self) -> usize {
        self.table.number_of_languages()
    }
}

/// A `(length, value_length, type, key, value, children)` block. All
/// offsets are absolute within the leaf; every region is 32-bit aligned.
#[derive(Debug)]
struct Block {
    end: usize,
    data_type: u16,
    key: String,
    value_start: usize,
    value_end: usize,
    children_start: usize,
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

fn invalid(reason: String) -> RsrcError {
    RsrcError::InvalidData { target: "version information", reason }
}

fn read_block(data: &[u8], start: usize) -> crate::Result<Block> {
    if start % 4 != 0 {
        return Err(invalid(format!("block at offset {start:#010x} is not 32-bit aligned")));
    }
    if start + BLOCK_HEADER_LENGTH > data.len() {
        return Err(invalid(format!("block header at offset {start:#010x} escapes the leaf")));
    }

    let mut cursor = Cursor::new(&data[start..start + BLOCK_HEADER_LENGTH]);
    let length = cursor.read_u16::<LittleEndian>()? as usize;
    let value_length = cursor.read_u16::<LittleEndian>()? as usize;
    let data_type = cursor.read_u16::<LittleEndian>()?;

    if data_type > 1 {
        return Err(invalid(format!("block value type {data_type} at offset {start:#010x}")));
    }

    let end = start + length;
    if length < BLOCK_HEADER_LENGTH || end > data.len() {
        return Err(invalid(format!("block length {length} at offset {start:#010x}")));
    }

    let mut pos = start + BLOCK_HEADER_LENGTH;
    let mut units = Vec::new();
    loop {
        if pos + 2 > end {
            return Err(invalid(format!("unterminated block key at offset {start:#010x}")));
        }
        let unit = u16::from_le_bytes([data[pos], data[pos + 1]]);
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    let key = String::from_utf16(&units)
        .map_err(|_| invalid(format!("block key at offset {start:#010x} is not valid UTF-16")))?;

    let value_bytes = if data_type == 1 { value_length * 2 } else { value_length };
    let value_start = if value_bytes == 0 { end.min(align4(pos)) } else { align4(pos) };
    let value_end = value_start + value_bytes;
    if value_end > end {
        return Err(invalid(format!("value of block `{key}` escapes the block")));
    }

    Ok(Block {
        end,
        data_type,
        key,
        value_start,
        value_end,
        children_start: align4(value_end),
    })
}

/// Parses the consecutive 32-bit aligned child blocks of `parent`.
fn read_children(data: &[u8], parent: &Block) -> crate::Result<Vec<Block>> {
    let mut children = Vec::new();
    let mut pos = parent.children_start;

    while pos < parent.end {
        let child = read_block(data, pos)?;
        if child.end > parent.end {
            return Err(invalid(format!(
                "child block `{}` escapes its parent `{}`",
                child.key, parent.key
            )));
        }
        pos = align4(child.end);
        children.push(child);
    }

    Ok(children)
}

fn decode_version(data: &[u8]) -> crate::Result<VersionValue> {
    let root = read_block(data, 0)?;
    if root.key != ROOT_KEY {
        return Err(invalid(format!("root block key is `{}`", root.key)));
    }
    if root.data_type != 0 {
        return Err(invalid("root block value is not binary".into()));
    }

    let fixed_info = decode_fixed_info(&data[root.value_start..root.value_end])?;
    let mut value = VersionValue { fixed_info, ..Default::default() };

    for child in read_children(data, &root)? {
        match child.key.as_str() {
            STRING_FILE_INFO_KEY => {
                for table in read_children(data, &child)? {
                    value.string_tables.push(decode_string_table(data, &table)?);
                }
            }
            VAR_FILE_INFO_KEY => {
                for var in read_children(data, &child)? {
                    if var.key != TRANSLATION_KEY {
                        return Err(invalid(format!("unexpected var block `{}`", var.key)));
                    }
                    decode_translations(&data[var.value_start..var.value_end], &mut value.translations)?;
                }
            }
            other => return Err(invalid(format!("unexpected child block `{other}`"))),
        }
    }

    Ok(value)
}

fn decode_fixed_info(value: &[u8]) -> crate::Result<FixedFileInfo> {
    if value.len() != FIXED_FILE_INFO_LENGTH {
        return Err(invalid(format!("fixed file info is {} bytes", value.len())));
    }

    let mut cursor = Cursor::new(value);
    let signature = cursor.read_u32::<LittleEndian>()?;
    if signature != FIXED_FILE_INFO_SIGNATURE {
        return Err(RsrcError::SignatureMismatch {
            target: "fixed file info",
            expected: FIXED_FILE_INFO_SIGNATURE as u64,
            actual: signature as u64,
        });
    }

    let structure_version = cursor.read_u32::<LittleEndian>()?;
    let file_version_ms = cursor.read_u32::<LittleEndian>()?;
    let file_version_ls = cursor.read_u32::<LittleEndian>()?;
    let product_version_ms = cursor.read_u32::<LittleEndian>()?;
    let product_version_ls = cursor.read_u32::<LittleEndian>()?;
    let file_flags_mask = cursor.read_u32::<LittleEndian>()?;
    let file_flags = cursor.read_u32::<LittleEndian>()?;
    let file_os = cursor.read_u32::<LittleEndian>()?;
    let file_type = cursor.read_u32::<LittleEndian>()?;
    let file_subtype = cursor.read_u32::<LittleEndian>()?;
    let file_date_ms = cursor.read_u32::<LittleEndian>()?;
    let file_date_ls = cursor.read_u32::<LittleEndian>()?;

    Ok(FixedFileInfo {
        structure_version,
        file_version: (file_version_ms as u64) << 32 | file_version_ls as u64,
        product_version: (product_version_ms as u64) << 32 | product_version_ls as u64,
        file_flags_mask,
        file_flags,
        file_os,
        file_type,
        file_subtype,
        file_date: (file_date_ms as u64) << 32 | file_date_ls as u64,
    })
}

fn decode_string_table(data: &[u8], table: &Block) -> crate::Result<VersionStringTable> {
    if table.key.len() != 8 || !table.key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid(format!("string table key `{}` is not a language/codepage pair", table.key)));
    }

    let mut strings = Vec::new();
    for string in read_children(data, table)? {
        let value = decode_string_value(&data[string.value_start..string.value_end])?;
        strings.push(VersionString { key: string.key, value });
    }

    Ok(VersionStringTable { key: table.key.clone(), strings })
}

fn decode_string_value(value: &[u8]) -> crate::Result<String> {
    if value.len() % 2 != 0 {
        return Err(invalid(format!("string value has odd length {}", value.len())));
    }

    let units: Vec<u16> = value
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let string = String::from_utf16(&units)
        .map_err(|_| invalid("string value is not valid UTF-16".into()))?;
    Ok(string.trim_end_matches('\0').to_string())
}

fn decode_translations(value: &[u8], translations: &mut Vec<Translation>) -> crate::Result<()> {
    if value.len() % 4 != 0 {
        return Err(invalid(format!("translation value has length {}", value.len())));
    }

    for pair in value.chunks_exact(4) {
        translations.push(Translation {
            language: u16::from_le_bytes([pair[0], pair[1]]),
            codepage: u16::from_le_bytes([pair[2], pair[3]]),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(key: &str, data_type: u16, value: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0u8; BLOCK_HEADER_LENGTH];
        for unit in key.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
        if !value.is_empty() {
            while out.len() % 4 != 0 {
                out.push(0);
            }
            out.extend_from_slice(value);
        }
        for child in children {
            while out.len() % 4 != 0 {
                out.push(0);
            }
            out.extend_from_slice(child);
        }

        let length = out.len() as u16;
        out[0..2].copy_from_slice(&length.to_le_bytes());
        let value_length = if data_type == 1 { value.len() / 2 } else { value.len() } as u16;
        out[2..4].copy_from_slice(&value_length.to_le_bytes());
        out[4..6].copy_from_slice(&data_type.to_le_bytes());
        out
    }

    fn utf16_value(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
        out
    }

    fn fixed_info_value(file_version: u64, product_version: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&FIXED_FILE_INFO_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&0x00010000u32.to_le_bytes());
        out.extend_from_slice(&((file_version >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&(file_version as u32).to_le_bytes());
        out.extend_from_slice(&((product_version >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&(product_version as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 4 * 7]);
        out
    }

    fn sample_version() -> Vec<u8> {
        let string_table = block(
            "040904B0",
            1,
            &[],
            &[
                block("CompanyName", 1, &utf16_value("Contoso"), &[]),
                block("FileVersion", 1, &utf16_value("1.2.3.4"), &[]),
            ],
        );
        let string_file_info = block(STRING_FILE_INFO_KEY, 1, &[], &[string_table]);
        let translation = block(TRANSLATION_KEY, 0, &[0x09, 0x04, 0xb0, 0x04], &[]);
        let var_file_info = block(VAR_FILE_INFO_KEY, 1, &[], &[translation]);

        block(
            ROOT_KEY,
            0,
            &fixed_info_value(0x0001_0002_0003_0004, 0x0001_0002_0000_0000),
            &[string_file_info, var_file_info],
        )
    }

    #[test]
    fn decode_sample() {
        let value = decode_version(&sample_version()).unwrap();

        assert_eq!(value.fixed_info.file_version, 0x0001_0002_0003_0004);
        assert_eq!(value.fixed_info.product_version, 0x0001_0002_0000_0000);
        assert_eq!(value.fixed_info.structure_version, 0x00010000);

        assert_eq!(value.string_tables.len(), 1);
        assert_eq!(value.string_tables[0].key, "040904B0");
        assert_eq!(value.string_tables[0].strings[0].key, "CompanyName");
        assert_eq!(value.string_tables[0].strings[0].value, "Contoso");
        assert_eq!(value.string_tables[0].strings[1].value, "1.2.3.4");

        assert_eq!(value.translations, [Translation { language: 0x0409, codepage: 0x04b0 }]);
    }

    #[test]
    fn bad_signature_fails() {
        let mut fixed = fixed_info_value(0, 0);
        fixed[0] = 0xaa;
        let root = block(ROOT_KEY, 0, &fixed, &[]);
        assert!(matches!(
            decode_version(&root),
            Err(RsrcError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn wrong_root_key_fails() {
        let root = block("VS_SOMETHING_ELSE", 0, &fixed_info_value(0, 0), &[]);
        assert!(matches!(decode_version(&root), Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn unexpected_child_fails() {
        let child = block("OddInfo", 1, &[], &[]);
        let root = block(ROOT_KEY, 0, &fixed_info_value(0, 0), &[child]);
        assert!(matches!(decode_version(&root), Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn truncated_fixed_info_fails() {
        let root = block(ROOT_KEY, 0, &fixed_info_value(0, 0)[..48], &[]);
        assert!(matches!(decode_version(&root), Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn child_escaping_parent_fails() {
        let mut root = block(ROOT_KEY, 0, &fixed_info_value(0, 0), &[block("StringFileInfo", 1, &[], &[])]);
        // shrink the root length below its children's end
        let short = (root.len() - 4) as u16;
        root[0..2].copy_from_slice(&short.to_le_bytes());
        assert!(matches!(decode_version(&root), Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn odd_translation_length_fails() {
        let translation = block(TRANSLATION_KEY, 0, &[0x09, 0x04], &[]);
        let var_file_info = block(VAR_FILE_INFO_KEY, 1, &[], &[translation]);
        let root = block(ROOT_KEY, 0, &fixed_info_value(0, 0), &[var_file_info]);
        assert!(matches!(decode_version(&root), Err(RsrcError::InvalidData { .. })));
    }

    #[test]
    fn bad_string_table_key_fails() {
        let table = block("NotHexDig", 1, &[], &[]);
        let string_file_info = block(STRING_FILE_INFO_KEY, 1, &[], &[table]);
        let root = block(ROOT_KEY, 0, &fixed_info_value(0, 0), &[string_file_info]);
        assert!(matches!(decode_version(&root), Err(RsrcError::InvalidData { .. })));
    }
}
