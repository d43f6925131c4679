#![allow(non_camel_case_types)]

pub mod tree;

use std::{fmt::Display, io::Cursor, mem::size_of};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    errors::RsrcError,
    new_header_field,
    types::{BufReadExt, Header, HeaderField},
};

pub const NODE_HEADER_LENGTH: u64 = 16;
pub const NODE_ENTRY_LENGTH: u64 = 8;
pub const DATA_DESCRIPTOR_LENGTH: u64 = 16;

const MSB_FLAG: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7fff_ffff;

/// Resource type of a level-1 directory entry. Numeric values follow the
/// predefined `RT_*` identifiers; `MUI` and `WEVT_TEMPLATE` are recognized
/// by name only.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum ResourceKind {
    CURSOR = 1,
    BITMAP = 2,
    ICON = 3,
    MENU = 4,
    DIALOG = 5,
    STRING = 6,
    FONTDIR = 7,
    FONT = 8,
    ACCELERATOR = 9,
    RC_DATA = 10,
    MESSAGE_TABLE = 11,
    GROUP_CURSOR = 12,
    GROUP_ICON = 14,
    VERSION = 16,
    DLG_INCLUDE = 17,
    PLUG_PLAY = 19,
    VXD = 20,
    ANIMATED_CURSOR = 21,
    ANIMATED_ICON = 22,
    HTML = 23,
    MANIFEST = 24,
    MUI,
    WEVT_TEMPLATE,
    UNKNOWN(u32),
}

impl Default for ResourceKind {
    fn default() -> Self {
        Self::UNKNOWN(0)
    }
}

impl From<u32> for ResourceKind {
    fn from(value: u32) -> Self {
        match value {
            01 => Self::CURSOR,
            02 => Self::BITMAP,
            03 => Self::ICON,
            04 => Self::MENU,
            05 => Self::DIALOG,
            06 => Self::STRING,
            07 => Self::FONTDIR,
            08 => Self::FONT,
            09 => Self::ACCELERATOR,
            10 => Self::RC_DATA,
            11 => Self::MESSAGE_TABLE,
            12 => Self::GROUP_CURSOR,
            14 => Self::GROUP_ICON,
            16 => Self::VERSION,
            17 => Self::DLG_INCLUDE,
            19 => Self::PLUG_PLAY,
            20 => Self::VXD,
            21 => Self::ANIMATED_CURSOR,
            22 => Self::ANIMATED_ICON,
            23 => Self::HTML,
            24 => Self::MANIFEST,
            _  => Self::UNKNOWN(value),
        }
    }
}

impl ResourceKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "MUI" => Self::MUI,
            "WEVT_TEMPLATE" => Self::WEVT_TEMPLATE,
            _ => Self::UNKNOWN(0),
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UNKNOWN(value) => write!(f, "UNKNOWN({value})"),
            _ => write!(f, "{self:?}"),
        }
    }
}


/// Leaf payload locator. The virtual address is relative to the PE image
/// base; the tree reader translates it against the stream's base VA.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DataDescriptor {
    pub virtual_address: HeaderField<u32>,
    pub size: HeaderField<u32>,
    pub code_page: HeaderField<u32>,
    #[serde(skip_serializing)]
    reserved: HeaderField<u32>,
}

impl DataDescriptor {
    pub fn read_at(reader: &mut dyn BufReadExt, offset: u64) -> crate::Result<Self> {
        let bytes = reader.read_bytes_at_offset(offset, DATA_DESCRIPTOR_LENGTH as usize)?;
        Self::parse_bytes(bytes, offset)
    }

    pub fn reserved(&self) -> u32 {
        self.reserved.value
    }
}

impl Header for DataDescriptor {
    fn parse_bytes(bytes: Vec<u8>, pos: u64) -> crate::Result<Self> where Self: Sized {
        let bytes_len = bytes.len() as u64;

        if bytes_len < DATA_DESCRIPTOR_LENGTH {
            return Err(RsrcError::BufferTooSmall {
                target: "DataDescriptor".into(),
                expected: DATA_DESCRIPTOR_LENGTH,
                actual: bytes_len,
            });
        }

        let mut hdr = Self::default();
        let mut offset = pos;
        let mut cursor = Cursor::new(bytes);

        hdr.virtual_address = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        hdr.size = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        hdr.code_page = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        hdr.reserved = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        Ok(hdr)
    }

    fn is_valid(&self) -> bool {
        self.reserved.value == 0
    }

    fn length() -> usize {
        DATA_DESCRIPTOR_LENGTH as usize
    }
}

impl Display for DataDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ VA: {:#010x}, Size: {}, CodePage: {} }}",
            self.virtual_address.value, self.size.value, self.code_page.value)
    }
}


/// 16-byte prefix of every resource directory node.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ResourceNodeHeader {
    pub flags: HeaderField<u32>,
    pub creation_time: HeaderField<DateTime<Utc>>,
    pub major_version: HeaderField<u16>,
    pub minor_version: HeaderField<u16>,
    pub named_entry_count: HeaderField<u16>,
    pub id_entry_count: HeaderField<u16>,
}

impl ResourceNodeHeader {
    pub fn read_at(reader: &mut dyn BufReadExt, offset: u64) -> crate::Result<Self> {
        let bytes = reader.read_bytes_at_offset(offset, NODE_HEADER_LENGTH as usize)?;
        Self::parse_bytes(bytes, offset)
    }

    /// Total entry count in u32 so 0xffff named + 0xffff id entries do not
    /// wrap.
    pub fn number_of_entries(&self) -> u32 {
        self.named_entry_count.value as u32 + self.id_entry_count.value as u32
    }
}

impl Header for ResourceNodeHeader {
    fn parse_bytes(bytes: Vec<u8>, pos: u64) -> crate::Result<Self> where Self: Sized {
        let bytes_len = bytes.len() as u64;

        if bytes_len < NODE_HEADER_LENGTH {
            return Err(RsrcError::BufferTooSmall {
                target: "ResourceNodeHeader".into(),
                expected: NODE_HEADER_LENGTH,
                actual: bytes_len,
            });
        }

        let mut hdr = Self::default();
        let mut offset = pos;
        let mut cursor = Cursor::new(bytes);

        hdr.flags = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        if hdr.flags.value != 0 {
            return Err(RsrcError::UnsupportedNodeFlags(hdr.flags.value));
        }

        let data = cursor.read_u32::<LittleEndian>()?;
        let ts = DateTime::<Utc>::from_timestamp(data.into(), 0)
            .ok_or(RsrcError::InvalidTimestamp(data.into()))?;
        hdr.creation_time = HeaderField { value: ts, offset, rva: offset };
        offset += size_of::<u32>() as u64;

        hdr.major_version = new_header_field!(cursor.read_u16::<LittleEndian>()?, offset);
        hdr.minor_version = new_header_field!(cursor.read_u16::<LittleEndian>()?, offset);
        hdr.named_entry_count = new_header_field!(cursor.read_u16::<LittleEndian>()?, offset);
        hdr.id_entry_count = new_header_field!(cursor.read_u16::<LittleEndian>()?, offset);

        Ok(hdr)
    }

    fn is_valid(&self) -> bool {
        self.flags.value == 0
    }

    fn length() -> usize {
        NODE_HEADER_LENGTH as usize
    }
}

impl Display for ResourceNodeHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ Flags: {:#010x}, Created: {}, Version: {}.{}, NamedEntries: {}, IdEntries: {} }}",
            self.flags.value, self.creation_time.value, self.major_version.value,
            self.minor_version.value, self.named_entry_count.value, self.id_entry_count.value)
    }
}


/// 8-byte directory slot. The MSB of `key` selects between an inline name
/// and a numeric identifier; the MSB of `child` selects between a
/// subdirectory offset and a data descriptor offset.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ResourceNodeEntry {
    pub key: HeaderField<u32>,
    pub child: HeaderField<u32>,
    pub name: Option<String>,
    pub kind: ResourceKind,
}

impl ResourceNodeEntry {
    pub fn is_named(&self) -> bool {
        self.key.value & MSB_FLAG != 0
    }

    pub fn name_offset(&self) -> u32 {
        self.key.value & OFFSET_MASK
    }

    pub fn identifier(&self) -> Option<u32> {
        if self.is_named() { None } else { Some(self.key.value) }
    }

    pub fn is_directory(&self) -> bool {
        self.child.value & MSB_FLAG != 0
    }

    pub fn child_offset(&self) -> u32 {
        self.child.value & OFFSET_MASK
    }

    pub fn name_utf8(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn name_utf16(&self) -> Option<Vec<u16>> {
        self.name.as_ref().map(|name| name.encode_utf16().collect())
    }

    /// Resolves the inline counted name the key points at.
    pub(crate) fn read_name(&mut self, reader: &mut dyn BufReadExt) -> crate::Result<()> {
        if self.is_named() {
            self.name = Some(reader.read_wchar_string_at_offset(self.name_offset() as u64)?);
        }
        Ok(())
    }

    /// Assigns the resource kind. Only meaningful for level-1 entries.
    pub(crate) fn classify(&mut self) {
        self.kind = match (&self.name, self.identifier()) {
            (Some(name), _) => ResourceKind::from_name(name),
            (None, Some(id)) => ResourceKind::from(id),
            (None, None) => ResourceKind::UNKNOWN(0),
        };
    }

    /// On-disk ordering: named entries first (by name), then numeric
    /// identifiers ascending. Duplicates compare equal; input order decides.
    pub fn compare(&self, other: &Self) -> std::cmp::Ordering {
        match (self.identifier(), other.identifier()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (None, None) => self.name.cmp(&other.name),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
        }
    }
}

impl Header for ResourceNodeEntry {
    fn parse_bytes(bytes: Vec<u8>, pos: u64) -> crate::Result<Self> where Self: Sized {
        let bytes_len = bytes.len() as u64;

        if bytes_len < NODE_ENTRY_LENGTH {
            return Err(RsrcError::BufferTooSmall {
                target: "ResourceNodeEntry".into(),
                expected: NODE_ENTRY_LENGTH,
                actual: bytes_len,
            });
        }

        let mut hdr = Self::default();
        let mut offset = pos;
        let mut cursor = Cursor::new(bytes);

        hdr.key = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        hdr.child = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        Ok(hdr)
    }

    fn is_valid(&self) -> bool {
        self.key.value != 0 || self.child.value != 0
    }

    fn length() -> usize {
        NODE_ENTRY_LENGTH as usize
    }
}

impl Display for ResourceNodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.name, self.identifier()) {
            (Some(name), _) => write!(f, "{{ Name: {name}, Child: {:#010x} }}", self.child.value),
            (None, Some(id)) => write!(f, "{{ Id: {id}, Child: {:#010x} }}", self.child.value),
            (None, None) => write!(f, "{{ Child: {:#010x} }}", self.child.value),
        }
    }
}
