use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::{
    errors::RsrcError,
    types::{BufReadExt, Header},
};

use super::{
    DataDescriptor, ResourceNodeEntry, ResourceNodeHeader,
    NODE_ENTRY_LENGTH, NODE_HEADER_LENGTH,
};

/// Upper bound on directory nesting. The format uses three levels; the
/// reader tolerates deeper trees up to this cap.
pub const MAX_NODE_DEPTH: u32 = 16;

/// A directory node: header plus its resolved entries in on-disk order.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ResourceDirectory {
    pub header: ResourceNodeHeader,
    pub entries: Vec<ResourceEntry>,
}

/// A directory slot together with the node it points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    pub entry: ResourceNodeEntry,
    pub node: ResourceNodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResourceNodeData {
    Directory(ResourceDirectory),
    Data(DataDescriptor),
}

impl ResourceEntry {
    pub fn directory(&self) -> Option<&ResourceDirectory> {
        match &self.node {
            ResourceNodeData::Directory(dir) => Some(dir),
            ResourceNodeData::Data(_) => None,
        }
    }

    pub fn descriptor(&self) -> Option<&DataDescriptor> {
        match &self.node {
            ResourceNodeData::Directory(_) => None,
            ResourceNodeData::Data(descriptor) => Some(descriptor),
        }
    }

    /// Child entries, empty for leaf entries.
    pub fn children(&self) -> &[ResourceEntry] {
        match &self.node {
            ResourceNodeData::Directory(dir) => &dir.entries,
            ResourceNodeData::Data(_) => &[],
        }
    }
}

/// Recursive reader over the resource directory starting at stream offset 0.
///
/// Every node is read in two passes: the entry array is fully parsed and
/// bounds-checked first, children are resolved after. Any violation aborts
/// the whole parse; no partial tree is returned.
pub(crate) struct TreeReader<'a> {
    reader: &'a mut dyn BufReadExt,
    stream_size: u64,
    base_virtual_address: u32,
    abort: &'a AtomicBool,
}

impl<'a> TreeReader<'a> {
    pub(crate) fn new(
        reader: &'a mut dyn BufReadExt,
        stream_size: u64,
        base_virtual_address: u32,
        abort: &'a AtomicBool,
    ) -> Self {
        Self { reader, stream_size, base_virtual_address, abort }
    }

    pub(crate) fn read_tree(&mut self) -> crate::Result<ResourceDirectory> {
        self.read_directory(0, 1)
    }

    fn read_directory(&mut self, offset: u64, level: u32) -> crate::Result<ResourceDirectory> {
        if level > MAX_NODE_DEPTH {
            return Err(RsrcError::RecursionDepthExceeded(MAX_NODE_DEPTH));
        }
        self.poll_abort()?;

        let header = ResourceNodeHeader::read_at(self.reader, offset)?;
        let number_of_entries = header.number_of_entries() as u64;
        let entries_end = offset + NODE_HEADER_LENGTH + NODE_ENTRY_LENGTH * number_of_entries;

        if entries_end > self.stream_size {
            return Err(RsrcError::OffsetOutOfBounds {
                offset: entries_end,
                lower: offset,
                upper: self.stream_size,
            });
        }

        let mut slots = Vec::with_capacity(number_of_entries as usize);

        for index in 0..number_of_entries {
            self.poll_abort()?;

            let pos = offset + NODE_HEADER_LENGTH + NODE_ENTRY_LENGTH * index;
            let bytes = self.reader.read_bytes_at_offset(pos, NODE_ENTRY_LENGTH as usize)?;
            let mut entry = ResourceNodeEntry::parse_bytes(bytes, pos)?;

            if entry.is_named() {
                let name_offset = entry.name_offset() as u64;
                if name_offset >= self.stream_size {
                    return Err(RsrcError::OffsetOutOfBounds {
                        offset: name_offset,
                        lower: entries_end,
                        upper: self.stream_size,
                    });
                }
                entry.read_name(self.reader)?;
            }

            let child_offset = entry.child_offset() as u64;
            if child_offset < entries_end || child_offset >= self.stream_size {
                return Err(RsrcError::OffsetOutOfBounds {
                    offset: child_offset,
                    lower: entries_end,
                    upper: self.stream_size,
                });
            }

            if level == 1 {
                entry.classify();
            }
            slots.push(entry);
        }

        let mut entries = Vec::with_capacity(slots.len());

        for entry in slots {
            let child_offset = entry.child_offset() as u64;
            let node = if entry.is_directory() {
                ResourceNodeData::Directory(self.read_directory(child_offset, level + 1)?)
            } else {
                let descriptor = DataDescriptor::read_at(self.reader, child_offset)?;
                self.validate_descriptor(&descriptor)?;
                ResourceNodeData::Data(descriptor)
            };
            entries.push(ResourceEntry { entry, node });
        }

        Ok(ResourceDirectory { header, entries })
    }

    fn validate_descriptor(&self, descriptor: &DataDescriptor) -> crate::Result<()> {
        let base = self.base_virtual_address as u64;
        let va = descriptor.virtual_address.value as u64;
        let end = va + descriptor.size.value as u64;

        if va < base || end > base + self.stream_size {
            return Err(RsrcError::OffsetOutOfBounds {
                offset: va,
                lower: base,
                upper: base + self.stream_size,
            });
        }
        Ok(())
    }

    fn poll_abort(&self) -> crate::Result<()> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(RsrcError::AbortRequested);
        }
        Ok(())
    }
}

pub fn display_resource_tree(
    dir: &ResourceDirectory,
    f: &mut dyn Write,
    separator: &str,
    level: u8,
) -> std::fmt::Result {
    writeln!(f, "{}Dir: {}", separator.repeat(level.into()), dir.header)?;

    for entry in &dir.entries {
        writeln!(f, "{}Entry: {}", separator.repeat((level + 1).into()), entry.entry)?;
        match &entry.node {
            ResourceNodeData::Data(descriptor) => {
                writeln!(f, "{}Data: {descriptor}", separator.repeat((level + 2).into()))?
            }
            ResourceNodeData::Directory(sub_dir) => {
                display_resource_tree(sub_dir, f, separator, level + 2)?
            }
        }
    }

    Ok(())
}
