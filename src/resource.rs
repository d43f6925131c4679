use std::{
    cell::RefCell,
    io::{Read, Seek, SeekFrom},
    rc::Rc,
};

use crate::{
    errors::RsrcError,
    rsrc::{tree::ResourceEntry, DataDescriptor, ResourceKind},
    stream::StreamContext,
    values::{
        manifest::ManifestResource, message_table::MessageTable, mui::MuiResource,
        string_table::StringTable, version::VersionInformation,
    },
};

/// Decoded values of a typed resource. The set is closed by the file
/// format; raw kinds (icons, bitmaps, ...) are read through `ResourceItem`.
#[derive(Debug, Clone)]
pub enum ResourceValues {
    StringTable(Rc<StringTable>),
    MessageTable(Rc<MessageTable>),
    Version(Rc<VersionInformation>),
    Mui(Rc<MuiResource>),
    Manifest(Rc<ManifestResource>),
}

/// A level-1 entry of the resource tree: one resource kind with its items
/// and languages below it.
pub struct Resource<'a> {
    context: StreamContext,
    entry: &'a ResourceEntry,
    values: RefCell<Option<ResourceValues>>,
}

impl<'a> Resource<'a> {
    pub(crate) fn new(context: StreamContext, entry: &'a ResourceEntry) -> Self {
        Self { context, entry, values: RefCell::new(None) }
    }

    pub fn kind(&self) -> ResourceKind {
        self.entry.entry.kind
    }

    pub fn identifier(&self) -> Option<u32> {
        self.entry.entry.identifier()
    }

    pub fn name_utf8(&self) -> Option<&str> {
        self.entry.entry.name_utf8()
    }

    pub fn name_utf16(&self) -> Option<Vec<u16>> {
        self.entry.entry.name_utf16()
    }

    pub fn number_of_items(&self) -> usize {
        self.entry.children().len()
    }

    pub fn item(&self, index: usize) -> Option<ResourceItem<'a>> {
        let entry = self.entry.children().get(index)?;
        Some(ResourceItem::new(self.context.clone(), entry))
    }

    pub fn items(&self) -> ResourceItems<'a> {
        ResourceItems {
            context: self.context.clone(),
            entries: self.entry.children().iter(),
        }
    }

    /// Decodes the typed values of this resource, caching the result in the
    /// handle. Repeated calls return the same table; a failed decode caches
    /// nothing and may be retried.
    pub fn values(&self) -> crate::Result<ResourceValues> {
        if let Some(values) = self.values.borrow().as_ref() {
            return Ok(values.clone());
        }

        let values = match self.kind() {
            ResourceKind::STRING => {
                ResourceValues::StringTable(Rc::new(StringTable::read(self.entry, &self.context)?))
            }
            ResourceKind::MESSAGE_TABLE => {
                ResourceValues::MessageTable(Rc::new(MessageTable::read(self.entry, &self.context)?))
            }
            ResourceKind::VERSION => {
                ResourceValues::Version(Rc::new(VersionInformation::read(self.entry, &self.context)?))
            }
            ResourceKind::MUI => {
                ResourceValues::Mui(Rc::new(MuiResource::read(self.entry, &self.context)?))
            }
            ResourceKind::MANIFEST => {
                ResourceValues::Manifest(Rc::new(ManifestResource::read(self.entry, &self.context)?))
            }
            _ => return Err(RsrcError::InvalidArgument("resource kind has no typed decoder")),
        };

        *self.values.borrow_mut() = Some(values.clone());
        Ok(values)
    }

    pub fn string_table(&self) -> crate::Result<Rc<StringTable>> {
        match self.values()? {
            ResourceValues::StringTable(table) => Ok(table),
            _ => Err(RsrcError::InvalidArgument("resource is not a string table")),
        }
    }

    pub fn message_table(&self) -> crate::Result<Rc<MessageTable>> {
        match self.values()? {
            ResourceValues::MessageTable(table) => Ok(table),
            _ => Err(RsrcError::InvalidArgument("resource is not a message table")),
        }
    }

    pub fn version_information(&self) -> crate::Result<Rc<VersionInformation>> {
        match self.values()? {
            ResourceValues::Version(version) => Ok(version),
            _ => Err(RsrcError::InvalidArgument("resource is not version information")),
        }
    }

    pub fn mui(&self) -> crate::Result<Rc<MuiResource>> {
        match self.values()? {
            ResourceValues::Mui(mui) => Ok(mui),
            _ => Err(RsrcError::InvalidArgument("resource is not a MUI resource")),
        }
    }

    pub fn manifest(&self) -> crate::Result<Rc<ManifestResource>> {
        match self.values()? {
            ResourceValues::Manifest(manifest) => Ok(manifest),
            _ => Err(RsrcError::InvalidArgument("resource is not a manifest")),
        }
    }
}

impl PartialEq for Resource<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.entry, other.entry)
    }
}

impl std::fmt::Debug for Resource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind())
            .field("identifier", &self.identifier())
            .field("name", &self.name_utf8())
            .finish()
    }
}

pub struct ResourceItems<'a> {
    context: StreamContext,
    entries: std::slice::Iter<'a, ResourceEntry>,
}

impl<'a> Iterator for ResourceItems<'a> {
    type Item = ResourceItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        Some(ResourceItem::new(self.context.clone(), entry))
    }
}

/// A cursor over one node of a resource's subtree. Leaf items expose their
/// payload bytes through `read`/`seek`; directory items expose sub items.
pub struct ResourceItem<'a> {
    context: StreamContext,
    item: &'a ResourceEntry,
    position: i64,
}

impl<'a> ResourceItem<'a> {
    pub(crate) fn new(context: StreamContext, item: &'a ResourceEntry) -> Self {
        Self { context, item, position: 0 }
    }

    pub fn identifier(&self) -> Option<u32> {
        self.item.entry.identifier()
    }

    pub fn name_utf8(&self) -> Option<&str> {
        self.item.entry.name_utf8()
    }

    pub fn name_utf16(&self) -> Option<Vec<u16>> {
        self.item.entry.name_utf16()
    }

    pub fn descriptor(&self) -> Option<&'a DataDescriptor> {
        self.item.descriptor()
    }

    /// Payload size in bytes; 0 for directory items.
    pub fn size(&self) -> u32 {
        self.descriptor().map_or(0, |descriptor| descriptor.size.value)
    }

    pub fn number_of_sub_items(&self) -> usize {
        self.item.children().len()
    }

    pub fn sub_item(&self, index: usize) -> Option<ResourceItem<'a>> {
        self.item
            .children()
            .get(index)
            .map(|entry| ResourceItem::new(self.context.clone(), entry))
    }

    pub fn sub_items(&self) -> ResourceItems<'a> {
        ResourceItems {
            context: self.context.clone(),
            entries: self.item.children().iter(),
        }
    }

    /// Reads up to `buf.len()` bytes at the current position. Returns 0 at
    /// or past the end of the payload.
    pub fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        let descriptor = self
            .item
            .descriptor()
            .ok_or(RsrcError::InvalidArgument("resource item has no data descriptor"))?;

        let size = descriptor.size.value as i64;
        if self.position >= size {
            return Ok(0);
        }

        let remaining = (size - self.position) as usize;
        let count = buf.len().min(remaining);
        let file_offset = descriptor.virtual_address.value as u64
            - self.context.base_virtual_address as u64
            + self.position as u64;

        let mut reader = self.context.reader.borrow_mut();
        reader.seek(SeekFrom::Start(file_offset))?;
        reader.read_exact(&mut buf[..count])?;

        self.position += count as i64;
        Ok(count)
    }

    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> crate::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }

    /// Seeks within the payload. Positions past the end are allowed and
    /// read as empty; a negative position is an error.
    pub fn seek(&mut self, pos: SeekFrom) -> crate::Result<i64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position + delta,
            SeekFrom::End(delta) => self.size() as i64 + delta,
        };

        if target < 0 {
            return Err(RsrcError::SeekOutOfBounds(target));
        }

        self.position = target;
        Ok(target)
    }

    pub fn tell(&self) -> i64 {
        self.position
    }
}

impl std::fmt::Debug for ResourceItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceItem")
            .field("identifier", &self.identifier())
            .field("name", &self.name_utf8())
            .field("size", &self.size())
            .finish()
    }
}
