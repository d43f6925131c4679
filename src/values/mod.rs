pub mod manifest;
pub mod message_table;
pub mod mui;
pub mod string_table;
pub mod version;

use serde::Serialize;

use crate::{
    errors::RsrcError,
    rsrc::{
        tree::{ResourceEntry, ResourceNodeData},
        DataDescriptor, ResourceNodeEntry,
    },
    stream::StreamContext,
    types::BufReadExt,
};

/// Decoded values of one language of a typed resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageEntry<T> {
    pub lcid: u32,
    pub values: Vec<T>,
}

/// Ordered collection of per-language values, keyed by LCID. Entries keep
/// the order in which their languages were first seen on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageTable<T> {
    entries: Vec<LanguageEntry<T>>,
}

impl<T> Default for LanguageTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> LanguageTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_lcid(&self, lcid: u32) -> Option<&LanguageEntry<T>> {
        self.entries.iter().find(|entry| entry.lcid == lcid)
    }

    pub fn languages(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|entry| entry.lcid)
    }

    pub fn number_of_languages(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LanguageEntry<T>> {
        self.entries.iter()
    }

    pub(crate) fn entry_mut_or_insert(&mut self, lcid: u32) -> &mut LanguageEntry<T> {
        let index = match self.entries.iter().position(|entry| entry.lcid == lcid) {
            Some(index) => index,
            None => {
                self.entries.push(LanguageEntry { lcid, values: Vec::new() });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }
}

impl<'a, T> IntoIterator for &'a LanguageTable<T> {
    type Item = &'a LanguageEntry<T>;
    type IntoIter = std::slice::Iter<'a, LanguageEntry<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Reads the payload bytes a descriptor points at, translating its virtual
/// address against the stream's base VA.
pub(crate) fn read_descriptor_data(
    context: &StreamContext,
    descriptor: &DataDescriptor,
) -> crate::Result<Vec<u8>> {
    let offset = descriptor.virtual_address.value as u64 - context.base_virtual_address as u64;
    let mut reader = context.reader.borrow_mut();
    reader.read_bytes_at_offset(offset, descriptor.size.value as usize)
}

/// Walks a typed resource's level-2 children (per-resource identifiers) and
/// their level-3 leaves (languages), feeding each leaf to `visit`.
pub(crate) fn for_each_language_leaf<F>(resource: &ResourceEntry, mut visit: F) -> crate::Result<()>
where
    F: FnMut(&ResourceNodeEntry, u32, &DataDescriptor) -> crate::Result<()>,
{
    let Some(items) = resource.directory() else {
        return Err(RsrcError::InvalidData {
            target: "resource node",
            reason: "typed resource entry has no sub directory".into(),
        });
    };

    for item in &items.entries {
        let Some(languages) = item.directory() else {
            return Err(RsrcError::InvalidData {
                target: "resource node",
                reason: "resource item entry has no language directory".into(),
            });
        };

        for leaf in &languages.entries {
            let lcid = leaf.entry.identifier().ok_or(RsrcError::InvalidData {
                target: "resource node",
                reason: "language entry carries a name instead of an LCID".into(),
            })?;

            match &leaf.node {
                ResourceNodeData::Data(descriptor) => visit(&item.entry, lcid, descriptor)?,
                ResourceNodeData::Directory(_) => {
                    return Err(RsrcError::InvalidData {
                        target: "resource node",
                        reason: "language entry points at another directory".into(),
                    })
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::LanguageTable;

    #[test]
    fn keeps_first_seen_order() {
        let mut table: LanguageTable<u32> = LanguageTable::new();
        table.entry_mut_or_insert(0x409).values.push(1);
        table.entry_mut_or_insert(0x407).values.push(2);
        table.entry_mut_or_insert(0x409).values.push(3);

        let languages: Vec<u32> = table.languages().collect();
        assert_eq!(languages, [0x409, 0x407]);
        assert_eq!(table.number_of_languages(), 2);
        assert_eq!(table.get_by_lcid(0x409).unwrap().values, [1, 3]);
        assert_eq!(table.get_by_lcid(0x407).unwrap().values, [2]);
        assert!(table.get_by_lcid(0x410).is_none());
    }
}
