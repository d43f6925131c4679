use serde::Serialize;

use crate::{
    errors::RsrcError,
    rsrc::tree::ResourceEntry,
    stream::StreamContext,
};

use super::{read_descriptor_data, for_each_language_leaf, LanguageTable};

/// Decoded `MANIFEST` resource: the payload is kept verbatim as UTF-8 XML.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ManifestResource {
    table: LanguageTable<String>,
}

impl ManifestResource {
    pub(crate) fn read(resource: &ResourceEntry, context: &StreamContext) -> crate::Result<Self> {
        let mut table = LanguageTable::new();

        for_each_language_leaf(resource, |_, lcid, descriptor| {
            let data = read_descriptor_data(context, descriptor)?;
            let xml = String::from_utf8(data).map_err(|_| RsrcError::InvalidData {
                target: "manifest",
                reason: "payload is not valid UTF-8".into(),
            })?;
            table.entry_mut_or_insert(lcid).values.push(xml);
            Ok(())
        })?;

        Ok(Self { table })
    }

    pub fn xml(&self, lcid: u32) -> Option<&str> {
        self.table
            .get_by_lcid(lcid)?
            .values
            .first()
            .map(|xml| xml.as_str())
    }

    pub fn languages(&self) -> impl Iterator<Item = u32> + '_ {
        self.table.languages()
    }

    pub fn number_of_languages(&self) -> usize {
        self.table.number_of_languages()
    }
}
