#![allow(non_camel_case_types)]

use std::{
    cell::RefCell,
    fs::File,
    io::BufReader,
    path::Path,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bitflags::bitflags;
use serde::Serialize;

use crate::{
    errors::RsrcError,
    resource::Resource,
    rsrc::{
        tree::{ResourceDirectory, TreeReader},
        ResourceKind,
    },
    types::BufReadExt,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct AccessFlags: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
    }
}

/// ASCII codepages recognized for message table bodies. Any other
/// identifier is rejected with an unsupported-codepage error.
#[repr(u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Codepage {
    ASCII = 20127,
    WINDOWS_874 = 874,
    WINDOWS_932 = 932,
    WINDOWS_936 = 936,
    WINDOWS_949 = 949,
    WINDOWS_950 = 950,
    WINDOWS_1250 = 1250,
    WINDOWS_1251 = 1251,
    #[default]
    WINDOWS_1252 = 1252,
    WINDOWS_1253 = 1253,
    WINDOWS_1254 = 1254,
    WINDOWS_1255 = 1255,
    WINDOWS_1256 = 1256,
    WINDOWS_1257 = 1257,
    WINDOWS_1258 = 1258,
}

impl Codepage {
    pub fn from_identifier(identifier: u32) -> crate::Result<Self> {
        match identifier {
            20127 => Ok(Self::ASCII),
            874 => Ok(Self::WINDOWS_874),
            932 => Ok(Self::WINDOWS_932),
            936 => Ok(Self::WINDOWS_936),
            949 => Ok(Self::WINDOWS_949),
            950 => Ok(Self::WINDOWS_950),
            1250 => Ok(Self::WINDOWS_1250),
            1251 => Ok(Self::WINDOWS_1251),
            1252 => Ok(Self::WINDOWS_1252),
            1253 => Ok(Self::WINDOWS_1253),
            1254 => Ok(Self::WINDOWS_1254),
            1255 => Ok(Self::WINDOWS_1255),
            1256 => Ok(Self::WINDOWS_1256),
            1257 => Ok(Self::WINDOWS_1257),
            1258 => Ok(Self::WINDOWS_1258),
            other => Err(RsrcError::UnsupportedCodepage(other)),
        }
    }

    pub fn identifier(self) -> u32 {
        self as u32
    }

    pub(crate) fn decode(self, bytes: &[u8]) -> crate::Result<String> {
        let encoding = match self {
            Self::ASCII => {
                return std::str::from_utf8(bytes)
                    .ok()
                    .filter(|string| string.is_ascii())
                    .map(str::to_string)
                    .ok_or(RsrcError::InvalidData {
                        target: "codepage string",
                        reason: "non-ASCII bytes in an ASCII string".into(),
                    });
            }
            Self::WINDOWS_874 => encoding_rs::WINDOWS_874,
            Self::WINDOWS_932 => encoding_rs::SHIFT_JIS,
            Self::WINDOWS_936 => encoding_rs::GBK,
            Self::WINDOWS_949 => encoding_rs::EUC_KR,
            Self::WINDOWS_950 => encoding_rs::BIG5,
            Self::WINDOWS_1250 => encoding_rs::WINDOWS_1250,
            Self::WINDOWS_1251 => encoding_rs::WINDOWS_1251,
            Self::WINDOWS_1252 => encoding_rs::WINDOWS_1252,
            Self::WINDOWS_1253 => encoding_rs::WINDOWS_1253,
            Self::WINDOWS_1254 => encoding_rs::WINDOWS_1254,
            Self::WINDOWS_1255 => encoding_rs::WINDOWS_1255,
            Self::WINDOWS_1256 => encoding_rs::WINDOWS_1256,
            Self::WINDOWS_1257 => encoding_rs::WINDOWS_1257,
            Self::WINDOWS_1258 => encoding_rs::WINDOWS_1258,
        };

        let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            return Err(RsrcError::InvalidData {
                target: "codepage string",
                reason: format!("undecodable bytes in codepage {}", self.identifier()),
            });
        }
        Ok(decoded.into_owned())
    }
}

/// Cloneable handle that requests cooperative cancellation of an in-flight
/// `open`. The tree reader polls it between sibling entries.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn signal(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_signalled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) type SharedReader = Rc<RefCell<Box<dyn BufReadExt>>>;

/// Everything a resource handle needs from its stream: the shared reader,
/// the VA translation base and the codepage for ANSI bodies.
#[derive(Clone)]
pub(crate) struct StreamContext {
    pub(crate) reader: SharedReader,
    pub(crate) base_virtual_address: u32,
    pub(crate) stream_size: u64,
    pub(crate) ascii_codepage: Codepage,
}

/// A Windows resource section stream: owns the reader and the parsed
/// directory tree, and resolves resources by index, identifier, kind or
/// name. Single threaded; share nothing, or create one stream per thread.
pub struct ResourceStream {
    reader: Option<SharedReader>,
    root: Option<ResourceDirectory>,
    stream_size: u64,
    base_virtual_address: u32,
    ascii_codepage: Codepage,
    abort: Arc<AtomicBool>,
}

impl Default for ResourceStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStream {
    pub fn new() -> Self {
        Self {
            reader: None,
            root: None,
            stream_size: 0,
            base_virtual_address: 0,
            ascii_codepage: Codepage::default(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the virtual address the section is mapped at. Data descriptor
    /// VAs are translated against this base.
    pub fn set_virtual_address(&mut self, virtual_address: u32) -> crate::Result<()> {
        if self.is_open() {
            return Err(RsrcError::InvalidArgument(
                "virtual address cannot change while the stream is open",
            ));
        }
        self.base_virtual_address = virtual_address;
        Ok(())
    }

    pub fn virtual_address(&self) -> u32 {
        self.base_virtual_address
    }

    pub fn set_ascii_codepage(&mut self, identifier: u32) -> crate::Result<()> {
        self.ascii_codepage = Codepage::from_identifier(identifier)?;
        Ok(())
    }

    pub fn ascii_codepage(&self) -> Codepage {
        self.ascii_codepage
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.abort.clone())
    }

    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn open(&mut self, path: impl AsRef<Path>, flags: AccessFlags) -> crate::Result<()> {
        let file = File::open(path)?;
        self.open_reader(Box::new(BufReader::new(file)), flags)
    }

    /// Opens the stream over an arbitrary reader. The reader must span the
    /// resource section exactly: the root directory lives at its offset 0.
    pub fn open_reader(
        &mut self,
        mut reader: Box<dyn BufReadExt>,
        flags: AccessFlags,
    ) -> crate::Result<()> {
        if self.is_open() {
            return Err(RsrcError::InvalidArgument("stream is already open"));
        }
        if flags.contains(AccessFlags::WRITE) {
            return Err(RsrcError::UnsupportedAccess(flags.bits()));
        }
        if !flags.contains(AccessFlags::READ) {
            return Err(RsrcError::InvalidArgument("read access is required"));
        }

        let stream_size = reader.stream_size()?;
        let root = TreeReader::new(
            reader.as_mut(),
            stream_size,
            self.base_virtual_address,
            &self.abort,
        )
        .read_tree()?;

        self.reader = Some(Rc::new(RefCell::new(reader)));
        self.stream_size = stream_size;
        self.root = Some(root);
        Ok(())
    }

    pub fn close(&mut self) {
        self.reader = None;
        self.root = None;
        self.stream_size = 0;
        self.abort.store(false, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.root.is_some()
    }

    pub fn stream_size(&self) -> u64 {
        self.stream_size
    }

    pub fn root(&self) -> Option<&ResourceDirectory> {
        self.root.as_ref()
    }

    pub fn number_of_resources(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.entries.len())
    }

    pub fn resource(&self, index: usize) -> Option<Resource<'_>> {
        let context = self.context()?;
        self.root
            .as_ref()?
            .entries
            .get(index)
            .map(|entry| Resource::new(context, entry))
    }

    pub fn resources(&self) -> Resources<'_> {
        Resources { stream: self, index: 0 }
    }

    pub fn resource_by_identifier(&self, identifier: u32) -> Option<Resource<'_>> {
        self.resources()
            .find(|resource| resource.identifier() == Some(identifier))
    }

    pub fn resource_by_kind(&self, kind: ResourceKind) -> Option<Resource<'_>> {
        self.resources().find(|resource| resource.kind() == kind)
    }

    pub fn resource_by_name(&self, name: &str) -> Option<Resource<'_>> {
        self.resources()
            .find(|resource| resource.name_utf8() == Some(name))
    }

    fn context(&self) -> Option<StreamContext> {
        Some(StreamContext {
            reader: self.reader.clone()?,
            base_virtual_address: self.base_virtual_address,
            stream_size: self.stream_size,
            ascii_codepage: self.ascii_codepage,
        })
    }
}

pub struct Resources<'a> {
    stream: &'a ResourceStream,
    index: usize,
}

impl<'a> Iterator for Resources<'a> {
    type Item = Resource<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let resource = self.stream.resource(self.index)?;
        self.index += 1;
        Some(resource)
    }
}
